mod batch;
mod config;
mod job;
mod routes;
mod synth;
#[cfg(test)]
mod test_support;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use routes::{build_router, ApiState};
use synth::Synthesizer;
use tokio::signal;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};
use tts_engine::{RemoteEngine, TtsEngine};
use voice_anchor::ProfileCatalog;

use crate::config::AppConfig;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Character voice synthesis backed by archetype voice anchors"
)]
struct Cli {
    /// Path to configuration file
    #[arg(long)]
    config: PathBuf,
    /// Logging level (error|warn|info|debug|trace)
    #[arg(long, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP job API (default)
    Serve,
    /// Render every character file in a directory to WAV
    Generate {
        /// Directory of character `*.json` files
        #[arg(long)]
        characters_dir: PathBuf,
        /// Directory the WAV files are written to
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,
        /// Characters rendered at the same time
        #[arg(long, default_value_t = 2)]
        concurrency: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let (config, config_dir) = AppConfig::load(cli.config.clone())?;
    info!(
        target = "anchortts::backend",
        config_dir = %config_dir.display(),
        profiles_dir = %config.profiles.dir.display(),
        engine = %config.engine.kind,
        "configuration loaded"
    );
    let synthesizer = Arc::new(build_synthesizer(&config)?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, synthesizer).await,
        Command::Generate {
            characters_dir,
            output_dir,
            concurrency,
        } => {
            let report =
                batch::run_batch(&synthesizer, &characters_dir, &output_dir, concurrency).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to render batch report")?
            );
            Ok(())
        }
    }
}

fn build_synthesizer(config: &AppConfig) -> Result<Synthesizer> {
    let catalog = ProfileCatalog::load(&config.profiles.dir);
    if catalog.is_empty() {
        warn!(
            target = "anchortts::backend",
            dir = %config.profiles.dir.display(),
            "no voice profiles loaded; every job will use zero-shot synthesis"
        );
    }

    let engine: Arc<dyn TtsEngine> = Arc::new(
        RemoteEngine::new(config.engine.clone()).context("failed to build engine client")?,
    );
    Ok(Synthesizer::new(
        Arc::new(catalog),
        engine,
        config.postprocess.clone(),
        config.api.max_parallel,
    )
    .with_seed(config.profiles.seed)
    .with_max_text_chars(config.api.max_text_chars))
}

async fn serve(config: &AppConfig, synthesizer: Arc<Synthesizer>) -> Result<()> {
    if !synthesizer.engine_ready().await {
        warn!(
            target = "anchortts::backend",
            endpoint = %config.engine.endpoint,
            "engine is not ready yet; /ready will report 503 until it is"
        );
    }

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
        .on_failure(DefaultOnFailure::new().level(Level::WARN));

    let app = build_router(ApiState { synthesizer }).layer(trace_layer);

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .context("bind_addr must be in host:port format")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    info!(target = "anchortts::backend", %addr, "backend ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(target = "anchortts::backend", "shutdown complete");
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new(format!("anchortts={level}")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow!("failed to initialise tracing subscriber: {err}"))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(target = "anchortts::backend", %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                warn!(target = "anchortts::backend", %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!(target = "anchortts::backend", "shutdown signal received");
}
