use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config as config_rs;
use serde::Deserialize;
use tts_engine::{PostProcessor, RemoteEngineConfig};

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub profiles: ProfilesConfig,
    pub engine: RemoteEngineConfig,
    #[serde(default)]
    pub postprocess: PostProcessor,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ProfilesConfig {
    #[serde(default = "default_profiles_dir")]
    pub dir: PathBuf,
    /// Fixes anchor selection order; unset means a fresh entropy seed.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            dir: default_profiles_dir(),
            seed: None,
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:27121".to_string()
}

fn default_max_parallel() -> usize {
    2
}

fn default_max_text_chars() -> usize {
    500
}

fn default_profiles_dir() -> PathBuf {
    PathBuf::from("voice_profiles")
}

impl AppConfig {
    pub fn load(path: PathBuf) -> Result<(Self, PathBuf)> {
        let config_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let builder = config_rs::Config::builder()
            .add_source(config_rs::File::from(path.clone()))
            .add_source(config_rs::Environment::with_prefix("ANCHORTTS").separator("__"));

        let cfg = builder
            .build()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;

        let mut app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        app_cfg.rebase_paths(&config_dir);
        app_cfg.validate()?;
        Ok((app_cfg, config_dir))
    }

    fn rebase_paths(&mut self, base: &Path) {
        self.profiles.dir = normalize_optional(base, &self.profiles.dir);
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.engine.endpoint.trim().is_empty(),
            "engine.endpoint must not be empty"
        );
        anyhow::ensure!(self.api.max_text_chars > 0, "api.max_text_chars must be positive");
        Ok(())
    }
}

/// The profile tree may not exist yet, so a failed canonicalize keeps the
/// joined path.
fn normalize_optional(base: &Path, path: &Path) -> PathBuf {
    let candidate = absolute_path(base, path);
    candidate.canonicalize().unwrap_or(candidate)
}

fn absolute_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
