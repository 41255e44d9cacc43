use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tts_engine::audio::encode_wav;
use voice_anchor::{CharacterRequest, VoiceConstraints};

use crate::job::UNKNOWN;
use crate::synth::{CharacterOutcome, Synthesizer};

/// One `*.json` file in the characters directory.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CharacterFile {
    pub character_id: Option<String>,
    pub archetype: Option<String>,
    pub script: Option<String>,
    pub gender: Option<String>,
    pub voice_constraints: VoiceConstraints,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Generated {
        used_anchor: String,
        output: PathBuf,
        duration: f64,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Serialize)]
pub struct BatchEntry {
    pub source: PathBuf,
    pub character_id: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    fn new(started_at: DateTime<Utc>, entries: Vec<BatchEntry>) -> Self {
        let mut report = Self {
            started_at,
            finished_at: Utc::now(),
            generated: 0,
            skipped: 0,
            failed: 0,
            entries,
        };
        for entry in &report.entries {
            match entry.outcome {
                BatchOutcome::Generated { .. } => report.generated += 1,
                BatchOutcome::Skipped { .. } => report.skipped += 1,
                BatchOutcome::Failed { .. } => report.failed += 1,
            }
        }
        report
    }
}

/// Renders every character file under `characters_dir` into
/// `{output_dir}/{character_id}.wav`. Individual failures are recorded in the
/// report and never stop the batch.
pub async fn run_batch(
    synth: &Synthesizer,
    characters_dir: &Path,
    output_dir: &Path,
    concurrency: usize,
) -> Result<BatchReport> {
    let started_at = Utc::now();
    let sources = character_files(characters_dir).await?;
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    info!(
        target = "anchortts::batch",
        characters = sources.len(),
        dir = %characters_dir.display(),
        "starting batch generation"
    );

    let entries: Vec<BatchEntry> = stream::iter(sources)
        .map(|source| generate_one(synth, source, output_dir))
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let report = BatchReport::new(started_at, entries);
    info!(
        target = "anchortts::batch",
        generated = report.generated,
        skipped = report.skipped,
        failed = report.failed,
        "batch generation finished"
    );
    Ok(report)
}

async fn character_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut reader = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read characters directory {}", dir.display()))?;
    let mut files = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn generate_one(synth: &Synthesizer, source: PathBuf, output_dir: &Path) -> BatchEntry {
    let fallback_id = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let character = match read_character(&source).await {
        Ok(character) => character,
        Err(err) => {
            let error = format!("{err:#}");
            warn!(
                target = "anchortts::batch",
                path = %source.display(),
                %error,
                "unreadable character file"
            );
            return BatchEntry {
                source,
                character_id: fallback_id,
                outcome: BatchOutcome::Failed { error },
            };
        }
    };

    let character_id = character
        .character_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or(fallback_id);
    let outcome = render_character(synth, &character, &character_id, output_dir).await;
    match &outcome {
        BatchOutcome::Generated { used_anchor, .. } => info!(
            target = "anchortts::batch",
            character = %character_id,
            anchor = %used_anchor,
            "character generated"
        ),
        BatchOutcome::Skipped { reason } => info!(
            target = "anchortts::batch",
            character = %character_id,
            %reason,
            "character skipped"
        ),
        BatchOutcome::Failed { error } => warn!(
            target = "anchortts::batch",
            character = %character_id,
            %error,
            "character failed"
        ),
    }
    BatchEntry {
        source,
        character_id,
        outcome,
    }
}

async fn read_character(path: &Path) -> Result<CharacterFile> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

async fn render_character(
    synth: &Synthesizer,
    character: &CharacterFile,
    character_id: &str,
    output_dir: &Path,
) -> BatchOutcome {
    let archetype = character.archetype.as_deref().map(str::trim).unwrap_or("");
    let script = character.script.as_deref().map(str::trim).unwrap_or("");
    if archetype.is_empty() || script.is_empty() {
        return BatchOutcome::Skipped {
            reason: "missing archetype or script".to_string(),
        };
    }

    let gender = character.gender.as_deref().unwrap_or(UNKNOWN);
    let request =
        CharacterRequest::new(archetype, gender).with_constraints(character.voice_constraints);
    let (anchor, audio) = match synth.generate_character(&request, script).await {
        Ok(CharacterOutcome::Generated { anchor, audio }) => (anchor, audio),
        Ok(CharacterOutcome::Skipped(reason)) => return BatchOutcome::Skipped { reason },
        Err(err) => {
            return BatchOutcome::Failed {
                error: err.to_string(),
            }
        }
    };

    let output = output_dir.join(format!("{}.wav", file_safe(character_id)));
    let written = match encode_wav(&audio.samples, audio.sample_rate) {
        Ok(wav) => tokio::fs::write(&output, wav)
            .await
            .with_context(|| format!("failed to write {}", output.display())),
        Err(err) => Err(err),
    };
    match written {
        Ok(()) => BatchOutcome::Generated {
            used_anchor: anchor.profile_id,
            output,
            duration: audio.duration_secs(),
        },
        Err(err) => BatchOutcome::Failed {
            error: format!("{err:#}"),
        },
    }
}

/// Keeps output files inside `output_dir` whatever the id contains.
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
