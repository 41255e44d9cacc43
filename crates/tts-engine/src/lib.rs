use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod audio;
mod engine_kind;
pub mod remote;

pub use audio::{EncodedAudio, PostProcessor, TARGET_SAMPLE_RATE};
pub use engine_kind::EngineKind;
pub use remote::{RemoteEngine, RemoteEngineConfig};

#[derive(Debug, Error)]
pub enum TtsEngineError {
    #[error("reference audio unavailable at {}: {source}", .path.display())]
    ReferenceAudio {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("engine request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("engine returned an error: {0}")]
    Upstream(String),
    #[error("engine returned undecodable audio: {0}")]
    Decode(String),
}

/// Voice to condition on. Anchor recordings are referenced by path and only
/// read when the request is sent.
#[derive(Clone, Debug, PartialEq)]
pub enum ReferenceAudio {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl ReferenceAudio {
    pub async fn load(&self) -> Result<Vec<u8>, TtsEngineError> {
        match self {
            ReferenceAudio::Path(path) => {
                tokio::fs::read(path)
                    .await
                    .map_err(|source| TtsEngineError::ReferenceAudio {
                        path: path.clone(),
                        source,
                    })
            }
            ReferenceAudio::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct EngineRequest {
    pub text: String,
    pub reference_audio: Option<ReferenceAudio>,
    pub reference_text: Option<String>,
    pub language: String,
    pub accent_hint: Option<String>,
    pub exaggeration: f32,
    pub temperature: f32,
    pub seed: Option<u64>,
}

impl EngineRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reference_audio: None,
            reference_text: None,
            language: "en".to_string(),
            accent_hint: None,
            exaggeration: 0.5,
            temperature: 0.8,
            seed: None,
        }
    }

    pub fn is_zero_shot(&self) -> bool {
        self.reference_audio.is_none()
    }
}

/// Mono waveform as produced by an engine or the post-processor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl RawAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[async_trait]
pub trait TtsEngine: Send + Sync {
    fn kind(&self) -> EngineKind;
    fn label(&self) -> String {
        self.kind().as_str().to_string()
    }
    async fn synthesize(&self, request: EngineRequest) -> Result<RawAudio>;
    async fn ready(&self) -> bool;
}
