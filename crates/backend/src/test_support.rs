use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tts_engine::{audio::encode_wav, EngineKind, EngineRequest, PostProcessor, RawAudio, TtsEngine};
use voice_anchor::ProfileCatalog;

use crate::synth::Synthesizer;

/// In-process engine that returns a short tone and records every request.
#[derive(Default)]
pub struct MockEngine {
    requests: Mutex<Vec<EngineRequest>>,
    failure: Option<String>,
    not_ready: bool,
}

impl MockEngine {
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn not_ready() -> Self {
        Self {
            not_ready: true,
            ..Default::default()
        }
    }

    pub fn last_request(&self) -> Option<EngineRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl TtsEngine for MockEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Chatterbox
    }

    async fn synthesize(&self, request: EngineRequest) -> Result<RawAudio> {
        self.requests.lock().push(request);
        if let Some(message) = &self.failure {
            return Err(anyhow!(message.clone()));
        }
        Ok(RawAudio {
            samples: (0..2_205).map(|i| (i as f32 * 0.07).sin() * 0.2).collect(),
            sample_rate: 22_050,
        })
    }

    async fn ready(&self) -> bool {
        !self.not_ready
    }
}

fn write_profile(root: &Path, rel: &str, json: &str, with_reference: bool) {
    let dir = root.join(rel);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("profile.json"), json).unwrap();
    if with_reference {
        let wav = encode_wav(&[0.0, 0.1, -0.1, 0.0], 24_000).unwrap();
        fs::write(dir.join("reference.wav"), wav).unwrap();
    }
}

/// One recorded male manipulator and one female mentor without a recording.
pub fn anchor_tree(root: &Path) {
    write_profile(
        root,
        "dark_manipulator/dm_male_01",
        r#"{
            "base_archetype": "dark_manipulator",
            "gender": "male",
            "conditioning": { "pitch_shift": 1.0, "speed": 0.95, "energy": 0.4 },
            "allowed_variation": { "pitch_shift": [-2, 2] }
        }"#,
        true,
    );
    write_profile(
        root,
        "wise_mentor/mentor_female_01",
        r#"{ "base_archetype": "wise_mentor" }"#,
        false,
    );
}

pub fn synthesizer(root: &Path, engine: Arc<dyn TtsEngine>) -> Synthesizer {
    Synthesizer::new(
        Arc::new(ProfileCatalog::load(root)),
        engine,
        PostProcessor::default(),
        2,
    )
    .with_seed(Some(7))
}
