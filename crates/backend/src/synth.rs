use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tts_engine::{
    audio::encode_base64_wav, EngineRequest, PostProcessor, RawAudio, ReferenceAudio, TtsEngine,
};
use voice_anchor::{CharacterRequest, MatchTier, ProfileCatalog, SynthesisParams};

use crate::job::{prepare_text, preview_text, JobError, JobInput, JobOutput, LEGACY_ANCHOR};

const DEFAULT_EXAGGERATION: f32 = 0.5;
const DEFAULT_TEMPERATURE: f32 = 0.8;
const MIN_SPEED: f64 = 0.25;
const MAX_SPEED: f64 = 4.0;
const MAX_PITCH: f64 = 12.0;

/// Anchor chosen for a job, with its recording confirmed on disk.
#[derive(Clone, Debug)]
pub struct SelectedAnchor {
    pub profile_id: String,
    pub tier: MatchTier,
    pub params: SynthesisParams,
    pub reference: PathBuf,
}

#[derive(Debug)]
enum AnchorLookup {
    Ready(SelectedAnchor),
    MissingReference { profile_id: String, path: PathBuf },
    NotFound,
}

#[derive(Debug)]
pub enum CharacterOutcome {
    Generated {
        anchor: SelectedAnchor,
        audio: RawAudio,
    },
    Skipped(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct AnchorSummary {
    pub profile_id: String,
    pub archetype: Option<String>,
    pub gender: String,
    pub has_reference: bool,
}

pub struct Synthesizer {
    catalog: Arc<ProfileCatalog>,
    engine: Arc<dyn TtsEngine>,
    postprocess: PostProcessor,
    limiter: Arc<Semaphore>,
    rng: Mutex<StdRng>,
    max_text_chars: usize,
}

impl Synthesizer {
    pub fn new(
        catalog: Arc<ProfileCatalog>,
        engine: Arc<dyn TtsEngine>,
        postprocess: PostProcessor,
        max_parallel: usize,
    ) -> Self {
        Self {
            catalog,
            engine,
            postprocess,
            limiter: Arc::new(Semaphore::new(max_parallel.max(1))),
            rng: Mutex::new(StdRng::from_entropy()),
            max_text_chars: 500,
        }
    }

    pub fn with_seed(self, seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self {
                rng: Mutex::new(StdRng::seed_from_u64(seed)),
                ..self
            },
            None => self,
        }
    }

    pub fn with_max_text_chars(mut self, max_text_chars: usize) -> Self {
        self.max_text_chars = max_text_chars.max(1);
        self
    }

    pub fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    pub fn engine_label(&self) -> String {
        self.engine.label()
    }

    pub async fn engine_ready(&self) -> bool {
        self.engine.ready().await
    }

    pub fn anchors(&self) -> Vec<AnchorSummary> {
        let mut anchors: Vec<AnchorSummary> = self
            .catalog
            .iter()
            .map(|profile| AnchorSummary {
                profile_id: profile.profile_id.clone(),
                archetype: profile.base_archetype.clone(),
                gender: profile.resolved_gender().to_string(),
                has_reference: profile.reference_audio_path().is_file(),
            })
            .collect();
        anchors.sort_by(|a, b| a.profile_id.cmp(&b.profile_id));
        anchors
    }

    #[instrument(skip(self, input), fields(character_id = %input.character_id()))]
    pub async fn run(&self, input: JobInput) -> Result<JobOutput, JobError> {
        let started_at = Instant::now();
        let text = prepare_text(input.text.as_deref(), self.max_text_chars)?;
        let caller_reference = decode_reference(input.reference_audio.as_deref())?;

        let anchor = match input.archetype() {
            Some(archetype) => {
                let request = CharacterRequest::new(archetype, input.gender())
                    .with_constraints(input.voice_constraints);
                match self.lookup_anchor(&request).await {
                    AnchorLookup::Ready(anchor) => Some(anchor),
                    AnchorLookup::MissingReference { profile_id, path } => {
                        warn!(
                            target = "anchortts::synth",
                            profile = %profile_id,
                            path = %path.display(),
                            "anchor reference audio missing; using zero-shot synthesis"
                        );
                        None
                    }
                    AnchorLookup::NotFound => {
                        debug!(
                            target = "anchortts::synth",
                            archetype,
                            "no anchor for archetype; using zero-shot synthesis"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        let mut request = EngineRequest::new(text.clone());
        if let Some(language) = input.language.clone() {
            request.language = language;
        }
        request.accent_hint = input.accent_hint.clone();
        request.temperature = finite_or(input.temperature, DEFAULT_TEMPERATURE, "temperature")?;
        request.seed = input.seed;

        let params = match &anchor {
            Some(anchor) => {
                request.reference_audio = Some(ReferenceAudio::Path(anchor.reference.clone()));
                request.exaggeration =
                    finite_or(input.exaggeration, anchor.params.energy as f32, "exaggeration")?;
                anchor.params
            }
            None => {
                if let Some(bytes) = caller_reference {
                    request.reference_audio = Some(ReferenceAudio::Bytes(bytes));
                    request.reference_text = input.reference_text.clone();
                }
                request.exaggeration =
                    finite_or(input.exaggeration, DEFAULT_EXAGGERATION, "exaggeration")?;
                let (pitch_shift, speed) = legacy_params(input.pitch, input.speed)?;
                SynthesisParams {
                    pitch_shift,
                    speed,
                    energy: f64::from(request.exaggeration),
                }
            }
        };

        debug!(
            target = "anchortts::synth",
            text_len = text.len(),
            text_preview = %preview_text(&text),
            anchor = anchor.as_ref().map(|a| a.profile_id.as_str()),
            pitch_shift = params.pitch_shift,
            speed = params.speed,
            "job accepted"
        );

        let audio = self.render(request, params).await?;
        let encoded = tokio::task::spawn_blocking(move || encode_base64_wav(&audio))
            .await
            .map_err(|err| JobError::Internal(err.into()))?
            .map_err(JobError::Internal)?;

        let output = JobOutput {
            request_id: Uuid::new_v4(),
            character_id: input.character_id().to_string(),
            engine: self.engine.label(),
            audio_base64: encoded.audio_base64,
            format: "wav",
            sample_rate: encoded.sample_rate,
            duration: encoded.duration_secs,
            waveform_len: encoded.waveform_len,
            used_anchor: anchor
                .as_ref()
                .map(|a| a.profile_id.clone())
                .unwrap_or_else(|| LEGACY_ANCHOR.to_string()),
            anchor_match: anchor.as_ref().map(|a| a.tier),
            params,
        };

        info!(
            target = "anchortts::synth",
            request_id = %output.request_id,
            used_anchor = %output.used_anchor,
            engine = %output.engine,
            sample_rate = output.sample_rate,
            waveform_len = output.waveform_len,
            elapsed_ms = started_at.elapsed().as_millis(),
            "job complete"
        );
        Ok(output)
    }

    /// Batch path: only anchored voices are generated, everything else is
    /// skipped with a reason.
    #[instrument(skip(self, request, script), fields(archetype = %request.archetype))]
    pub async fn generate_character(
        &self,
        request: &CharacterRequest,
        script: &str,
    ) -> Result<CharacterOutcome, JobError> {
        let text = prepare_text(Some(script), self.max_text_chars)?;
        let anchor = match self.lookup_anchor(request).await {
            AnchorLookup::Ready(anchor) => anchor,
            AnchorLookup::MissingReference { profile_id, path } => {
                return Ok(CharacterOutcome::Skipped(format!(
                    "anchor {profile_id} has no reference audio at {}",
                    path.display()
                )));
            }
            AnchorLookup::NotFound => {
                return Ok(CharacterOutcome::Skipped(format!(
                    "no anchor for archetype {}",
                    request.archetype
                )));
            }
        };

        let mut engine_request = EngineRequest::new(text);
        engine_request.reference_audio = Some(ReferenceAudio::Path(anchor.reference.clone()));
        engine_request.exaggeration = anchor.params.energy as f32;
        let audio = self.render(engine_request, anchor.params).await?;
        Ok(CharacterOutcome::Generated { anchor, audio })
    }

    async fn lookup_anchor(&self, request: &CharacterRequest) -> AnchorLookup {
        let resolved = {
            let mut rng = self.rng.lock();
            request.resolve(&self.catalog, &mut *rng)
        };
        let Some(resolved) = resolved else {
            return AnchorLookup::NotFound;
        };

        let profile_id = resolved.anchor.profile_id().to_string();
        let path = resolved.anchor.profile.reference_audio_path();
        let exists = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !exists {
            return AnchorLookup::MissingReference { profile_id, path };
        }
        AnchorLookup::Ready(SelectedAnchor {
            profile_id,
            tier: resolved.anchor.tier,
            params: resolved.params,
            reference: path,
        })
    }

    async fn render(
        &self,
        mut request: EngineRequest,
        params: SynthesisParams,
    ) -> Result<RawAudio, JobError> {
        let kind = self.engine.kind();
        if !kind.supports_cloning() && request.reference_audio.is_some() {
            warn!(
                target = "anchortts::synth",
                engine = %kind,
                "engine cannot clone voices; dropping reference audio"
            );
            request.reference_audio = None;
            request.reference_text = None;
        }

        let raw = {
            let _permit = self
                .limiter
                .acquire()
                .await
                .map_err(|err| JobError::Internal(err.into()))?;
            self.engine
                .synthesize(request)
                .await
                .map_err(JobError::Engine)?
        };
        if raw.samples.is_empty() {
            return Err(JobError::Engine(anyhow!("engine returned no audio")));
        }

        let postprocess = self.postprocess.clone();
        tokio::task::spawn_blocking(move || {
            postprocess.apply(raw, params.pitch_shift, params.speed)
        })
        .await
        .map_err(|err| JobError::Internal(err.into()))
    }
}

fn decode_reference(encoded: Option<&str>) -> Result<Option<Vec<u8>>, JobError> {
    match encoded.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => BASE64
            .decode(value.as_bytes())
            .map(Some)
            .map_err(|err| {
                JobError::invalid(format!("reference_audio is not valid base64: {err}"))
            }),
        None => Ok(None),
    }
}

fn legacy_params(pitch: Option<f64>, speed: Option<f64>) -> Result<(f64, f64), JobError> {
    let pitch = pitch.unwrap_or(0.0);
    let speed = speed.unwrap_or(1.0);
    if !pitch.is_finite() || !(-MAX_PITCH..=MAX_PITCH).contains(&pitch) {
        return Err(JobError::invalid(format!(
            "pitch must lie in [-{MAX_PITCH}, {MAX_PITCH}] semitones"
        )));
    }
    if !speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
        return Err(JobError::invalid(format!(
            "speed must lie in [{MIN_SPEED}, {MAX_SPEED}]"
        )));
    }
    Ok((pitch, speed))
}

fn finite_or(value: Option<f32>, default: f32, name: &str) -> Result<f32, JobError> {
    match value {
        Some(value) if !value.is_finite() => {
            Err(JobError::invalid(format!("{name} must be a finite number")))
        }
        Some(value) => Ok(value),
        None => Ok(default),
    }
}
