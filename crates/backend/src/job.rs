use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use voice_anchor::{MatchTier, SynthesisParams, VoiceConstraints};

pub const DEFAULT_TEXT: &str = "Hello!";
pub const LEGACY_ANCHOR: &str = "legacy";
pub const UNKNOWN: &str = "unknown";

/// Job payload accepted by both `/api/synthesize` and the `/run` envelope.
/// Every field is optional.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct JobInput {
    pub text: Option<String>,
    pub archetype: Option<String>,
    pub gender: Option<String>,
    pub character_id: Option<String>,
    pub voice_constraints: VoiceConstraints,
    pub language: Option<String>,
    pub accent_hint: Option<String>,
    pub exaggeration: Option<f32>,
    pub temperature: Option<f32>,
    pub seed: Option<u64>,
    /// Base64 WAV used when no anchor recording applies.
    pub reference_audio: Option<String>,
    pub reference_text: Option<String>,
    pub pitch: Option<f64>,
    pub speed: Option<f64>,
}

impl JobInput {
    pub fn archetype(&self) -> Option<&str> {
        self.archetype
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn gender(&self) -> &str {
        self.gender.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn character_id(&self) -> &str {
        self.character_id.as_deref().unwrap_or(UNKNOWN)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct JobOutput {
    pub request_id: Uuid,
    pub character_id: String,
    pub engine: String,
    pub audio_base64: String,
    pub format: &'static str,
    pub sample_rate: u32,
    /// Seconds.
    pub duration: f64,
    pub waveform_len: usize,
    pub used_anchor: String,
    pub anchor_match: Option<MatchTier>,
    pub params: SynthesisParams,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("synthesis engine failed: {0:#}")]
    Engine(anyhow::Error),
    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl JobError {
    pub fn invalid(message: impl Into<String>) -> Self {
        JobError::InvalidInput(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            JobError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            JobError::Engine(_) => StatusCode::BAD_GATEWAY,
            JobError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Applies the default, rejects blank text and truncates to `max_chars`
/// characters.
pub fn prepare_text(raw: Option<&str>, max_chars: usize) -> Result<String, JobError> {
    let text = raw.unwrap_or(DEFAULT_TEXT).trim();
    if text.is_empty() {
        return Err(JobError::invalid("text must not be empty"));
    }
    Ok(text.chars().take(max_chars.max(1)).collect())
}

pub fn preview_text(value: &str) -> String {
    const LIMIT: usize = 80;
    let mut chars = value.chars();
    let mut preview: String = chars.by_ref().take(LIMIT).collect();
    if chars.next().is_some() {
        preview.push('…');
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_gets_defaults() {
        let input: JobInput = serde_json::from_str("{}").unwrap();
        assert!(input.archetype().is_none());
        assert_eq!(input.gender(), "unknown");
        assert_eq!(input.character_id(), "unknown");
        assert_eq!(prepare_text(input.text.as_deref(), 500).unwrap(), "Hello!");
    }

    #[test]
    fn blank_archetype_is_treated_as_absent() {
        let json = r#"{ "archetype": "  ", "voice_constraints": { "pitch_bias": 1.5 } }"#;
        let input: JobInput = serde_json::from_str(json).unwrap();
        assert!(input.archetype().is_none());
        assert_eq!(input.voice_constraints.pitch_bias, 1.5);
    }

    #[test]
    fn text_is_trimmed_and_truncated_by_chars() {
        assert!(matches!(
            prepare_text(Some("   "), 500),
            Err(JobError::InvalidInput(_))
        ));
        let long = "é".repeat(600);
        assert_eq!(prepare_text(Some(&long), 500).unwrap().chars().count(), 500);
        assert_eq!(prepare_text(Some("  hi  "), 500).unwrap(), "hi");
    }

    #[test]
    fn errors_map_to_status_codes() {
        assert_eq!(JobError::invalid("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            JobError::Engine(anyhow::anyhow!("down")).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            JobError::Internal(anyhow::anyhow!("oops")).to_string(),
            "internal error: oops"
        );
    }

    #[test]
    fn preview_marks_truncation() {
        assert_eq!(preview_text("short"), "short");
        assert!(preview_text(&"a".repeat(200)).ends_with('…'));
    }
}
