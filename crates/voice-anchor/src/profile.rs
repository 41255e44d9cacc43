use std::{collections::HashMap, fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::gender::infer_gender_from_id;

pub const PROFILE_FILE_NAME: &str = "profile.json";
pub const REFERENCE_AUDIO_FILE_NAME: &str = "reference.wav";

/// The three knobs an anchor profile calibrates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisParam {
    PitchShift,
    Speed,
    Energy,
}

impl SynthesisParam {
    pub const ALL: [SynthesisParam; 3] = [
        SynthesisParam::PitchShift,
        SynthesisParam::Speed,
        SynthesisParam::Energy,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            SynthesisParam::PitchShift => "pitch_shift",
            SynthesisParam::Speed => "speed",
            SynthesisParam::Energy => "energy",
        }
    }

    pub const fn default_baseline(&self) -> f64 {
        match self {
            SynthesisParam::PitchShift => 0.0,
            SynthesisParam::Speed => 1.0,
            SynthesisParam::Energy => 0.5,
        }
    }

    pub const fn default_range(&self) -> ParamRange {
        match self {
            SynthesisParam::PitchShift => ParamRange::new(-2.0, 2.0),
            SynthesisParam::Speed => ParamRange::new(0.5, 1.5),
            SynthesisParam::Energy => ParamRange::new(0.0, 1.0),
        }
    }
}

impl fmt::Display for SynthesisParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive `[min, max]` bound, stored on disk as a two element array.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `max(min, min(value, max))`. An inverted range saturates to `min`.
    pub fn clamp(&self, value: f64) -> f64 {
        self.min.max(value.min(self.max))
    }
}

impl From<[f64; 2]> for ParamRange {
    fn from([min, max]: [f64; 2]) -> Self {
        Self::new(min, max)
    }
}

impl From<ParamRange> for [f64; 2] {
    fn from(range: ParamRange) -> Self {
        [range.min, range.max]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Conditioning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_shift: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
}

impl Conditioning {
    pub fn baseline(&self, param: SynthesisParam) -> f64 {
        let value = match param {
            SynthesisParam::PitchShift => self.pitch_shift,
            SynthesisParam::Speed => self.speed,
            SynthesisParam::Energy => self.energy,
        };
        value.unwrap_or_else(|| param.default_baseline())
    }
}

/// Shape of a `profile.json` file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ProfileDocument {
    #[serde(default)]
    pub base_archetype: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub conditioning: Conditioning,
    #[serde(default)]
    pub allowed_variation: HashMap<String, ParamRange>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VoiceProfile {
    pub profile_id: String,
    pub directory: PathBuf,
    pub base_archetype: Option<String>,
    /// Declared gender, lower-cased. Empty when the profile does not say.
    pub gender: String,
    pub conditioning: Conditioning,
    pub allowed_variation: HashMap<String, ParamRange>,
}

impl VoiceProfile {
    pub fn new(profile_id: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            profile_id: profile_id.into(),
            directory: directory.into(),
            base_archetype: None,
            gender: String::new(),
            conditioning: Conditioning::default(),
            allowed_variation: HashMap::new(),
        }
    }

    pub fn from_document(
        profile_id: impl Into<String>,
        directory: impl Into<PathBuf>,
        document: ProfileDocument,
    ) -> Self {
        Self {
            profile_id: profile_id.into(),
            directory: directory.into(),
            base_archetype: document
                .base_archetype
                .filter(|archetype| !archetype.is_empty()),
            gender: document
                .gender
                .map(|gender| gender.trim().to_lowercase())
                .unwrap_or_default(),
            conditioning: document.conditioning,
            allowed_variation: document.allowed_variation,
        }
    }

    pub fn with_archetype(mut self, archetype: impl Into<String>) -> Self {
        self.base_archetype = Some(archetype.into()).filter(|archetype| !archetype.is_empty());
        self
    }

    pub fn with_gender(mut self, gender: impl AsRef<str>) -> Self {
        self.gender = gender.as_ref().trim().to_lowercase();
        self
    }

    pub fn with_conditioning(mut self, conditioning: Conditioning) -> Self {
        self.conditioning = conditioning;
        self
    }

    pub fn with_range(mut self, param: SynthesisParam, min: f64, max: f64) -> Self {
        self.allowed_variation
            .insert(param.as_str().to_string(), ParamRange::new(min, max));
        self
    }

    /// Declared gender, or the one guessed from the id, or `""`.
    pub fn resolved_gender(&self) -> &str {
        if !self.gender.is_empty() {
            return &self.gender;
        }
        infer_gender_from_id(&self.profile_id).unwrap_or("")
    }

    pub fn allowed_range(&self, param: SynthesisParam) -> ParamRange {
        self.allowed_variation
            .get(param.as_str())
            .copied()
            .unwrap_or_else(|| param.default_range())
    }

    pub fn reference_audio_path(&self) -> PathBuf {
        self.directory.join(REFERENCE_AUDIO_FILE_NAME)
    }

    pub fn profile_path(&self) -> PathBuf {
        self.directory.join(PROFILE_FILE_NAME)
    }
}
