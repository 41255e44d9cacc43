use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Chatterbox,
    F5,
    FishSpeech,
    Xtts,
    Maya,
    #[serde(rename = "openvoice")]
    OpenVoice,
}

impl EngineKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Chatterbox => "chatterbox",
            EngineKind::F5 => "f5",
            EngineKind::FishSpeech => "fish_speech",
            EngineKind::Xtts => "xtts",
            EngineKind::Maya => "maya",
            EngineKind::OpenVoice => "openvoice",
        }
    }

    /// Whether the engine can condition on a reference recording.
    pub const fn supports_cloning(&self) -> bool {
        !matches!(self, EngineKind::Maya)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chatterbox" => Ok(EngineKind::Chatterbox),
            "f5" | "f5-tts" | "f5_tts" => Ok(EngineKind::F5),
            "fish_speech" | "fish-speech" | "fishspeech" => Ok(EngineKind::FishSpeech),
            "xtts" | "xtts_v2" | "xtts-v2" => Ok(EngineKind::Xtts),
            "maya" | "maya-1" | "fastmaya" => Ok(EngineKind::Maya),
            "openvoice" | "open_voice" | "open-voice" => Ok(EngineKind::OpenVoice),
            _ => Err(()),
        }
    }
}
