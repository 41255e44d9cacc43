//! Voice anchor selection for character synthesis.
//!
//! A [`ProfileCatalog`] is loaded once from a tree of `profile.json` files.
//! [`resolve_anchor`] picks a recorded reference voice for an archetype and
//! gender, and [`derive_params`] turns that profile plus caller biases into
//! bounded pitch/speed/energy values.

pub mod catalog;
pub mod error;
pub mod gender;
pub mod params;
pub mod profile;
pub mod request;
pub mod resolver;

pub use catalog::{read_profile, ProfileCatalog};
pub use error::CatalogError;
pub use gender::{infer_gender_from_id, normalize_gender};
pub use params::{clamp, derive_params, SynthesisParams, VoiceConstraints};
pub use profile::{
    Conditioning, ParamRange, ProfileDocument, SynthesisParam, VoiceProfile, PROFILE_FILE_NAME,
    REFERENCE_AUDIO_FILE_NAME,
};
pub use request::{CharacterRequest, ResolvedVoice};
pub use resolver::{resolve_anchor, resolve_anchor_with, AnchorMatch, MatchTier};
