use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::ProfileCatalog,
    gender::normalize_gender,
    params::{derive_params, SynthesisParams, VoiceConstraints},
    resolver::{resolve_anchor_with, AnchorMatch},
};

/// One synthesis call's character description. Built per job and dropped
/// once the call returns.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CharacterRequest {
    pub archetype: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub voice_constraints: VoiceConstraints,
}

#[derive(Clone, Copy, Debug)]
pub struct ResolvedVoice<'a> {
    pub anchor: AnchorMatch<'a>,
    pub params: SynthesisParams,
}

impl CharacterRequest {
    pub fn new(archetype: impl Into<String>, gender: impl Into<String>) -> Self {
        Self {
            archetype: archetype.into(),
            gender: gender.into(),
            voice_constraints: VoiceConstraints::default(),
        }
    }

    pub fn with_constraints(mut self, constraints: VoiceConstraints) -> Self {
        self.voice_constraints = constraints;
        self
    }

    pub fn normalized_gender(&self) -> String {
        normalize_gender(&self.gender)
    }

    /// Anchor selection followed by parameter derivation.
    pub fn resolve<'a, R>(
        &self,
        catalog: &'a ProfileCatalog,
        rng: &mut R,
    ) -> Option<ResolvedVoice<'a>>
    where
        R: Rng + ?Sized,
    {
        let anchor = resolve_anchor_with(catalog, &self.archetype, &self.gender, rng)?;
        let params = derive_params(anchor.profile, &self.voice_constraints);
        Some(ResolvedVoice { anchor, params })
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::profile::{Conditioning, SynthesisParam, VoiceProfile};

    #[test]
    fn resolves_anchor_and_clamps_params() {
        let catalog = ProfileCatalog::from_profiles(vec![VoiceProfile::new(
            "oracle_female_01",
            "/anchors/oracle_female_01",
        )
        .with_archetype("oracle")
        .with_conditioning(Conditioning {
            speed: Some(0.9),
            energy: Some(0.7),
            ..Default::default()
        })
        .with_range(SynthesisParam::Speed, 0.8, 1.0)]);

        let request = CharacterRequest::new("oracle", "F").with_constraints(VoiceConstraints {
            speed_bias: 0.5,
            energy_bias: 0.1,
            ..Default::default()
        });
        assert_eq!(request.normalized_gender(), "female");

        let mut rng = StdRng::seed_from_u64(1);
        let resolved = request.resolve(&catalog, &mut rng).unwrap();
        assert_eq!(resolved.anchor.profile_id(), "oracle_female_01");
        assert_eq!(resolved.params.speed, 1.0);
        assert!((resolved.params.energy - 0.8).abs() < 1e-12);
    }

    #[test]
    fn unknown_archetype_resolves_to_none() {
        let mut rng = StdRng::seed_from_u64(1);
        let request = CharacterRequest::new("ghost", "m");
        assert!(request
            .resolve(&ProfileCatalog::default(), &mut rng)
            .is_none());
    }
}
