use serde::{Deserialize, Serialize};

use crate::profile::{SynthesisParam, VoiceProfile};

/// Caller offsets applied to a profile's baseline before clamping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceConstraints {
    #[serde(default)]
    pub pitch_bias: f64,
    #[serde(default)]
    pub speed_bias: f64,
    #[serde(default)]
    pub energy_bias: f64,
}

impl VoiceConstraints {
    pub fn bias(&self, param: SynthesisParam) -> f64 {
        let bias = match param {
            SynthesisParam::PitchShift => self.pitch_bias,
            SynthesisParam::Speed => self.speed_bias,
            SynthesisParam::Energy => self.energy_bias,
        };
        if bias.is_nan() {
            0.0
        } else {
            bias
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    pub pitch_shift: f64,
    pub speed: f64,
    pub energy: f64,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            pitch_shift: SynthesisParam::PitchShift.default_baseline(),
            speed: SynthesisParam::Speed.default_baseline(),
            energy: SynthesisParam::Energy.default_baseline(),
        }
    }
}

impl SynthesisParams {
    pub fn get(&self, param: SynthesisParam) -> f64 {
        match param {
            SynthesisParam::PitchShift => self.pitch_shift,
            SynthesisParam::Speed => self.speed,
            SynthesisParam::Energy => self.energy,
        }
    }

    fn set(&mut self, param: SynthesisParam, value: f64) {
        match param {
            SynthesisParam::PitchShift => self.pitch_shift = value,
            SynthesisParam::Speed => self.speed = value,
            SynthesisParam::Energy => self.energy = value,
        }
    }
}

pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    lo.max(value.min(hi))
}

/// Baseline plus bias, saturated into the profile's allowed range.
///
/// Total: every output lies inside the declared (or default) range no matter
/// how large the bias is.
pub fn derive_params(profile: &VoiceProfile, constraints: &VoiceConstraints) -> SynthesisParams {
    let mut params = SynthesisParams::default();
    for param in SynthesisParam::ALL {
        let candidate = profile.conditioning.baseline(param) + constraints.bias(param);
        let range = profile.allowed_range(param);
        params.set(param, clamp(candidate, range.min, range.max));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Conditioning;

    fn profile() -> VoiceProfile {
        VoiceProfile::new("dm_male_01", "/anchors/dm_male_01")
            .with_archetype("dark_manipulator")
            .with_conditioning(Conditioning {
                pitch_shift: Some(1.0),
                ..Default::default()
            })
            .with_range(SynthesisParam::PitchShift, -2.0, 2.0)
    }

    #[test]
    fn saturates_at_upper_bound() {
        let constraints = VoiceConstraints {
            pitch_bias: 5.0,
            ..Default::default()
        };
        let params = derive_params(&profile(), &constraints);
        assert_eq!(params.pitch_shift, 2.0);
        assert_eq!(params.speed, 1.0);
        assert_eq!(params.energy, 0.5);
    }

    #[test]
    fn applies_bias_inside_range() {
        let constraints = VoiceConstraints {
            pitch_bias: -0.5,
            speed_bias: 0.2,
            energy_bias: -0.1,
        };
        let params = derive_params(&profile(), &constraints);
        assert_eq!(params.pitch_shift, 0.5);
        assert!((params.speed - 1.2).abs() < 1e-12);
        assert!((params.energy - 0.4).abs() < 1e-12);
    }

    #[test]
    fn infinite_biases_stay_in_range() {
        let profile = profile();
        for bias in [f64::INFINITY, f64::NEG_INFINITY, 1e300, -1e300] {
            let constraints = VoiceConstraints {
                pitch_bias: bias,
                speed_bias: bias,
                energy_bias: bias,
            };
            let params = derive_params(&profile, &constraints);
            for param in SynthesisParam::ALL {
                let range = profile.allowed_range(param);
                let value = params.get(param);
                assert!(value >= range.min && value <= range.max, "{param}={value}");
            }
        }
    }

    #[test]
    fn nan_bias_is_ignored() {
        let constraints = VoiceConstraints {
            pitch_bias: f64::NAN,
            ..Default::default()
        };
        assert_eq!(derive_params(&profile(), &constraints).pitch_shift, 1.0);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let constraints = VoiceConstraints {
            pitch_bias: 0.3,
            speed_bias: -2.0,
            energy_bias: 0.9,
        };
        let profile = profile();
        assert_eq!(
            derive_params(&profile, &constraints),
            derive_params(&profile, &constraints)
        );
    }

    #[test]
    fn deserializes_partial_constraints() {
        let constraints: VoiceConstraints =
            serde_json::from_str(r#"{ "speed_bias": -0.25 }"#).unwrap();
        assert_eq!(constraints.speed_bias, -0.25);
        assert_eq!(constraints.pitch_bias, 0.0);
    }
}
