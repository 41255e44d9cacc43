use std::io::Cursor;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RawAudio;

pub const TARGET_SAMPLE_RATE: u32 = 24_000;
pub const DEFAULT_NORMALIZE_PEAK: f32 = 0.95;
/// Shifts beyond two octaves either way are clamped.
pub const MAX_PITCH_SHIFT_SEMITONES: f64 = 24.0;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PostProcessor {
    #[serde(default = "default_target_sample_rate")]
    pub target_sample_rate: u32,
    #[serde(default = "default_normalize_peak")]
    pub normalize_peak: Option<f32>,
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self {
            target_sample_rate: default_target_sample_rate(),
            normalize_peak: default_normalize_peak(),
        }
    }
}

fn default_target_sample_rate() -> u32 {
    TARGET_SAMPLE_RATE
}

fn default_normalize_peak() -> Option<f32> {
    Some(DEFAULT_NORMALIZE_PEAK)
}

impl PostProcessor {
    /// Resamples to the output rate, then applies pitch and speed and
    /// finally peak normalisation.
    pub fn apply(&self, audio: RawAudio, pitch_semitones: f64, speed: f64) -> RawAudio {
        let sample_rate = self.target_sample_rate.max(1);
        let mut samples = resample_linear(&audio.samples, audio.sample_rate, sample_rate);
        samples = apply_pitch_shift(&samples, pitch_semitones, sample_rate);
        samples = apply_speed_change(&samples, speed, sample_rate);
        if let Some(peak) = self.normalize_peak {
            normalize_peak(&mut samples, peak);
        }
        debug!(
            target = "anchortts::audio",
            input_rate = audio.sample_rate,
            input_len = audio.samples.len(),
            output_len = samples.len(),
            pitch_semitones,
            speed,
            "post-processing complete"
        );
        RawAudio {
            samples,
            sample_rate,
        }
    }
}

/// Tape-style pitch shift: playing `sr * 2^(s/12)` material back at `sr`.
/// Raising the pitch shortens the clip by the same ratio.
pub fn apply_pitch_shift(samples: &[f32], semitones: f64, sample_rate: u32) -> Vec<f32> {
    if semitones == 0.0 || !semitones.is_finite() {
        return samples.to_vec();
    }
    let semitones = semitones.clamp(-MAX_PITCH_SHIFT_SEMITONES, MAX_PITCH_SHIFT_SEMITONES);
    let ratio = 2f64.powf(semitones / 12.0);
    let effective_rate = (sample_rate as f64 * ratio) as u32;
    if effective_rate == 0 {
        return samples.to_vec();
    }
    resample_linear(samples, effective_rate, sample_rate)
}

/// Scales duration by `1 / speed` by resampling to `sr / speed` and playing
/// the result at `sr`.
pub fn apply_speed_change(samples: &[f32], speed: f64, sample_rate: u32) -> Vec<f32> {
    if speed == 1.0 || !speed.is_finite() || speed <= 0.0 {
        return samples.to_vec();
    }
    let target_rate = (sample_rate as f64 / speed) as u32;
    if target_rate == 0 {
        return samples.to_vec();
    }
    resample_linear(samples, sample_rate, target_rate)
}

pub fn normalize_peak(samples: &mut [f32], peak: f32) {
    let max = samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
    if max <= f32::EPSILON || !max.is_finite() {
        return;
    }
    let gain = peak / max;
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

pub fn resample_linear(input: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || input.is_empty() || src_rate == 0 || dst_rate == 0 {
        return input.to_vec();
    }

    let ratio = dst_rate as f64 / src_rate as f64;
    let output_len = (input.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);
    let inv_ratio = src_rate as f64 / dst_rate as f64;
    let last = input[input.len() - 1];

    for i in 0..output_len {
        let src_pos = i as f64 * inv_ratio;
        let idx = src_pos as usize;
        if idx + 1 >= input.len() {
            output.push(last);
        } else {
            let frac = (src_pos - idx as f64) as f32;
            let a = input[idx];
            let b = input[idx + 1];
            output.push(a + (b - a) * frac);
        }
    }

    output
}

pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    // 44 byte header + 2 bytes per sample
    let mut buffer = Vec::with_capacity(44 + samples.len() * 2);
    {
        let mut cursor = Cursor::new(&mut buffer);
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }

    Ok(buffer)
}

/// Decodes a WAV container into mono `f32`, averaging channels.
pub fn decode_wav(bytes: &[u8]) -> Result<RawAudio> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(anyhow!(
                    "unsupported bits per sample: {}",
                    spec.bits_per_sample
                ));
            }
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(RawAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[derive(Clone, Debug, Serialize)]
pub struct EncodedAudio {
    pub audio_base64: String,
    pub sample_rate: u32,
    pub waveform_len: usize,
    pub duration_secs: f64,
}

pub fn encode_base64_wav(audio: &RawAudio) -> Result<EncodedAudio> {
    let wav = encode_wav(&audio.samples, audio.sample_rate)?;
    Ok(EncodedAudio {
        audio_base64: BASE64.encode(&wav),
        sample_rate: audio.sample_rate,
        waveform_len: audio.samples.len(),
        duration_secs: audio.duration_secs(),
    })
}
