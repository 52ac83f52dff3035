//! Generated transition effects.
//!
//! Every clip is shaped noise: band-limited with biquads, then given an
//! attack/release envelope.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::audio::DecodedBuffer;
use crate::config::ScheduleConfig;
use crate::dsp::{Biquad, BiquadKind};
use crate::plan::TransitionSound;

use super::CueAssetProvider;

const SWEEP_START_HZ: f32 = 400.0;
const SWEEP_END_HZ: f32 = 12_000.0;
const SWEEP_BLOCK_FRAMES: usize = 256;
const BAND_Q: f32 = 0.707;

/// Synthesizes the four stock transition sounds as mono 16-bit WAV.
#[derive(Debug, Clone)]
pub struct SynthCueProvider {
    sample_rate: u32,
    scratch_max_sec: f64,
    seed: Option<u64>,
}

impl SynthCueProvider {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(8_000),
            scratch_max_sec: ScheduleConfig::default().vinyl_scratch_max_sec,
            seed: None,
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self {
            scratch_max_sec: config.vinyl_scratch_max_sec,
            ..Self::new(config.output_sample_rate)
        }
    }

    /// Fix the noise seed so clips are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Render `sound` as mono samples. Silence has no clip.
    pub fn render(&self, sound: TransitionSound, duration_sec: f64) -> Option<DecodedBuffer> {
        let duration_sec = match sound {
            TransitionSound::Silent => return None,
            TransitionSound::VinylScratch => duration_sec.min(self.scratch_max_sec),
            _ => duration_sec,
        };
        if !duration_sec.is_finite() || duration_sec <= 0.0 {
            return None;
        }

        let frames = (duration_sec * self.sample_rate as f64) as usize;
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let sr = self.sample_rate;
        let duration = duration_sec as f32;

        let samples = match sound {
            TransitionSound::Whoosh => {
                let mut out = noise(&mut rng, frames, 0.5);
                band_pass(&mut out, sr, 400.0, 6_000.0);
                apply_envelope(&mut out, sr, 0.03, duration * 0.7, 0.45);
                out
            }
            TransitionSound::FilterSweep => {
                let mut out = noise(&mut rng, frames, 0.35);
                let mut low_pass =
                    Biquad::new(BiquadKind::LowPass, sr, 1, SWEEP_START_HZ, BAND_Q);
                for (block, chunk) in out.chunks_mut(SWEEP_BLOCK_FRAMES).enumerate() {
                    let progress = (block * SWEEP_BLOCK_FRAMES) as f32 / frames.max(1) as f32;
                    low_pass.set_frequency(
                        SWEEP_START_HZ + (SWEEP_END_HZ - SWEEP_START_HZ) * progress,
                    );
                    low_pass.process(chunk);
                }
                apply_envelope(&mut out, sr, 0.01, duration * 0.5, 0.45);
                out
            }
            TransitionSound::EchoTail => {
                let mut out = noise(&mut rng, frames, 0.25);
                for (n, sample) in out.iter_mut().enumerate() {
                    *sample *= (-(n as f32) / sr as f32 * 8.0).exp();
                }
                band_pass(&mut out, sr, 200.0, 6_000.0);
                apply_envelope(&mut out, sr, 0.005, duration * 0.3, 0.5);
                out
            }
            TransitionSound::VinylScratch => {
                let mut out = noise(&mut rng, frames, 0.6);
                band_pass(&mut out, sr, 800.0, 5_000.0);
                apply_envelope(&mut out, sr, 0.005, duration * 0.7, 0.4);
                out
            }
            TransitionSound::Silent => return None,
        };

        Some(DecodedBuffer::new(samples, 1, sr))
    }
}

impl CueAssetProvider for SynthCueProvider {
    fn fetch(&self, sound: TransitionSound, duration_hint: f64) -> Option<Vec<u8>> {
        self.render(sound, duration_hint)?.to_wav_bytes().ok()
    }
}

fn noise(rng: &mut StdRng, frames: usize, amplitude: f32) -> Vec<f32> {
    (0..frames)
        .map(|_| rng.gen_range(-1.0_f32..1.0_f32) * amplitude)
        .collect()
}

fn band_pass(samples: &mut [f32], sample_rate: u32, low_hz: f32, high_hz: f32) {
    Biquad::new(BiquadKind::HighPass, sample_rate, 1, low_hz, BAND_Q).process(samples);
    Biquad::new(BiquadKind::LowPass, sample_rate, 1, high_hz, BAND_Q).process(samples);
}

/// Linear attack and release, then a flat output gain.
fn apply_envelope(
    samples: &mut [f32],
    sample_rate: u32,
    attack_sec: f32,
    release_sec: f32,
    gain: f32,
) {
    let n = samples.len();
    let attack = (attack_sec * sample_rate as f32) as usize;
    let release = (release_sec * sample_rate as f32) as usize;

    for (i, sample) in samples.iter_mut().enumerate() {
        let mut env = 1.0;
        if attack > 0 && n >= attack && i < attack {
            env = i as f32 / attack.saturating_sub(1).max(1) as f32;
        }
        if release > 0 && n > release && i >= n - release {
            let into_release = i - (n - release);
            env = 1.0 - into_release as f32 / release.saturating_sub(1).max(1) as f32;
        }
        *sample *= env * gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_sound_renders_audible_bounded_clip() {
        let provider = SynthCueProvider::new(44_100).with_seed(7);
        for sound in TransitionSound::ALL {
            let clip = provider.render(sound, 0.5).expect("clip");
            assert!(clip.peak() > 0.0, "{} is silent", sound.id());
            assert!(clip.peak() <= 1.0);
            assert_eq!(clip.frame(0), Some(&[0.0_f32][..]));
        }
    }

    #[test]
    fn scratch_is_capped_and_silence_has_no_clip() {
        let provider = SynthCueProvider::new(44_100).with_seed(1);
        let scratch = provider
            .render(TransitionSound::VinylScratch, 1.0)
            .expect("scratch");
        assert!((scratch.duration_sec() - 0.2).abs() < 1e-3);
        assert!(provider.render(TransitionSound::Silent, 1.0).is_none());
        assert!(provider.fetch(TransitionSound::Silent, 1.0).is_none());
    }

    #[test]
    fn fetch_returns_wav_bytes() {
        let provider = SynthCueProvider::new(22_050).with_seed(3);
        let bytes = provider
            .fetch(TransitionSound::Whoosh, 0.25)
            .expect("bytes");
        assert_eq!(&bytes[0..4], b"RIFF");
    }
}
