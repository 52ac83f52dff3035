//! Signal processing helpers shared by voices and cue synthesis.

pub mod biquad;

pub use biquad::{Biquad, BiquadKind};

/// Scale `samples` so the loudest one sits at `target_peak`.
///
/// Silent input is left untouched.
pub fn normalize_peak(samples: &mut [f32], target_peak: f32) {
    let peak = samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
    if peak <= f32::EPSILON {
        return;
    }
    let scale = target_peak / peak;
    for sample in samples.iter_mut() {
        *sample *= scale;
    }
}
