//! Mixing separated stems over a transition window.

use log::{debug, info};
use std::collections::BTreeMap;
use std::path::Path;

use crate::audio::{decode_file, DecodedBuffer, OutputFormat};
use crate::dsp::normalize_peak;
use crate::error::ScheduleError;

use super::plan::{Stem, StemFadePlan};

const STEM_EXTENSIONS: [&str; 3] = ["wav", "flac", "mp3"];
const OUTPUT_PEAK: f32 = 0.95;

/// Mono stems of one track, all at one sample rate.
#[derive(Debug, Clone, Default)]
pub struct StemSet {
    stems: BTreeMap<Stem, DecodedBuffer>,
}

impl StemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `<dir>/<stem>.<ext>` for every stem present. Missing stems are
    /// skipped; a stem that exists but cannot be decoded is an error.
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory holding the separated stems.
    /// * `sample_rate` - Rate every stem is resampled to.
    /// * `track` - Reported in decode errors.
    pub fn load_dir(dir: impl AsRef<Path>, sample_rate: u32, track: usize) -> Result<Self, ScheduleError> {
        let dir = dir.as_ref();
        let format = OutputFormat::new(sample_rate, 1);
        let mut set = Self::new();
        for stem in Stem::ALL {
            let found = STEM_EXTENSIONS
                .iter()
                .map(|ext| dir.join(format!("{}.{}", stem.id(), ext)))
                .find(|path| path.is_file());
            let Some(path) = found else {
                debug!("no {} stem in {}", stem.id(), dir.display());
                continue;
            };
            let buffer = decode_file(&path, format, None).map_err(|err| ScheduleError::Decode {
                track,
                reason: format!("{}: {}", path.display(), err),
            })?;
            set.insert(stem, buffer);
        }
        Ok(set)
    }

    pub fn insert(&mut self, stem: Stem, buffer: DecodedBuffer) {
        self.stems.insert(stem, buffer);
    }

    pub fn get(&self, stem: Stem) -> Option<&DecodedBuffer> {
        self.stems.get(&stem)
    }

    pub fn is_empty(&self) -> bool {
        self.stems.is_empty()
    }
}

/// Mix A's stems from `transition_start_a` and B's stems from `0` over the
/// plan's crossfade window, then normalize to a fixed peak.
///
/// The result is mono at `sample_rate`. Each stem is read from its first
/// channel at its own sample rate; stems that run out leave silence.
pub fn render_stem_transition(
    stems_a: &StemSet,
    stems_b: &StemSet,
    plan: &StemFadePlan,
    transition_start_a: f64,
    sample_rate: u32,
) -> DecodedBuffer {
    let frames = (plan.crossfade_sec * sample_rate as f64) as usize;
    let mut out = vec![0.0_f32; frames];
    let start_a = transition_start_a.max(0.0);

    for stem in Stem::ALL {
        if let Some(buffer) = stems_a.get(stem) {
            let fade = plan.fade_out(stem);
            mix_stem(&mut out, buffer, start_a, sample_rate, |t| fade.gain_out(t));
        }
        if let Some(buffer) = stems_b.get(stem) {
            let fade = plan.fade_in(stem);
            mix_stem(&mut out, buffer, 0.0, sample_rate, |t| fade.gain_in(t));
        }
    }

    normalize_peak(&mut out, OUTPUT_PEAK);
    info!(
        "rendered {:.2}s stem transition from {:.2}s into A",
        plan.crossfade_sec, start_a
    );
    DecodedBuffer::new(out, 1, sample_rate)
}

fn mix_stem(
    out: &mut [f32],
    buffer: &DecodedBuffer,
    from_sec: f64,
    sample_rate: u32,
    gain: impl Fn(f64) -> f64,
) {
    let source_rate = buffer.sample_rate() as f64;
    for (n, sample) in out.iter_mut().enumerate() {
        let t = n as f64 / sample_rate as f64;
        let index = ((from_sec + t) * source_rate) as usize;
        let Some(frame) = buffer.frame(index) else {
            break;
        };
        *sample += frame[0] * gain(t) as f32;
    }
}
