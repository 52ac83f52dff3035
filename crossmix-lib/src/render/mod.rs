//! Realization of a [`PlaybackSchedule`] as audio.
//!
//! The schedule is pure data; this module turns it into [`Voice`]s and hands
//! them to an output: the default device through [`DeviceBackend`], or an
//! in-memory mix through [`render_offline`].

mod device;
mod offline;
mod voice;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::audio::{DecodedBuffer, OutputFormat};
use crate::config::ScheduleConfig;
use crate::cues::CueBank;
use crate::error::{ConfigurationError, ScheduleError};
use crate::schedule::PlaybackSchedule;

pub use device::DeviceBackend;
pub use offline::{render_offline, RenderedMix};
pub use voice::{CompletionSignal, SegmentEnded, Voice};

/// Factory for the exclusive playback resource of one session.
pub trait OutputBackend: Send + Sync {
    fn acquire(&self, format: OutputFormat) -> Result<Box<dyn OutputResource>, ScheduleError>;
}

/// A device or render context owned by a single session.
pub trait OutputResource: Send {
    /// Start every voice against one shared clock.
    fn start(&mut self, voices: Vec<Voice>) -> Result<(), ScheduleError>;

    /// Halt all voices and give the resource back.
    fn release(&mut self);
}

/// Voices for every segment and cue of `schedule`.
///
/// `tracks` is indexed by track index and every buffer must already be at
/// the configured output format. Each segment voice gets its own clone of
/// `completion`.
pub fn build_voices(
    schedule: &PlaybackSchedule,
    tracks: &[DecodedBuffer],
    cues: Option<&CueBank>,
    config: &ScheduleConfig,
    stop: Arc<AtomicBool>,
    completion: Option<CompletionSignal>,
) -> Result<Vec<Voice>, ScheduleError> {
    let format = OutputFormat::new(config.output_sample_rate, config.output_channels);
    let mut voices = Vec::with_capacity(schedule.segments.len() + schedule.cues.len());

    for segment in &schedule.segments {
        let buffer = tracks
            .get(segment.track_index)
            .ok_or(ConfigurationError::MissingSource {
                track: segment.track_index,
            })?;
        ensure_format(buffer, format, || format!("track {}", segment.track_index))?;
        voices.push(Voice::segment(
            segment,
            buffer.clone(),
            schedule.skip_offset,
            config,
            stop.clone(),
            completion.clone(),
        ));
    }

    if let Some(bank) = cues {
        if bank.format() != format {
            return Err(ScheduleError::Output(
                "cue bank format differs from the output format".to_string(),
            ));
        }
        for cue in &schedule.cues {
            voices.push(Voice::cue(cue, bank.clone(), config.cue_gain, stop.clone()));
        }
    }

    Ok(voices)
}

fn ensure_format(
    buffer: &DecodedBuffer,
    format: OutputFormat,
    name: impl FnOnce() -> String,
) -> Result<(), ScheduleError> {
    if buffer.sample_rate() == format.sample_rate && buffer.channels() == format.channels {
        return Ok(());
    }
    Err(ScheduleError::Output(format!(
        "{} is {} Hz / {} ch, output is {} Hz / {} ch",
        name(),
        buffer.sample_rate(),
        buffer.channels(),
        format.sample_rate,
        format.channels
    )))
}
