//! Faster-than-real-time rendering into memory.

use log::{info, warn};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::audio::DecodedBuffer;
use crate::config::ScheduleConfig;
use crate::cues::CueBank;
use crate::error::ScheduleError;
use crate::schedule::PlaybackSchedule;

use super::build_voices;

/// A finished offline mix, starting at the schedule's skip instant.
#[derive(Debug, Clone)]
pub struct RenderedMix {
    pub buffer: DecodedBuffer,
    pub skip_offset: f64,
    /// Samples whose summed magnitude exceeded full scale.
    pub clipped_samples: usize,
}

impl RenderedMix {
    pub fn duration_sec(&self) -> f64 {
        self.buffer.duration_sec()
    }

    pub fn peak(&self) -> f32 {
        self.buffer.peak()
    }

    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, ScheduleError> {
        self.buffer.to_wav_bytes()
    }

    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<(), ScheduleError> {
        self.buffer.write_wav(path)
    }
}

/// Mix every segment and cue of `schedule` into one interleaved buffer.
///
/// Cue clips are loaded up front since there is no wall clock to race.
/// Clips that cannot be loaded are left out with a warning.
pub fn render_offline(
    schedule: &PlaybackSchedule,
    tracks: &[DecodedBuffer],
    cues: &CueBank,
    config: &ScheduleConfig,
) -> Result<RenderedMix, ScheduleError> {
    for cue in &schedule.cues {
        if let Err(err) = cues.load_blocking(cue.sound, cue.duration_hint) {
            warn!("{}", err);
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let voices = build_voices(schedule, tracks, Some(cues), config, stop, None)?;

    let channels = config.output_channels.clamp(1, 2);
    let expected_frames = (schedule.local_duration() * config.output_sample_rate as f64).ceil();
    let mut mix = vec![0.0_f32; expected_frames as usize * channels as usize];
    for voice in voices {
        for (index, sample) in voice.enumerate() {
            if index >= mix.len() {
                mix.resize(index + 1, 0.0);
            }
            mix[index] += sample;
        }
    }

    let clipped_samples = mix.iter().filter(|sample| sample.abs() > 1.0).count();
    if clipped_samples > 0 {
        warn!("{} samples clipped in offline render", clipped_samples);
    }

    let buffer = DecodedBuffer::new(mix, channels, config.output_sample_rate);
    info!(
        "rendered {:.2}s from {:.2}s on the mix timeline",
        buffer.duration_sec(),
        schedule.skip_offset
    );
    Ok(RenderedMix {
        buffer,
        skip_offset: schedule.skip_offset,
        clipped_samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OutputFormat;
    use crate::cues::SynthCueProvider;
    use crate::features::TrackFeatures;
    use crate::plan::{MixPlan, TransitionPlan, TransitionSound};
    use crate::schedule::{build_schedule, PlaybackStart};

    const RATE: u32 = 1_000;

    fn config() -> ScheduleConfig {
        ScheduleConfig {
            output_sample_rate: RATE,
            filter_automation: false,
            ..ScheduleConfig::default()
        }
    }

    fn constant(duration: f64, value: f32) -> DecodedBuffer {
        let frames = (duration * RATE as f64) as usize;
        DecodedBuffer::new(vec![value; frames * 2], 2, RATE)
    }

    fn synth_cues() -> CueBank {
        CueBank::new(
            Arc::new(SynthCueProvider::new(RATE).with_seed(1)),
            OutputFormat::new(RATE, 2),
        )
    }

    #[test]
    fn linear_crossfade_sums_to_unity() {
        let plan = MixPlan::new(
            vec![0, 1],
            vec![TransitionPlan::new(6.0, 4.0).with_sound(TransitionSound::Silent)],
        );
        let features = vec![TrackFeatures::with_duration(10.0), TrackFeatures::with_duration(8.0)];
        let config = config();
        let schedule =
            build_schedule(&plan, &features, PlaybackStart::Beginning, &config).expect("schedule");
        let tracks = vec![constant(10.0, 0.5), constant(8.0, 0.5)];

        let mix = render_offline(&schedule, &tracks, &synth_cues(), &config).expect("render");
        assert!((mix.duration_sec() - 14.0).abs() < 1e-3);
        assert_eq!(mix.clipped_samples, 0);
        let at = |seconds: f64| mix.buffer.frame(mix.buffer.frame_at(seconds)).expect("frame")[0];
        assert!((at(2.0) - 0.5).abs() < 1e-3);
        assert!((at(8.0) - 0.5).abs() < 1e-2);
        assert!((at(12.0) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn skip_starts_at_first_transition() {
        let plan = MixPlan::new(
            vec![0, 1],
            vec![TransitionPlan::new(6.0, 2.0).with_sound(TransitionSound::Silent)],
        );
        let features = vec![TrackFeatures::with_duration(10.0), TrackFeatures::with_duration(4.0)];
        let config = config();
        let schedule =
            build_schedule(&plan, &features, PlaybackStart::FirstTransition, &config)
                .expect("schedule");
        let tracks = vec![constant(10.0, 0.25), constant(4.0, 0.25)];

        let mix = render_offline(&schedule, &tracks, &synth_cues(), &config).expect("render");
        assert_eq!(mix.skip_offset, 6.0);
        assert!((mix.duration_sec() - 4.0).abs() < 1e-3);
        let first = mix.buffer.frame(0).expect("first frame")[0];
        assert!((first - 0.25).abs() < 1e-3);
    }

    #[test]
    fn cues_are_mixed_at_transitions() {
        let plan = MixPlan::new(
            vec![0, 1],
            vec![TransitionPlan::new(2.0, 1.0).with_sound(TransitionSound::Whoosh)],
        );
        let features = vec![TrackFeatures::with_duration(3.0), TrackFeatures::with_duration(3.0)];
        let config = config();
        let schedule =
            build_schedule(&plan, &features, PlaybackStart::Beginning, &config).expect("schedule");
        let tracks = vec![constant(3.0, 0.0), constant(3.0, 0.0)];

        let mix = render_offline(&schedule, &tracks, &synth_cues(), &config).expect("render");
        let before = mix.buffer.samples()[..2 * 1_990].iter().all(|s| *s == 0.0);
        let during = mix.buffer.samples()[2 * 2_000..2 * 2_500]
            .iter()
            .any(|s| s.abs() > 0.0);
        assert!(before);
        assert!(during);
    }

    #[test]
    fn mismatched_track_format_is_rejected() {
        let plan = MixPlan::new(vec![0], Vec::new());
        let features = vec![TrackFeatures::with_duration(1.0)];
        let config = config();
        let schedule =
            build_schedule(&plan, &features, PlaybackStart::Beginning, &config).expect("schedule");
        let tracks = vec![DecodedBuffer::silence(1.0, 1, RATE)];
        let err = render_offline(&schedule, &tracks, &synth_cues(), &config)
            .expect_err("mono track");
        assert!(matches!(err, ScheduleError::Output(_)));
    }
}
