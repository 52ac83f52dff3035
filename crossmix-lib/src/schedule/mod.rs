//! Pure schedule computation.
//!
//! [`build_schedule`] turns a mix plan and normalized features into a
//! [`PlaybackSchedule`]: data only, no audio. Realization lives in
//! [`crate::render`].

mod cues;
mod envelope;
mod filter;
mod gain;
mod offsets;
mod windows;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::ScheduleConfig;
use crate::error::ConfigurationError;
use crate::features::TrackFeatures;
use crate::plan::MixPlan;

pub use cues::{place_cues, CuePlacement};
pub use envelope::{Breakpoint, Envelope};
pub use filter::{plan_filters, FilterAutomation};
pub use gain::{plan_gain, Ramp};
pub use offsets::{resolve_offsets, SegmentTiming};
pub use windows::{resolve_windows, ResolvedTransition, TransitionWindows};

/// Where on the mix timeline playback begins.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PlaybackStart {
    #[default]
    Beginning,
    /// Just before the first handoff, less the configured lead-in.
    FirstTransition,
    /// An explicit mix-timeline position in seconds.
    At(f64),
}

impl PlaybackStart {
    /// Skip offset in seconds for the given start times.
    pub fn resolve(&self, starts: &[f64], config: &ScheduleConfig) -> f64 {
        match self {
            PlaybackStart::Beginning => 0.0,
            PlaybackStart::FirstTransition => starts
                .get(1)
                .map(|start| (start - config.first_transition_lead_in_sec).max(0.0))
                .unwrap_or(0.0),
            PlaybackStart::At(seconds) if seconds.is_finite() => seconds.max(0.0),
            PlaybackStart::At(_) => 0.0,
        }
    }
}

/// One track's realization parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub position: usize,
    pub track_index: usize,
    pub absolute_start_time: f64,
    pub buffer_offset: f64,
    pub play_duration: f64,
    /// Seconds after the skip instant at which the segment starts.
    pub local_start: f64,
    /// Gain over the mix timeline, in `[0, 1]`.
    pub gain: Envelope,
    pub filter: FilterAutomation,
}

impl Segment {
    /// Local instant of the segment's hard stop.
    pub fn local_stop(&self) -> f64 {
        self.local_start + self.play_duration
    }
}

/// Everything a renderer needs for one session.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlaybackSchedule {
    pub skip_offset: f64,
    /// Length of the full mix, skip not considered.
    pub total_duration: f64,
    pub segments: Vec<Segment>,
    pub cues: Vec<CuePlacement>,
    pub transitions: Vec<ResolvedTransition>,
}

impl PlaybackSchedule {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.cues.is_empty()
    }

    /// Seconds from the skip instant until the last segment stops.
    pub fn local_duration(&self) -> f64 {
        let segments = self.segments.iter().map(Segment::local_stop);
        let cues = self.cues.iter().map(|cue| cue.local_time + cue.duration_hint);
        segments.chain(cues).fold(0.0, f64::max)
    }

    pub fn segment(&self, position: usize) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.position == position)
    }
}

/// Compute the playback schedule for `plan`.
///
/// `features` is indexed by track index and should already be normalized
/// against the decoded buffers.
pub fn build_schedule(
    plan: &MixPlan,
    features: &[TrackFeatures],
    start: PlaybackStart,
    config: &ScheduleConfig,
) -> Result<PlaybackSchedule, ConfigurationError> {
    let windows = resolve_windows(plan, features, config)?;
    let skip_offset = start.resolve(&windows.starts, config);

    let mut segments = Vec::with_capacity(plan.order.len());
    for (position, &track_index) in plan.order.iter().enumerate() {
        let absolute_start = windows.starts[position];
        let duration = windows.durations[position];
        let incoming = windows.incoming(position);
        let outgoing = windows.outgoing(position);

        let Some(timing) = resolve_offsets(absolute_start, duration, incoming, outgoing, skip_offset)
        else {
            debug!(
                "position {} (track {}) ends before {:.2}s; omitted",
                position, track_index, skip_offset
            );
            continue;
        };

        let entry = offsets::entry_offset(incoming);
        let fade_in = incoming.and_then(|transition| {
            let length = transition.crossfade_sec.min(duration - entry);
            Ramp::new(absolute_start, absolute_start + length)
        });
        let fade_out = outgoing.and_then(|transition| {
            Ramp::new(
                absolute_start + transition.start,
                (absolute_start + transition.end).min(timing.audible_end),
            )
        });

        let gain = plan_gain(fade_in, fade_out, config);
        let filter = plan_filters(
            fade_in.zip(incoming.map(|transition| transition.eq_strategy)),
            fade_out.zip(outgoing.map(|transition| transition.eq_strategy)),
            config,
        );

        segments.push(Segment {
            position,
            track_index,
            absolute_start_time: absolute_start,
            buffer_offset: timing.buffer_offset,
            play_duration: timing.play_duration,
            local_start: timing.local_start,
            gain,
            filter,
        });
    }

    let cues = place_cues(&windows, skip_offset, config);
    info!(
        "scheduled {} segments and {} cues from {:.2}s of a {:.2}s mix",
        segments.len(),
        cues.len(),
        skip_offset,
        windows.total_duration()
    );

    Ok(PlaybackSchedule {
        skip_offset,
        total_duration: windows.total_duration(),
        segments,
        cues,
        transitions: windows.transitions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{TransitionPlan, TransitionSound};

    fn tracks(durations: &[f64]) -> Vec<TrackFeatures> {
        durations
            .iter()
            .map(|duration| TrackFeatures::with_duration(*duration))
            .collect()
    }

    fn three_track_plan() -> MixPlan {
        MixPlan::new(
            vec![0, 1, 2],
            vec![TransitionPlan::new(150.0, 16.0), TransitionPlan::new(140.0, 12.0)],
        )
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn three_tracks_line_up_on_cumulative_starts() {
        let schedule = build_schedule(
            &three_track_plan(),
            &tracks(&[200.0, 180.0, 220.0]),
            PlaybackStart::Beginning,
            &ScheduleConfig::default(),
        )
        .expect("schedule");
        let starts: Vec<f64> = schedule
            .segments
            .iter()
            .map(|segment| segment.absolute_start_time)
            .collect();
        assert_eq!(starts, vec![0.0, 150.0, 290.0]);
        assert_eq!(schedule.total_duration, 510.0);
        assert_eq!(schedule.cues.len(), 2);
    }

    #[test]
    fn two_track_crossfade_ramps() {
        let plan = MixPlan::new(vec![0, 1], vec![TransitionPlan::new(180.0, 16.0)]);
        let schedule = build_schedule(
            &plan,
            &tracks(&[200.0, 180.0]),
            PlaybackStart::Beginning,
            &ScheduleConfig::default(),
        )
        .expect("schedule");

        let outgoing = schedule.segment(0).expect("outgoing");
        assert_eq!(outgoing.gain.value_at(0.0), 1.0);
        assert_eq!(outgoing.gain.value_at(180.0), 1.0);
        assert!(approx(outgoing.gain.value_at(188.0), 0.5));
        assert_eq!(outgoing.gain.value_at(196.0), 0.0);
        assert_eq!(outgoing.play_duration, 196.0);

        let incoming = schedule.segment(1).expect("incoming");
        assert_eq!(incoming.absolute_start_time, 180.0);
        assert_eq!(incoming.gain.value_at(180.0), 0.0);
        assert!(approx(incoming.gain.value_at(188.0), 0.5));
        assert_eq!(incoming.gain.value_at(196.0), 1.0);
        assert_eq!(incoming.gain.value_at(300.0), 1.0);
    }

    #[test]
    fn incoming_offset_overrides_skip() {
        let plan = MixPlan::new(
            vec![0, 1],
            vec![TransitionPlan::new(150.0, 16.0).with_incoming_offset(12.5)],
        );
        let features = tracks(&[200.0, 180.0]);
        for start in [
            PlaybackStart::Beginning,
            PlaybackStart::FirstTransition,
            PlaybackStart::At(160.0),
        ] {
            let schedule = build_schedule(&plan, &features, start, &ScheduleConfig::default())
                .expect("schedule");
            let incoming = schedule.segment(1).expect("incoming");
            assert_eq!(incoming.buffer_offset, 12.5);
        }
    }

    #[test]
    fn silent_transitions_schedule_no_cues() {
        let mut plan = three_track_plan();
        for transition in &mut plan.transitions {
            transition.transition_sound = Some(TransitionSound::Silent);
        }
        let schedule = build_schedule(
            &plan,
            &tracks(&[200.0, 180.0, 220.0]),
            PlaybackStart::Beginning,
            &ScheduleConfig::default(),
        )
        .expect("schedule");
        assert!(schedule.cues.is_empty());
    }

    #[test]
    fn first_transition_skip_starts_everything_at_or_after_the_skip() {
        let schedule = build_schedule(
            &three_track_plan(),
            &tracks(&[200.0, 180.0, 220.0]),
            PlaybackStart::FirstTransition,
            &ScheduleConfig::default(),
        )
        .expect("schedule");
        assert_eq!(schedule.skip_offset, 150.0);

        let first = schedule.segment(0).expect("first still sounding");
        assert_eq!(first.local_start, 0.0);
        assert_eq!(first.buffer_offset, 150.0);
        assert_eq!(first.play_duration, 16.0);

        let second = schedule.segment(1).expect("second");
        assert_eq!(second.local_start, 0.0);
        assert_eq!(second.buffer_offset, 0.0);
        assert_eq!(second.gain.value_at(schedule.skip_offset), 0.0);

        let third = schedule.segment(2).expect("third");
        assert_eq!(third.local_start, 140.0);

        let cue_times: Vec<f64> = schedule.cues.iter().map(|cue| cue.local_time).collect();
        assert_eq!(cue_times, vec![0.0, 140.0]);
    }

    #[test]
    fn lead_in_moves_the_skip_point_earlier() {
        let config = ScheduleConfig {
            first_transition_lead_in_sec: 4.0,
            ..ScheduleConfig::default()
        };
        let schedule = build_schedule(
            &three_track_plan(),
            &tracks(&[200.0, 180.0, 220.0]),
            PlaybackStart::FirstTransition,
            &config,
        )
        .expect("schedule");
        assert_eq!(schedule.skip_offset, 146.0);
        assert_eq!(schedule.segment(1).expect("second").local_start, 4.0);
    }

    #[test]
    fn mid_stream_skip_drops_earlier_segments_and_cues() {
        let schedule = build_schedule(
            &three_track_plan(),
            &tracks(&[200.0, 180.0, 220.0]),
            PlaybackStart::At(300.0),
            &ScheduleConfig::default(),
        )
        .expect("schedule");
        assert!(schedule.segment(0).is_none());
        let second = schedule.segment(1).expect("second overlaps skip");
        assert_eq!(second.buffer_offset, 150.0);
        assert!(approx(second.play_duration, 2.0));
        assert!(schedule.cues.is_empty());
    }

    #[test]
    fn skip_past_the_end_is_empty() {
        let schedule = build_schedule(
            &three_track_plan(),
            &tracks(&[200.0, 180.0, 220.0]),
            PlaybackStart::At(600.0),
            &ScheduleConfig::default(),
        )
        .expect("schedule");
        assert!(schedule.is_empty());
        assert_eq!(schedule.local_duration(), 0.0);
    }

    #[test]
    fn gain_stays_in_unit_range_and_truncation_holds() {
        let plan = MixPlan::new(
            vec![2, 0, 1],
            vec![
                TransitionPlan::new(20.0, 30.0).with_incoming_offset(5.0),
                TransitionPlan::new(10.0, 32.0).with_end(18.0),
            ],
        );
        let features = tracks(&[40.0, 35.0, 25.0]);
        let schedule =
            build_schedule(&plan, &features, PlaybackStart::Beginning, &ScheduleConfig::default())
                .expect("schedule");

        for segment in &schedule.segments {
            assert!(segment.gain.min_value().unwrap_or(0.0) >= 0.0);
            assert!(segment.gain.max_value().unwrap_or(1.0) <= 1.0);
            assert!(segment.play_duration >= 0.0);
            if let Some(transition) = schedule.transitions.get(segment.position) {
                assert!(segment.play_duration <= transition.end - segment.buffer_offset + 1e-9);
            }
        }
        let middle = schedule.segment(1).expect("middle");
        assert_eq!(middle.buffer_offset, 5.0);
        assert_eq!(middle.play_duration, 13.0);
    }

    #[test]
    fn disabled_automation_is_independent() {
        let config = ScheduleConfig {
            gain_automation: false,
            ..ScheduleConfig::default()
        };
        let schedule = build_schedule(
            &three_track_plan(),
            &tracks(&[200.0, 180.0, 220.0]),
            PlaybackStart::Beginning,
            &config,
        )
        .expect("schedule");
        let second = schedule.segment(1).expect("second");
        assert!(second.gain.is_constant());
        assert!(second.filter.low_pass.is_some());
    }
}
