//! Absolute start offsets on the mix timeline.

use log::warn;
use serde::Serialize;

use crate::config::ScheduleConfig;
use crate::error::ConfigurationError;
use crate::features::TrackFeatures;
use crate::plan::{EqStrategy, MixPlan, TransitionSound};

/// A transition after sanitation, measured on the outgoing track's clock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTransition {
    /// Position of the outgoing track in the order.
    pub position: usize,
    pub start: f64,
    pub end: f64,
    pub crossfade_sec: f64,
    pub eq_strategy: EqStrategy,
    pub sound: TransitionSound,
    pub incoming_offset: Option<f64>,
    /// Pair had no transition: the incoming track follows the outgoing one
    /// back to back.
    pub hard_cut: bool,
}

/// Start offsets plus the sanitized transitions they were derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionWindows {
    pub starts: Vec<f64>,
    pub durations: Vec<f64>,
    pub transitions: Vec<ResolvedTransition>,
}

impl TransitionWindows {
    /// End of the last position on the mix timeline, or `0` for an empty
    /// order.
    pub fn total_duration(&self) -> f64 {
        match (self.starts.last(), self.durations.last()) {
            (Some(start), Some(duration)) => start + duration,
            _ => 0.0,
        }
    }

    pub fn incoming(&self, position: usize) -> Option<&ResolvedTransition> {
        position
            .checked_sub(1)
            .and_then(|previous| self.transitions.get(previous))
    }

    pub fn outgoing(&self, position: usize) -> Option<&ResolvedTransition> {
        self.transitions.get(position)
    }
}

/// Resolve every position's absolute start time.
///
/// `features` is indexed by track index (not position) and must already be
/// normalized.
pub fn resolve_windows(
    plan: &MixPlan,
    features: &[TrackFeatures],
    config: &ScheduleConfig,
) -> Result<TransitionWindows, ConfigurationError> {
    plan.validate(features.len(), config)?;

    let durations: Vec<f64> = plan
        .order
        .iter()
        .map(|&index| features[index].duration_sec)
        .collect();

    let mut starts = Vec::with_capacity(plan.order.len());
    let mut transitions = Vec::with_capacity(plan.expected_transitions());
    if plan.order.is_empty() {
        return Ok(TransitionWindows {
            starts,
            durations,
            transitions,
        });
    }
    starts.push(0.0);

    for position in 0..plan.expected_transitions() {
        let previous = starts[position];
        let out_duration = durations[position];
        let in_duration = durations[position + 1];

        let resolved = match plan.transition_after(position) {
            Some(raw) => {
                let start = raw.transition_start_time;
                if !start.is_finite() || start < 0.0 {
                    return Err(ConfigurationError::NonMonotonicStart {
                        position: position + 1,
                        previous,
                        current: previous + start,
                    });
                }
                let start = if start > out_duration {
                    warn!(
                        "transition {} starts at {:.2}s past the outgoing track's {:.2}s; clamping",
                        position, start, out_duration
                    );
                    out_duration
                } else {
                    start
                };

                let crossfade_sec = config.crossfade_or_default(raw.crossfade_duration_sec);
                if crossfade_sec != raw.crossfade_duration_sec {
                    warn!(
                        "transition {} crossfade {} unusable, using {:.2}s",
                        position, raw.crossfade_duration_sec, crossfade_sec
                    );
                }

                let end = match raw.transition_end_time {
                    Some(end) if end.is_finite() && end >= start => end,
                    Some(end) => {
                        warn!(
                            "transition {} end {:.2}s precedes its start; ignoring",
                            position, end
                        );
                        start + crossfade_sec
                    }
                    None => start + crossfade_sec,
                };

                let incoming_offset = raw
                    .incoming_start_offset
                    .filter(|offset| offset.is_finite())
                    .map(|offset| offset.clamp(0.0, in_duration.max(0.0)));

                ResolvedTransition {
                    position,
                    start,
                    end,
                    crossfade_sec,
                    eq_strategy: raw.eq_strategy,
                    sound: raw
                        .transition_sound
                        .unwrap_or(config.default_transition_sound),
                    incoming_offset,
                    hard_cut: false,
                }
            }
            None => {
                warn!(
                    "no transition between positions {} and {}; hard cut",
                    position,
                    position + 1
                );
                ResolvedTransition {
                    position,
                    start: out_duration,
                    end: out_duration,
                    crossfade_sec: 0.0,
                    eq_strategy: EqStrategy::Flat,
                    sound: TransitionSound::Silent,
                    incoming_offset: None,
                    hard_cut: true,
                }
            }
        };

        starts.push(previous + resolved.start);
        transitions.push(resolved);
    }

    Ok(TransitionWindows {
        starts,
        durations,
        transitions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::TransitionPlan;

    fn tracks(durations: &[f64]) -> Vec<TrackFeatures> {
        durations
            .iter()
            .map(|duration| TrackFeatures::with_duration(*duration))
            .collect()
    }

    #[test]
    fn starts_are_cumulative_transition_starts() {
        let plan = MixPlan::new(
            vec![0, 1, 2],
            vec![TransitionPlan::new(150.0, 16.0), TransitionPlan::new(140.0, 12.0)],
        );
        let windows =
            resolve_windows(&plan, &tracks(&[200.0, 180.0, 220.0]), &ScheduleConfig::default())
                .expect("windows");
        assert_eq!(windows.starts, vec![0.0, 150.0, 290.0]);
        assert_eq!(windows.total_duration(), 510.0);
        for (position, transition) in windows.transitions.iter().enumerate() {
            assert_eq!(
                windows.starts[position + 1],
                windows.starts[position] + transition.start
            );
        }
    }

    #[test]
    fn negative_start_is_rejected() {
        let plan = MixPlan::new(vec![0, 1], vec![TransitionPlan::new(-3.0, 16.0)]);
        let err = resolve_windows(&plan, &tracks(&[100.0, 100.0]), &ScheduleConfig::default())
            .expect_err("negative start");
        assert!(matches!(
            err,
            ConfigurationError::NonMonotonicStart { position: 1, .. }
        ));
    }

    #[test]
    fn parameters_are_sanitized() {
        let plan = MixPlan::new(
            vec![1, 0],
            vec![TransitionPlan::new(500.0, 0.0)
                .with_end(10.0)
                .with_incoming_offset(400.0)],
        );
        let windows = resolve_windows(&plan, &tracks(&[90.0, 120.0]), &ScheduleConfig::default())
            .expect("windows");
        let transition = &windows.transitions[0];
        assert_eq!(transition.start, 120.0);
        assert_eq!(transition.crossfade_sec, 16.0);
        assert_eq!(transition.end, 136.0);
        assert_eq!(transition.incoming_offset, Some(90.0));
        assert_eq!(transition.sound, TransitionSound::Whoosh);
    }

    #[test]
    fn missing_transition_becomes_hard_cut_when_allowed() {
        let config = ScheduleConfig {
            allow_missing_transitions: true,
            ..ScheduleConfig::default()
        };
        let plan = MixPlan::new(vec![0, 1, 2], vec![TransitionPlan::new(50.0, 8.0)]);
        let windows =
            resolve_windows(&plan, &tracks(&[60.0, 70.0, 80.0]), &config).expect("windows");
        assert_eq!(windows.starts, vec![0.0, 50.0, 120.0]);
        assert!(windows.transitions[1].hard_cut);
        assert!(windows.transitions[1].sound.is_silent());
    }
}
