//! Phrase-boundary snapping for transition windows.
//!
//! The outgoing track should stop on a vocal phrase end, and the incoming
//! track should reach full gain on a phrase start, so neither side cuts a
//! word in half. When no phrase boundary is close enough the handoff falls
//! back to the nearest beat.

use log::debug;

use crate::config::ScheduleConfig;
use crate::features::{nearest_within, TrackFeatures};

use super::MixPlan;

/// Return a copy of `plan` with transition windows snapped to phrase
/// boundaries (or beats) found in `features`.
///
/// The crossfade length of every transition is preserved; only its position
/// moves. An explicit `incoming_start_offset` is never replaced.
pub fn snap_to_phrases(
    plan: &MixPlan,
    features: &[TrackFeatures],
    config: &ScheduleConfig,
) -> MixPlan {
    let mut snapped = plan.clone();
    let tolerance = config.phrase_snap_tolerance_sec;

    for (position, transition) in snapped.transitions.iter_mut().enumerate() {
        let (Some(&out_index), Some(&in_index)) =
            (plan.order.get(position), plan.order.get(position + 1))
        else {
            break;
        };
        let (Some(outgoing), Some(incoming)) = (features.get(out_index), features.get(in_index))
        else {
            continue;
        };

        let crossfade = config.crossfade_or_default(transition.crossfade_duration_sec);
        let start = transition.transition_start_time;
        let end = transition
            .transition_end_time
            .filter(|end| *end >= start)
            .unwrap_or(start + crossfade);
        let span = end - start;

        let target = nearest_within(&outgoing.vocal_phrase_ends, end, tolerance).or_else(|| {
            if config.snap_to_beats {
                nearest_within(&outgoing.beat_times_sec, end, tolerance)
            } else {
                None
            }
        });

        if let Some(target) = target {
            let new_start = (target - span).max(0.0).min(outgoing.duration_sec.max(0.0));
            debug!(
                "snapped transition {} end {:.2}s -> {:.2}s (start {:.2}s)",
                position, end, target, new_start
            );
            transition.transition_start_time = new_start;
            if transition.transition_end_time.is_some() {
                transition.transition_end_time = Some(new_start + span);
            }
        }

        if transition.incoming_start_offset.is_none() {
            let entry = incoming
                .vocal_phrase_starts
                .iter()
                .copied()
                .find(|phrase| *phrase >= crossfade && phrase - crossfade <= tolerance);
            if let Some(phrase) = entry {
                debug!(
                    "transition {} incoming offset {:.2}s lands full gain on phrase at {:.2}s",
                    position,
                    phrase - crossfade,
                    phrase
                );
                transition.incoming_start_offset = Some(phrase - crossfade);
            }
        }
    }

    snapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::TransitionPlan;

    fn features(duration: f64, phrase_starts: Vec<f64>, phrase_ends: Vec<f64>) -> TrackFeatures {
        TrackFeatures {
            duration_sec: duration,
            bpm: 124.0,
            beat_times_sec: (0..(duration as usize)).map(|beat| beat as f64 * 0.5).collect(),
            vocal_phrase_starts: phrase_starts,
            vocal_phrase_ends: phrase_ends,
            energy_curve: Vec::new(),
        }
    }

    #[test]
    fn end_snaps_to_phrase_end_and_incoming_to_phrase_start() {
        let plan = MixPlan::new(vec![0, 1], vec![TransitionPlan::new(160.0, 16.0)]);
        let tracks = vec![
            features(200.0, vec![], vec![120.0, 178.5]),
            features(180.0, vec![20.0, 60.0], vec![]),
        ];
        let snapped = snap_to_phrases(&plan, &tracks, &ScheduleConfig::default());
        let transition = &snapped.transitions[0];
        assert!((transition.transition_start_time - 162.5).abs() < 1e-9);
        assert_eq!(transition.incoming_start_offset, Some(4.0));
    }

    #[test]
    fn falls_back_to_beats_and_keeps_explicit_offset() {
        let plan = MixPlan::new(
            vec![0, 1],
            vec![TransitionPlan::new(100.2, 8.0).with_incoming_offset(12.5)],
        );
        let tracks = vec![features(200.0, vec![], vec![]), features(180.0, vec![10.0], vec![])];
        let snapped = snap_to_phrases(&plan, &tracks, &ScheduleConfig::default());
        let transition = &snapped.transitions[0];
        assert!((transition.transition_start_time - 100.0).abs() < 1e-9);
        assert_eq!(transition.incoming_start_offset, Some(12.5));
    }

    #[test]
    fn nothing_in_tolerance_leaves_plan_untouched() {
        let plan = MixPlan::new(vec![0, 1], vec![TransitionPlan::new(50.0, 10.0)]);
        let tracks = vec![
            features(200.0, vec![], vec![5.0]),
            features(180.0, vec![100.0], vec![]),
        ];
        let config = ScheduleConfig {
            snap_to_beats: false,
            ..ScheduleConfig::default()
        };
        assert_eq!(snap_to_phrases(&plan, &tracks, &config), plan);
    }
}
