use log::debug;
use serde::Serialize;

use crate::config::ScheduleConfig;
use crate::plan::TransitionSound;

use super::windows::TransitionWindows;

/// A one-shot effect at a transition boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CuePlacement {
    /// Index of the transition the cue decorates.
    pub transition: usize,
    pub absolute_time: f64,
    /// Seconds after the skip instant.
    pub local_time: f64,
    pub sound: TransitionSound,
    pub duration_hint: f64,
}

/// One cue per non-silent transition, at the incoming track's start.
/// Cues that would fall before `skip_offset` are dropped.
pub fn place_cues(
    windows: &TransitionWindows,
    skip_offset: f64,
    config: &ScheduleConfig,
) -> Vec<CuePlacement> {
    windows
        .transitions
        .iter()
        .enumerate()
        .filter(|(_, transition)| !transition.sound.is_silent())
        .filter_map(|(index, transition)| {
            let absolute_time = windows.starts[index + 1];
            if absolute_time < skip_offset {
                debug!(
                    "dropping {} cue at {:.2}s, before skip point {:.2}s",
                    transition.sound.id(),
                    absolute_time,
                    skip_offset
                );
                return None;
            }
            Some(CuePlacement {
                transition: index,
                absolute_time,
                local_time: absolute_time - skip_offset,
                sound: transition.sound,
                duration_hint: config.cue_duration_for(transition.sound),
            })
        })
        .collect()
}
