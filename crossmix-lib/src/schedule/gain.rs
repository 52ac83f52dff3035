//! Gain automation.

use serde::Serialize;

use crate::config::ScheduleConfig;

use super::envelope::Envelope;

/// A fade window on the mix timeline, `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ramp {
    pub start: f64,
    pub end: f64,
}

impl Ramp {
    /// `None` for empty or inverted windows.
    pub fn new(start: f64, end: f64) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }
}

/// Build the gain curve for a segment from its fade-in and fade-out windows.
///
/// Without either window the segment plays at unity. Where both overlap (a
/// track shorter than its two crossfades) the lower of the two wins.
pub fn plan_gain(fade_in: Option<Ramp>, fade_out: Option<Ramp>, config: &ScheduleConfig) -> Envelope {
    if !config.gain_automation {
        return Envelope::constant(1.0);
    }

    let rising = fade_in.map(|ramp| Envelope::ramp(ramp.start, ramp.end, 0.0, 1.0));
    let falling = fade_out.map(|ramp| Envelope::ramp(ramp.start, ramp.end, 1.0, 0.0));

    match (rising, falling) {
        (Some(rising), Some(falling)) => rising.combine(&falling, f64::min),
        (Some(env), None) | (None, Some(env)) => env,
        (None, None) => Envelope::constant(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unity_without_windows_or_automation() {
        let config = ScheduleConfig::default();
        assert!(plan_gain(None, None, &config).is_constant());

        let disabled = ScheduleConfig {
            gain_automation: false,
            ..ScheduleConfig::default()
        };
        let env = plan_gain(Ramp::new(0.0, 4.0), Ramp::new(10.0, 12.0), &disabled);
        assert_eq!(env, Envelope::constant(1.0));
    }

    #[test]
    fn overlapping_fades_stay_in_unit_range() {
        let env = plan_gain(
            Ramp::new(100.0, 116.0),
            Ramp::new(108.0, 112.0),
            &ScheduleConfig::default(),
        );
        assert!(env.min_value().unwrap_or(-1.0) >= 0.0);
        assert!(env.max_value().unwrap_or(2.0) <= 1.0);
        assert_eq!(env.value_at(100.0), 0.0);
        assert_eq!(env.value_at(112.0), 0.0);
    }

    #[test]
    fn degenerate_ramps_are_dropped() {
        assert!(Ramp::new(5.0, 5.0).is_none());
        assert!(Ramp::new(6.0, 5.0).is_none());
    }
}
