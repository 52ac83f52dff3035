//! Spectral sweep automation, independent of the gain curve.
//!
//! Lane values are corner frequencies in Hz. A missing lane means that
//! filter stays out of the signal path.

use serde::Serialize;

use crate::config::ScheduleConfig;
use crate::plan::EqStrategy;

use super::envelope::Envelope;
use super::gain::Ramp;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FilterAutomation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_pass: Option<Envelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_pass: Option<Envelope>,
}

impl FilterAutomation {
    pub fn is_flat(&self) -> bool {
        self.low_pass.is_none() && self.high_pass.is_none()
    }
}

/// Plan filter lanes for a segment.
///
/// `entry` is the fade-in window with the strategy of the incoming
/// transition, `exit` the fade-out window with the strategy of the outgoing
/// one.
pub fn plan_filters(
    entry: Option<(Ramp, EqStrategy)>,
    exit: Option<(Ramp, EqStrategy)>,
    config: &ScheduleConfig,
) -> FilterAutomation {
    let mut lanes = FilterAutomation::default();
    if !config.filter_automation {
        return lanes;
    }

    let floor = config.high_pass_floor_hz as f64;
    let open = config.filter_open_hz as f64;

    match entry {
        Some((ramp, EqStrategy::FilterSweep)) => {
            lanes.low_pass = Some(Envelope::ramp(
                ramp.start,
                ramp.end,
                config.low_pass_start_hz as f64,
                open,
            ));
        }
        Some((ramp, EqStrategy::BassSwap)) => {
            lanes.high_pass = Some(Envelope::ramp(
                ramp.start,
                ramp.end,
                config.bass_cut_hz as f64,
                floor,
            ));
        }
        Some((_, EqStrategy::Flat)) | None => {}
    }

    let exit_lane = match exit {
        Some((ramp, EqStrategy::FilterSweep)) => Some(Envelope::ramp(
            ramp.start,
            ramp.end,
            floor,
            config.high_pass_end_hz as f64,
        )),
        Some((ramp, EqStrategy::BassSwap)) => Some(Envelope::ramp(
            ramp.start,
            ramp.end,
            floor,
            config.bass_cut_hz as f64,
        )),
        Some((_, EqStrategy::Flat)) | None => None,
    };

    lanes.high_pass = match (lanes.high_pass.take(), exit_lane) {
        (Some(entry_lane), Some(exit_lane)) => Some(entry_lane.combine(&exit_lane, f64::max)),
        (lane, None) | (None, lane) => lane,
    };

    lanes
}
