//! Scheduling defaults consulted by every planner.
//!
//! All fallback values used when a plan or feature object is incomplete live
//! here, so the planners never carry their own inline literals.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ScheduleError;
use crate::plan::TransitionSound;

const DEFAULT_CROSSFADE_SEC: f64 = 16.0;
const DEFAULT_BPM: f64 = 120.0;
const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 44_100;

/// Explicit configuration record for schedule construction and realization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Crossfade used when a transition carries no usable length.
    pub default_crossfade_sec: f64,
    /// Tempo assumed when a feature object has no usable BPM.
    pub default_bpm: f64,
    /// Cue used when a transition does not name one.
    pub default_transition_sound: TransitionSound,
    /// Requested length of generated cue clips.
    pub cue_duration_sec: f64,
    /// Scratches are short by nature; longer requests are capped here.
    pub vinyl_scratch_max_sec: f64,
    pub cue_gain: f32,
    /// Low-pass corner at the start of an incoming sweep.
    pub low_pass_start_hz: f32,
    /// Corner frequency treated as "fully open".
    pub filter_open_hz: f32,
    /// High-pass corner that passes the full band.
    pub high_pass_floor_hz: f32,
    /// High-pass corner reached at the end of an outgoing sweep.
    pub high_pass_end_hz: f32,
    /// High-pass corner an incoming track starts from in a bass swap.
    pub bass_cut_hz: f32,
    pub filter_q: f32,
    pub gain_automation: bool,
    pub filter_automation: bool,
    /// Treat a short transition list as hard cuts instead of rejecting it.
    pub allow_missing_transitions: bool,
    /// Seconds of pre-roll before the first transition in skip mode.
    pub first_transition_lead_in_sec: f64,
    pub phrase_snap_tolerance_sec: f64,
    pub snap_to_beats: bool,
    pub output_sample_rate: u32,
    pub output_channels: u16,
    /// Frames between filter coefficient updates while sweeping.
    pub filter_control_frames: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_crossfade_sec: DEFAULT_CROSSFADE_SEC,
            default_bpm: DEFAULT_BPM,
            default_transition_sound: TransitionSound::Whoosh,
            cue_duration_sec: 0.5,
            vinyl_scratch_max_sec: 0.2,
            cue_gain: 0.8,
            low_pass_start_hz: 400.0,
            filter_open_hz: 20_000.0,
            high_pass_floor_hz: 20.0,
            high_pass_end_hz: 1_200.0,
            bass_cut_hz: 250.0,
            filter_q: 0.707,
            gain_automation: true,
            filter_automation: true,
            allow_missing_transitions: false,
            first_transition_lead_in_sec: 0.0,
            phrase_snap_tolerance_sec: 4.0,
            snap_to_beats: true,
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            output_channels: 2,
            filter_control_frames: 64,
        }
    }
}

impl ScheduleConfig {
    /// Parse a configuration payload; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ScheduleError> {
        let config: ScheduleConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Read and parse a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScheduleError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Crossfade length to use for a raw plan value.
    pub fn crossfade_or_default(&self, crossfade_sec: f64) -> f64 {
        if crossfade_sec.is_finite() && crossfade_sec > 0.0 {
            crossfade_sec
        } else {
            self.default_crossfade_sec
        }
    }

    /// Cue length request for a given sound.
    pub fn cue_duration_for(&self, sound: TransitionSound) -> f64 {
        match sound {
            TransitionSound::VinylScratch => self.cue_duration_sec.min(self.vinyl_scratch_max_sec),
            _ => self.cue_duration_sec,
        }
    }

    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.default_crossfade_sec.is_finite() && self.default_crossfade_sec > 0.0) {
            self.default_crossfade_sec = defaults.default_crossfade_sec;
        }
        if !(self.default_bpm.is_finite() && self.default_bpm > 0.0) {
            self.default_bpm = defaults.default_bpm;
        }
        if self.output_sample_rate == 0 {
            self.output_sample_rate = defaults.output_sample_rate;
        }
        self.output_channels = self.output_channels.clamp(1, 2);
        self.filter_control_frames = self.filter_control_frames.max(1);
        self.first_transition_lead_in_sec = self.first_transition_lead_in_sec.max(0.0);
        self.phrase_snap_tolerance_sec = self.phrase_snap_tolerance_sec.max(0.0);
        self.cue_gain = self.cue_gain.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ScheduleConfig::from_json_str(r#"{"default_crossfade_sec": 8.0}"#)
            .expect("parse config");
        assert_eq!(config.default_crossfade_sec, 8.0);
        assert_eq!(config.default_bpm, DEFAULT_BPM);
        assert_eq!(config.default_transition_sound, TransitionSound::Whoosh);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = ScheduleConfig::from_json_str(
            r#"{"default_crossfade_sec": -1.0, "output_channels": 6, "output_sample_rate": 0}"#,
        )
        .expect("parse config");
        assert_eq!(config.default_crossfade_sec, DEFAULT_CROSSFADE_SEC);
        assert_eq!(config.output_channels, 2);
        assert_eq!(config.output_sample_rate, DEFAULT_OUTPUT_SAMPLE_RATE);
    }

    #[test]
    fn scratch_cues_are_capped() {
        let config = ScheduleConfig::default();
        assert_eq!(config.cue_duration_for(TransitionSound::VinylScratch), 0.2);
        assert_eq!(config.cue_duration_for(TransitionSound::Whoosh), 0.5);
    }
}
