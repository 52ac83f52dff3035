//! Per-track musical features and their normalization.
//!
//! Feature objects come from an external analysis step and may be
//! incomplete or slightly out of range. [`normalize_features`] turns them
//! into the canonical shape the planners rely on: finite values, timestamps
//! sorted and inside `[0, duration]`, energy inside `[0, 1]`.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::ScheduleConfig;
use crate::error::ScheduleError;

/// Analysis output for a single track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackFeatures {
    pub duration_sec: f64,
    pub bpm: f64,
    pub beat_times_sec: Vec<f64>,
    pub vocal_phrase_starts: Vec<f64>,
    pub vocal_phrase_ends: Vec<f64>,
    pub energy_curve: Vec<f64>,
}

impl TrackFeatures {
    /// Minimal feature object for a track of known length.
    pub fn with_duration(duration_sec: f64) -> Self {
        Self {
            duration_sec,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FeaturesContainer {
    Nested { tracks: Vec<TrackFeatures> },
    Flat(Vec<TrackFeatures>),
}

/// Parse a features payload: either a list or an object with `tracks`.
pub fn features_from_json_str(json: &str) -> Result<Vec<TrackFeatures>, ScheduleError> {
    let container: FeaturesContainer = serde_json::from_str(json)?;
    Ok(match container {
        FeaturesContainer::Nested { tracks } => tracks,
        FeaturesContainer::Flat(tracks) => tracks,
    })
}

pub fn features_from_path(path: impl AsRef<Path>) -> Result<Vec<TrackFeatures>, ScheduleError> {
    let raw = std::fs::read_to_string(path)?;
    features_from_json_str(&raw)
}

/// Validate and default a feature object.
///
/// # Arguments
/// - `raw`: Feature object as produced by the analysis collaborator.
/// - `decoded_duration`: Length of the decoded buffer, when known. It is
///   authoritative over the analyzed duration since it bounds what can play.
/// - `config`: Fallback values.
pub fn normalize_features(
    raw: &TrackFeatures,
    decoded_duration: Option<f64>,
    config: &ScheduleConfig,
) -> TrackFeatures {
    let duration_sec = match decoded_duration.filter(|d| d.is_finite() && *d >= 0.0) {
        Some(decoded) => {
            if raw.duration_sec.is_finite() && (raw.duration_sec - decoded).abs() > 0.5 {
                debug!(
                    "analyzed duration {:.2}s differs from decoded {:.2}s",
                    raw.duration_sec, decoded
                );
            }
            decoded
        }
        None if raw.duration_sec.is_finite() && raw.duration_sec > 0.0 => raw.duration_sec,
        None => {
            warn!("track has no usable duration ({})", raw.duration_sec);
            0.0
        }
    };

    let bpm = if raw.bpm.is_finite() && raw.bpm > 0.0 {
        raw.bpm
    } else {
        config.default_bpm
    };

    TrackFeatures {
        duration_sec,
        bpm,
        beat_times_sec: normalize_timestamps(&raw.beat_times_sec, duration_sec),
        vocal_phrase_starts: normalize_timestamps(&raw.vocal_phrase_starts, duration_sec),
        vocal_phrase_ends: normalize_timestamps(&raw.vocal_phrase_ends, duration_sec),
        energy_curve: raw
            .energy_curve
            .iter()
            .map(|value| {
                if value.is_finite() {
                    value.clamp(0.0, 1.0)
                } else {
                    0.0
                }
            })
            .collect(),
    }
}

fn normalize_timestamps(values: &[f64], duration_sec: f64) -> Vec<f64> {
    let mut out: Vec<f64> = values
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .map(|value| value.clamp(0.0, duration_sec))
        .collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    out
}

/// Value in `sorted` closest to `target`, if within `tolerance`.
pub(crate) fn nearest_within(sorted: &[f64], target: f64, tolerance: f64) -> Option<f64> {
    sorted
        .iter()
        .copied()
        .filter(|value| (value - target).abs() <= tolerance)
        .min_by(|a, b| (a - target).abs().total_cmp(&(b - target).abs()))
}
