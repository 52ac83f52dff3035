//! Error taxonomy for scheduling, decoding and playback.

use std::fmt::{Display, Formatter};

/// Plan or source problems detected before anything is scheduled.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    TransitionCount { expected: usize, found: usize },
    FeatureCount { expected: usize, found: usize },
    InvalidTrackIndex(usize),
    DuplicateTrackIndex(usize),
    NonMonotonicStart {
        position: usize,
        previous: f64,
        current: f64,
    },
    MissingSource { track: usize },
    RemoteSource { track: usize },
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransitionCount { expected, found } => write!(
                f,
                "expected {} transitions for the track order, found {}",
                expected, found
            ),
            Self::FeatureCount { expected, found } => write!(
                f,
                "expected features for {} tracks, found {}",
                expected, found
            ),
            Self::InvalidTrackIndex(index) => write!(f, "track index {} is out of range", index),
            Self::DuplicateTrackIndex(index) => {
                write!(f, "track index {} appears more than once in the order", index)
            }
            Self::NonMonotonicStart {
                position,
                previous,
                current,
            } => write!(
                f,
                "start time of position {} ({:.3}s) precedes position {} ({:.3}s)",
                position,
                current,
                position.saturating_sub(1),
                previous
            ),
            Self::MissingSource { track } => {
                write!(f, "track {} has no source audio buffer", track)
            }
            Self::RemoteSource { track } => write!(
                f,
                "track {} is only available by remote reference and cannot be previewed",
                track
            ),
        }
    }
}

/// Error type for the scheduling and playback pipeline.
#[derive(Debug)]
pub enum ScheduleError {
    Configuration(ConfigurationError),
    Decode { track: usize, reason: String },
    AssetUnavailable { sound: String, reason: String },
    Output(String),
    Cancelled,
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl Display for ScheduleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(err) => write!(f, "configuration error: {}", err),
            Self::Decode { track, reason } => {
                write!(f, "decode error on track {}: {}", track, reason)
            }
            Self::AssetUnavailable { sound, reason } => {
                write!(f, "cue asset {} unavailable: {}", sound, reason)
            }
            Self::Output(reason) => write!(f, "output error: {}", reason),
            Self::Cancelled => write!(f, "playback was stopped before it started"),
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl std::error::Error for ScheduleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigurationError> for ScheduleError {
    fn from(value: ConfigurationError) -> Self {
        Self::Configuration(value)
    }
}

impl From<std::io::Error> for ScheduleError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ScheduleError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<hound::Error> for ScheduleError {
    fn from(value: hound::Error) -> Self {
        match value {
            hound::Error::IoError(err) => Self::Io(err),
            other => Self::Output(other.to_string()),
        }
    }
}

impl ScheduleError {
    /// True when the error was raised before any segment could start.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
