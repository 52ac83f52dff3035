//! # Crossmix
//!
//! Transition scheduling and mix preview for multi-track DJ sets.
//!
//! A [`plan::MixPlan`] and per-track [`features::TrackFeatures`] go in; a
//! [`schedule::PlaybackSchedule`] of timed segments, gain and filter
//! automation, and cue placements comes out. The schedule is realized live
//! through a [`transport::Transport`] or offline with
//! [`render::render_offline`].

pub mod audio;
pub mod config;
pub mod cues;
pub mod dsp;
pub mod error;
pub mod features;
pub mod plan;
pub mod render;
pub mod schedule;
pub mod stems;
pub mod transport;

pub use config::ScheduleConfig;
pub use error::{ConfigurationError, ScheduleError};
pub use schedule::{build_schedule, PlaybackSchedule, PlaybackStart};
pub use transport::{PlayRequest, TrackSource, Transport, TransportState};
