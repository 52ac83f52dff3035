//! Mix plan input types produced by the reasoning collaborator.
//!
//! A [`MixPlan`] names the play order of analyzed tracks and carries one
//! [`TransitionPlan`] per adjacent pair. Plans are immutable for the duration
//! of a planning round; the scheduler only reads them.

mod snap;

use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::path::Path;

use crate::config::ScheduleConfig;
use crate::error::{ConfigurationError, ScheduleError};

pub use snap::snap_to_phrases;

/// One-shot effect placed at a transition boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransitionSound {
    Whoosh,
    FilterSweep,
    EchoTail,
    VinylScratch,
    /// No cue for this transition.
    Silent,
}

impl TransitionSound {
    pub const ALL: [TransitionSound; 4] = [
        TransitionSound::Whoosh,
        TransitionSound::FilterSweep,
        TransitionSound::EchoTail,
        TransitionSound::VinylScratch,
    ];

    /// Wire identifier, also used as the cue cache key.
    pub fn id(&self) -> &'static str {
        match self {
            TransitionSound::Whoosh => "whoosh",
            TransitionSound::FilterSweep => "filter_sweep",
            TransitionSound::EchoTail => "echo_tail",
            TransitionSound::VinylScratch => "vinyl_scratch",
            TransitionSound::Silent => "none",
        }
    }

    /// Parse a sound name. Unknown names fall back to a whoosh.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "" | "none" => TransitionSound::Silent,
            "whoosh" => TransitionSound::Whoosh,
            "filter_sweep" => TransitionSound::FilterSweep,
            "echo_tail" => TransitionSound::EchoTail,
            "vinyl_scratch" => TransitionSound::VinylScratch,
            other => {
                warn!("unknown transition sound {:?}, using whoosh", other);
                TransitionSound::Whoosh
            }
        }
    }

    pub fn is_silent(&self) -> bool {
        *self == TransitionSound::Silent
    }
}

impl Serialize for TransitionSound {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for TransitionSound {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(TransitionSound::from_name(&raw))
    }
}

/// Spectral move layered on top of the amplitude crossfade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EqStrategy {
    /// Incoming opens from a low-pass, outgoing thins out through a high-pass.
    #[default]
    FilterSweep,
    /// Outgoing loses its bass while the incoming bass is brought in.
    BassSwap,
    /// Amplitude crossfade only.
    Flat,
}

impl EqStrategy {
    pub fn id(&self) -> &'static str {
        match self {
            EqStrategy::FilterSweep => "filter_sweep",
            EqStrategy::BassSwap => "bass_swap",
            EqStrategy::Flat => "none",
        }
    }

    /// Interpret an identifier or a free-text strategy description.
    pub fn from_text(text: &str) -> Self {
        let lowered = text.trim().to_lowercase();
        match lowered.as_str() {
            "filter_sweep" | "" => EqStrategy::FilterSweep,
            "bass_swap" => EqStrategy::BassSwap,
            "none" | "flat" => EqStrategy::Flat,
            _ if lowered.contains("bass") => EqStrategy::BassSwap,
            _ => EqStrategy::FilterSweep,
        }
    }
}

impl Serialize for EqStrategy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for EqStrategy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(EqStrategy::from_text(&raw))
    }
}

/// Handoff parameters for one adjacent pair of tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionPlan {
    /// Seconds into the outgoing track where the handoff begins.
    pub transition_start_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_end_time: Option<f64>,
    #[serde(default)]
    pub crossfade_duration_sec: f64,
    #[serde(default)]
    pub eq_strategy: EqStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_sound: Option<TransitionSound>,
    /// Phrase/word matched entry point into the incoming track.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incoming_start_offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_word: Option<String>,
    #[serde(default)]
    pub reasoning_text: String,
}

impl TransitionPlan {
    /// Plain crossfade starting `start` seconds into the outgoing track.
    pub fn new(start: f64, crossfade_sec: f64) -> Self {
        Self {
            transition_start_time: start,
            transition_end_time: None,
            crossfade_duration_sec: crossfade_sec,
            eq_strategy: EqStrategy::default(),
            transition_sound: None,
            incoming_start_offset: None,
            matched_word: None,
            reasoning_text: String::new(),
        }
    }

    pub fn with_sound(mut self, sound: TransitionSound) -> Self {
        self.transition_sound = Some(sound);
        self
    }

    pub fn with_incoming_offset(mut self, offset: f64) -> Self {
        self.incoming_start_offset = Some(offset);
        self
    }

    pub fn with_end(mut self, end: f64) -> Self {
        self.transition_end_time = Some(end);
        self
    }

    pub fn with_eq(mut self, eq_strategy: EqStrategy) -> Self {
        self.eq_strategy = eq_strategy;
        self
    }
}

/// Ordered track sequence plus per-pair transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixPlan {
    pub order: Vec<usize>,
    #[serde(default)]
    pub transitions: Vec<TransitionPlan>,
    #[serde(default)]
    pub energy_curve: Vec<f64>,
}

impl MixPlan {
    pub fn new(order: Vec<usize>, transitions: Vec<TransitionPlan>) -> Self {
        Self {
            order,
            transitions,
            energy_curve: Vec::new(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ScheduleError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScheduleError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Number of transitions the order requires.
    pub fn expected_transitions(&self) -> usize {
        self.order.len().saturating_sub(1)
    }

    /// Transition leaving position `position`, if the plan carries one.
    pub fn transition_after(&self, position: usize) -> Option<&TransitionPlan> {
        if position + 1 >= self.order.len() {
            return None;
        }
        self.transitions.get(position)
    }

    /// Check order indices and transition count against `track_count` tracks.
    pub fn validate(
        &self,
        track_count: usize,
        config: &ScheduleConfig,
    ) -> Result<(), ConfigurationError> {
        let mut seen = HashSet::with_capacity(self.order.len());
        for &index in &self.order {
            if index >= track_count {
                return Err(ConfigurationError::InvalidTrackIndex(index));
            }
            if !seen.insert(index) {
                return Err(ConfigurationError::DuplicateTrackIndex(index));
            }
        }

        let expected = self.expected_transitions();
        let found = self.transitions.len();
        let short_but_allowed = found < expected && config.allow_missing_transitions;
        if found != expected && !short_but_allowed {
            return Err(ConfigurationError::TransitionCount { expected, found });
        }

        Ok(())
    }
}
