//! What a caller hands to [`super::Transport::play`].

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use crate::audio::{decode_bytes, decode_file, DecodeError, DecodedBuffer, OutputFormat};
use crate::features::TrackFeatures;
use crate::plan::MixPlan;
use crate::schedule::PlaybackStart;

/// Where a track's raw audio comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackSource {
    /// Encoded file contents already in memory. `extension` is a probe hint.
    Bytes {
        data: Vec<u8>,
        extension: Option<String>,
    },
    File(PathBuf),
    /// Only known by reference (a URL or catalog id). Cannot be previewed.
    Remote(String),
}

impl TrackSource {
    pub fn bytes(data: Vec<u8>, extension: Option<&str>) -> Self {
        TrackSource::Bytes {
            data,
            extension: extension.map(str::to_string),
        }
    }

    pub fn is_local(&self) -> bool {
        !matches!(self, TrackSource::Remote(_))
    }

    pub(crate) fn decode(
        &self,
        format: OutputFormat,
        abort: &AtomicBool,
    ) -> Result<DecodedBuffer, DecodeError> {
        match self {
            TrackSource::Bytes { data, extension } => {
                decode_bytes(data.clone(), extension.as_deref(), format, Some(abort))
            }
            TrackSource::File(path) => decode_file(path, format, Some(abort)),
            TrackSource::Remote(reference) => Err(DecodeError::Unsupported(format!(
                "remote source {} has no local audio",
                reference
            ))),
        }
    }
}

/// A plan, its features and the audio for every track it names.
///
/// `features` and `sources` are both indexed by track index. A `None`
/// source is only allowed for tracks the order does not use.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub plan: MixPlan,
    pub features: Vec<TrackFeatures>,
    pub sources: Vec<Option<TrackSource>>,
    pub start: PlaybackStart,
    /// Snap transition windows to phrase boundaries before scheduling.
    pub snap_to_phrases: bool,
}

impl PlayRequest {
    pub fn new(plan: MixPlan, features: Vec<TrackFeatures>, sources: Vec<Option<TrackSource>>) -> Self {
        Self {
            plan,
            features,
            sources,
            start: PlaybackStart::Beginning,
            snap_to_phrases: false,
        }
    }

    pub fn starting_at(mut self, start: PlaybackStart) -> Self {
        self.start = start;
        self
    }

    pub fn with_phrase_snap(mut self, enabled: bool) -> Self {
        self.snap_to_phrases = enabled;
        self
    }
}
