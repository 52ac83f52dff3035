//! Cue assets: where transition sounds come from and the decoded-clip cache.
//!
//! Cues are decorative. Nothing in this module can fail a playback session;
//! unavailable assets are logged and the cue is left out.

mod synth;

use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::audio::{decode_bytes, DecodedBuffer, OutputFormat};
use crate::error::ScheduleError;
use crate::plan::TransitionSound;
use crate::schedule::CuePlacement;

pub use synth::SynthCueProvider;

/// Source of raw, decodable cue audio.
pub trait CueAssetProvider: Send + Sync {
    /// Bytes for `sound`, roughly `duration_hint` seconds long. `None` when
    /// the provider has nothing usable.
    fn fetch(&self, sound: TransitionSound, duration_hint: f64) -> Option<Vec<u8>>;
}

const CUE_FILE_EXTENSIONS: [&str; 5] = ["wav", "flac", "mp3", "ogg", "m4a"];

/// Reads `<dir>/<sound_id>.<ext>` from disk.
#[derive(Debug, Clone)]
pub struct DirectoryCueProvider {
    dir: PathBuf,
}

impl DirectoryCueProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl CueAssetProvider for DirectoryCueProvider {
    fn fetch(&self, sound: TransitionSound, _duration_hint: f64) -> Option<Vec<u8>> {
        if sound.is_silent() {
            return None;
        }
        CUE_FILE_EXTENSIONS.iter().find_map(|ext| {
            let path = self.dir.join(format!("{}.{}", sound.id(), ext));
            std::fs::read(&path).ok()
        })
    }
}

type ClipMap = Arc<Mutex<HashMap<TransitionSound, DecodedBuffer>>>;

/// Decoded cue clips keyed by sound.
///
/// Clones share the same cache. Loads run on background threads and may
/// land after the cue's start instant; a voice that finds no clip simply
/// stays silent.
#[derive(Clone)]
pub struct CueBank {
    clips: ClipMap,
    pending: Arc<Mutex<HashSet<TransitionSound>>>,
    provider: Arc<dyn CueAssetProvider>,
    format: OutputFormat,
}

impl CueBank {
    pub fn new(provider: Arc<dyn CueAssetProvider>, format: OutputFormat) -> Self {
        Self {
            clips: Arc::new(Mutex::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashSet::new())),
            provider,
            format,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Cached clip for `sound`, if it has finished loading.
    pub fn get(&self, sound: TransitionSound) -> Option<DecodedBuffer> {
        self.clips.lock().unwrap().get(&sound).cloned()
    }

    pub fn is_ready(&self, sound: TransitionSound) -> bool {
        self.clips.lock().unwrap().contains_key(&sound)
    }

    pub fn insert(&self, sound: TransitionSound, clip: DecodedBuffer) {
        self.clips.lock().unwrap().insert(sound, clip);
    }

    /// Fetch and decode `sound` on the calling thread, caching the result.
    pub fn load_blocking(
        &self,
        sound: TransitionSound,
        duration_hint: f64,
    ) -> Result<DecodedBuffer, ScheduleError> {
        if let Some(clip) = self.get(sound) {
            return Ok(clip);
        }
        let clip = fetch_and_decode(self.provider.as_ref(), sound, duration_hint, self.format)?;
        self.insert(sound, clip.clone());
        Ok(clip)
    }

    /// Start a background load unless the clip is cached or already loading.
    pub fn request(&self, sound: TransitionSound, duration_hint: f64) -> Option<JoinHandle<()>> {
        if sound.is_silent() || self.is_ready(sound) {
            return None;
        }
        if !self.pending.lock().unwrap().insert(sound) {
            return None;
        }

        let clips = self.clips.clone();
        let pending = self.pending.clone();
        let provider = self.provider.clone();
        let format = self.format;
        Some(thread::spawn(move || {
            match fetch_and_decode(provider.as_ref(), sound, duration_hint, format) {
                Ok(clip) => {
                    debug!("cue {} ready ({:.2}s)", sound.id(), clip.duration_sec());
                    clips.lock().unwrap().insert(sound, clip);
                }
                Err(err) => warn!("{}", err),
            }
            pending.lock().unwrap().remove(&sound);
        }))
    }

    /// Request every distinct sound used by `cues`.
    pub fn request_all(&self, cues: &[CuePlacement]) -> Vec<JoinHandle<()>> {
        cues.iter()
            .filter_map(|cue| self.request(cue.sound, cue.duration_hint))
            .collect()
    }
}

fn fetch_and_decode(
    provider: &dyn CueAssetProvider,
    sound: TransitionSound,
    duration_hint: f64,
    format: OutputFormat,
) -> Result<DecodedBuffer, ScheduleError> {
    let bytes = provider
        .fetch(sound, duration_hint)
        .ok_or_else(|| ScheduleError::AssetUnavailable {
            sound: sound.id().to_string(),
            reason: "provider returned nothing".to_string(),
        })?;
    decode_bytes(bytes, None, format, None).map_err(|err| ScheduleError::AssetUnavailable {
        sound: sound.id().to_string(),
        reason: err.to_string(),
    })
}
