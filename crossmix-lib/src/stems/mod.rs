//! Stem-aware transitions: vocals, drums, bass and the rest handed over on
//! their own schedules instead of one shared crossfade.
//!
//! Rendering sits behind [`StemRenderer`] so an out-of-process separator
//! can stand in for [`LocalStemRenderer`].

mod plan;
mod render;

use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::audio::DecodedBuffer;
use crate::error::{ConfigurationError, ScheduleError};

pub use plan::{Stem, StemFade, StemFadePlan};
pub use render::{render_stem_transition, StemSet};

/// Everything needed to render one stem-aware handoff from A to B.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemRenderRequest {
    pub file_a: PathBuf,
    pub file_b: PathBuf,
    /// Seconds into A where the transition begins.
    pub transition_start_a: f64,
    pub crossfade_duration_sec: f64,
    pub bpm_a: f64,
    pub bpm_b: f64,
    #[serde(default = "default_style")]
    pub style: String,
}

fn default_style() -> String {
    "club".to_string()
}

/// Produces the mixed audio of a stem-aware transition as encoded bytes.
pub trait StemRenderer: Send + Sync {
    fn render(&self, request: &StemRenderRequest) -> Result<Vec<u8>, ScheduleError>;
}

/// Renders from pre-separated stems on disk.
///
/// `file_a` and `file_b` name directories holding `vocals.wav`,
/// `drums.wav`, `bass.wav` and `other.wav`. Output is mono 16-bit WAV.
#[derive(Debug, Clone)]
pub struct LocalStemRenderer {
    sample_rate: u32,
    plan: Option<StemFadePlan>,
}

impl LocalStemRenderer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            plan: None,
        }
    }

    /// Use `plan` instead of [`StemFadePlan::default_for`].
    pub fn with_plan(mut self, plan: StemFadePlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Render to samples instead of WAV bytes.
    pub fn render_buffer(
        &self,
        request: &StemRenderRequest,
    ) -> Result<DecodedBuffer, ScheduleError> {
        let plan = match &self.plan {
            Some(plan) => plan.clone(),
            None => StemFadePlan::default_for(request.crossfade_duration_sec),
        };
        let stems_a = StemSet::load_dir(&request.file_a, self.sample_rate, 0)?;
        let stems_b = StemSet::load_dir(&request.file_b, self.sample_rate, 1)?;
        if stems_a.is_empty() && stems_b.is_empty() {
            return Err(ConfigurationError::MissingSource { track: 0 }.into());
        }
        info!(
            "stem transition {:.0} -> {:.0} bpm, style {}",
            request.bpm_a, request.bpm_b, request.style
        );
        Ok(render_stem_transition(
            &stems_a,
            &stems_b,
            &plan,
            request.transition_start_a,
            self.sample_rate,
        ))
    }
}

impl StemRenderer for LocalStemRenderer {
    fn render(&self, request: &StemRenderRequest) -> Result<Vec<u8>, ScheduleError> {
        self.render_buffer(request)?.to_wav_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{decode_bytes, OutputFormat};

    fn write_stem(dir: &std::path::Path, stem: Stem, seconds: f64, value: f32) {
        let frames = (seconds * 8_000.0) as usize;
        DecodedBuffer::new(vec![value; frames], 1, 8_000)
            .write_wav(dir.join(format!("{}.wav", stem.id())))
            .expect("write stem");
    }

    fn request(a: &std::path::Path, b: &std::path::Path) -> StemRenderRequest {
        StemRenderRequest {
            file_a: a.to_path_buf(),
            file_b: b.to_path_buf(),
            transition_start_a: 2.0,
            crossfade_duration_sec: 4.0,
            bpm_a: 124.0,
            bpm_b: 126.0,
            style: "club".to_string(),
        }
    }

    #[test]
    fn local_renderer_returns_decodable_wav() {
        let a = tempfile::tempdir().expect("a");
        let b = tempfile::tempdir().expect("b");
        for stem in Stem::ALL {
            write_stem(a.path(), stem, 8.0, 0.2);
            write_stem(b.path(), stem, 8.0, 0.2);
        }

        let renderer = LocalStemRenderer::new(8_000);
        let bytes = renderer.render(&request(a.path(), b.path())).expect("render");
        let decoded =
            decode_bytes(bytes, Some("wav"), OutputFormat::new(8_000, 1), None).expect("decode");
        assert!((decoded.duration_sec() - 4.0).abs() < 1e-3);
        assert!((decoded.peak() - 0.95).abs() < 1e-3);
    }

    #[test]
    fn empty_stem_directories_are_rejected() {
        let a = tempfile::tempdir().expect("a");
        let b = tempfile::tempdir().expect("b");
        let err = LocalStemRenderer::new(8_000)
            .render(&request(a.path(), b.path()))
            .expect_err("no stems");
        assert!(err.is_configuration());
    }

    #[test]
    fn request_style_defaults_to_club() {
        let request: StemRenderRequest = serde_json::from_str(
            r#"{"file_a": "a", "file_b": "b", "transition_start_a": 60.0,
                "crossfade_duration_sec": 8.0, "bpm_a": 120.0, "bpm_b": 122.0}"#,
        )
        .expect("request");
        assert_eq!(request.style, "club");
    }
}
