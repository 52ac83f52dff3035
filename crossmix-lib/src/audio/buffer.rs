//! Decoded, interleaved sample storage.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use crate::error::ScheduleError;

/// Interleaved `f32` samples at a fixed rate and channel count.
///
/// The sample data is reference counted so voices and cached cue clips can
/// share one decode.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    samples: Arc<Vec<f32>>,
    channels: u16,
    sample_rate: u32,
}

impl DecodedBuffer {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let mut samples = samples;
        samples.truncate(samples.len() - samples.len() % channels as usize);
        Self {
            samples: Arc::new(samples),
            channels,
            sample_rate: sample_rate.max(1),
        }
    }

    pub fn silence(duration_sec: f64, channels: u16, sample_rate: u32) -> Self {
        let frames = (duration_sec.max(0.0) * sample_rate as f64).round() as usize;
        Self::new(vec![0.0; frames * channels.max(1) as usize], channels, sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_sec(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Interleaved samples of frame `index`, if it exists.
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let channels = self.channels as usize;
        let start = index.checked_mul(channels)?;
        self.samples.get(start..start + channels)
    }

    /// Frame index for a time in seconds, rounded to the nearest frame.
    pub fn frame_at(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate as f64).round() as usize
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }

    /// Encode as a 16-bit PCM WAV file in memory.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>, ScheduleError> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, self.wav_spec())?;
            self.write_samples(&mut writer)?;
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    /// Write as a 16-bit PCM WAV file.
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<(), ScheduleError> {
        let mut writer = hound::WavWriter::create(path, self.wav_spec())?;
        self.write_samples(&mut writer)?;
        writer.finalize()?;
        Ok(())
    }

    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    fn write_samples<W>(&self, writer: &mut hound::WavWriter<W>) -> Result<(), ScheduleError>
    where
        W: std::io::Write + std::io::Seek,
    {
        for sample in self.samples.iter() {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        Ok(())
    }
}
