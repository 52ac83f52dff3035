//! Band-limited sample rate conversion for decoded audio.
//!
//! Decoded packets are fed in as they arrive and converted in fixed input
//! chunks by a windowed-sinc resampler.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::fmt::Display;

use super::decode::DecodeError;

const RESAMPLE_CHUNK_FRAMES: usize = 1024;
const RESAMPLE_SINC_LEN: usize = 256;
const RESAMPLE_CUTOFF: f32 = 0.95;
const RESAMPLE_OVERSAMPLING_FACTOR: usize = 128;
const RESAMPLE_INTERPOLATION: SincInterpolationType = SincInterpolationType::Linear;
const RESAMPLE_WINDOW: WindowFunction = WindowFunction::BlackmanHarris2;

/// Streaming interleaved resampler.
///
/// Input is buffered per channel until a full chunk is available. The
/// filter delay is trimmed in [`ChunkResampler::finish`] so the output lines
/// up with the input and lasts `input_frames * dst / src` frames.
pub(crate) struct ChunkResampler {
    resampler: SincFixedIn<f32>,
    channels: usize,
    ratio: f64,
    pending: Vec<Vec<f32>>,
    output: Vec<f32>,
    frames_in: usize,
}

impl ChunkResampler {
    /// `None` when the rates already match.
    pub(crate) fn create_if_needed(
        src_rate: u32,
        dst_rate: u32,
        channels: usize,
    ) -> Result<Option<Self>, DecodeError> {
        if src_rate == dst_rate || channels == 0 {
            return Ok(None);
        }

        let params = SincInterpolationParameters {
            sinc_len: RESAMPLE_SINC_LEN,
            f_cutoff: RESAMPLE_CUTOFF,
            oversampling_factor: RESAMPLE_OVERSAMPLING_FACTOR,
            interpolation: RESAMPLE_INTERPOLATION,
            window: RESAMPLE_WINDOW,
        };
        let ratio = dst_rate as f64 / src_rate as f64;
        let resampler =
            SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK_FRAMES, channels)
                .map_err(|err| resample_error("failed to create resampler", err))?;

        Ok(Some(Self {
            resampler,
            channels,
            ratio,
            pending: vec![Vec::with_capacity(RESAMPLE_CHUNK_FRAMES); channels],
            output: Vec::new(),
            frames_in: 0,
        }))
    }

    /// Queue interleaved frames, converting every completed chunk.
    pub(crate) fn push_interleaved(&mut self, samples: &[f32]) -> Result<(), DecodeError> {
        for frame in samples.chunks_exact(self.channels) {
            for (lane, sample) in self.pending.iter_mut().zip(frame) {
                lane.push(*sample);
            }
            self.frames_in += 1;
            if self.pending[0].len() == RESAMPLE_CHUNK_FRAMES {
                let out = self
                    .resampler
                    .process(self.pending.as_slice(), None)
                    .map_err(|err| resample_error("resample error", err))?;
                interleave_into(&mut self.output, &out);
                for lane in &mut self.pending {
                    lane.clear();
                }
            }
        }
        Ok(())
    }

    /// Convert the partial last chunk, drain the filter and return the
    /// delay-compensated interleaved output.
    pub(crate) fn finish(mut self) -> Result<Vec<f32>, DecodeError> {
        let delay = self.resampler.output_delay();
        let expected = (self.frames_in as f64 * self.ratio).round() as usize;

        if !self.pending[0].is_empty() {
            let out = self
                .resampler
                .process_partial(Some(self.pending.as_slice()), None)
                .map_err(|err| resample_error("resample error", err))?;
            interleave_into(&mut self.output, &out);
        }
        while self.output.len() / self.channels < delay + expected {
            let out = self
                .resampler
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(|err| resample_error("resample error", err))?;
            if out.first().map_or(true, Vec::is_empty) {
                break;
            }
            interleave_into(&mut self.output, &out);
        }

        let start = (delay * self.channels).min(self.output.len());
        let mut samples = self.output.split_off(start);
        samples.truncate(expected * self.channels);
        Ok(samples)
    }
}

fn interleave_into(output: &mut Vec<f32>, planar: &[Vec<f32>]) {
    let frames = planar.first().map_or(0, Vec::len);
    output.reserve(frames * planar.len());
    for index in 0..frames {
        for lane in planar {
            output.push(lane[index]);
        }
    }
}

fn resample_error(context: &str, err: impl Display) -> DecodeError {
    DecodeError::Decode(format!("{}: {}", context, err))
}
