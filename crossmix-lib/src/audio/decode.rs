//! Symphonia decoding into [`DecodedBuffer`]s at the output format.

use log::warn;
use std::fmt::{Display, Formatter};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::buffer::DecodedBuffer;
use super::resample::ChunkResampler;

/// Why a byte buffer could not be turned into samples.
#[derive(Debug)]
pub enum DecodeError {
    Io(std::io::Error),
    Unsupported(String),
    Decode(String),
    /// The abort flag was raised mid-decode.
    Cancelled,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Unsupported(err) => write!(f, "unsupported audio: {}", err),
            Self::Decode(err) => write!(f, "decode error: {}", err),
            Self::Cancelled => write!(f, "decode cancelled"),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Target layout for decoded audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl OutputFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.clamp(1, 2),
        }
    }
}

/// Decode an in-memory file.
///
/// `extension` is only a probe hint. When `abort` is given it is checked
/// between packets and a raised flag ends the decode with
/// [`DecodeError::Cancelled`].
pub fn decode_bytes(
    bytes: Vec<u8>,
    extension: Option<&str>,
    format: OutputFormat,
    abort: Option<&AtomicBool>,
) -> Result<DecodedBuffer, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
    let mut hint = Hint::new();
    if let Some(extension) = extension {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| DecodeError::Unsupported(err.to_string()))?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::Unsupported("no supported audio tracks".to_string()))?;
    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::Unsupported("unknown sample rate".to_string()))?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| DecodeError::Unsupported(err.to_string()))?;

    let out_channels = format.channels as usize;
    let mut resampler =
        ChunkResampler::create_if_needed(source_rate, format.sample_rate, out_channels)?;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;
    let mut samples: Vec<f32> = Vec::new();
    let mut decoded_any = false;

    loop {
        if abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(DecodeError::Cancelled);
        }

        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(_)) => break,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(err) => return Err(DecodeError::Decode(err.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => {
                warn!("skipping undecodable packet: {}", err);
                continue;
            }
            Err(SymphoniaError::IoError(_)) => break,
            Err(err) => return Err(DecodeError::Decode(err.to_string())),
        };

        let spec = *decoded.spec();
        let source_channels = spec.channels.count().max(1);
        let buffer = sample_buffer_for(&mut sample_buf, decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        decoded_any = true;

        let remixed = remix(buffer.samples(), source_channels, out_channels);
        match resampler.as_mut() {
            Some(resampler) => resampler.push_interleaved(&remixed)?,
            None => samples.extend_from_slice(&remixed),
        }
    }

    if !decoded_any {
        return Err(DecodeError::Decode("no audio frames decoded".to_string()));
    }
    if let Some(resampler) = resampler {
        samples = resampler.finish()?;
    }

    Ok(DecodedBuffer::new(
        samples,
        format.channels,
        format.sample_rate,
    ))
}

/// Reuse the interleaving buffer unless this packet needs more room than it
/// has. Packet capacity can grow mid-stream for variable-frame codecs.
fn sample_buffer_for(
    slot: &mut Option<SampleBuffer<f32>>,
    frames: u64,
    spec: SignalSpec,
) -> &mut SampleBuffer<f32> {
    let needed = frames as usize * spec.channels.count();
    let fits = slot
        .as_ref()
        .is_some_and(|buffer| buffer.capacity() >= needed);
    if !fits {
        *slot = Some(SampleBuffer::new(frames, spec));
    }
    slot.get_or_insert_with(|| SampleBuffer::new(frames, spec))
}

/// Decode a file from disk, using its extension as the probe hint.
pub fn decode_file(
    path: impl AsRef<Path>,
    format: OutputFormat,
    abort: Option<&AtomicBool>,
) -> Result<DecodedBuffer, DecodeError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let extension = path.extension().and_then(|ext| ext.to_str());
    decode_bytes(bytes, extension, format, abort)
}

/// Convert between mono and stereo; extra source channels are dropped.
fn remix(input: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to {
        return input.to_vec();
    }
    let mut out = Vec::with_capacity(input.len() / from * to);
    for frame in input.chunks_exact(from) {
        match to {
            1 => out.push(frame.iter().take(2).sum::<f32>() / from.min(2) as f32),
            _ => {
                let left = frame[0];
                let right = if from > 1 { frame[1] } else { frame[0] };
                out.push(left);
                out.push(right);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::audio::Channels;

    fn wav_bytes(frames: usize, channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("writer");
            for n in 0..frames * channels as usize {
                writer
                    .write_sample(((n % 100) as i16 - 50) * 200)
                    .expect("sample");
            }
            writer.finalize().expect("finalize");
        }
        cursor.into_inner()
    }

    #[test]
    fn decodes_mono_wav_to_stereo_output() {
        let bytes = wav_bytes(44_100, 1, 44_100);
        let buffer = decode_bytes(bytes, Some("wav"), OutputFormat::new(44_100, 2), None)
            .expect("decode");
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.frames(), 44_100);
        let frame = buffer.frame(10).expect("frame");
        assert_eq!(frame[0], frame[1]);
    }

    #[test]
    fn resamples_to_output_rate() {
        let bytes = wav_bytes(22_050, 2, 22_050);
        let buffer = decode_bytes(bytes, None, OutputFormat::new(44_100, 2), None)
            .expect("decode");
        assert!((buffer.duration_sec() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn long_files_keep_every_packet() {
        // Several hundred packets at the default WAV packet size.
        let bytes = wav_bytes(300_000, 2, 44_100);
        let buffer = decode_bytes(bytes, Some("wav"), OutputFormat::new(44_100, 2), None)
            .expect("decode");
        assert_eq!(buffer.frames(), 300_000);
        let last = buffer.frame(299_999).expect("last frame");
        let expected = (((299_999 * 2) % 100) as i16 - 50) * 200;
        assert!((last[0] - expected as f32 / 32_768.0).abs() < 1e-4);
    }

    #[test]
    fn sample_buffer_grows_for_larger_packets() {
        let spec = SignalSpec::new(
            44_100,
            Channels::FRONT_LEFT | Channels::FRONT_RIGHT,
        );
        let mut slot = None;
        assert!(sample_buffer_for(&mut slot, 576, spec).capacity() >= 576 * 2);
        assert!(sample_buffer_for(&mut slot, 4_608, spec).capacity() >= 4_608 * 2);
        // Smaller packets reuse the grown buffer.
        assert!(sample_buffer_for(&mut slot, 1_152, spec).capacity() >= 4_608 * 2);
    }

    #[test]
    fn downsampling_filters_content_above_the_output_nyquist() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 96_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("writer");
            for n in 0..96_000 {
                let phase = 2.0 * std::f32::consts::PI * 30_000.0 * n as f32 / 96_000.0;
                writer
                    .write_sample((phase.sin() * 16_000.0) as i16)
                    .expect("sample");
            }
            writer.finalize().expect("finalize");
        }

        let buffer = decode_bytes(cursor.into_inner(), Some("wav"), OutputFormat::new(44_100, 1), None)
            .expect("decode");
        assert_eq!(buffer.frames(), 44_100);
        let body = &buffer.samples()[1_000..43_100];
        let rms = (body.iter().map(|s| s * s).sum::<f32>() / body.len() as f32).sqrt();
        assert!(rms < 0.01, "aliased rms {}", rms);
    }

    #[test]
    fn raised_abort_flag_cancels() {
        let abort = AtomicBool::new(true);
        let result = decode_bytes(
            wav_bytes(1_000, 2, 44_100),
            Some("wav"),
            OutputFormat::new(44_100, 2),
            Some(&abort),
        );
        assert!(matches!(result, Err(DecodeError::Cancelled)));
    }

    #[test]
    fn garbage_is_rejected() {
        let result = decode_bytes(vec![7u8; 512], None, OutputFormat::new(44_100, 2), None);
        assert!(matches!(result, Err(DecodeError::Unsupported(_))));
    }
}
