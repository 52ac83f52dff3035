//! Sample buffers and decoding.

pub mod buffer;
pub mod decode;
mod resample;

pub use buffer::DecodedBuffer;
pub use decode::{decode_bytes, decode_file, DecodeError, OutputFormat};
