//! NDJSON codec for interpreter streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so a
//! runaway `repr` or an unterminated write cannot make the host buffer
//! without bound.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum inbound line length: 16 MiB.
///
/// Large cell outputs arrive as a single JSON line, so the limit is well
/// above anything a reasonable execution prints.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Line codec for the interpreter's stdio.
///
/// Inbound lines longer than [`MAX_LINE_BYTES`] return
/// [`AppError::Protocol`]`("line too long: …")`; the codec then discards
/// the rest of that line and resumes at the next newline.
#[derive(Debug)]
pub struct KernelCodec(LinesCodec);

impl KernelCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_length))
    }
}

impl Default for KernelCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for KernelCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for KernelCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Protocol("line too long: exceeded maximum line length".into())
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
