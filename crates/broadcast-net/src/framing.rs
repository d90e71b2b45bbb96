//! Message framing for the messaging substrate
//!
//! One JSON envelope per line. Malformed lines are consumed and reported
//! individually so a single bad frame never stalls the stream.

use broadcast_core::Envelope;
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame too large: {0} bytes")]
    TooLarge(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] broadcast_core::Error),
}

/// Codec for newline-delimited JSON envelopes
///
/// Wire format:
/// - N bytes: UTF-8 JSON object, no embedded newlines
/// - 1 byte: `\n`
pub struct EnvelopeCodec {
    /// Upper bound for a single line, newline excluded
    max_frame_bytes: usize,
    /// Offset already scanned for a newline
    next_index: usize,
    /// Skipping the tail of an oversized line
    discarding: bool,
}

impl EnvelopeCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self::with_max_frame(MAX_FRAME_SIZE)
    }

    /// Create codec with a custom frame limit
    pub fn with_max_frame(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            next_index: 0,
            discarding: false,
        }
    }

    fn parse_line(line: &[u8]) -> Result<Option<Envelope>, FrameError> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(Envelope::from_slice(line)?))
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| offset + self.next_index);

            match newline {
                Some(pos) if self.discarding => {
                    src.advance(pos + 1);
                    self.next_index = 0;
                    self.discarding = false;
                }
                Some(pos) => {
                    let line = src.split_to(pos + 1);
                    self.next_index = 0;

                    if pos > self.max_frame_bytes {
                        return Err(FrameError::TooLarge(pos));
                    }
                    // Blank lines are skipped
                    if let Some(envelope) = Self::parse_line(&line[..pos])? {
                        return Ok(Some(envelope));
                    }
                }
                None if self.discarding => {
                    src.advance(src.len());
                    self.next_index = 0;
                    return Ok(None);
                }
                None if src.len() > self.max_frame_bytes => {
                    let len = src.len();
                    src.advance(len);
                    self.next_index = 0;
                    self.discarding = true;
                    return Err(FrameError::TooLarge(len));
                }
                None => {
                    self.next_index = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(envelope) = self.decode(src)? {
            return Ok(Some(envelope));
        }

        // Final line without a trailing newline
        self.next_index = 0;
        if self.discarding || src.is_empty() {
            src.clear();
            self.discarding = false;
            return Ok(None);
        }
        let line = src.split_to(src.len());
        Self::parse_line(&line)
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.to_vec()?;
        if payload.len() > self.max_frame_bytes {
            return Err(FrameError::TooLarge(payload.len()));
        }

        dst.reserve(payload.len() + 1);
        dst.put_slice(&payload);
        dst.put_u8(b'\n');

        Ok(())
    }
}
