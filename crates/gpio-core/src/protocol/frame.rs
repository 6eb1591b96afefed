//! Recovers complete envelopes from an unframed inbound byte stream.
//!
//! The session peer writes JSON objects back to back, usually one per line,
//! but a single read may carry several objects or only part of one.  The
//! [`FrameDecoder`] accumulates bytes and yields every complete JSON value in
//! arrival order, keeping an incomplete tail for the next read.
//!
//! Recovery rules:
//! - a syntax error discards input up to and including the next newline;
//! - a buffer that grows past its limit without producing a value is
//!   discarded and reported as [`CodecError::BufferOverflow`].

use serde_json::{Deserializer, Value};

use crate::protocol::codec::{envelope_from_value, CodecError};
use crate::protocol::envelope::Envelope;

/// Default limit on buffered, not-yet-decoded bytes.
pub const MAX_FRAME_BUFFER: usize = 4096;

/// Stateful stream-to-envelope decoder.  One per connection.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    limit: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_limit(MAX_FRAME_BUFFER)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Number of bytes held back waiting for the rest of a value.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Appends `bytes` and returns every result that became complete.
    ///
    /// Each element is either a decoded [`Envelope`] or the error for one
    /// malformed value; errors never stop the values that follow them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Envelope, CodecError>> {
        self.buf.extend_from_slice(bytes);

        let mut out = Vec::new();
        let mut consumed = 0;

        loop {
            consumed += self.buf[consumed..]
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            if consumed == self.buf.len() {
                break;
            }

            let mut stream = Deserializer::from_slice(&self.buf[consumed..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) => {
                    consumed += stream.byte_offset();
                    out.push(envelope_from_value(value));
                }
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => {
                    out.push(Err(CodecError::Json(e)));
                    consumed = match self.buf[consumed..].iter().position(|&b| b == b'\n') {
                        Some(pos) => consumed + pos + 1,
                        None => self.buf.len(),
                    };
                }
                None => break,
            }
        }

        self.buf.drain(..consumed);

        if self.buf.len() > self.limit {
            out.push(Err(CodecError::BufferOverflow {
                len: self.buf.len(),
            }));
            self.buf.clear();
        }

        out
    }

    /// Drops any partially received value.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
