//! Incremental UTF-8 decoding of a streamed response body.
//!
//! Network chunks do not respect character boundaries: a three-byte character can arrive as
//! one byte in one chunk and two in the next.  [`StreamDecoder`] buffers the incomplete tail
//! of each chunk and completes it with the next one, so concatenating every increment gives
//! the same text as decoding the whole body at once.  Invalid bytes are replaced with U+FFFD
//! the way [`String::from_utf8_lossy`] replaces them.

use std::char::REPLACEMENT_CHARACTER;
use std::str;

use crate::error::Error;

/// A stream ended part way through a multi-byte character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedTail {
    bytes: Vec<u8>,
}

impl MalformedTail {
    /// The raw bytes left over at the end of the stream.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The text that stands in for the leftover bytes.
    pub fn text(&self) -> &'static str {
        "\u{FFFD}"
    }
}

impl From<MalformedTail> for Error {
    fn from(tail: MalformedTail) -> Self {
        Error::encoding(
            format!(
                "stream ended inside a UTF-8 sequence ({} trailing bytes: {:02x?})",
                tail.bytes.len(),
                tail.bytes
            ),
            None,
        )
    }
}

/// Stateful UTF-8 decoder for a chunked byte stream.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    pending: Vec<u8>,
    bytes_seen: u64,
    replacements: u64,
}

impl StreamDecoder {
    /// Creates a decoder with no buffered input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one chunk and returns the text it completes.
    ///
    /// An incomplete sequence at the end of `bytes` is held back until the next call to
    /// `feed` or `finish`.  This never fails.
    pub fn feed(&mut self, bytes: &[u8]) -> String {
        self.bytes_seen += bytes.len() as u64;
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest: &[u8] = &input;
        loop {
            match str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    if let Ok(valid) = str::from_utf8(valid) {
                        out.push_str(valid);
                    }
                    match err.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT_CHARACTER);
                            self.replacements += 1;
                            rest = &after[len..];
                        }
                        None => {
                            self.pending = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flushes the decoder at end of stream.
    ///
    /// Returns `None` when the producer sent well-formed text.  Otherwise the leftover bytes
    /// are reported so the caller can surface them; the decoder is reset either way.
    pub fn finish(&mut self) -> Option<MalformedTail> {
        if self.pending.is_empty() {
            return None;
        }
        self.replacements += 1;
        Some(MalformedTail {
            bytes: std::mem::take(&mut self.pending),
        })
    }

    /// Discards buffered input and counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns true if part of a character is buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Total bytes fed since creation or the last reset.
    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    /// Number of replacement characters emitted since creation or the last reset.
    pub fn replacements(&self) -> u64 {
        self.replacements
    }
}
