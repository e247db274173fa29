//! Linear buffer: a contiguous byte store.
//!
//! Persistent operations allocate a fresh container and copy; the
//! in-place variants shift bytes inside the existing allocation. Nothing
//! here is clever, which is the point: this backend is the differential
//! oracle the rope is validated against.

use super::stream::{RuneReader, SliceBackStream, SliceStream};
use super::{Buffer, Statistics};
use crate::error::{BufferError, Result};
use crate::rune;

/// A rune-addressable buffer over one contiguous, well-formed UTF-8 byte
/// region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearBuffer {
    text: Vec<u8>,
    len: usize,
}

impl LinearBuffer {
    /// Create a buffer by copying and validating `text`.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidEncoding`] on malformed input.
    pub fn new(text: &[u8]) -> Result<Self> {
        std::str::from_utf8(text).map_err(|_| BufferError::InvalidEncoding)?;
        Ok(Self {
            text: text.to_vec(),
            len: rune::rune_count(text),
        })
    }

    /// Create a buffer from an owned string, skipping re-validation.
    pub fn from_string(text: String) -> Self {
        let text = text.into_bytes();
        let len = rune::rune_count(&text);
        Self { text, len }
    }

    /// Wrap bytes already known to be well-formed UTF-8.
    pub(crate) fn from_parts(text: Vec<u8>) -> Self {
        let len = rune::rune_count(&text);
        Self { text, len }
    }

    /// Borrow the byte image without copying.
    pub fn as_bytes(&self) -> &[u8] {
        &self.text
    }

    /// Forward rune reader bounded by the absolute rune offset `end`:
    /// the stream is exhausted once its cursor reaches `end`. `end` at
    /// or before `pos` yields an exhausted stream; `end` past the
    /// content clamps to the length.
    pub fn stream_till(&self, pos: usize, end: usize) -> Box<dyn RuneReader + '_> {
        let end = end.min(self.len);
        let count = end.saturating_sub(pos);
        self.stream_count(pos, count)
    }

    /// Backward rune reader bounded by the absolute rune offset `end`:
    /// emits the runes at `pos - 1` down to `end`. `end` at or past
    /// `pos` yields an exhausted stream.
    pub fn back_stream_till(&self, pos: usize, end: usize) -> Box<dyn RuneReader + '_> {
        let count = pos.saturating_sub(end);
        self.back_stream_count(pos, count)
    }

    fn check_cursor(&self, pos: usize) -> Result<()> {
        if pos <= self.len {
            Ok(())
        } else {
            Err(BufferError::IndexOutOfBound)
        }
    }

    /// Byte offset of the rune at `pos`; `pos == len` maps to the end.
    fn byte_at(&self, pos: usize) -> usize {
        // The cursor has been validated, so the mapping cannot fail.
        rune::byte_offset(&self.text, pos).unwrap_or(self.text.len())
    }
}

impl Buffer for LinearBuffer {
    fn length(&self) -> usize {
        self.len
    }

    fn bytes(&self) -> Vec<u8> {
        self.text.clone()
    }

    fn runes(&self) -> Result<Vec<char>> {
        rune::bytes_to_runes(&self.text)
    }

    fn rune_at(&self, pos: usize) -> Result<char> {
        if pos >= self.len {
            return Err(BufferError::IndexOutOfBound);
        }
        let at = self.byte_at(pos);
        rune::decode_rune(&self.text[at..]).map(|(ch, _)| ch)
    }

    fn slice(&self, pos: usize, n: usize) -> Result<Self> {
        self.check_cursor(pos)?;
        if pos + n > self.len {
            return Err(BufferError::IndexOutOfBound);
        }
        let span = rune::byte_span(&self.text, pos, n)?;
        Ok(Self::from_parts(self.text[span].to_vec()))
    }

    fn concat(&self, other: &Self) -> Self {
        let mut text = Vec::with_capacity(self.text.len() + other.text.len());
        text.extend_from_slice(&self.text);
        text.extend_from_slice(&other.text);
        Self {
            text,
            len: self.len + other.len,
        }
    }

    fn split(&self, pos: usize) -> Result<(Self, Self)> {
        self.check_cursor(pos)?;
        let at = self.byte_at(pos);
        Ok((
            Self::from_parts(self.text[..at].to_vec()),
            Self::from_parts(self.text[at..].to_vec()),
        ))
    }

    fn insert(&self, pos: usize, text: &str) -> Result<Self> {
        self.check_cursor(pos)?;
        if text.is_empty() {
            return Ok(self.clone());
        }
        let at = self.byte_at(pos);
        let mut out = Vec::with_capacity(self.text.len() + text.len());
        out.extend_from_slice(&self.text[..at]);
        out.extend_from_slice(text.as_bytes());
        out.extend_from_slice(&self.text[at..]);
        Ok(Self {
            text: out,
            len: self.len + text.chars().count(),
        })
    }

    fn delete(&self, pos: usize, n: usize) -> Result<Self> {
        if n == 0 {
            return Ok(self.clone());
        }
        if pos >= self.len || pos + n > self.len {
            return Err(BufferError::IndexOutOfBound);
        }
        let span = rune::byte_span(&self.text, pos, n)?;
        let mut out = Vec::with_capacity(self.text.len() - span.len());
        out.extend_from_slice(&self.text[..span.start]);
        out.extend_from_slice(&self.text[span.end..]);
        Ok(Self {
            text: out,
            len: self.len - n,
        })
    }

    fn insert_in(&mut self, pos: usize, text: &str) -> Result<()> {
        self.check_cursor(pos)?;
        if text.is_empty() {
            return Ok(());
        }
        let at = self.byte_at(pos);
        self.text.splice(at..at, text.bytes());
        self.len += text.chars().count();
        Ok(())
    }

    fn delete_in(&mut self, pos: usize, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        if pos >= self.len || pos + n > self.len {
            return Err(BufferError::IndexOutOfBound);
        }
        let span = rune::byte_span(&self.text, pos, n)?;
        self.text.drain(span);
        self.len -= n;
        Ok(())
    }

    fn stream_from(&self, pos: usize) -> Box<dyn RuneReader + '_> {
        Box::new(SliceStream::new(&self.text, self.byte_at(pos.min(self.len)), None))
    }

    fn stream_count(&self, pos: usize, count: usize) -> Box<dyn RuneReader + '_> {
        Box::new(SliceStream::new(
            &self.text,
            self.byte_at(pos.min(self.len)),
            Some(count),
        ))
    }

    fn back_stream_from(&self, pos: usize) -> Box<dyn RuneReader + '_> {
        Box::new(SliceBackStream::new(
            &self.text,
            self.byte_at(pos.min(self.len)),
            None,
        ))
    }

    fn back_stream_count(&self, pos: usize, count: usize) -> Box<dyn RuneReader + '_> {
        Box::new(SliceBackStream::new(
            &self.text,
            self.byte_at(pos.min(self.len)),
            Some(count),
        ))
    }

    fn stats(&self) -> Statistics {
        let mut stats = Statistics::default();
        if !self.text.is_empty() {
            stats.visit_leaf(1, self.text.len(), self.text.capacity());
        }
        stats
    }
}
