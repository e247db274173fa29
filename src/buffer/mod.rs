//! Buffer module: rune-addressable text containers.
//!
//! This module contains:
//! - [`Buffer`]: the capability contract every storage backend satisfies
//! - [`LinearBuffer`]: a contiguous byte store, simple enough to audit by
//!   inspection and therefore the differential oracle
//! - [`RopeBuffer`]: a persistent balanced tree of byte leaves, the
//!   primary implementation
//! - [`TextBuffer`]: a tagged union over the two backends
//! - [`Statistics`]: a one-pass snapshot of a rope's shape
//!
//! All positional arguments across the contract are *rune* offsets; byte
//! offsets never cross the module boundary except as decoded-size reports
//! in streams.

mod linear;
mod rope;
pub mod stream;
mod walker;

pub use linear::LinearBuffer;
pub use rope::{RopeBuffer, ROPE_CAPACITY};
pub use stream::RuneReader;

use crate::error::Result;

/// The capability set every storage backend provides.
///
/// Rune positions satisfy `0 <= pos <= length()`; operations that need a
/// valid rune *before* `pos` additionally require `pos < length()`.
///
/// `insert`, `delete`, `split`, `concat` and `slice` are persistent: the
/// receiver is observationally unchanged and the result is a new value
/// that may share structure with it. `insert_in` and `delete_in` are
/// in-place fast paths for write-heavy edits that record no history.
pub trait Buffer {
    /// Rune count of the content.
    fn length(&self) -> usize;

    /// Full UTF-8 byte image of the content.
    fn bytes(&self) -> Vec<u8>;

    /// Full rune image of the content.
    ///
    /// # Errors
    ///
    /// [`crate::BufferError::InvalidEncoding`] if the stored bytes are
    /// malformed.
    fn runes(&self) -> Result<Vec<char>>;

    /// The rune at position `pos`, `pos` in `[0, length())`.
    ///
    /// # Errors
    ///
    /// [`crate::BufferError::IndexOutOfBound`] outside that range,
    /// [`crate::BufferError::InvalidEncoding`] on a malformed sequence.
    fn rune_at(&self, pos: usize) -> Result<char>;

    /// A new buffer holding `n` runes starting at `pos`.
    ///
    /// # Errors
    ///
    /// [`crate::BufferError::IndexOutOfBound`] when `pos + n` exceeds the
    /// length.
    fn slice(&self, pos: usize, n: usize) -> Result<Self>
    where
        Self: Sized;

    /// A new buffer holding the content of `self` followed by `other`.
    ///
    /// Associative, with the empty buffer as identity.
    fn concat(&self, other: &Self) -> Self
    where
        Self: Sized;

    /// Split into `(left, right)` at `pos`; either side may be empty.
    ///
    /// Total over `[0, length()]`: `split(0)` yields `(empty, whole)` and
    /// `split(length())` yields `(whole, empty)`.
    ///
    /// # Errors
    ///
    /// [`crate::BufferError::IndexOutOfBound`] when `pos > length()`.
    fn split(&self, pos: usize) -> Result<(Self, Self)>
    where
        Self: Sized;

    /// A new buffer with `text` spliced in at `pos`.
    ///
    /// # Errors
    ///
    /// [`crate::BufferError::IndexOutOfBound`] when `pos > length()`.
    fn insert(&self, pos: usize, text: &str) -> Result<Self>
    where
        Self: Sized;

    /// A new buffer with `n` runes removed starting at `pos`.
    ///
    /// `delete(_, 0)` returns the receiver unchanged.
    ///
    /// # Errors
    ///
    /// [`crate::BufferError::IndexOutOfBound`] when `pos >= length()` or
    /// fewer than `n` runes follow `pos`.
    fn delete(&self, pos: usize, n: usize) -> Result<Self>
    where
        Self: Sized;

    /// Splice `text` in at `pos`, mutating the receiver.
    ///
    /// # Errors
    ///
    /// As [`Buffer::insert`]; the receiver is unchanged on failure.
    fn insert_in(&mut self, pos: usize, text: &str) -> Result<()>;

    /// Remove `n` runes starting at `pos`, mutating the receiver.
    ///
    /// # Errors
    ///
    /// As [`Buffer::delete`]; the receiver is unchanged on failure.
    fn delete_in(&mut self, pos: usize, n: usize) -> Result<()>;

    /// Forward rune reader starting at `pos`. A reader positioned at or
    /// past the end is immediately exhausted.
    fn stream_from(&self, pos: usize) -> Box<dyn RuneReader + '_>;

    /// Forward rune reader bounded to at most `count` runes.
    fn stream_count(&self, pos: usize, count: usize) -> Box<dyn RuneReader + '_>;

    /// Backward rune reader starting at `pos`: emits the rune at
    /// `pos - 1` first, down to `0`. A reader created at `0` is
    /// immediately exhausted.
    fn back_stream_from(&self, pos: usize) -> Box<dyn RuneReader + '_>;

    /// Backward rune reader bounded to at most `count` runes.
    fn back_stream_count(&self, pos: usize, count: usize) -> Box<dyn RuneReader + '_>;

    /// A snapshot of interesting shape statistics.
    fn stats(&self) -> Statistics;
}

/// One-pass snapshot of a rope's tree shape.
///
/// Depth statistics use Welford's incremental mean/variance, accumulated
/// as leaves are visited on a post-order walk; a freshly built perfect
/// tree reports zero [`Statistics::deviant_level`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Statistics {
    /// Number of leaf nodes.
    pub leaves: usize,
    /// Number of internal nodes.
    pub nodes: usize,
    /// Total content length across leaves, in bytes.
    pub length: usize,
    /// Total allocated leaf capacity, in bytes.
    pub capacity: usize,
    /// Shallowest occupied level (1 for any non-empty tree).
    pub min_level: usize,
    /// Deepest leaf level, root at level 1.
    pub max_level: usize,
    /// Mean leaf level.
    pub mean_level: f64,
    /// Standard deviation of leaf levels.
    pub deviant_level: f64,
    /// Welford running sum of squared deviations.
    m2: f64,
}

impl Statistics {
    /// Record an internal node.
    pub(crate) fn visit_node(&mut self) {
        self.nodes += 1;
    }

    /// Record a leaf at `level` holding `size` content bytes in a
    /// `capacity`-byte allocation.
    pub(crate) fn visit_leaf(&mut self, level: usize, size: usize, capacity: usize) {
        self.leaves += 1;
        self.length += size;
        self.capacity += capacity;
        self.min_level = 1;
        self.max_level = self.max_level.max(level);

        // Welford's update, one sample per leaf.
        #[allow(clippy::cast_precision_loss)]
        let (n, x) = (self.leaves as f64, level as f64);
        let delta = x - self.mean_level;
        self.mean_level += delta / n;
        self.m2 += delta * (x - self.mean_level);
        self.deviant_level = (self.m2 / n).sqrt();
    }
}

/// A text buffer backed by either storage backend.
///
/// The contract of [`Buffer`] is the only polymorphic surface in the
/// crate; this tagged union dispatches it without a trait object.
#[derive(Debug, Clone)]
pub enum TextBuffer {
    /// Contiguous byte store; the differential oracle.
    Linear(LinearBuffer),
    /// Persistent rope; the primary implementation.
    Rope(RopeBuffer),
}

impl TextBuffer {
    /// Build a linear buffer from UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// [`crate::BufferError::InvalidEncoding`] on malformed input.
    pub fn linear(text: &[u8]) -> Result<Self> {
        Ok(Self::Linear(LinearBuffer::new(text)?))
    }

    /// Build a rope buffer from UTF-8 bytes with the given leaf capacity.
    ///
    /// # Errors
    ///
    /// [`crate::BufferError::InvalidEncoding`] on malformed input.
    pub fn rope(text: &[u8], capacity: usize) -> Result<Self> {
        Ok(Self::Rope(RopeBuffer::new(text, capacity)?))
    }
}

impl Buffer for TextBuffer {
    fn length(&self) -> usize {
        match self {
            Self::Linear(b) => b.length(),
            Self::Rope(b) => b.length(),
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            Self::Linear(b) => b.bytes(),
            Self::Rope(b) => b.bytes(),
        }
    }

    fn runes(&self) -> Result<Vec<char>> {
        match self {
            Self::Linear(b) => b.runes(),
            Self::Rope(b) => b.runes(),
        }
    }

    fn rune_at(&self, pos: usize) -> Result<char> {
        match self {
            Self::Linear(b) => b.rune_at(pos),
            Self::Rope(b) => b.rune_at(pos),
        }
    }

    fn slice(&self, pos: usize, n: usize) -> Result<Self> {
        match self {
            Self::Linear(b) => b.slice(pos, n).map(Self::Linear),
            Self::Rope(b) => b.slice(pos, n).map(Self::Rope),
        }
    }

    fn concat(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Linear(a), Self::Linear(b)) => Self::Linear(a.concat(b)),
            (Self::Rope(a), Self::Rope(b)) => Self::Rope(a.concat(b)),
            // Mixed backends adopt the receiver's backend. The other
            // side joins as a single oversized leaf on the rope side,
            // which keeps the operation infallible.
            (Self::Linear(a), b) => {
                let mut joined = a.bytes();
                joined.extend(b.bytes());
                Self::Linear(LinearBuffer::from_parts(joined))
            }
            (Self::Rope(a), b) => Self::Rope(a.concat(&RopeBuffer::leaf(&b.bytes(), a.capacity()))),
        }
    }

    fn split(&self, pos: usize) -> Result<(Self, Self)> {
        match self {
            Self::Linear(b) => {
                let (l, r) = b.split(pos)?;
                Ok((Self::Linear(l), Self::Linear(r)))
            }
            Self::Rope(b) => {
                let (l, r) = b.split(pos)?;
                Ok((Self::Rope(l), Self::Rope(r)))
            }
        }
    }

    fn insert(&self, pos: usize, text: &str) -> Result<Self> {
        match self {
            Self::Linear(b) => b.insert(pos, text).map(Self::Linear),
            Self::Rope(b) => b.insert(pos, text).map(Self::Rope),
        }
    }

    fn delete(&self, pos: usize, n: usize) -> Result<Self> {
        match self {
            Self::Linear(b) => b.delete(pos, n).map(Self::Linear),
            Self::Rope(b) => b.delete(pos, n).map(Self::Rope),
        }
    }

    fn insert_in(&mut self, pos: usize, text: &str) -> Result<()> {
        match self {
            Self::Linear(b) => b.insert_in(pos, text),
            Self::Rope(b) => b.insert_in(pos, text),
        }
    }

    fn delete_in(&mut self, pos: usize, n: usize) -> Result<()> {
        match self {
            Self::Linear(b) => b.delete_in(pos, n),
            Self::Rope(b) => b.delete_in(pos, n),
        }
    }

    fn stream_from(&self, pos: usize) -> Box<dyn RuneReader + '_> {
        match self {
            Self::Linear(b) => b.stream_from(pos),
            Self::Rope(b) => b.stream_from(pos),
        }
    }

    fn stream_count(&self, pos: usize, count: usize) -> Box<dyn RuneReader + '_> {
        match self {
            Self::Linear(b) => b.stream_count(pos, count),
            Self::Rope(b) => b.stream_count(pos, count),
        }
    }

    fn back_stream_from(&self, pos: usize) -> Box<dyn RuneReader + '_> {
        match self {
            Self::Linear(b) => b.back_stream_from(pos),
            Self::Rope(b) => b.back_stream_from(pos),
        }
    }

    fn back_stream_count(&self, pos: usize, count: usize) -> Box<dyn RuneReader + '_> {
        match self {
            Self::Linear(b) => b.back_stream_count(pos, count),
            Self::Rope(b) => b.back_stream_count(pos, count),
        }
    }

    fn stats(&self) -> Statistics {
        match self {
            Self::Linear(b) => b.stats(),
            Self::Rope(b) => b.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_uniform_levels_have_zero_deviance() {
        let mut stats = Statistics::default();
        for _ in 0..8 {
            stats.visit_leaf(4, 16, 16);
        }
        assert_eq!(stats.leaves, 8);
        assert_eq!(stats.min_level, 1);
        assert_eq!(stats.max_level, 4);
        assert!((stats.mean_level - 4.0).abs() < f64::EPSILON);
        assert!(stats.deviant_level.abs() < f64::EPSILON);
    }

    #[test]
    fn test_statistics_mixed_levels_deviate() {
        let mut stats = Statistics::default();
        stats.visit_leaf(2, 8, 8);
        stats.visit_leaf(4, 8, 8);
        assert!((stats.mean_level - 3.0).abs() < f64::EPSILON);
        assert!(stats.deviant_level > 0.9);
    }

    #[test]
    fn test_tagged_union_dispatch_agrees() {
        let text = "hello world".as_bytes();
        let linear = TextBuffer::linear(text).unwrap();
        let rope = TextBuffer::rope(text, 4).unwrap();
        assert_eq!(linear.length(), rope.length());
        assert_eq!(linear.bytes(), rope.bytes());
        assert_eq!(
            linear.insert(5, "!").unwrap().bytes(),
            rope.insert(5, "!").unwrap().bytes()
        );
    }

    #[test]
    fn test_mixed_concat_adopts_receiver_backend() {
        let linear = TextBuffer::linear(b"left ").unwrap();
        let rope = TextBuffer::rope(b"right", 4).unwrap();
        let joined = linear.concat(&rope);
        assert!(matches!(joined, TextBuffer::Linear(_)));
        assert_eq!(joined.bytes(), b"left right");
        let joined = rope.concat(&linear);
        assert!(matches!(joined, TextBuffer::Rope(_)));
        assert_eq!(joined.bytes(), b"rightleft ");
    }
}
