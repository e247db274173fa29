//! Rune streams: lazy forward/backward readers over any buffer.
//!
//! Every reader produces one rune per step together with its decoded
//! byte size, signals end of stream by returning `None`, and stays
//! exhausted afterwards. `close` is permitted at any time and is
//! idempotent; reads after close are defined to signal end of stream.
//!
//! Linear buffers are served by plain cursors over the byte image
//! ([`SliceStream`], [`SliceBackStream`]). Rope streams pull leaves from
//! a dedicated walker thread ([`RopeStream`], [`RopeBackStream`]), so
//! the tree descent runs cooperatively while the consumer decodes.

use super::rope::Node;
use super::walker::{Direction, LeafWalker};
use crate::rune::{self, MAX_RUNE_WIDTH};
use std::sync::Arc;

/// A finite, non-restartable source of `(rune, byte_size)` pairs.
pub trait RuneReader {
    /// Produce the next rune, or `None` at end of stream.
    fn read_rune(&mut self) -> Option<(char, usize)>;

    /// Release the reader's resources. Idempotent; subsequent reads
    /// signal end of stream.
    fn close(&mut self);
}

impl<'a> Iterator for Box<dyn RuneReader + 'a> {
    type Item = (char, usize);

    fn next(&mut self) -> Option<Self::Item> {
        self.as_mut().read_rune()
    }
}

/// Forward reader over a borrowed byte slice.
#[derive(Debug)]
pub struct SliceStream<'a> {
    text: &'a [u8],
    at: usize,
    remaining: Option<usize>,
    closed: bool,
}

impl<'a> SliceStream<'a> {
    /// Reader over `text` starting at byte offset `at`, optionally
    /// bounded to `remaining` runes.
    pub(crate) fn new(text: &'a [u8], at: usize, remaining: Option<usize>) -> Self {
        Self {
            text,
            at,
            remaining,
            closed: false,
        }
    }
}

impl RuneReader for SliceStream<'_> {
    fn read_rune(&mut self) -> Option<(char, usize)> {
        if self.closed || self.at >= self.text.len() || self.remaining == Some(0) {
            return None;
        }
        let (ch, size) = rune::decode_rune(&self.text[self.at..]).ok()?;
        self.at += size;
        if let Some(left) = self.remaining.as_mut() {
            *left -= 1;
        }
        Some((ch, size))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

impl Iterator for SliceStream<'_> {
    type Item = (char, usize);

    fn next(&mut self) -> Option<Self::Item> {
        self.read_rune()
    }
}

/// Backward reader over a borrowed byte slice.
///
/// Steps by locating the last sequence start inside a trailing window of
/// at most [`MAX_RUNE_WIDTH`] bytes.
#[derive(Debug)]
pub struct SliceBackStream<'a> {
    text: &'a [u8],
    at: usize,
    remaining: Option<usize>,
    closed: bool,
}

impl<'a> SliceBackStream<'a> {
    /// Reader emitting the runes before byte offset `at` in reverse,
    /// optionally bounded to `remaining` runes.
    pub(crate) fn new(text: &'a [u8], at: usize, remaining: Option<usize>) -> Self {
        Self {
            text,
            at,
            remaining,
            closed: false,
        }
    }
}

impl RuneReader for SliceBackStream<'_> {
    fn read_rune(&mut self) -> Option<(char, usize)> {
        if self.closed || self.at == 0 || self.remaining == Some(0) {
            return None;
        }
        let floor = self.at.saturating_sub(MAX_RUNE_WIDTH);
        let start = floor + rune::rune_start(&self.text[floor..self.at], true).ok()?;
        let (ch, size) = rune::decode_rune(&self.text[start..]).ok()?;
        self.at = start;
        if let Some(left) = self.remaining.as_mut() {
            *left -= 1;
        }
        Some((ch, size))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

impl Iterator for SliceBackStream<'_> {
    type Item = (char, usize);

    fn next(&mut self) -> Option<Self::Item> {
        self.read_rune()
    }
}

/// Forward reader over a rope, fed by a leaf walker.
pub struct RopeStream {
    walker: LeafWalker,
    /// Current leaf and the byte offset of the next rune inside it.
    leaf: Option<(Arc<Node>, usize)>,
    remaining: Option<usize>,
    closed: bool,
}

impl RopeStream {
    pub(crate) fn new(root: Arc<Node>, pos: usize, remaining: Option<usize>) -> Self {
        let mut walker = LeafWalker::spawn(root, pos, Direction::Forward);
        let leaf = Self::fetch(&mut walker);
        Self {
            walker,
            leaf,
            remaining,
            closed: false,
        }
    }

    fn fetch(walker: &mut LeafWalker) -> Option<(Arc<Node>, usize)> {
        let (off, node) = walker.next_leaf()?;
        let at = match &*node {
            Node::Leaf(leaf) => rune::byte_offset(&leaf.text, off).ok()?,
            Node::Internal(_) => return None,
        };
        Some((node, at))
    }
}

impl RuneReader for RopeStream {
    fn read_rune(&mut self) -> Option<(char, usize)> {
        if self.closed || self.remaining == Some(0) {
            self.close();
            return None;
        }
        let (node, at) = self.leaf.take()?;
        let decoded = match &*node {
            Node::Leaf(leaf) => rune::decode_rune(&leaf.text[at..]).ok(),
            Node::Internal(_) => None,
        };
        let Some((ch, size)) = decoded else {
            self.close();
            return None;
        };
        let text_len = match &*node {
            Node::Leaf(leaf) => leaf.text.len(),
            Node::Internal(_) => 0,
        };
        self.leaf = if at + size < text_len {
            Some((node, at + size))
        } else {
            Self::fetch(&mut self.walker)
        };
        if let Some(left) = self.remaining.as_mut() {
            *left -= 1;
        }
        Some((ch, size))
    }

    fn close(&mut self) {
        self.closed = true;
        self.leaf = None;
        self.walker.close();
    }
}

impl Iterator for RopeStream {
    type Item = (char, usize);

    fn next(&mut self) -> Option<Self::Item> {
        self.read_rune()
    }
}

/// Backward reader over a rope, fed by a reverse leaf walker.
pub struct RopeBackStream {
    walker: LeafWalker,
    /// Current leaf and the byte offset one past the next rune to emit.
    leaf: Option<(Arc<Node>, usize)>,
    remaining: Option<usize>,
    closed: bool,
}

impl RopeBackStream {
    pub(crate) fn new(root: Arc<Node>, pos: usize, remaining: Option<usize>) -> Self {
        let mut walker = LeafWalker::spawn(root, pos, Direction::Backward);
        let leaf = Self::fetch(&mut walker);
        Self {
            walker,
            leaf,
            remaining,
            closed: false,
        }
    }

    fn fetch(walker: &mut LeafWalker) -> Option<(Arc<Node>, usize)> {
        let (off, node) = walker.next_leaf()?;
        let at = match &*node {
            Node::Leaf(leaf) => rune::byte_offset(&leaf.text, off).ok()?,
            Node::Internal(_) => return None,
        };
        Some((node, at))
    }
}

impl RuneReader for RopeBackStream {
    fn read_rune(&mut self) -> Option<(char, usize)> {
        if self.closed || self.remaining == Some(0) {
            self.close();
            return None;
        }
        let (node, at) = self.leaf.take()?;
        let decoded = match &*node {
            Node::Leaf(leaf) if at > 0 => {
                let floor = at.saturating_sub(MAX_RUNE_WIDTH);
                rune::rune_start(&leaf.text[floor..at], true)
                    .and_then(|start| {
                        let start = floor + start;
                        rune::decode_rune(&leaf.text[start..]).map(|(ch, size)| (ch, size, start))
                    })
                    .ok()
            }
            _ => None,
        };
        let Some((ch, size, start)) = decoded else {
            self.close();
            return None;
        };
        self.leaf = if start > 0 {
            Some((node, start))
        } else {
            Self::fetch(&mut self.walker)
        };
        if let Some(left) = self.remaining.as_mut() {
            *left -= 1;
        }
        Some((ch, size))
    }

    fn close(&mut self) {
        self.closed = true;
        self.leaf = None;
        self.walker.close();
    }
}

impl Iterator for RopeBackStream {
    type Item = (char, usize);

    fn next(&mut self) -> Option<Self::Item> {
        self.read_rune()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, LinearBuffer, RopeBuffer};
    use crate::testutil::CHINESE;

    #[test]
    fn test_slice_stream_reports_sizes() {
        let text = "a道b".as_bytes();
        let mut stream = SliceStream::new(text, 0, None);
        assert_eq!(stream.read_rune(), Some(('a', 1)));
        assert_eq!(stream.read_rune(), Some(('道', 3)));
        assert_eq!(stream.read_rune(), Some(('b', 1)));
        assert_eq!(stream.read_rune(), None);
        assert_eq!(stream.read_rune(), None);
    }

    #[test]
    fn test_slice_back_stream_reports_sizes() {
        let text = "a道b".as_bytes();
        let mut stream = SliceBackStream::new(text, text.len(), None);
        assert_eq!(stream.read_rune(), Some(('b', 1)));
        assert_eq!(stream.read_rune(), Some(('道', 3)));
        assert_eq!(stream.read_rune(), Some(('a', 1)));
        assert_eq!(stream.read_rune(), None);
    }

    #[test]
    fn test_close_makes_reads_eof() {
        let linear = LinearBuffer::new(CHINESE.as_bytes()).unwrap();
        let mut stream = linear.stream_from(0);
        assert!(stream.read_rune().is_some());
        stream.close();
        stream.close();
        assert!(stream.read_rune().is_none());

        let rope = RopeBuffer::new(CHINESE.as_bytes(), 8).unwrap();
        let mut stream = rope.stream_from(0);
        assert!(stream.read_rune().is_some());
        stream.close();
        stream.close();
        assert!(stream.read_rune().is_none());
    }

    #[test]
    fn test_streams_agree_across_backends() {
        let linear = LinearBuffer::new(CHINESE.as_bytes()).unwrap();
        let rope = RopeBuffer::new(CHINESE.as_bytes(), 8).unwrap();
        for pos in [0, 1, 25, 50, 51] {
            let from_linear: Vec<_> = linear.stream_from(pos).collect();
            let from_rope: Vec<_> = rope.stream_from(pos).collect();
            assert_eq!(from_linear, from_rope, "forward from {pos}");

            let back_linear: Vec<_> = linear.back_stream_from(pos).collect();
            let back_rope: Vec<_> = rope.back_stream_from(pos).collect();
            assert_eq!(back_linear, back_rope, "backward from {pos}");
        }
    }

    #[test]
    fn test_bounded_streams_stop_at_count() {
        let rope = RopeBuffer::new(CHINESE.as_bytes(), 8).unwrap();
        assert_eq!(rope.stream_count(0, 7).count(), 7);
        assert_eq!(rope.stream_count(48, 100).count(), 3);
        assert_eq!(rope.stream_count(5, 0).count(), 0);
        assert_eq!(rope.back_stream_count(10, 4).count(), 4);
        assert_eq!(rope.back_stream_count(2, 100).count(), 2);
    }

    #[test]
    fn test_rope_stream_crosses_leaves_in_order() {
        let rope = RopeBuffer::new(CHINESE.as_bytes(), 8).unwrap();
        let forward: String = rope.stream_from(0).map(|(ch, _)| ch).collect();
        assert_eq!(forward, CHINESE);
        let backward: String = rope.back_stream_from(51).map(|(ch, _)| ch).collect();
        let expected: String = CHINESE.chars().rev().collect();
        assert_eq!(backward, expected);
    }
}
