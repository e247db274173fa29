//! Line index: a lazily built cache of line spans around the cursor.
//!
//! The index holds sorted `(start, end)` rune-offset pairs. `start ==
//! end` denotes an empty line; `end` excludes the newline pattern, so
//! consecutive lines satisfy `next.start == end + newline_len`; the
//! final line of a buffer ends at `length + 1`, marking the missing
//! trailing newline. An empty buffer indexes as `[(0, 0)]`.
//!
//! Blocks of consecutive lines are discovered with the forward and
//! backward rune streams and merged into the index; the whole cache is
//! dropped on any edit that changes the byte image.

use crate::buffer::{Buffer, TextBuffer};

/// Sorted cache of line spans, possibly covering several disjoint
/// regions of the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineIndex {
    spans: Vec<(usize, usize)>,
    /// Rune length of the newline pattern separating adjacent lines.
    gap: usize,
}

impl LineIndex {
    /// An empty index for a single-rune newline.
    pub fn new() -> Self {
        Self::with_gap(1)
    }

    /// An empty index for a newline pattern of `gap` runes.
    pub fn with_gap(gap: usize) -> Self {
        Self {
            spans: Vec::new(),
            gap: gap.max(1),
        }
    }

    /// The cached spans, sorted by start offset.
    pub fn spans(&self) -> &[(usize, usize)] {
        &self.spans
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Drop every cached span. Called on any content edit.
    pub fn clear(&mut self) {
        self.spans.clear();
    }

    /// Merge a contiguous, sorted block of line spans into the index.
    /// Cached spans overlapping the block's range are replaced by the
    /// block's version, so merging overlapping blocks of the same line
    /// structure is commutative.
    pub fn merge_block(&mut self, block: &[(usize, usize)]) {
        let (Some(&(lo, _)), Some(&(_, hi))) = (block.first(), block.last()) else {
            return;
        };
        self.spans.retain(|&(start, end)| end < lo || start > hi);
        let at = self.spans.partition_point(|&(start, _)| start < lo);
        self.spans.splice(at..at, block.iter().copied());
    }

    /// Index of the cached line containing `cursor`, if any.
    fn index_of(&self, cursor: usize) -> Option<usize> {
        self.spans
            .iter()
            .position(|&(start, end)| start <= cursor && cursor <= end)
    }

    /// Serve `2 * width + 1` consecutive lines around `cursor` from the
    /// cache, or `None` when the cached run is too small.
    pub fn around(&self, cursor: usize, width: usize) -> Option<Vec<(usize, usize)>> {
        let at = self.index_of(cursor)?;
        let lo = at.checked_sub(width)?;
        let hi = at + width;
        if hi >= self.spans.len() {
            return None;
        }
        for k in lo..hi {
            if self.spans[k + 1].0 != self.spans[k].1 + self.gap {
                return None;
            }
        }
        Some(self.spans[lo..=hi].to_vec())
    }
}

/// Discover the block of up to `2 * width + 1` consecutive line spans
/// around `cursor`, scanning with the buffer's rune streams.
pub(crate) fn build_block(
    buffer: &TextBuffer,
    newline: &[char],
    cursor: usize,
    width: usize,
) -> Vec<(usize, usize)> {
    let len = buffer.length();
    if len == 0 {
        return vec![(0, 0)];
    }
    let m = newline.len();
    if m == 0 {
        return vec![(0, len + 1)];
    }

    // Line starts at and above the cursor line, nearest first.
    let mut starts: Vec<usize> = Vec::with_capacity(width + 1);
    {
        let mut stream = buffer.back_stream_from(cursor.min(len));
        let mut pos = cursor.min(len);
        let mut matched = 0;
        while starts.len() < width + 1 {
            let Some((ch, _)) = stream.read_rune() else {
                starts.push(0);
                break;
            };
            pos -= 1;
            if ch == newline[m - 1 - matched] {
                matched += 1;
                if matched == m {
                    starts.push(pos + m);
                    matched = 0;
                }
            } else if ch == newline[m - 1] {
                matched = 1;
            } else {
                matched = 0;
            }
        }
    }

    // Line ends at and below the cursor line, nearest first. The end of
    // the last line is `len + 1`.
    let mut ends: Vec<usize> = Vec::with_capacity(width + 1);
    {
        let mut stream = buffer.stream_from(cursor.min(len));
        let mut pos = cursor.min(len);
        let mut matched = 0;
        while ends.len() < width + 1 {
            let Some((ch, _)) = stream.read_rune() else {
                ends.push(len + 1);
                break;
            };
            if ch == newline[matched] {
                matched += 1;
                if matched == m {
                    ends.push(pos + 1 - m);
                    matched = 0;
                }
            } else if ch == newline[0] {
                matched = 1;
            } else {
                matched = 0;
            }
            pos += 1;
        }
    }

    let mut block = Vec::with_capacity(starts.len() + ends.len());
    for k in (1..starts.len()).rev() {
        block.push((starts[k], starts[k - 1] - m));
    }
    let mut line_start = starts.first().copied().unwrap_or(0);
    for &end in &ends {
        block.push((line_start, end));
        if end > len {
            break;
        }
        line_start = end + m;
    }
    block
}
