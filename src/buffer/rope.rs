//! Rope buffer: a persistent balanced tree of byte leaves.
//!
//! Nodes are shared through `Arc`, so every persistent operation returns
//! a fresh root while reusing untouched subtrees; any previously obtained
//! root keeps denoting its original content. The in-place variants use
//! copy-on-write at shared nodes and rewrite only the affected spine.
//!
//! ```text
//!            (weight=5, len=11)
//!            /              \
//!      leaf "hello"     leaf " world"
//! ```
//!
//! Weights count *runes*, never bytes; leaves store UTF-8 bytes and may
//! split only on a code-point boundary.

use super::stream::{RopeBackStream, RopeStream, RuneReader};
use super::{Buffer, Statistics};
use crate::error::{BufferError, Result};
use crate::rune;
use std::sync::Arc;

/// Default leaf capacity in bytes. A tuning knob, not a correctness
/// parameter: every contract property holds for any capacity of at least
/// [`rune::MAX_RUNE_WIDTH`].
pub const ROPE_CAPACITY: usize = 64;

/// A node of the rope tree.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    /// Owns a contiguous, well-formed UTF-8 byte slice.
    Leaf(Leaf),
    /// Holds the rune length of its left subtree as `weight`.
    Internal(Internal),
}

#[derive(Debug, Clone)]
pub(crate) struct Leaf {
    pub text: Vec<u8>,
    /// Rune count of `text`.
    pub len: usize,
    /// Split threshold in bytes.
    pub capacity: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct Internal {
    /// Rune length of the left subtree.
    pub weight: usize,
    /// Total rune length.
    pub len: usize,
    pub capacity: usize,
    pub left: Arc<Node>,
    pub right: Arc<Node>,
}

impl Node {
    pub(crate) const fn len(&self) -> usize {
        match self {
            Self::Leaf(leaf) => leaf.len,
            Self::Internal(node) => node.len,
        }
    }

    pub(crate) const fn capacity(&self) -> usize {
        match self {
            Self::Leaf(leaf) => leaf.capacity,
            Self::Internal(node) => node.capacity,
        }
    }
}

fn leaf_node(text: &[u8], capacity: usize) -> Arc<Node> {
    let mut owned = Vec::with_capacity(text.len());
    owned.extend_from_slice(text);
    Arc::new(Node::Leaf(Leaf {
        len: rune::rune_count(&owned),
        text: owned,
        capacity,
    }))
}

fn internal_node(left: Arc<Node>, right: Arc<Node>) -> Arc<Node> {
    Arc::new(Node::Internal(Internal {
        weight: left.len(),
        len: left.len() + right.len(),
        capacity: left.capacity(),
        left,
        right,
    }))
}

/// Join two optional subtrees; `None` is the identity.
fn concat_nodes(left: Option<Arc<Node>>, right: Option<Arc<Node>>) -> Option<Arc<Node>> {
    match (left, right) {
        (None, side) | (side, None) => side,
        (Some(left), Some(right)) => Some(internal_node(left, right)),
    }
}

/// Build a perfect tree over `text`: every root-to-leaf path has the
/// same length, so a freshly built tree reports zero depth deviance.
///
/// Starts from the smallest power-of-two leaf count that could bring
/// every leaf under `capacity`, then re-checks the actual leaves: the
/// boundary adjustment in [`split_point`] can push a cut forward and
/// leave a leaf over `capacity`, in which case another level is added
/// until every leaf fits. The one exception is a single rune wider than
/// `capacity` (possible only below [`rune::MAX_RUNE_WIDTH`]), which is
/// kept whole rather than torn apart.
fn build_tree(text: &[u8], capacity: usize) -> Result<Arc<Node>> {
    if text.len() <= capacity {
        return Ok(leaf_node(text, capacity));
    }
    let leaves = text.len().div_ceil(capacity).next_power_of_two();
    let mut levels = leaves.trailing_zeros();
    loop {
        let root = split_levels(text, levels, capacity)?;
        match oversized_leaf_runes(&root, capacity) {
            // A deeper split halves every oversized leaf again.
            Some(runes) if runes > 1 => levels += 1,
            // Fits, or cannot split below one code point.
            _ => return Ok(root),
        }
    }
}

fn split_levels(text: &[u8], levels: u32, capacity: usize) -> Result<Arc<Node>> {
    if levels == 0 || text.is_empty() {
        return Ok(leaf_node(text, capacity));
    }
    let mid = split_point(text)?;
    Ok(internal_node(
        split_levels(&text[..mid], levels - 1, capacity)?,
        split_levels(&text[mid..], levels - 1, capacity)?,
    ))
}

/// The byte median adjusted to a code-point boundary: forward to the
/// nearest rune start, or backward when the median landed inside the
/// final rune and no start follows it.
fn split_point(text: &[u8]) -> Result<usize> {
    let mid = text.len() / 2;
    match rune::rune_start(&text[mid..], false) {
        Ok(adjust) => Ok(mid + adjust),
        Err(_) => rune::rune_start(&text[..mid], true),
    }
}

/// Rune length of the most rune-rich leaf whose byte length exceeds
/// `capacity`, if any leaf does.
fn oversized_leaf_runes(node: &Node, capacity: usize) -> Option<usize> {
    match node {
        Node::Leaf(leaf) => (leaf.text.len() > capacity).then_some(leaf.len),
        Node::Internal(inner) => {
            let left = oversized_leaf_runes(&inner.left, capacity);
            let right = oversized_leaf_runes(&inner.right, capacity);
            left.max(right)
        }
    }
}

/// Split `node` at rune offset `pos`, sharing subtrees with the original
/// wherever the cut does not pass through them.
fn split_node(node: &Arc<Node>, pos: usize) -> Result<(Option<Arc<Node>>, Option<Arc<Node>>)> {
    match &**node {
        Node::Leaf(leaf) => {
            if pos == 0 {
                Ok((None, Some(node.clone())))
            } else if pos >= leaf.len {
                Ok((Some(node.clone()), None))
            } else {
                let at = rune::byte_offset(&leaf.text, pos)?;
                Ok((
                    Some(leaf_node(&leaf.text[..at], leaf.capacity)),
                    Some(leaf_node(&leaf.text[at..], leaf.capacity)),
                ))
            }
        }
        Node::Internal(inner) => {
            if pos == inner.weight {
                Ok((Some(inner.left.clone()), Some(inner.right.clone())))
            } else if pos > inner.weight {
                let (mid, right) = split_node(&inner.right, pos - inner.weight)?;
                Ok((concat_nodes(Some(inner.left.clone()), mid), right))
            } else {
                let (left, mid) = split_node(&inner.left, pos)?;
                Ok((left, concat_nodes(mid, Some(inner.right.clone()))))
            }
        }
    }
}

fn collect_bytes(node: &Node, acc: &mut Vec<u8>) {
    match node {
        Node::Leaf(leaf) => acc.extend_from_slice(&leaf.text),
        Node::Internal(inner) => {
            collect_bytes(&inner.left, acc);
            collect_bytes(&inner.right, acc);
        }
    }
}

/// Gather the byte image of `n` runes starting at rune offset `pos`,
/// splitting the request at `weight` where it straddles both subtrees.
fn gather(node: &Node, pos: usize, n: usize, acc: &mut Vec<u8>) -> Result<()> {
    if n == 0 {
        return Ok(());
    }
    match node {
        Node::Leaf(leaf) => {
            let take = n.min(leaf.len - pos);
            if pos == 0 && take == leaf.len {
                acc.extend_from_slice(&leaf.text);
            } else {
                let span = rune::byte_span(&leaf.text, pos, take)?;
                acc.extend_from_slice(&leaf.text[span]);
            }
            Ok(())
        }
        Node::Internal(inner) => {
            if pos >= inner.weight {
                gather(&inner.right, pos - inner.weight, n, acc)
            } else if pos + n <= inner.weight {
                gather(&inner.left, pos, n, acc)
            } else {
                let left_n = inner.weight - pos;
                gather(&inner.left, pos, left_n, acc)?;
                gather(&inner.right, 0, n - left_n, acc)
            }
        }
    }
}

fn rune_at_node(node: &Node, pos: usize) -> Result<char> {
    match node {
        Node::Leaf(leaf) => {
            let at = rune::byte_offset(&leaf.text, pos)?;
            rune::decode_rune(&leaf.text[at..]).map(|(ch, _)| ch)
        }
        Node::Internal(inner) => {
            if pos < inner.weight {
                rune_at_node(&inner.left, pos)
            } else {
                rune_at_node(&inner.right, pos - inner.weight)
            }
        }
    }
}

fn insert_in_node(node: &mut Arc<Node>, pos: usize, text: &str, count: usize) -> Result<()> {
    let oversized = match Arc::make_mut(node) {
        Node::Leaf(leaf) => {
            let at = rune::byte_offset(&leaf.text, pos)?;
            leaf.text.splice(at..at, text.bytes());
            leaf.len += count;
            leaf.text.len() > leaf.capacity
        }
        Node::Internal(inner) => {
            if pos >= inner.weight {
                insert_in_node(&mut inner.right, pos - inner.weight, text, count)?;
            } else {
                insert_in_node(&mut inner.left, pos, text, count)?;
                inner.weight += count;
            }
            inner.len += count;
            false
        }
    };
    if oversized {
        let rebuilt = match &**node {
            Node::Leaf(leaf) => Some(build_tree(&leaf.text, leaf.capacity)?),
            Node::Internal(_) => None,
        };
        if let Some(rebuilt) = rebuilt {
            *node = rebuilt;
        }
    }
    Ok(())
}

fn delete_in_node(node: &mut Arc<Node>, pos: usize, n: usize) -> Result<()> {
    if n == 0 {
        return Ok(());
    }
    match Arc::make_mut(node) {
        Node::Leaf(leaf) => {
            let span = rune::byte_span(&leaf.text, pos, n)?;
            leaf.text.drain(span);
            leaf.len -= n;
        }
        Node::Internal(inner) => {
            if pos >= inner.weight {
                delete_in_node(&mut inner.right, pos - inner.weight, n)?;
            } else if pos + n <= inner.weight {
                delete_in_node(&mut inner.left, pos, n)?;
                inner.weight -= n;
            } else {
                // The range straddles both subtrees.
                let left_n = inner.weight - pos;
                delete_in_node(&mut inner.left, pos, left_n)?;
                delete_in_node(&mut inner.right, 0, n - left_n)?;
                inner.weight -= left_n;
            }
            inner.len -= n;
        }
    }
    Ok(())
}

/// Post-order walk over the leaves holding content at or after rune
/// offset `pos`. Reports the starting rune offset inside each leaf: the
/// descent offset for the first, `0` for the rest. The visitor returns
/// `false` to stop the walk.
pub(crate) fn walk<F>(node: &Arc<Node>, pos: usize, visit: &mut F) -> bool
where
    F: FnMut(usize, Arc<Node>) -> bool,
{
    match &**node {
        Node::Leaf(leaf) => {
            if pos < leaf.len {
                visit(pos, node.clone())
            } else {
                true
            }
        }
        Node::Internal(inner) => {
            if pos >= inner.weight {
                walk(&inner.right, pos - inner.weight, visit)
            } else {
                walk(&inner.left, pos, visit) && walk(&inner.right, 0, visit)
            }
        }
    }
}

/// Reverse post-order walk over the leaves holding content before rune
/// offset `pos`. Reports the ending rune offset inside each leaf: the
/// descent offset for the first, the leaf length for the rest.
pub(crate) fn back_walk<F>(node: &Arc<Node>, pos: usize, visit: &mut F) -> bool
where
    F: FnMut(usize, Arc<Node>) -> bool,
{
    match &**node {
        Node::Leaf(leaf) => {
            if pos > 0 {
                visit(pos.min(leaf.len), node.clone())
            } else {
                true
            }
        }
        Node::Internal(inner) => {
            if pos > inner.weight {
                back_walk(&inner.right, pos - inner.weight, visit)
                    && back_walk(&inner.left, inner.weight, visit)
            } else {
                back_walk(&inner.left, pos, visit)
            }
        }
    }
}

fn stats_node(node: &Node, level: usize, stats: &mut Statistics) {
    match node {
        Node::Leaf(leaf) => stats.visit_leaf(level, leaf.text.len(), leaf.text.capacity()),
        Node::Internal(inner) => {
            stats.visit_node();
            stats_node(&inner.left, level + 1, stats);
            stats_node(&inner.right, level + 1, stats);
        }
    }
}

/// A persistent rope over UTF-8 text.
///
/// Cloning is O(1) and shares the whole tree; persistent edits allocate
/// `O(depth)` fresh internal nodes.
#[derive(Debug, Clone)]
pub struct RopeBuffer {
    root: Arc<Node>,
}

impl RopeBuffer {
    /// Build a rope from `text`, splitting leaves longer than `capacity`
    /// bytes at rune boundaries. The builder produces a perfect tree of
    /// minimum depth.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidEncoding`] on malformed input.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(text: &[u8], capacity: usize) -> Result<Self> {
        assert!(capacity > 0, "leaf capacity must be non-zero");
        std::str::from_utf8(text).map_err(|_| BufferError::InvalidEncoding)?;
        Ok(Self {
            root: build_tree(text, capacity)?,
        })
    }

    /// An empty rope with the given leaf capacity.
    pub fn empty(capacity: usize) -> Self {
        Self {
            root: leaf_node(&[], capacity),
        }
    }

    /// Wrap well-formed bytes as a single leaf, without splitting.
    pub(crate) fn leaf(text: &[u8], capacity: usize) -> Self {
        Self {
            root: leaf_node(text, capacity),
        }
    }

    /// The leaf split threshold this rope was built with.
    pub fn capacity(&self) -> usize {
        self.root.capacity()
    }

    pub(crate) fn root(&self) -> &Arc<Node> {
        &self.root
    }

    /// Forward rune reader bounded by the absolute rune offset `end`:
    /// exhausted once the cursor reaches `end`. `end` at or before `pos`
    /// yields an exhausted reader; `end` past the content clamps to the
    /// length.
    pub fn stream_till(&self, pos: usize, end: usize) -> Box<dyn RuneReader> {
        let count = end.min(self.length()).saturating_sub(pos);
        Box::new(RopeStream::new(self.root.clone(), pos, Some(count)))
    }

    /// Backward rune reader bounded by the absolute rune offset `end`:
    /// emits the runes at `pos - 1` down to `end`.
    pub fn back_stream_till(&self, pos: usize, end: usize) -> Box<dyn RuneReader> {
        let count = pos.min(self.length()).saturating_sub(end);
        Box::new(RopeBackStream::new(self.root.clone(), pos, Some(count)))
    }

    fn from_parts(root: Option<Arc<Node>>, capacity: usize) -> Self {
        root.map_or_else(|| Self::empty(capacity), |root| Self { root })
    }
}

impl Buffer for RopeBuffer {
    fn length(&self) -> usize {
        self.root.len()
    }

    fn bytes(&self) -> Vec<u8> {
        let mut acc = Vec::with_capacity(self.root.len());
        collect_bytes(&self.root, &mut acc);
        acc
    }

    fn runes(&self) -> Result<Vec<char>> {
        rune::bytes_to_runes(&self.bytes())
    }

    fn rune_at(&self, pos: usize) -> Result<char> {
        if pos >= self.length() {
            return Err(BufferError::IndexOutOfBound);
        }
        rune_at_node(&self.root, pos)
    }

    fn slice(&self, pos: usize, n: usize) -> Result<Self> {
        if pos > self.length() || pos + n > self.length() {
            return Err(BufferError::IndexOutOfBound);
        }
        let mut acc = Vec::with_capacity(n);
        gather(&self.root, pos, n, &mut acc)?;
        Self::new(&acc, self.capacity())
    }

    fn concat(&self, other: &Self) -> Self {
        if self.length() == 0 {
            return other.clone();
        }
        if other.length() == 0 {
            return self.clone();
        }
        Self {
            root: internal_node(self.root.clone(), other.root.clone()),
        }
    }

    fn split(&self, pos: usize) -> Result<(Self, Self)> {
        if pos > self.length() {
            return Err(BufferError::IndexOutOfBound);
        }
        let (left, right) = split_node(&self.root, pos)?;
        Ok((
            Self::from_parts(left, self.capacity()),
            Self::from_parts(right, self.capacity()),
        ))
    }

    fn insert(&self, pos: usize, text: &str) -> Result<Self> {
        if pos > self.length() {
            return Err(BufferError::IndexOutOfBound);
        }
        if text.is_empty() {
            return Ok(self.clone());
        }
        let middle = build_tree(text.as_bytes(), self.capacity())?;
        let (left, right) = split_node(&self.root, pos)?;
        let root = concat_nodes(concat_nodes(left, Some(middle)), right);
        Ok(Self::from_parts(root, self.capacity()))
    }

    fn delete(&self, pos: usize, n: usize) -> Result<Self> {
        if n == 0 {
            return Ok(self.clone());
        }
        if pos >= self.length() || pos + n > self.length() {
            return Err(BufferError::IndexOutOfBound);
        }
        if pos == 0 && n == self.length() {
            return Ok(Self::empty(self.capacity()));
        }
        let (left, rest) = split_node(&self.root, pos)?;
        let rest = rest.ok_or(BufferError::IndexOutOfBound)?;
        let (_, right) = split_node(&rest, n)?;
        Ok(Self::from_parts(concat_nodes(left, right), self.capacity()))
    }

    fn insert_in(&mut self, pos: usize, text: &str) -> Result<()> {
        if pos > self.length() {
            return Err(BufferError::IndexOutOfBound);
        }
        if text.is_empty() {
            return Ok(());
        }
        if self.length() == 0 {
            *self = Self::new(text.as_bytes(), self.capacity())?;
            return Ok(());
        }
        insert_in_node(&mut self.root, pos, text, text.chars().count())
    }

    fn delete_in(&mut self, pos: usize, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        if pos >= self.length() || pos + n > self.length() {
            return Err(BufferError::IndexOutOfBound);
        }
        delete_in_node(&mut self.root, pos, n)
    }

    fn stream_from(&self, pos: usize) -> Box<dyn RuneReader + '_> {
        Box::new(RopeStream::new(self.root.clone(), pos, None))
    }

    fn stream_count(&self, pos: usize, count: usize) -> Box<dyn RuneReader + '_> {
        Box::new(RopeStream::new(self.root.clone(), pos, Some(count)))
    }

    fn back_stream_from(&self, pos: usize) -> Box<dyn RuneReader + '_> {
        Box::new(RopeBackStream::new(self.root.clone(), pos, None))
    }

    fn back_stream_count(&self, pos: usize, count: usize) -> Box<dyn RuneReader + '_> {
        Box::new(RopeBackStream::new(self.root.clone(), pos, Some(count)))
    }

    fn stats(&self) -> Statistics {
        let mut stats = Statistics::default();
        stats_node(&self.root, 1, &mut stats);
        stats
    }
}
