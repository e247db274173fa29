//! Edit sessions: a change tree over shared buffers.
//!
//! Every recorded edit appends a child session, so history forms a tree
//! rooted at the load session. Undo walks toward the root, redo toward
//! the most recently appended child; any child in the list remains a
//! valid alternate history. Sessions own their children and weak-refer
//! to their parent, so an ancestor stays alive exactly as long as some
//! live session still references it.

pub mod lines;

use crate::buffer::{Buffer, TextBuffer};
use crate::error::{BufferError, Result};
use bitflags::bitflags;
use lines::LineIndex;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Default newline pattern for cursor motion and the line index.
pub const NEWLINE: &str = "\n";

bitflags! {
    /// Per-session state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SessionFlags: u8 {
        /// Mutating operations fail with `ReadOnlyBuffer`.
        const READ_ONLY = 1;
        /// Cursor sticks to end-of-line across vertical motion.
        const STICK_EOL = 1 << 1;
        /// Cursor sticks to beginning-of-line across vertical motion.
        const STICK_BOL = 1 << 2;
    }
}

/// Editing mode, deciding whether mutators record history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Hot-path typing: mutate the current session in place.
    Insert,
    /// Command-driven editing: record every change as a child session.
    Normal,
}

struct SessionNode {
    cursor: usize,
    buffer: TextBuffer,
    flags: SessionFlags,
    newline: String,
    parent: Weak<RefCell<SessionNode>>,
    children: Vec<Rc<RefCell<SessionNode>>>,
    lines: LineIndex,
}

/// A handle to one node of the change tree.
///
/// Cloning a session clones the handle, not the node: both handles see
/// the same cursor and buffer. Sessions are single-threaded.
#[derive(Clone)]
pub struct EditSession {
    node: Rc<RefCell<SessionNode>>,
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("node", &Rc::as_ptr(&self.node))
            .finish()
    }
}

impl PartialEq for EditSession {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl EditSession {
    /// Create a writable root session.
    pub fn new(cursor: usize, buffer: TextBuffer) -> Self {
        Self::with_parent(cursor, buffer, Weak::new(), SessionFlags::empty())
    }

    /// Create a root session marked read-only.
    pub fn read_only(cursor: usize, buffer: TextBuffer) -> Self {
        Self::with_parent(cursor, buffer, Weak::new(), SessionFlags::READ_ONLY)
    }

    fn with_parent(
        cursor: usize,
        buffer: TextBuffer,
        parent: Weak<RefCell<SessionNode>>,
        flags: SessionFlags,
    ) -> Self {
        Self {
            node: Rc::new(RefCell::new(SessionNode {
                cursor,
                buffer,
                flags,
                newline: NEWLINE.to_string(),
                parent,
                children: Vec::new(),
                lines: LineIndex::new(),
            })),
        }
    }

    /// Override the newline pattern used for cursor motion and the line
    /// index.
    pub fn configure_newline(&self, newline: &str) {
        let mut inner = self.node.borrow_mut();
        inner.newline = newline.to_string();
        inner.lines = LineIndex::with_gap(newline.chars().count());
    }

    /// Whether mutating operations are refused.
    pub fn is_read_only(&self) -> bool {
        self.node.borrow().flags.contains(SessionFlags::READ_ONLY)
    }

    /// Clear the read-only flag.
    pub fn force_write(&self) {
        self.node
            .borrow_mut()
            .flags
            .remove(SessionFlags::READ_ONLY);
    }

    /// Current cursor, a rune offset in `[0, length]`.
    pub fn cursor(&self) -> usize {
        self.node.borrow().cursor
    }

    /// Current buffer reference. Cheap for rope-backed sessions, which
    /// share the tree structurally.
    pub fn buffer(&self) -> TextBuffer {
        self.node.borrow().buffer.clone()
    }

    /// Current session flags.
    pub fn flags(&self) -> SessionFlags {
        self.node.borrow().flags
    }

    fn check_writable(&self) -> Result<()> {
        if self.is_read_only() {
            Err(BufferError::ReadOnlyBuffer)
        } else {
            Ok(())
        }
    }

    /// Replace the current buffer reference in place, recording no
    /// history. The hot path for in-place edits.
    ///
    /// # Errors
    ///
    /// [`BufferError::ReadOnlyBuffer`] when the session is read-only.
    pub fn update_change(&self, buffer: TextBuffer) -> Result<()> {
        self.check_writable()?;
        let mut inner = self.node.borrow_mut();
        inner.buffer = buffer;
        inner.lines.clear();
        Ok(())
    }

    /// Record `(cursor, buffer)` as a child session, append it to the
    /// children list and return it. The child becomes the current tip
    /// of this branch.
    ///
    /// # Errors
    ///
    /// [`BufferError::ReadOnlyBuffer`] when the session is read-only.
    pub fn append_change(&self, cursor: usize, buffer: TextBuffer) -> Result<Self> {
        self.check_writable()?;
        let child = Self::with_parent(
            cursor,
            buffer,
            Rc::downgrade(&self.node),
            SessionFlags::empty(),
        );
        self.node.borrow_mut().children.push(child.node.clone());
        Ok(child)
    }

    /// Walk `n` steps toward the root. Pure navigation: saturates at the
    /// root once at least one step was taken.
    ///
    /// # Errors
    ///
    /// [`BufferError::OldestChange`] when already at the root and
    /// `n > 0`.
    pub fn undo(&self, n: usize) -> Result<Self> {
        let mut current = self.node.clone();
        let mut left = n;
        while left > 0 {
            let Some(parent) = current.borrow().parent.upgrade() else {
                break;
            };
            current = parent;
            left -= 1;
        }
        if left == n && n > 0 {
            return Err(BufferError::OldestChange);
        }
        Ok(Self { node: current })
    }

    /// Walk `n` steps toward the most recently appended child at each
    /// level. Saturates where no child exists once at least one step was
    /// taken.
    ///
    /// # Errors
    ///
    /// [`BufferError::LatestChange`] when already at a leaf and `n > 0`.
    pub fn redo(&self, n: usize) -> Result<Self> {
        let mut current = self.node.clone();
        let mut left = n;
        while left > 0 {
            let Some(child) = current.borrow().children.last().cloned() else {
                break;
            };
            current = child;
            left -= 1;
        }
        if left == n && n > 0 {
            return Err(BufferError::LatestChange);
        }
        Ok(Self { node: current })
    }

    /// All recorded children, oldest first.
    pub fn children(&self) -> Vec<Self> {
        self.node
            .borrow()
            .children
            .iter()
            .map(|node| Self { node: node.clone() })
            .collect()
    }

    /// Move the cursor to `pos`.
    ///
    /// # Errors
    ///
    /// [`BufferError::IndexOutOfBound`] when `pos` exceeds the buffer
    /// length.
    pub fn goto(&self, pos: usize) -> Result<()> {
        let mut inner = self.node.borrow_mut();
        if pos > inner.buffer.length() {
            return Err(BufferError::IndexOutOfBound);
        }
        inner.cursor = pos;
        inner.flags.remove(SessionFlags::STICK_EOL | SessionFlags::STICK_BOL);
        Ok(())
    }

    /// Move the cursor to the start of the buffer.
    pub fn goto_start(&self) {
        let mut inner = self.node.borrow_mut();
        inner.cursor = 0;
        inner.flags.remove(SessionFlags::STICK_EOL);
        inner.flags.insert(SessionFlags::STICK_BOL);
    }

    /// Move the cursor to the end of the buffer.
    pub fn goto_end(&self) {
        let mut inner = self.node.borrow_mut();
        inner.cursor = inner.buffer.length();
        inner.flags.remove(SessionFlags::STICK_BOL);
    }

    /// Move right by up to `n` runes, bounded by the end of the current
    /// line. Returns the new cursor.
    pub fn goright(&self, n: usize) -> usize {
        let mut inner = self.node.borrow_mut();
        let distance = eol_distance(&inner.buffer, inner.cursor, &inner.newline);
        inner.cursor += n.min(distance);
        inner.flags.remove(SessionFlags::STICK_EOL | SessionFlags::STICK_BOL);
        inner.cursor
    }

    /// Move to the end of the current line (just before the newline
    /// pattern, or the end of the buffer on the last line). Returns the
    /// new cursor.
    pub fn goto_eol(&self) -> usize {
        let mut inner = self.node.borrow_mut();
        let distance = eol_distance(&inner.buffer, inner.cursor, &inner.newline);
        inner.cursor += distance;
        inner.flags.insert(SessionFlags::STICK_EOL);
        inner.cursor
    }

    /// Move down `n` lines keeping the column.
    ///
    /// Placeholder: returns the cursor unchanged.
    /// TODO: resolve the target through `lines_around` once column
    /// tracking lands.
    pub fn godown(&self, _n: usize) -> usize {
        self.cursor()
    }

    /// Move to column `col` of the current line.
    ///
    /// Placeholder: returns the cursor unchanged.
    pub fn goto_column(&self, _col: usize) -> usize {
        self.cursor()
    }

    /// Delete the rune immediately before the cursor. In [`Mode::Insert`]
    /// the current session mutates in place; in other modes the edit is
    /// recorded as a child session. With the cursor at the start the
    /// call is a no-op.
    ///
    /// # Errors
    ///
    /// [`BufferError::ReadOnlyBuffer`] when the session is read-only.
    pub fn rubout_char(&self, mode: Mode) -> Result<Self> {
        self.check_writable()?;
        let (cursor, buffer) = {
            let inner = self.node.borrow();
            (inner.cursor, inner.buffer.clone())
        };
        if cursor == 0 {
            return Ok(self.clone());
        }
        match mode {
            Mode::Insert => {
                let mut buffer = buffer;
                buffer.delete_in(cursor - 1, 1)?;
                self.update_change(buffer)?;
                self.node.borrow_mut().cursor = cursor - 1;
                Ok(self.clone())
            }
            Mode::Normal => {
                let edited = buffer.delete(cursor - 1, 1)?;
                self.append_change(cursor - 1, edited)
            }
        }
    }

    /// Up to `2 * width + 1` consecutive line spans around the cursor,
    /// served from the lazily built line index.
    pub fn lines_around(&self, width: usize) -> Vec<(usize, usize)> {
        let mut inner = self.node.borrow_mut();
        let SessionNode {
            cursor,
            buffer,
            newline,
            lines: cache,
            ..
        } = &mut *inner;
        if let Some(cached) = cache.around(*cursor, width) {
            return cached;
        }
        let pattern: Vec<char> = newline.chars().collect();
        let block = lines::build_block(buffer, &pattern, *cursor, width);
        cache.merge_block(&block);
        block
    }
}

/// Runes between `from` and the start of the next newline pattern (or
/// the end of the buffer).
fn eol_distance(buffer: &TextBuffer, from: usize, newline: &str) -> usize {
    let pattern: Vec<char> = newline.chars().collect();
    if pattern.is_empty() {
        return buffer.length() - from;
    }
    let mut stream = buffer.stream_from(from);
    let mut window: Vec<char> = Vec::with_capacity(pattern.len());
    let mut distance = 0;
    loop {
        while window.len() < pattern.len() {
            match stream.read_rune() {
                Some((ch, _)) => window.push(ch),
                // Too close to the end for a full pattern.
                None => return distance + window.len(),
            }
        }
        if window == pattern {
            return distance;
        }
        window.remove(0);
        distance += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ROPE_CAPACITY;

    fn rope_session(text: &str) -> EditSession {
        let buffer = TextBuffer::rope(text.as_bytes(), ROPE_CAPACITY).unwrap();
        EditSession::new(0, buffer)
    }

    fn content(session: &EditSession) -> String {
        String::from_utf8(session.buffer().bytes()).unwrap()
    }

    #[test]
    fn test_append_change_builds_chain() {
        let root = rope_session("hello");
        let step1 = root
            .append_change(5, root.buffer().insert(5, " world").unwrap())
            .unwrap();
        let step2 = step1
            .append_change(0, step1.buffer().insert(0, ">> ").unwrap())
            .unwrap();
        assert_eq!(content(&root), "hello");
        assert_eq!(content(&step1), "hello world");
        assert_eq!(content(&step2), ">> hello world");
    }

    #[test]
    fn test_undo_redo_navigate_tree() {
        let root = rope_session("a");
        let b = root
            .append_change(1, root.buffer().insert(1, "b").unwrap())
            .unwrap();
        let c = b
            .append_change(2, b.buffer().insert(2, "c").unwrap())
            .unwrap();

        assert_eq!(content(&c.undo(1).unwrap()), "ab");
        assert_eq!(content(&c.undo(2).unwrap()), "a");
        // Saturates at the root once a step was taken.
        assert_eq!(content(&c.undo(10).unwrap()), "a");
        assert_eq!(root.undo(1), Err(BufferError::OldestChange));

        assert_eq!(content(&root.redo(2).unwrap()), "abc");
        assert_eq!(content(&root.redo(10).unwrap()), "abc");
        assert_eq!(c.redo(1), Err(BufferError::LatestChange));
    }

    #[test]
    fn test_redo_follows_latest_branch() {
        let root = rope_session("x");
        let _first = root
            .append_change(1, root.buffer().insert(1, "1").unwrap())
            .unwrap();
        let second = root
            .append_change(1, root.buffer().insert(1, "2").unwrap())
            .unwrap();
        assert_eq!(content(&root.redo(1).unwrap()), content(&second));
        assert_eq!(root.children().len(), 2);
    }

    #[test]
    fn test_read_only_guards_mutation() {
        let buffer = TextBuffer::rope(b"fixed", ROPE_CAPACITY).unwrap();
        let session = EditSession::read_only(0, buffer.clone());
        assert_eq!(
            session.update_change(buffer.clone()),
            Err(BufferError::ReadOnlyBuffer)
        );
        assert_eq!(
            session.append_change(0, buffer.clone()).err(),
            Some(BufferError::ReadOnlyBuffer)
        );
        session.force_write();
        assert!(session.update_change(buffer).is_ok());
    }

    #[test]
    fn test_cursor_motion_respects_lines() {
        let session = rope_session("one\ntwo two\nthree");
        assert_eq!(session.goright(2), 2);
        // Bounded by end-of-line.
        assert_eq!(session.goright(10), 3);
        assert_eq!(session.goto_eol(), 3);
        assert!(session.flags().contains(SessionFlags::STICK_EOL));

        session.goto(4).unwrap();
        assert_eq!(session.goto_eol(), 11);
        session.goto_end();
        assert_eq!(session.cursor(), 17);
        assert_eq!(session.goto(18), Err(BufferError::IndexOutOfBound));
        session.goto_start();
        assert_eq!(session.cursor(), 0);
    }

    #[test]
    fn test_goright_with_crlf_newline() {
        let session = rope_session("ab\r\ncd");
        session.configure_newline("\r\n");
        assert_eq!(session.goright(10), 2);
        session.goto(4).unwrap();
        assert_eq!(session.goto_eol(), 6);
    }

    #[test]
    fn test_rubout_in_insert_mode_is_in_place() {
        let session = rope_session("abc");
        session.goto(2).unwrap();
        let same = session.rubout_char(Mode::Insert).unwrap();
        assert_eq!(content(&same), "ac");
        assert_eq!(session.cursor(), 1);
        assert!(session.children().is_empty());
    }

    #[test]
    fn test_rubout_in_normal_mode_records_child() {
        let session = rope_session("abc");
        session.goto(3).unwrap();
        let child = session.rubout_char(Mode::Normal).unwrap();
        assert_eq!(content(&child), "ab");
        assert_eq!(content(&session), "abc");
        assert_eq!(child.cursor(), 2);
        assert_eq!(session.children().len(), 1);
        assert_eq!(content(&child.undo(1).unwrap()), "abc");
    }

    #[test]
    fn test_rubout_at_start_is_noop() {
        let session = rope_session("abc");
        let same = session.rubout_char(Mode::Normal).unwrap();
        assert_eq!(content(&same), "abc");
        assert!(session.children().is_empty());
    }

    #[test]
    fn test_lines_around_caches_and_invalidates() {
        let session = rope_session("one\ntwo\nthree\nfour\nfive");
        session.goto(9).unwrap();
        let block = session.lines_around(1);
        assert_eq!(block, vec![(4, 7), (8, 13), (14, 18)]);
        // Second call is served from the cache.
        assert_eq!(session.lines_around(1), block);

        // Any recorded edit drops the cache; spans follow the new image.
        session
            .update_change(session.buffer().insert(0, "x").unwrap())
            .unwrap();
        assert_eq!(session.lines_around(1), vec![(5, 8), (9, 14), (15, 19)]);
    }

    #[test]
    fn test_parent_is_weak() {
        let child = {
            let root = rope_session("a");
            root.append_change(1, root.buffer().insert(1, "b").unwrap())
                .unwrap()
        };
        // The root handle is gone: descendants do not keep ancestors
        // alive, so undo now reports the oldest change.
        assert_eq!(content(&child), "ab");
        assert_eq!(child.undo(1), Err(BufferError::OldestChange));
    }
}
