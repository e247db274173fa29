//! Leaf walker: a cooperative producer that feeds rope streams.
//!
//! Each stream over a rope owns one walker: a dedicated thread performing
//! the post-order leaf walk and handing `(offset, leaf)` pairs over a
//! bounded channel. Closing the walker flips its cancel flag and drops
//! the receiving side, so a blocked send unblocks and the thread exits
//! promptly; a panic raised during that teardown is caught and discarded
//! by the join.

use super::rope::{back_walk, walk, Node};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// How many leaf visits may queue up before the walk blocks.
const WALK_BUFFER: usize = 8;

/// Direction of a leaf walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Forward,
    Backward,
}

/// Handle to a walking thread producing `(rune_offset, leaf)` pairs.
pub(crate) struct LeafWalker {
    rx: Option<Receiver<(usize, Arc<Node>)>>,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LeafWalker {
    /// Spawn a walker over `root` starting at rune offset `pos`.
    pub fn spawn(root: Arc<Node>, pos: usize, direction: Direction) -> Self {
        let (tx, rx) = bounded(WALK_BUFFER);
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();

        let handle = thread::Builder::new()
            .name("cordage-leafwalk".to_string())
            .spawn(move || {
                let mut visit = |off: usize, leaf: Arc<Node>| {
                    !flag.load(Ordering::Relaxed) && tx.send((off, leaf)).is_ok()
                };
                match direction {
                    Direction::Forward => walk(&root, pos, &mut visit),
                    Direction::Backward => back_walk(&root, pos, &mut visit),
                };
            })
            .expect("failed to spawn leaf-walk thread");

        Self {
            rx: Some(rx),
            cancel,
            handle: Some(handle),
        }
    }

    /// Next leaf in walk order, or `None` once the walk is done or the
    /// walker has been closed.
    pub fn next_leaf(&mut self) -> Option<(usize, Arc<Node>)> {
        self.rx.as_ref()?.recv().ok()
    }

    /// Stop the walk and reap the thread. Idempotent.
    pub fn close(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        // Dropping the receiver unblocks a pending send.
        self.rx = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LeafWalker {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, RopeBuffer};

    fn leaf_len(node: &Arc<Node>) -> usize {
        node.len()
    }

    #[test]
    fn test_forward_walk_covers_all_leaves() {
        let rope = RopeBuffer::new(b"hello world, how are you", 4).unwrap();
        let mut walker = LeafWalker::spawn(rope.root().clone(), 0, Direction::Forward);
        let mut total = 0;
        while let Some((off, leaf)) = walker.next_leaf() {
            assert_eq!(off, 0);
            total += leaf_len(&leaf);
        }
        assert_eq!(total, rope.length());
    }

    #[test]
    fn test_forward_walk_reports_descent_offset() {
        let rope = RopeBuffer::new(b"hello world", 4).unwrap();
        let mut walker = LeafWalker::spawn(rope.root().clone(), 6, Direction::Forward);
        let (off, leaf) = walker.next_leaf().unwrap();
        // First visit lands inside a leaf; the rest restart at zero.
        assert!(off > 0 && off < leaf_len(&leaf));
        let mut rest = 0;
        while let Some((off, leaf)) = walker.next_leaf() {
            assert_eq!(off, 0);
            rest += leaf_len(&leaf);
        }
        assert_eq!(leaf_len(&leaf) - off + rest, rope.length() - 6);
    }

    #[test]
    fn test_backward_walk_covers_prefix() {
        let rope = RopeBuffer::new(b"hello world, how are you", 4).unwrap();
        let mut walker = LeafWalker::spawn(rope.root().clone(), 9, Direction::Backward);
        let mut covered = 0;
        while let Some((off, _)) = walker.next_leaf() {
            covered += off;
        }
        assert_eq!(covered, 9);
    }

    #[test]
    fn test_close_is_idempotent_and_prompt() {
        let big: Vec<u8> = b"abcdefgh".repeat(4096);
        let rope = RopeBuffer::new(&big, 8).unwrap();
        let mut walker = LeafWalker::spawn(rope.root().clone(), 0, Direction::Forward);
        let _ = walker.next_leaf();
        walker.close();
        walker.close();
        assert!(walker.next_leaf().is_none());
    }
}
