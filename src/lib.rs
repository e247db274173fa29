//! # Cordage
//!
//! A rune-addressable text-buffer foundation for editors.
//!
//! Cordage provides two interchangeable Unicode-aware text containers,
//! a linear byte array and a persistent rope, plus a change-tree edit
//! session layered on top, and a randomized differential validator that
//! treats the linear buffer as an oracle for the rope.
//!
//! ## Core Concepts
//!
//! - **Rune addressing**: every position is a Unicode scalar offset;
//!   byte offsets stay inside leaf storage
//! - **Persistence**: rope edits return fresh roots that share structure,
//!   so old references keep their original content
//! - **In-place fast paths**: `insert_in`/`delete_in` for write-heavy
//!   edits that record no history
//! - **Streams**: forward/backward bounded rune readers over any backend
//! - **Change tree**: sessions branch on every recorded edit; undo and
//!   redo navigate the tree
//!
//! ## Example
//!
//! ```rust,ignore
//! use cordage::{Buffer, RopeBuffer, ROPE_CAPACITY};
//!
//! let rope = RopeBuffer::new("hello world".as_bytes(), ROPE_CAPACITY)?;
//! let edited = rope.insert(5, ", there")?;
//!
//! // The original root is unchanged.
//! assert_eq!(rope.bytes(), b"hello world");
//! assert_eq!(edited.bytes(), b"hello, there world");
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod buffer;
pub mod error;
pub mod rune;
pub mod session;
pub mod validator;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports for convenience
pub use buffer::{Buffer, LinearBuffer, RopeBuffer, RuneReader, Statistics, TextBuffer, ROPE_CAPACITY};
pub use error::{BufferError, Result};
pub use session::{EditSession, Mode, SessionFlags};
pub use validator::{RunConfig, RunReport};
