//! Error taxonomy shared by every layer of the crate.
//!
//! Buffer operations report errors as kinds, not nested causes: the
//! differential validator compares the error returned by each backend for
//! the same command, so the type is `Copy + Eq` and carries no payload.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BufferError>;

/// Every failure a buffer or edit-session operation can report.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferError {
    /// An operation was invoked on an absent receiver.
    ///
    /// Ownership makes this state unrepresentable inside the crate itself;
    /// the kind survives for API parity and for the validator's per-error
    /// counters.
    #[error("buffer is not initialized")]
    BufferNil,

    /// A rune position or length falls outside the range the operation
    /// allows.
    #[error("position or length outside the buffer")]
    IndexOutOfBound,

    /// UTF-8 decoding failed inside a leaf or an argument.
    #[error("malformed UTF-8 sequence")]
    InvalidEncoding,

    /// A mutating session operation was invoked on a read-only session.
    #[error("buffer is marked read-only")]
    ReadOnlyBuffer,

    /// Undo was asked to walk past the root of the change tree.
    #[error("already at the oldest change")]
    OldestChange,

    /// Redo was asked to walk past a leaf of the change tree.
    #[error("already at the latest change")]
    LatestChange,
}

impl BufferError {
    /// Stable short key for statistics counters.
    pub const fn key(self) -> &'static str {
        match self {
            Self::BufferNil => "buffer-nil",
            Self::IndexOutOfBound => "index-out-of-bound",
            Self::InvalidEncoding => "invalid-encoding",
            Self::ReadOnlyBuffer => "read-only-buffer",
            Self::OldestChange => "oldest-change",
            Self::LatestChange => "latest-change",
        }
    }
}
