//! Cross-validator: randomized differential testing of the two
//! backends.
//!
//! The linear buffer is the oracle: simple enough to audit by
//! inspection. A grammar-driven generator emits JSON command scripts, a
//! worker pool replays each script against the shared
//! `(linear, rope)` pair, and every observation (return values and
//! error kinds alike) must agree. A gatherer snapshots rope references
//! mid-run and re-reads them at the end, witnessing that persistent
//! edits never disturb previously captured roots.

mod driver;
pub mod grammar;

pub use driver::{run, RunConfig, RunFailure, RunReport};
pub use grammar::{Command, CommandRule, Generator, Grammar, OpKind};
