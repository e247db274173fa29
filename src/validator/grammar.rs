//! Command grammar: a data-driven template emitting JSON command
//! scripts.
//!
//! A grammar file describes the weighted mix of commands and the ranges
//! their parameters are drawn from; the generator turns it into scripts
//! of the form `[["insert", 3, "text"], ["length"], ...]`. Positions are
//! drawn blindly, so scripts exercise the error paths as well as the
//! happy ones.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use serde_json::{json, Value};

/// Operations the differential driver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Persistent insert.
    Insert,
    /// Persistent delete.
    Delete,
    /// In-place insert; requires exclusive access to the pair.
    InsertIn,
    /// In-place delete; requires exclusive access to the pair.
    DeleteIn,
    /// Read one rune.
    Index,
    /// Read the rune length.
    Length,
    /// Read the full byte image.
    Value,
    /// Read a rune slice.
    Substr,
}

impl OpKind {
    /// Stable short key for statistics counters.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::InsertIn => "insertin",
            Self::DeleteIn => "deletein",
            Self::Index => "index",
            Self::Length => "length",
            Self::Value => "value",
            Self::Substr => "substr",
        }
    }
}

/// One weighted command choice.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRule {
    /// The operation to emit.
    pub op: OpKind,
    /// Relative weight among all rules.
    pub weight: u32,
}

const fn default_script_len() -> (usize, usize) {
    (4, 32)
}

const fn default_max_pos() -> usize {
    128
}

const fn default_max_span() -> usize {
    16
}

const fn default_max_text() -> usize {
    24
}

/// A parsed grammar file.
#[derive(Debug, Clone, Deserialize)]
pub struct Grammar {
    /// Weighted command choices.
    pub commands: Vec<CommandRule>,
    /// Commands per script, inclusive range.
    #[serde(default = "default_script_len")]
    pub script_len: (usize, usize),
    /// Highest rune position the generator draws.
    #[serde(default = "default_max_pos")]
    pub max_pos: usize,
    /// Longest delete/substr span in runes.
    #[serde(default = "default_max_span")]
    pub max_span: usize,
    /// Longest insert payload in runes.
    #[serde(default = "default_max_text")]
    pub max_text: usize,
}

impl Grammar {
    /// Parse a grammar from its JSON source.
    ///
    /// # Errors
    ///
    /// Returns the underlying decode error on malformed input.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// The mix the repository ships for routine validation runs: every
    /// operation enabled, reads outweighing writes.
    pub fn standard() -> Self {
        let rule = |op, weight| CommandRule { op, weight };
        Self {
            commands: vec![
                rule(OpKind::Insert, 4),
                rule(OpKind::Delete, 3),
                rule(OpKind::InsertIn, 2),
                rule(OpKind::DeleteIn, 2),
                rule(OpKind::Index, 6),
                rule(OpKind::Length, 6),
                rule(OpKind::Value, 4),
                rule(OpKind::Substr, 5),
            ],
            script_len: default_script_len(),
            max_pos: default_max_pos(),
            max_span: default_max_span(),
            max_text: default_max_text(),
        }
    }
}

/// One driver command with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `["insert", pos, text]`
    Insert {
        /// Rune position.
        pos: usize,
        /// Payload.
        text: String,
    },
    /// `["delete", pos, n]`
    Delete {
        /// Rune position.
        pos: usize,
        /// Runes to remove.
        n: usize,
    },
    /// `["insertin", pos, text]`
    InsertIn {
        /// Rune position.
        pos: usize,
        /// Payload.
        text: String,
    },
    /// `["deletein", pos, n]`
    DeleteIn {
        /// Rune position.
        pos: usize,
        /// Runes to remove.
        n: usize,
    },
    /// `["index", pos]`
    Index {
        /// Rune position.
        pos: usize,
    },
    /// `["length"]`
    Length,
    /// `["value"]`
    Value,
    /// `["substr", pos, n]`
    Substr {
        /// Rune position.
        pos: usize,
        /// Runes to read.
        n: usize,
    },
}

impl Command {
    /// The operation this command performs.
    pub const fn op(&self) -> OpKind {
        match self {
            Self::Insert { .. } => OpKind::Insert,
            Self::Delete { .. } => OpKind::Delete,
            Self::InsertIn { .. } => OpKind::InsertIn,
            Self::DeleteIn { .. } => OpKind::DeleteIn,
            Self::Index { .. } => OpKind::Index,
            Self::Length => OpKind::Length,
            Self::Value => OpKind::Value,
            Self::Substr { .. } => OpKind::Substr,
        }
    }

    /// Whether the command mutates the shared pair in place and needs
    /// the writer side of the lock.
    pub const fn is_exclusive(&self) -> bool {
        matches!(self, Self::InsertIn { .. } | Self::DeleteIn { .. })
    }

    /// The JSON array form used in command scripts.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Insert { pos, text } => json!(["insert", pos, text]),
            Self::Delete { pos, n } => json!(["delete", pos, n]),
            Self::InsertIn { pos, text } => json!(["insertin", pos, text]),
            Self::DeleteIn { pos, n } => json!(["deletein", pos, n]),
            Self::Index { pos } => json!(["index", pos]),
            Self::Length => json!(["length"]),
            Self::Value => json!(["value"]),
            Self::Substr { pos, n } => json!(["substr", pos, n]),
        }
    }

    /// Decode one command from its JSON array form.
    pub fn from_value(value: &Value) -> Option<Self> {
        let items = value.as_array()?;
        let op = items.first()?.as_str()?;
        let pos_at = |i: usize| items.get(i)?.as_u64().and_then(|v| usize::try_from(v).ok());
        let text_at = |i: usize| items.get(i)?.as_str().map(str::to_string);
        match op {
            "insert" => Some(Self::Insert {
                pos: pos_at(1)?,
                text: text_at(2)?,
            }),
            "delete" => Some(Self::Delete {
                pos: pos_at(1)?,
                n: pos_at(2)?,
            }),
            "insertin" => Some(Self::InsertIn {
                pos: pos_at(1)?,
                text: text_at(2)?,
            }),
            "deletein" => Some(Self::DeleteIn {
                pos: pos_at(1)?,
                n: pos_at(2)?,
            }),
            "index" => Some(Self::Index { pos: pos_at(1)? }),
            "length" => Some(Self::Length),
            "value" => Some(Self::Value),
            "substr" => Some(Self::Substr {
                pos: pos_at(1)?,
                n: pos_at(2)?,
            }),
            _ => None,
        }
    }
}

/// Encode a script as the JSON text workers consume.
pub fn encode_script(commands: &[Command]) -> String {
    Value::Array(commands.iter().map(Command::to_value).collect()).to_string()
}

/// Decode a script from JSON text; `None` on any malformed command.
pub fn decode_script(text: &str) -> Option<Vec<Command>> {
    let value: Value = serde_json::from_str(text).ok()?;
    value
        .as_array()?
        .iter()
        .map(Command::from_value)
        .collect()
}

/// Seeded script generator over a grammar and a bag of sample texts.
pub struct Generator {
    grammar: Grammar,
    bag: Vec<Vec<char>>,
    rng: ChaCha8Rng,
}

impl Generator {
    /// Create a generator. `bag` holds corpus blobs insert payloads are
    /// sliced from; with an empty bag the generator falls back to short
    /// ASCII payloads.
    pub fn new(grammar: Grammar, bag: &[String], seed: u64) -> Self {
        Self {
            grammar,
            bag: bag.iter().map(|s| s.chars().collect()).collect(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Generate the next command script as JSON text.
    pub fn next_script(&mut self) -> String {
        let (lo, hi) = self.grammar.script_len;
        let len = self.rng.random_range(lo..=hi.max(lo));
        let commands: Vec<Command> = (0..len).map(|_| self.next_command()).collect();
        encode_script(&commands)
    }

    fn next_command(&mut self) -> Command {
        let total: u32 = self.grammar.commands.iter().map(|rule| rule.weight).sum();
        let mut draw = self.rng.random_range(0..total.max(1));
        let mut op = OpKind::Length;
        for rule in &self.grammar.commands {
            if draw < rule.weight {
                op = rule.op;
                break;
            }
            draw -= rule.weight;
        }
        let pos = self.rng.random_range(0..=self.grammar.max_pos);
        let span = self.rng.random_range(0..=self.grammar.max_span);
        match op {
            OpKind::Insert => Command::Insert {
                pos,
                text: self.sample_text(),
            },
            OpKind::Delete => Command::Delete { pos, n: span },
            OpKind::InsertIn => Command::InsertIn {
                pos,
                text: self.sample_text(),
            },
            OpKind::DeleteIn => Command::DeleteIn { pos, n: span },
            OpKind::Index => Command::Index { pos },
            OpKind::Length => Command::Length,
            OpKind::Value => Command::Value,
            OpKind::Substr => Command::Substr { pos, n: span },
        }
    }

    fn sample_text(&mut self) -> String {
        let want = self.rng.random_range(1..=self.grammar.max_text.max(1));
        if self.bag.is_empty() {
            let len = want.min(8);
            return (0..len)
                .map(|_| char::from(self.rng.random_range(b'a'..=b'z')))
                .collect();
        }
        let blob = &self.bag[self.rng.random_range(0..self.bag.len())];
        if blob.is_empty() {
            return String::new();
        }
        let start = self.rng.random_range(0..blob.len());
        let end = (start + want).min(blob.len());
        blob[start..end].iter().collect()
    }
}
