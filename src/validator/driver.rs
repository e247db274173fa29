//! Differential driver: run identical command scripts against both
//! backends and demand observational equivalence.
//!
//! A producer thread generates scripts from the grammar, a pool of
//! worker threads applies them to the shared `(linear, rope)` pair, and
//! a gatherer periodically snapshots the current rope reference so the
//! persistence of `insert`/`delete` can be re-verified at the end of the
//! run. In-place commands take the writer side of the pair's lock; all
//! other commands take the reader side.

use super::grammar::{decode_script, Command, Generator, Grammar};
use crate::buffer::{Buffer, LinearBuffer, RopeBuffer};
use crate::error::BufferError;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, trace};

/// How long the producer waits per send attempt before rechecking the
/// stop flag.
const SEND_TICK: Duration = Duration::from_millis(50);

/// Pause between persistence snapshots.
const GATHER_TICK: Duration = Duration::from_millis(2);

/// Upper bound on retained persistence snapshots.
const MAX_SNAPSHOTS: usize = 10_000;

/// Counter key for scripts the workers could not decode.
const MALFORMED_KEY: &str = "malformed-script";

type SharedPair = Arc<RwLock<(LinearBuffer, RopeBuffer)>>;

/// Validator run parameters.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// PRNG seed; printable for reproduction.
    pub seed: u64,
    /// Number of command scripts to run.
    pub count: u64,
    /// Number of worker threads.
    pub par: usize,
    /// Leaf capacity for the rope under test.
    pub capacity: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            count: 1,
            par: 1,
            capacity: crate::buffer::ROPE_CAPACITY,
        }
    }
}

/// Per-run statistics of a completed (or aborted) run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// The seed the run used.
    pub seed: u64,
    /// Commands executed, per operation.
    pub ops: BTreeMap<&'static str, u64>,
    /// Matched errors observed, per kind.
    pub errors: BTreeMap<&'static str, u64>,
    /// Persistent rope references whose value survived unchanged.
    pub snapshots_verified: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total: u64 = self.ops.values().sum();
        writeln!(f, "seed: {}", self.seed)?;
        writeln!(f, "total commands: {total}")?;
        for (key, count) in &self.ops {
            writeln!(f, "  {key}: {count}")?;
        }
        if !self.errors.is_empty() {
            writeln!(f, "matched errors:")?;
            for (key, count) in &self.errors {
                writeln!(f, "  {key}: {count}")?;
            }
        }
        write!(f, "verified: {} persistent values", self.snapshots_verified)
    }
}

/// A failed run: mismatch between the backends, a caught panic, or a
/// persistence violation.
#[derive(Debug)]
pub struct RunFailure {
    /// The seed to reproduce with.
    pub seed: u64,
    /// Human-readable account of the first divergence.
    pub detail: String,
    /// Statistics up to the failure.
    pub report: RunReport,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.detail)?;
        write!(f, "{}", self.report)
    }
}

#[derive(Default)]
struct Counters {
    ops: Mutex<BTreeMap<&'static str, u64>>,
    errors: Mutex<BTreeMap<&'static str, u64>>,
}

impl Counters {
    fn inc_op(&self, key: &'static str) {
        *lock_or_poisoned(&self.ops).entry(key).or_insert(0) += 1;
    }

    fn inc_error(&self, kind: BufferError) {
        *lock_or_poisoned(&self.errors).entry(kind.key()).or_insert(0) += 1;
    }

    fn snapshot(&self) -> (BTreeMap<&'static str, u64>, BTreeMap<&'static str, u64>) {
        (
            lock_or_poisoned(&self.ops).clone(),
            lock_or_poisoned(&self.errors).clone(),
        )
    }
}

/// Recover the guard even after a worker panicked inside the critical
/// section; the run is aborted on panic, so observing the poisoned
/// state is fine.
fn lock_or_poisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn read_pair(shared: &SharedPair) -> (LinearBuffer, RopeBuffer) {
    let guard = shared
        .read()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    (guard.0.clone(), guard.1.clone())
}

fn store_pair(shared: &SharedPair, pair: (LinearBuffer, RopeBuffer)) {
    let mut guard = shared
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    *guard = pair;
}

struct Failure {
    slot: Mutex<Option<String>>,
    stop: AtomicBool,
}

impl Failure {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            stop: AtomicBool::new(false),
        }
    }

    fn record(&self, detail: String) {
        error!(%detail, "backend divergence");
        let mut slot = lock_or_poisoned(&self.slot);
        slot.get_or_insert(detail);
        self.stop.store(true, Ordering::Relaxed);
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn take(&self) -> Option<String> {
        lock_or_poisoned(&self.slot).take()
    }
}

/// Execute one command against both backends, updating the shared pair
/// and the counters. Returns the first divergence as an error string.
fn apply(
    command: &Command,
    shared: &SharedPair,
    counters: &Counters,
) -> Result<(), String> {
    match command {
        Command::Insert { pos, text } => {
            let (linear, rope) = read_pair(shared);
            reconcile(
                shared,
                counters,
                linear.insert(*pos, text),
                rope.insert(*pos, text),
                command,
            )
        }
        Command::Delete { pos, n } => {
            let (linear, rope) = read_pair(shared);
            reconcile(
                shared,
                counters,
                linear.delete(*pos, *n),
                rope.delete(*pos, *n),
                command,
            )
        }
        Command::InsertIn { pos, text } => {
            let mut guard = shared
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let (linear, rope) = &mut *guard;
            let results = (linear.insert_in(*pos, text), rope.insert_in(*pos, text));
            compare_in_place(linear, rope, results, counters, command)
        }
        Command::DeleteIn { pos, n } => {
            let mut guard = shared
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let (linear, rope) = &mut *guard;
            let results = (linear.delete_in(*pos, *n), rope.delete_in(*pos, *n));
            compare_in_place(linear, rope, results, counters, command)
        }
        Command::Index { pos } => {
            let (linear, rope) = read_pair(shared);
            compare_reads(linear.rune_at(*pos), rope.rune_at(*pos), counters, command)
        }
        Command::Length => {
            let (linear, rope) = read_pair(shared);
            if linear.length() == rope.length() {
                Ok(())
            } else {
                Err(divergence(
                    command,
                    &format!("length {} vs {}", linear.length(), rope.length()),
                ))
            }
        }
        Command::Value => {
            let (linear, rope) = read_pair(shared);
            if linear.bytes() == rope.bytes() {
                Ok(())
            } else {
                Err(divergence(command, "byte images differ"))
            }
        }
        Command::Substr { pos, n } => {
            let (linear, rope) = read_pair(shared);
            let left = linear.slice(*pos, *n).and_then(|b| b.runes());
            let right = rope.slice(*pos, *n).and_then(|b| b.runes());
            compare_reads(left, right, counters, command)
        }
    }
}

/// Persistent edits: both results must agree; on success the fresh pair
/// replaces the shared one.
fn reconcile(
    shared: &SharedPair,
    counters: &Counters,
    linear: crate::Result<LinearBuffer>,
    rope: crate::Result<RopeBuffer>,
    command: &Command,
) -> Result<(), String> {
    match (linear, rope) {
        (Ok(linear), Ok(rope)) => {
            if linear.bytes() == rope.bytes() {
                store_pair(shared, (linear, rope));
                Ok(())
            } else {
                Err(divergence(command, "byte images differ after edit"))
            }
        }
        (Err(left), Err(right)) if left == right => {
            counters.inc_error(left);
            Ok(())
        }
        (left, right) => Err(divergence(
            command,
            &format!("errors differ: {left:?} vs {right:?}"),
        )),
    }
}

fn compare_in_place(
    linear: &LinearBuffer,
    rope: &RopeBuffer,
    results: (crate::Result<()>, crate::Result<()>),
    counters: &Counters,
    command: &Command,
) -> Result<(), String> {
    match results {
        (Ok(()), Ok(())) => {
            if linear.bytes() == rope.bytes() {
                Ok(())
            } else {
                Err(divergence(command, "byte images differ after edit"))
            }
        }
        (Err(left), Err(right)) if left == right => {
            counters.inc_error(left);
            Ok(())
        }
        (left, right) => Err(divergence(
            command,
            &format!("errors differ: {left:?} vs {right:?}"),
        )),
    }
}

fn compare_reads<T: PartialEq + fmt::Debug>(
    left: crate::Result<T>,
    right: crate::Result<T>,
    counters: &Counters,
    command: &Command,
) -> Result<(), String> {
    match (left, right) {
        (Ok(a), Ok(b)) => {
            if a == b {
                Ok(())
            } else {
                Err(divergence(command, &format!("values differ: {a:?} vs {b:?}")))
            }
        }
        (Err(a), Err(b)) if a == b => {
            counters.inc_error(a);
            Ok(())
        }
        (a, b) => Err(divergence(command, &format!("errors differ: {a:?} vs {b:?}"))),
    }
}

fn divergence(command: &Command, detail: &str) -> String {
    format!("command {:?}: {detail}", command.to_value())
}

fn spawn_producer(
    mut generator: Generator,
    count: u64,
    tx: Sender<String>,
    failure: Arc<Failure>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("cordage-generate".to_string())
        .spawn(move || {
            for _ in 0..count {
                if failure.stopped() {
                    break;
                }
                let mut script = generator.next_script();
                loop {
                    match tx.send_timeout(script, SEND_TICK) {
                        Ok(()) => break,
                        Err(SendTimeoutError::Timeout(returned)) => {
                            if failure.stopped() {
                                return;
                            }
                            script = returned;
                        }
                        Err(SendTimeoutError::Disconnected(_)) => return,
                    }
                }
            }
        })
        .expect("failed to spawn generator thread")
}

fn spawn_worker(
    index: usize,
    rx: Receiver<String>,
    shared: SharedPair,
    counters: Arc<Counters>,
    failure: Arc<Failure>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("cordage-validate-{index}"))
        .spawn(move || {
            while let Ok(script) = rx.recv() {
                if failure.stopped() {
                    break;
                }
                let Some(commands) = decode_script(&script) else {
                    counters.inc_op(MALFORMED_KEY);
                    continue;
                };
                trace!(worker = index, commands = commands.len(), "script");
                for command in commands {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        apply(&command, &shared, &counters)
                    }));
                    match outcome {
                        Ok(Ok(())) => counters.inc_op(command.op().key()),
                        Ok(Err(detail)) => {
                            failure.record(detail);
                            return;
                        }
                        Err(payload) => {
                            failure.record(format!(
                                "panic in {:?}: {}",
                                command.to_value(),
                                panic_message(payload.as_ref())
                            ));
                            return;
                        }
                    }
                }
            }
        })
        .expect("failed to spawn validator worker")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "opaque panic payload".to_string())
}

fn spawn_gatherer(
    shared: SharedPair,
    done: Arc<AtomicBool>,
) -> JoinHandle<Vec<(RopeBuffer, Vec<u8>)>> {
    thread::Builder::new()
        .name("cordage-gather".to_string())
        .spawn(move || {
            let mut snapshots: Vec<(RopeBuffer, Vec<u8>)> = Vec::new();
            loop {
                if snapshots.len() < MAX_SNAPSHOTS {
                    let (_, rope) = read_pair(&shared);
                    let image = rope.bytes();
                    snapshots.push((rope, image));
                }
                if done.load(Ordering::Relaxed) {
                    break;
                }
                thread::sleep(GATHER_TICK);
            }
            snapshots
        })
        .expect("failed to spawn gatherer thread")
}

/// Run `config.count` scripts from `grammar` against a fresh pair of
/// backends.
///
/// # Errors
///
/// [`RunFailure`] on the first observed divergence, caught panic, or
/// persistence violation; the failure carries the counters and the seed
/// for reproduction.
pub fn run(grammar: &Grammar, bag: &[String], config: &RunConfig) -> Result<RunReport, RunFailure> {
    let shared: SharedPair = Arc::new(RwLock::new((
        LinearBuffer::default(),
        RopeBuffer::empty(config.capacity),
    )));
    let counters = Arc::new(Counters::default());
    let failure = Arc::new(Failure::new());

    debug!(seed = config.seed, count = config.count, par = config.par, "starting run");

    let (tx, rx) = bounded::<String>(config.par.max(1) * 2);
    let generator = Generator::new(grammar.clone(), bag, config.seed);
    let producer = spawn_producer(generator, config.count, tx, failure.clone());

    let workers: Vec<_> = (0..config.par.max(1))
        .map(|index| {
            spawn_worker(
                index,
                rx.clone(),
                shared.clone(),
                counters.clone(),
                failure.clone(),
            )
        })
        .collect();
    drop(rx);

    let gather_done = Arc::new(AtomicBool::new(false));
    let gatherer = spawn_gatherer(shared.clone(), gather_done.clone());

    let _ = producer.join();
    for worker in workers {
        let _ = worker.join();
    }
    gather_done.store(true, Ordering::Relaxed);
    let snapshots = gatherer.join().unwrap_or_default();

    let (ops, errors) = counters.snapshot();
    let mut report = RunReport {
        seed: config.seed,
        ops,
        errors,
        snapshots_verified: 0,
    };

    if let Some(detail) = failure.take() {
        return Err(RunFailure {
            seed: config.seed,
            detail,
            report,
        });
    }

    for (rope, image) in &snapshots {
        if rope.bytes() != *image {
            return Err(RunFailure {
                seed: config.seed,
                detail: "persistent rope reference changed under later edits".to_string(),
                report,
            });
        }
        report.snapshots_verified += 1;
    }

    debug!(verified = report.snapshots_verified, "run complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::grammar::{CommandRule, OpKind};

    fn quick_config(seed: u64, count: u64, par: usize) -> RunConfig {
        RunConfig {
            seed,
            count,
            par,
            capacity: 8,
        }
    }

    #[test]
    fn test_backends_agree_over_random_scripts() {
        let bag = vec![crate::testutil::CHINESE.to_string(), "plain ascii".to_string()];
        let report = run(&Grammar::standard(), &bag, &quick_config(0xC0FFEE, 60, 4))
            .expect("backends diverged");
        let total: u64 = report.ops.values().sum();
        assert!(total > 0);
        assert!(report.snapshots_verified > 0);
    }

    #[test]
    fn test_single_worker_run_is_reproducible() {
        let bag = vec!["hello world".to_string()];
        let a = run(&Grammar::standard(), &bag, &quick_config(7, 20, 1)).unwrap();
        let b = run(&Grammar::standard(), &bag, &quick_config(7, 20, 1)).unwrap();
        assert_eq!(a.ops, b.ops);
        assert_eq!(a.errors, b.errors);
    }

    #[test]
    fn test_out_of_bound_commands_match_error_kinds() {
        let grammar = Grammar {
            commands: vec![
                CommandRule {
                    op: OpKind::Delete,
                    weight: 1,
                },
                CommandRule {
                    op: OpKind::Index,
                    weight: 1,
                },
            ],
            ..Grammar::standard()
        };
        // Every command targets an empty pair, so both backends must
        // report IndexOutOfBound in lockstep.
        let report = run(&grammar, &[], &quick_config(3, 10, 2)).unwrap();
        assert!(report
            .errors
            .get(BufferError::IndexOutOfBound.key())
            .copied()
            .unwrap_or(0) > 0);
    }

    #[test]
    fn test_apply_detects_planted_divergence() {
        let shared: SharedPair = Arc::new(RwLock::new((
            LinearBuffer::new(b"one").unwrap(),
            RopeBuffer::new(b"two", 8).unwrap(),
        )));
        let counters = Counters::default();
        let command = Command::Value;
        assert!(apply(&command, &shared, &counters).is_err());
    }
}
