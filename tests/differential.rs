//! End-to-end differential runs with fixed seeds.
//!
//! These are the library-level equivalent of a `crossval` invocation:
//! grammar in, worker pool over the shared pair, persistence snapshots
//! re-verified at the end.

use cordage::validator::{run, Grammar, RunConfig};
use cordage::{Buffer, LinearBuffer, RopeBuffer};

const SAMPLE: &str = "左司馬販（《春秋左傳·哀公四年》 #2.2）\n當為左司馬「眅」，音「攀」上聲。 \n並非「販賣」之「販」";

fn bag() -> Vec<String> {
    vec![
        SAMPLE.to_string(),
        "the quick brown fox jumps over the lazy dog\n".to_string(),
    ]
}

#[test]
fn full_run_agrees_across_workers() {
    let config = RunConfig {
        seed: 0xDEAD_BEEF,
        count: 200,
        par: 4,
        capacity: 8,
    };
    let report = run(&Grammar::standard(), &bag(), &config).expect("backends diverged");
    let total: u64 = report.ops.values().sum();
    assert!(total >= 200, "ran only {total} commands");
    assert!(report.snapshots_verified > 0);
}

#[test]
fn several_seeds_and_capacities_agree() {
    for (seed, capacity) in [(1, 2), (2, 4), (3, 64), (4, 1024 * 1024)] {
        let config = RunConfig {
            seed,
            count: 40,
            par: 2,
            capacity,
        };
        let report = run(&Grammar::standard(), &bag(), &config)
            .unwrap_or_else(|failure| panic!("seed {seed}: {failure}"));
        assert_eq!(report.seed, seed);
    }
}

#[test]
fn oracle_matches_rope_over_scripted_walk() {
    // The §8 dicing walk on both backends in lockstep, checked through
    // the public contract alone.
    let mut linear = LinearBuffer::new(SAMPLE.as_bytes()).unwrap();
    let mut rope = RopeBuffer::new(SAMPLE.as_bytes(), 8).unwrap();
    let steps = [
        (0usize, "1"),
        (5, "2"),
        (7, "3"),
        (8, "4"),
        (15, "5"),
        (40, "道"),
    ];
    for &(pos, text) in &steps {
        linear = linear.insert(pos, text).unwrap();
        rope = rope.insert(pos, text).unwrap();
        assert_eq!(linear.bytes(), rope.bytes());
        assert_eq!(linear.length(), rope.length());
    }
    for pos in 0..linear.length() {
        assert_eq!(linear.rune_at(pos).unwrap(), rope.rune_at(pos).unwrap());
    }
    // Unwind the inserts newest-first; each delete undoes one step.
    for &(pos, _) in steps.iter().rev() {
        linear = linear.delete(pos, 1).unwrap();
        rope = rope.delete(pos, 1).unwrap();
        assert_eq!(linear.bytes(), rope.bytes());
    }
    assert_eq!(linear.bytes(), SAMPLE.as_bytes());
}
