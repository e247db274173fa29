//! `crossval`: drive the randomized differential validator from the
//! command line.
//!
//! Exits `0` on full agreement between the backends; nonzero on any
//! mismatch or caught panic, with the seed printed to standard error
//! for reproduction.

use clap::Parser;
use cordage::validator::{run, Grammar, RunConfig};
use cordage::ROPE_CAPACITY;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crossval", about = "Differential validator: rope vs. linear oracle")]
struct Args {
    /// Grammar file for command-script generation (JSON).
    #[arg(long)]
    prodfile: PathBuf,

    /// Directory of sample text blobs insert payloads are sliced from.
    #[arg(long)]
    bagdir: Option<PathBuf>,

    /// 64-bit PRNG seed; defaults to wall-clock nanoseconds.
    #[arg(long)]
    seed: Option<u64>,

    /// Total number of command scripts to run.
    #[arg(long, default_value_t = 1)]
    count: u64,

    /// Number of worker threads.
    #[arg(long, default_value_t = 1)]
    par: usize,

    /// Leaf capacity for the rope under test, in bytes.
    #[arg(long, default_value_t = ROPE_CAPACITY)]
    capacity: usize,
}

fn wall_clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::from(elapsed.subsec_nanos()) | elapsed.as_secs() << 32)
}

fn read_bag(dir: Option<&PathBuf>) -> std::io::Result<Vec<String>> {
    let Some(dir) = dir else {
        return Ok(Vec::new());
    };
    let mut bag = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            if let Ok(text) = fs::read_to_string(&path) {
                bag.push(text);
            }
        }
    }
    Ok(bag)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let grammar_text = match fs::read_to_string(&args.prodfile) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("cannot read {}: {err}", args.prodfile.display());
            return ExitCode::FAILURE;
        }
    };
    let grammar = match Grammar::from_json(&grammar_text) {
        Ok(grammar) => grammar,
        Err(err) => {
            eprintln!("bad grammar {}: {err}", args.prodfile.display());
            return ExitCode::FAILURE;
        }
    };
    let bag = match read_bag(args.bagdir.as_ref()) {
        Ok(bag) => bag,
        Err(err) => {
            eprintln!("cannot read bagdir: {err}");
            return ExitCode::FAILURE;
        }
    };

    let config = RunConfig {
        seed: args.seed.unwrap_or_else(wall_clock_seed),
        count: args.count,
        par: args.par,
        capacity: args.capacity,
    };

    match run(&grammar, &bag, &config) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(failure) => {
            eprintln!("{failure}");
            eprintln!("seed: {}", failure.seed);
            ExitCode::FAILURE
        }
    }
}
