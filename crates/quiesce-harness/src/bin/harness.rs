//! CLI entrypoint for the quiesce stress harness.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde::Serialize;

use quiesce_harness::stress::{StressConfig, StressReport, run_stress};

/// Stress and validation tooling for the quiesce RCU primitive.
#[derive(Debug, Parser)]
#[command(name = "quiesce-harness")]
#[command(about = "Stress harness for the quiesce RCU primitive")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the concurrent stress profile once and report.
    Stress {
        /// Number of concurrent reader threads.
        #[arg(long, default_value_t = 15)]
        readers: usize,
        /// Total writer toggle operations.
        #[arg(long, default_value_t = 8_000_000)]
        ops: u64,
        /// Keys are drawn from [0, keyspace).
        #[arg(long, default_value_t = 1024)]
        keyspace: u32,
        /// Unlinked nodes per reclamation callback.
        #[arg(long, default_value_t = 1024)]
        batch: usize,
        /// Seed for the deterministic per-thread RNGs.
        #[arg(long, default_value_t = 0xDEAD_BEEF)]
        seed: u64,
        /// Output JSON path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Repeat scaled-down stress runs until a time budget is spent.
    Soak {
        /// Time budget in seconds.
        #[arg(long, default_value_t = 60)]
        seconds: u64,
        /// Number of concurrent reader threads per run.
        #[arg(long, default_value_t = 7)]
        readers: usize,
        /// Writer toggle operations per run.
        #[arg(long, default_value_t = 500_000)]
        ops: u64,
        /// Keys are drawn from [0, keyspace).
        #[arg(long, default_value_t = 1024)]
        keyspace: u32,
        /// Unlinked nodes per reclamation callback.
        #[arg(long, default_value_t = 256)]
        batch: usize,
        /// Base seed; each run perturbs it.
        #[arg(long, default_value_t = 0xDEAD_BEEF)]
        seed: u64,
        /// Output JSON path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Aggregate over a soak session.
#[derive(Debug, Serialize)]
struct SoakReport {
    runs: u64,
    total_ops: u64,
    total_freed: u64,
    total_removes: u64,
    failures: u64,
    duration_ms: u64,
    last_run: Option<StressReport>,
}

fn emit<T: Serialize>(report: &T, output: Option<&PathBuf>) -> Result<(), String> {
    let json = serde_json::to_string_pretty(report).map_err(|e| e.to_string())?;
    match output {
        Some(path) => std::fs::write(path, json).map_err(|e| e.to_string()),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

fn run() -> Result<bool, String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Stress {
            readers,
            ops,
            keyspace,
            batch,
            seed,
            output,
        } => {
            let config = StressConfig {
                readers,
                ops,
                keyspace,
                batch,
                seed,
            };
            let report = run_stress(&config).map_err(|e| e.to_string())?;
            let passed = report.fully_reclaimed() && report.balanced();
            emit(&report, output.as_ref())?;
            Ok(passed)
        }
        Command::Soak {
            seconds,
            readers,
            ops,
            keyspace,
            batch,
            seed,
            output,
        } => {
            let deadline = Duration::from_secs(seconds);
            let start = Instant::now();
            let mut report = SoakReport {
                runs: 0,
                total_ops: 0,
                total_freed: 0,
                total_removes: 0,
                failures: 0,
                duration_ms: 0,
                last_run: None,
            };
            while start.elapsed() < deadline {
                let config = StressConfig {
                    readers,
                    ops,
                    keyspace,
                    batch,
                    seed: seed.wrapping_add(report.runs),
                };
                let run = run_stress(&config).map_err(|e| e.to_string())?;
                report.runs += 1;
                report.total_ops += run.ops;
                report.total_freed += run.freed;
                report.total_removes += run.removes;
                if !run.fully_reclaimed() || !run.balanced() {
                    report.failures += 1;
                }
                report.last_run = Some(run);
            }
            report.duration_ms = start.elapsed().as_millis() as u64;
            let passed = report.failures == 0 && report.runs > 0;
            emit(&report, output.as_ref())?;
            Ok(passed)
        }
    }
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => {
            eprintln!("validation failed: see report");
            std::process::exit(1);
        }
        Err(message) => {
            eprintln!("error: {message}");
            std::process::exit(2);
        }
    }
}
