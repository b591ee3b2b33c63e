//! lockstep CLI
//!
//! Drives the transaction engine from the command line: a pool of worker
//! threads builds and commits three-step transactions over an in-memory
//! record container until a target commit count is reached, writing one
//! audit log per worker.

mod audit;
mod driver;
mod picker;

use audit::AuditFormat;
use clap::{Parser, Subcommand, ValueEnum};
use driver::RunConfig;
use lockstep_core::DeadlockDetector;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// lockstep transaction driver.
#[derive(Parser)]
#[command(name = "lockstep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive transactions until the commit target is reached
    Run {
        /// Number of worker threads
        #[arg(short = 'n', long, default_value_t = 4)]
        threads: usize,

        /// Number of records in the container
        #[arg(short, long, default_value_t = 16)]
        records: usize,

        /// Stop once this many commits are sequenced
        #[arg(short, long, default_value_t = 10_000)]
        target: u64,

        /// Initial value of every record
        #[arg(long, default_value_t = 100)]
        initial: i64,

        /// Seed for the index pickers (entropy-seeded when omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Deadlock detection strategy
        #[arg(long, value_enum, default_value = "wait-graph")]
        detector: DetectorArg,

        /// Directory receiving one audit log per worker
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,

        /// Audit log and summary format (text, json)
        #[arg(short, long, value_enum, default_value = "text")]
        format: FormatArg,
    },

    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DetectorArg {
    /// BFS over the worker wait-for graph (complete)
    WaitGraph,
    /// Dependency-chain walk (faster, specialized)
    ChainWalk,
}

impl From<DetectorArg> for DeadlockDetector {
    fn from(arg: DetectorArg) -> Self {
        match arg {
            DetectorArg::WaitGraph => DeadlockDetector::WaitGraph,
            DetectorArg::ChainWalk => DeadlockDetector::ChainWalk,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Whitespace-separated fields
    Text,
    /// One JSON object per line
    Json,
}

impl From<FormatArg> for AuditFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => AuditFormat::Text,
            FormatArg::Json => AuditFormat::Json,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            threads,
            records,
            target,
            initial,
            seed,
            detector,
            log_dir,
            format,
        } => {
            let config = RunConfig {
                threads,
                records,
                target,
                initial,
                seed,
                detector: detector.into(),
                log_dir,
                format: format.into(),
            };
            let summary = driver::run(&config)?;
            match format {
                FormatArg::Text => {
                    println!("commits:     {}", summary.commits);
                    println!("deadlocks:   {}", summary.deadlocks);
                    println!("overflows:   {}", summary.overflows);
                    println!("duration:    {:?}", summary.duration);
                    println!("throughput:  {:.2} commits/sec", summary.commits_per_second());
                    println!("final sum:   {}", summary.final_sum);
                }
                FormatArg::Json => {
                    let value = serde_json::json!({
                        "commits": summary.commits,
                        "deadlocks": summary.deadlocks,
                        "overflows": summary.overflows,
                        "duration_ms": summary.duration.as_millis() as u64,
                        "commits_per_second": summary.commits_per_second(),
                        "final_sum": summary.final_sum,
                    });
                    println!("{value}");
                }
            }
        }
        Commands::Version => {
            println!("lockstep CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("lockstep core v{}", lockstep_core::VERSION);
        }
    }

    Ok(())
}
