//! Worker-pool driver: loop transactions until the commit target.

use crate::audit::{AuditFormat, AuditWriter};
use crate::picker::IndexPicker;
use lockstep_core::{Container, ContainerConfig, DeadlockDetector, EngineError, WorkerId};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from a driver run.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The run configuration is unusable.
    #[error("configuration: {0}")]
    Config(String),

    /// The engine reported a non-retryable failure.
    #[error("engine failure: {0}")]
    Engine(#[from] EngineError),

    /// An audit log could not be written.
    #[error("audit log I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters of one driver run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Number of records in the container.
    pub records: usize,
    /// Stop once this many commits are sequenced.
    pub target: u64,
    /// Initial value of every record.
    pub initial: i64,
    /// Picker seed; workers derive per-thread seeds from it.
    pub seed: Option<u64>,
    /// Deadlock detection strategy.
    pub detector: DeadlockDetector,
    /// Directory receiving one audit log per worker.
    pub log_dir: PathBuf,
    /// Audit log format.
    pub format: AuditFormat,
}

/// Totals of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Commits sequenced (may slightly exceed the target under contention).
    pub commits: u64,
    /// Transactions aborted by the deadlock detector and retried.
    pub deadlocks: u64,
    /// Transactions aborted by write overflow and retried.
    pub overflows: u64,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Final sum of all record values.
    pub final_sum: i64,
}

impl RunSummary {
    /// Commit throughput over the whole run.
    #[must_use]
    pub fn commits_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.commits as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

/// Runs worker threads against a fresh container until the commit counter
/// reaches the target. Failed builds are discarded and retried with fresh
/// triples; they affect throughput only.
pub fn run(config: &RunConfig) -> Result<RunSummary, DriverError> {
    if config.threads == 0 {
        return Err(DriverError::Config("at least one worker thread".into()));
    }
    if config.records < 3 {
        return Err(DriverError::Config(format!(
            "a transaction spans 3 distinct records; {} configured",
            config.records
        )));
    }
    std::fs::create_dir_all(&config.log_dir)?;

    let container = Container::new(
        ContainerConfig::new()
            .records(config.records)
            .initial_value(config.initial)
            .detector(config.detector),
    );
    let deadlocks = AtomicU64::new(0);
    let overflows = AtomicU64::new(0);
    let started = Instant::now();

    thread::scope(|scope| {
        let mut handles = Vec::new();
        for worker in 0..config.threads {
            let container = &container;
            let deadlocks = &deadlocks;
            let overflows = &overflows;
            handles.push(scope.spawn(move || {
                worker_loop(worker, config, container, deadlocks, overflows)
            }));
        }
        for handle in handles {
            handle.join().expect("worker thread panicked")?;
        }
        Ok::<(), DriverError>(())
    })?;

    let summary = RunSummary {
        commits: container.order().as_u64(),
        deadlocks: deadlocks.load(Ordering::Relaxed),
        overflows: overflows.load(Ordering::Relaxed),
        duration: started.elapsed(),
        final_sum: container.values().iter().sum(),
    };
    info!(
        commits = summary.commits,
        deadlocks = summary.deadlocks,
        "run complete"
    );
    Ok(summary)
}

fn worker_loop(
    worker: usize,
    config: &RunConfig,
    container: &Container,
    deadlocks: &AtomicU64,
    overflows: &AtomicU64,
) -> Result<(), DriverError> {
    let id = WorkerId::new(worker as u64);
    let mut picker = match config.seed {
        Some(seed) => IndexPicker::seeded(config.records, seed.wrapping_add(worker as u64)),
        None => IndexPicker::new(config.records),
    };
    let path = config.log_dir.join(format!("worker{worker}.log"));
    let mut audit = AuditWriter::create(&path, config.format)?;
    let target = config.target;

    while container.order().as_u64() < target {
        let (i, j, k) = picker.next_triple();
        let build = match container.transaction(id, i, j, k) {
            Ok(build) => build,
            Err(err @ EngineError::Deadlock { .. }) => {
                deadlocks.fetch_add(1, Ordering::Relaxed);
                debug!(%err, "build aborted, retrying");
                continue;
            }
            Err(err @ EngineError::Overflow { .. }) => {
                overflows.fetch_add(1, Ordering::Relaxed);
                debug!(%err, "build aborted, retrying");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let mut logged = Ok(());
        container.commit(build, |info| {
            // Commits sequenced past the target still count, but stay out
            // of the fixed-length audit log.
            if info.order.as_u64() <= target {
                logged = audit.append(&info);
            }
        })?;
        logged?;
    }

    audit.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(log_dir: PathBuf) -> RunConfig {
        RunConfig {
            threads: 4,
            records: 8,
            target: 500,
            initial: 100,
            seed: Some(11),
            detector: DeadlockDetector::WaitGraph,
            log_dir,
            format: AuditFormat::Text,
        }
    }

    #[test]
    fn run_reaches_the_target_and_keeps_the_sum() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path().join("logs"));
        let summary = run(&config).unwrap();

        assert!(summary.commits >= 500);
        assert_eq!(summary.final_sum, 8 * 100 + summary.commits as i64);
    }

    #[test]
    fn audit_logs_cover_exactly_the_target() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path().join("logs"));
        run(&config).unwrap();

        let mut orders = Vec::new();
        for worker in 0..config.threads {
            let path = config.log_dir.join(format!("worker{worker}.log"));
            for line in std::fs::read_to_string(&path).unwrap().lines() {
                let order: u64 = line.split_whitespace().next().unwrap().parse().unwrap();
                orders.push(order);
            }
        }
        orders.sort_unstable();
        let expected: Vec<u64> = (1..=config.target).collect();
        assert_eq!(orders, expected);
    }

    #[test]
    fn fewer_than_three_records_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path().join("logs"));
        config.records = 2;
        assert!(matches!(run(&config), Err(DriverError::Config(_))));
    }
}
