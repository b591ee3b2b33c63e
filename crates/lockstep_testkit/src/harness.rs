//! Concurrent stress harness for the engine.
//!
//! Runs a fleet of worker threads against one container until a commit
//! target is reached, capturing every commit callback for the checkers in
//! [`crate::check`].

use crate::check;
use lockstep_core::{
    CommitInfo, Container, ContainerConfig, DeadlockDetector, EngineError, WorkerId,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Configuration for a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent worker threads.
    pub workers: usize,
    /// Number of records in the container.
    pub records: usize,
    /// Initial value of every record.
    pub initial_value: i64,
    /// Stop once this many commits are sequenced.
    pub target: u64,
    /// Deadlock detection strategy.
    pub detector: DeadlockDetector,
    /// Base seed; each worker derives its own stream.
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            records: 8,
            initial_value: 100,
            target: 2_000,
            detector: DeadlockDetector::WaitGraph,
            seed: 0xC0FFEE,
        }
    }
}

/// Result of a stress run.
#[derive(Debug)]
pub struct StressOutcome {
    /// Commits sequenced (may slightly exceed the target).
    pub commits: u64,
    /// Retryable deadlock aborts observed.
    pub deadlocks: u64,
    /// Retryable overflow aborts observed.
    pub overflows: u64,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Every commit callback, in commit order.
    pub entries: Vec<CommitInfo>,
    /// Record values before the run.
    pub initial: Vec<i64>,
    /// Record values after the run.
    pub final_values: Vec<i64>,
}

impl StressOutcome {
    /// Commit throughput over the whole run.
    #[must_use]
    pub fn commits_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.commits as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Runs every audit checker against this outcome.
    pub fn verify(&self) -> Result<(), String> {
        let replayed = check::replay(&self.initial, &self.entries)?;
        if replayed != self.final_values {
            return Err(format!(
                "replayed state {:?} diverges from container state {:?}",
                replayed, self.final_values
            ));
        }
        check::check_sum(&self.initial, &self.final_values, self.commits)
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Commits: {}", self.commits);
        println!("Deadlock aborts: {}", self.deadlocks);
        println!("Overflow aborts: {}", self.overflows);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} commits/sec", self.commits_per_second());
    }
}

/// Runs the stress workload described by `config` over a fresh container.
pub fn run_stress(config: &StressConfig) -> StressOutcome {
    let container = Container::new(
        ContainerConfig::new()
            .records(config.records)
            .initial_value(config.initial_value)
            .detector(config.detector),
    );
    run_stress_on(container, config)
}

/// Runs the stress workload over a caller-built container, for runs that
/// need per-record initial values. `config.records` and
/// `config.initial_value` are ignored in favor of the container's own.
///
/// Workers loop picking a random distinct triple, building, and committing
/// until the container's commit counter reaches the target. Retryable
/// aborts are counted and retried; any other engine error panics, since it
/// means the harness found a bug.
pub fn run_stress_on(container: Container, config: &StressConfig) -> StressOutcome {
    let records = container.record_count();
    assert!(records >= 3, "a transaction spans 3 distinct records");
    let initial = container.values();
    let entries: Mutex<Vec<CommitInfo>> = Mutex::new(Vec::new());
    let deadlocks = AtomicU64::new(0);
    let overflows = AtomicU64::new(0);
    let started = Instant::now();

    thread::scope(|scope| {
        for worker in 0..config.workers {
            let container = &container;
            let entries = &entries;
            let deadlocks = &deadlocks;
            let overflows = &overflows;
            let target = config.target;
            let seed = config.seed.wrapping_add(worker as u64);
            scope.spawn(move || {
                let id = WorkerId::new(worker as u64);
                let mut rng = StdRng::seed_from_u64(seed);
                while container.order().as_u64() < target {
                    let (i, j, k) = distinct_triple(&mut rng, records);
                    match container.transaction(id, i, j, k) {
                        Ok(build) => {
                            container
                                .commit(build, |info| {
                                    entries.lock().expect("entry sink poisoned").push(info);
                                })
                                .expect("commit of a fresh build id");
                        }
                        Err(EngineError::Deadlock { .. }) => {
                            deadlocks.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(EngineError::Overflow { .. }) => {
                            overflows.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(err) => panic!("stress worker hit {err}"),
                    }
                }
            });
        }
    });

    StressOutcome {
        commits: container.order().as_u64(),
        deadlocks: deadlocks.load(Ordering::Relaxed),
        overflows: overflows.load(Ordering::Relaxed),
        duration: started.elapsed(),
        entries: entries.into_inner().expect("entry sink poisoned"),
        initial,
        final_values: container.values(),
    }
}

fn distinct_triple(rng: &mut StdRng, records: usize) -> (usize, usize, usize) {
    let i = rng.gen_range(0..records);
    let mut j = rng.gen_range(0..records);
    while j == i {
        j = rng.gen_range(0..records);
    }
    let mut k = rng.gen_range(0..records);
    while k == i || k == j {
        k = rng.gen_range(0..records);
    }
    (i, j, k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stress_replays_cleanly() {
        let outcome = run_stress(&StressConfig::default());
        assert!(outcome.commits >= 2_000);
        outcome.verify().unwrap();
    }

    #[test]
    fn contended_stress_keeps_order_contiguous() {
        // Few records and many workers force constant lock conflicts.
        let outcome = run_stress(&StressConfig {
            workers: 8,
            records: 4,
            target: 3_000,
            ..StressConfig::default()
        });
        outcome.verify().unwrap();
        assert_eq!(outcome.entries.len() as u64, outcome.commits);
    }

    #[test]
    fn chain_walk_detector_survives_two_way_contention() {
        // The chain walk is specialized to the three-step shape; two
        // workers keep the workload inside the cases it covers.
        let outcome = run_stress(&StressConfig {
            workers: 2,
            records: 3,
            target: 1_000,
            detector: DeadlockDetector::ChainWalk,
            ..StressConfig::default()
        });
        outcome.verify().unwrap();
    }

    #[test]
    fn overflow_heavy_stress_still_balances() {
        // One record near the numeric ceiling: any transaction reading it
        // overflows its debit step and aborts, while transactions reading
        // the negative records commit. Whatever commits must still replay.
        let mut values = vec![-1_000i64; 6];
        values[0] = i64::MAX - 2;
        let container = Container::with_values(values, DeadlockDetector::WaitGraph);
        let outcome = run_stress_on(
            container,
            &StressConfig {
                workers: 4,
                target: 64,
                ..StressConfig::default()
            },
        );
        outcome.verify().unwrap();
        assert!(outcome.overflows > 0);
    }
}
