//! The container: records, wait lists, and the commit sequencer.

use crate::config::ContainerConfig;
use crate::deadlock::DeadlockDetector;
use crate::error::{EngineError, EngineResult};
use crate::operation::{OpKind, Operation};
use crate::record::Record;
use crate::types::{BuildId, CommitOrder, OpId, WorkerId};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Link from a wait-list entry to the next operation of the same
/// transaction, wired as that next operation begins waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpLink {
    /// The chained operation.
    pub op: OpId,
    /// Record whose wait list holds the chained operation.
    pub record: usize,
}

/// One pending or active operation on a record's wait list.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WaitEntry {
    pub op: OpId,
    pub worker: WorkerId,
    pub kind: OpKind,
    pub depends_on: Option<OpLink>,
}

/// A fully-built transaction parked in history until commit.
#[derive(Debug)]
struct BuiltTransaction {
    read: Operation,
    add: Operation,
    sub: Operation,
}

/// Metadata guarded by the container's short metadata lock: wait lists,
/// history, and the commit counter. Never held across a blocking lock
/// acquisition, so transactions on disjoint record sets do not contend.
#[derive(Debug)]
struct Books {
    waiting: Vec<VecDeque<WaitEntry>>,
    history: Vec<Option<BuiltTransaction>>,
    commits: u64,
    next_op: u64,
}

impl Books {
    fn link_dependency(&mut self, op: OpId, record: usize, link: OpLink) {
        if let Some(entry) = self.waiting[record].iter_mut().find(|e| e.op == op) {
            entry.depends_on = Some(link);
        }
    }

    fn remove_waiter(&mut self, record: usize, op: OpId) {
        if let Some(pos) = self.waiting[record].iter().position(|e| e.op == op) {
            self.waiting[record].remove(pos);
        }
    }
}

/// Data handed to the commit callback, describing one committed
/// transaction in the audit log's total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    /// Commit order assigned to this transaction.
    pub order: CommitOrder,
    /// Index of the record that was read.
    pub read_index: usize,
    /// Index of the record the read value (plus one) was added to.
    pub add_index: usize,
    /// Index of the record the read value was subtracted from.
    pub sub_index: usize,
    /// Value observed by the read step.
    pub read_value: i64,
    /// Value of the add record after its write.
    pub add_value: i64,
    /// Value of the sub record after its write.
    pub sub_value: i64,
}

/// An in-memory store of numeric records with three-step transactions.
///
/// The container owns all records and all transaction bookkeeping. Each
/// transaction reads one record and writes two others, holding every lock
/// it acquires until [`commit`](Container::commit) releases them and
/// assigns the next slot in the global commit order.
///
/// Two layers of locking keep unrelated transactions apart: each record
/// carries its own [`FairRwLock`](crate::lock::FairRwLock), while one short
/// metadata lock serializes wait-list bookkeeping, deadlock checks, and
/// commit sequencing.
#[derive(Debug)]
pub struct Container {
    records: Vec<Record>,
    detector: DeadlockDetector,
    books: Mutex<Books>,
}

impl Container {
    /// Creates a container from a configuration.
    #[must_use]
    pub fn new(config: ContainerConfig) -> Self {
        Self::with_values(
            vec![config.initial_value; config.records],
            config.detector,
        )
    }

    /// Creates a container with one record per initial value.
    #[must_use]
    pub fn with_values(values: Vec<i64>, detector: DeadlockDetector) -> Self {
        let records: Vec<Record> = values.into_iter().map(Record::new).collect();
        let waiting = records.iter().map(|_| VecDeque::new()).collect();
        Self {
            records,
            detector,
            books: Mutex::new(Books {
                waiting,
                history: Vec::new(),
                commits: 0,
                next_op: 0,
            }),
        }
    }

    /// Number of records the container owns.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// The deadlock detection strategy in use.
    #[must_use]
    pub fn detector(&self) -> DeadlockDetector {
        self.detector
    }

    /// Current commit counter.
    ///
    /// Monotonic and consistent across threads; it advances only under the
    /// metadata lock, by exactly one per successful commit.
    #[must_use]
    pub fn order(&self) -> CommitOrder {
        CommitOrder::new(self.books.lock().commits)
    }

    /// Snapshot of all record values, read without taking record locks.
    /// Intended for quiescent inspection; values read while transactions
    /// are in flight may be mid-update.
    #[must_use]
    pub fn values(&self) -> Vec<i64> {
        self.records.iter().map(Record::get).collect()
    }

    /// Builds a three-step transaction: read record `i`, add the read
    /// value plus one to record `j`, subtract the read value from record
    /// `k`. Steps acquire strictly in i, j, k order.
    ///
    /// On success every lock is still held and the returned [`BuildId`]
    /// names the parked triple for [`commit`](Container::commit). On any
    /// failure every acquired operation is undone and released in reverse
    /// order; [`Deadlock`](EngineError::Deadlock) and
    /// [`Overflow`](EngineError::Overflow) are retryable with a fresh
    /// triple.
    ///
    /// `i`, `j`, and `k` must be pairwise distinct; violating that is the
    /// caller's error and is only debug-asserted.
    pub fn transaction(
        &self,
        worker: WorkerId,
        i: usize,
        j: usize,
        k: usize,
    ) -> EngineResult<BuildId> {
        self.ensure_index(i)?;
        self.ensure_index(j)?;
        self.ensure_index(k)?;
        debug_assert!(
            i != j && i != k && j != k,
            "record indices must be pairwise distinct"
        );

        let mut read = self.begin_step(worker, i, OpKind::Read, None)?;
        let value = match read.execute(&self.records[i], 0) {
            Ok(value) => value,
            Err(err) => {
                self.rollback(vec![read]);
                return Err(err);
            }
        };

        let mut add = match self.begin_step(worker, j, OpKind::Write, Some((read.id(), i))) {
            Ok(op) => op,
            Err(err) => {
                self.rollback(vec![read]);
                return Err(err);
            }
        };
        if let Err(err) = add.execute(&self.records[j], value.wrapping_add(1)) {
            self.rollback(vec![read, add]);
            return Err(err);
        }

        let mut sub = match self.begin_step(worker, k, OpKind::Write, Some((add.id(), j))) {
            Ok(op) => op,
            Err(err) => {
                self.rollback(vec![read, add]);
                return Err(err);
            }
        };
        if let Err(err) = sub.execute(&self.records[k], value.wrapping_neg()) {
            self.rollback(vec![read, add, sub]);
            return Err(err);
        }

        let mut books = self.books.lock();
        let build = BuildId::new(books.history.len() as u64);
        books.history.push(Some(BuiltTransaction { read, add, sub }));
        tracing::trace!(%worker, %build, "transaction built");
        Ok(build)
    }

    /// Commits a built transaction: releases its three locks, removes its
    /// wait-list entries, advances the commit counter, and invokes
    /// `callback` exactly once with the assigned order and final values —
    /// all under the metadata lock, so callbacks observe a total order
    /// consistent with commit completion.
    ///
    /// An unknown or already-committed build ID fails with
    /// [`InvalidArgument`](EngineError::InvalidArgument) and the callback
    /// does not run.
    pub fn commit<F>(&self, build: BuildId, callback: F) -> EngineResult<CommitOrder>
    where
        F: FnOnce(CommitInfo),
    {
        let mut books = self.books.lock();
        let slot = books
            .history
            .get_mut(build.as_u64() as usize)
            .ok_or_else(|| EngineError::invalid_argument(format!("unknown {build}")))?;
        let built = slot
            .take()
            .ok_or_else(|| EngineError::invalid_argument(format!("{build} already committed")))?;
        let BuiltTransaction {
            mut read,
            mut add,
            mut sub,
        } = built;

        for op in [&mut read, &mut add, &mut sub] {
            let record = &self.records[op.record_index()];
            op.release(record);
            books.remove_waiter(op.record_index(), op.id());
        }

        books.commits += 1;
        let order = CommitOrder::new(books.commits);
        tracing::debug!(%order, "transaction committed");
        callback(CommitInfo {
            order,
            read_index: read.record_index(),
            add_index: add.record_index(),
            sub_index: sub.record_index(),
            read_value: read.result(),
            add_value: add.result(),
            sub_value: sub.result(),
        });
        Ok(order)
    }

    /// Starts one transaction step: allocates the operation, runs the
    /// deadlock check when the lock is not immediately free, enqueues the
    /// wait-list entry, and acquires the record's lock — blocking only
    /// after the metadata lock is dropped.
    ///
    /// The lock-queue registration happens under the metadata lock so that
    /// a record's wait list and its lock's arrival queue always agree on
    /// ordering; the deadlock check depends on that agreement.
    fn begin_step(
        &self,
        worker: WorkerId,
        record: usize,
        kind: OpKind,
        prev: Option<(OpId, usize)>,
    ) -> EngineResult<Operation> {
        let mut op;
        let acquired_early;
        {
            let mut books = self.books.lock();
            let id = OpId::new(books.next_op);
            books.next_op += 1;
            op = Operation::new(id, worker, record, kind);

            acquired_early = self.records[record].try_acquire(kind, worker);
            if !acquired_early {
                if self
                    .detector
                    .would_deadlock(&books.waiting, worker, kind, record)
                {
                    return Err(EngineError::Deadlock { worker, record });
                }
                self.records[record].register(kind, worker);
            }

            // Wire the previous step's dependency as this one begins waiting.
            if let Some((prev_op, prev_record)) = prev {
                books.link_dependency(prev_op, prev_record, OpLink { op: id, record });
            }
            books.waiting[record].push_back(WaitEntry {
                op: id,
                worker,
                kind,
                depends_on: None,
            });
        }
        if !acquired_early {
            self.records[record].wait_granted(kind, worker);
        }
        op.mark_acquired();
        Ok(op)
    }

    /// Undoes and releases the given operations in reverse order and drops
    /// their wait-list entries. Every abort path funnels its acquired
    /// operations through here, so no abort can leak a lock or a written
    /// value.
    fn rollback(&self, ops: Vec<Operation>) {
        let mut books = self.books.lock();
        tracing::trace!(steps = ops.len(), "rolling back partial transaction");
        for mut op in ops.into_iter().rev() {
            let record = &self.records[op.record_index()];
            if op.is_executed() {
                // Undo cannot fail once the operation has executed.
                let _ = op.undo(record);
            }
            op.release(record);
            books.remove_waiter(op.record_index(), op.id());
        }
    }

    fn ensure_index(&self, index: usize) -> EngineResult<()> {
        if index >= self.records.len() {
            return Err(EngineError::invalid_argument(format!(
                "record index {index} out of range for {} records",
                self.records.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn small_container(initial: i64) -> Container {
        Container::new(
            ContainerConfig::new()
                .records(3)
                .initial_value(initial),
        )
    }

    #[test]
    fn reference_scenario() {
        let container = small_container(10);
        let build = container
            .transaction(WorkerId::new(0), 0, 1, 2)
            .unwrap();

        let mut seen = None;
        let order = container
            .commit(build, |info| seen = Some(info))
            .unwrap();

        assert_eq!(order, CommitOrder::new(1));
        let info = seen.unwrap();
        assert_eq!(info.order, CommitOrder::new(1));
        assert_eq!(
            (info.read_index, info.add_index, info.sub_index),
            (0, 1, 2)
        );
        assert_eq!(
            (info.read_value, info.add_value, info.sub_value),
            (10, 21, 0)
        );
        assert_eq!(container.values(), vec![10, 21, 0]);
        assert_eq!(container.values().iter().sum::<i64>(), 31);
    }

    #[test]
    fn each_commit_adds_net_one() {
        let container = small_container(10);
        let before: i64 = container.values().iter().sum();

        for step in 0..30u64 {
            let (i, j, k) = match step % 3 {
                0 => (0, 1, 2),
                1 => (1, 2, 0),
                _ => (2, 0, 1),
            };
            let build = container
                .transaction(WorkerId::new(0), i, j, k)
                .unwrap();
            container.commit(build, |_| {}).unwrap();
        }

        let after: i64 = container.values().iter().sum();
        assert_eq!(after, before + 30);
        assert_eq!(container.order(), CommitOrder::new(30));
    }

    #[test]
    fn double_commit_is_invalid_and_callback_fires_once() {
        let container = small_container(10);
        let build = container
            .transaction(WorkerId::new(0), 0, 1, 2)
            .unwrap();

        let mut calls = 0;
        container.commit(build, |_| calls += 1).unwrap();
        let err = container.commit(build, |_| calls += 1).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn unknown_build_id_is_invalid_argument() {
        let container = small_container(10);
        let err = container
            .commit(BuildId::new(99), |_| panic!("callback must not run"))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
    }

    #[test]
    fn out_of_range_index_is_invalid_argument() {
        let container = small_container(10);
        let err = container
            .transaction(WorkerId::new(0), 0, 1, 7)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
        // Nothing may be left acquired after the failed call.
        let build = container.transaction(WorkerId::new(1), 0, 1, 2).unwrap();
        container.commit(build, |_| {}).unwrap();
    }

    #[test]
    fn overflow_aborts_and_restores_all_values() {
        let container = small_container(i64::MAX - 1);
        let before = container.values();

        let err = container
            .transaction(WorkerId::new(0), 0, 1, 2)
            .unwrap_err();
        assert!(matches!(err, EngineError::Overflow { .. }));
        assert_eq!(container.values(), before);

        // All locks were released by the rollback.
        let build = container.transaction(WorkerId::new(1), 2, 1, 0);
        // The retry overflows too (same values), but must again leave no
        // locks behind rather than wedge.
        assert!(build.is_err());
        assert_eq!(container.values(), before);
    }

    #[test]
    fn order_is_zero_before_any_commit() {
        let container = small_container(10);
        assert_eq!(container.order(), CommitOrder::new(0));
    }

    #[test]
    fn concurrent_disjoint_transactions_all_complete() {
        let container = Arc::new(Container::new(
            ContainerConfig::new().records(12).initial_value(100),
        ));

        let mut handles = Vec::new();
        for worker in 0..4usize {
            let container = Arc::clone(&container);
            handles.push(thread::spawn(move || {
                let base = worker * 3;
                for _ in 0..50 {
                    let build = container
                        .transaction(WorkerId::new(worker as u64), base, base + 1, base + 2)
                        .expect("disjoint transactions never conflict");
                    container.commit(build, |_| {}).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(container.order(), CommitOrder::new(200));
        let sum: i64 = container.values().iter().sum();
        assert_eq!(sum, 12 * 100 + 200);
    }

    #[test]
    fn crossed_writes_fail_with_deadlock_not_a_hang() {
        let container = Arc::new(small_container(100));
        let stop = Arc::new(AtomicBool::new(false));
        let deadlocks = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for (worker, (j, k)) in [(0usize, (0, 1)), (1, (1, 0))] {
            let container = Arc::clone(&container);
            let stop = Arc::clone(&stop);
            let deadlocks = Arc::clone(&deadlocks);
            handles.push(thread::spawn(move || {
                // Both workers read record 2 then write 0/1 in opposite
                // orders, so crossed holds arise constantly.
                for _ in 0..200_000 {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    match container.transaction(WorkerId::new(worker as u64), 2, j, k) {
                        Ok(build) => {
                            container.commit(build, |_| {}).unwrap();
                        }
                        Err(EngineError::Deadlock { .. }) => {
                            deadlocks.fetch_add(1, Ordering::Relaxed);
                            stop.store(true, Ordering::Relaxed);
                            break;
                        }
                        Err(err) => panic!("unexpected failure: {err}"),
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(
            deadlocks.load(Ordering::Relaxed) > 0,
            "crossed write orders never tripped the detector"
        );
    }
}
