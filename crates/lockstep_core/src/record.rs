//! A single numeric record cell and its lock.

use crate::lock::FairRwLock;
use crate::operation::OpKind;
use crate::types::WorkerId;
use std::sync::atomic::{AtomicI64, Ordering};

/// A mutable numeric cell guarded by a [`FairRwLock`].
///
/// The lock is advisory: callers must hold at least a shared lock to call
/// [`get`](Record::get) and the exclusive lock to call [`add`](Record::add)
/// or [`reset`](Record::reset). The cell itself is an atomic so that the
/// value stays data-race-free even if the protocol is violated; logical
/// exclusion comes from the lock.
#[derive(Debug)]
pub struct Record {
    value: AtomicI64,
    lock: FairRwLock,
}

impl Record {
    /// Creates a record holding `value`.
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self {
            value: AtomicI64::new(value),
            lock: FairRwLock::new(),
        }
    }

    /// Returns the current value. Caller must hold at least a shared lock.
    #[must_use]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Adds `delta` (wrapping) and returns the pre-add value.
    /// Caller must hold the exclusive lock.
    ///
    /// Overflow is detected by the caller from the returned origin; the
    /// wrapped value stays in place until the caller undoes it.
    pub fn add(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::SeqCst)
    }

    /// Restores `origin`, undoing a prior write.
    /// Caller must hold the exclusive lock.
    pub fn reset(&self, origin: i64) {
        self.value.store(origin, Ordering::SeqCst);
    }

    /// Acquires this record's lock in the mode `kind` requires,
    /// blocking until granted.
    pub fn acquire(&self, kind: OpKind, id: WorkerId) {
        match kind {
            OpKind::Read => self.lock.lock_shared(id),
            OpKind::Write => self.lock.lock(id),
        }
    }

    /// Attempts a non-blocking acquisition in the mode `kind` requires.
    pub fn try_acquire(&self, kind: OpKind, id: WorkerId) -> bool {
        match kind {
            OpKind::Read => self.lock.try_lock_shared(id),
            OpKind::Write => self.lock.try_lock(id),
        }
    }

    /// Registers a request in the lock's arrival queue without waiting,
    /// so the queue position is fixed while the caller still holds its
    /// own bookkeeping lock. Must be paired with
    /// [`wait_granted`](Record::wait_granted).
    pub(crate) fn register(&self, kind: OpKind, id: WorkerId) {
        match kind {
            OpKind::Read => self.lock.register_reader(id),
            OpKind::Write => self.lock.register_writer(id),
        }
    }

    /// Blocks until a request registered via [`register`](Record::register)
    /// is granted.
    pub(crate) fn wait_granted(&self, kind: OpKind, id: WorkerId) {
        match kind {
            OpKind::Read => self.lock.wait_reader(id),
            OpKind::Write => self.lock.wait_writer(id),
        }
    }

    /// Releases the lock held in the mode `kind` requires, removing the
    /// caller's arrival-queue entry.
    pub fn release(&self, kind: OpKind, id: WorkerId) {
        match kind {
            OpKind::Read => self.lock.unlock_shared(id),
            OpKind::Write => self.lock.unlock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_returns_origin() {
        let record = Record::new(10);
        assert_eq!(record.add(5), 10);
        assert_eq!(record.get(), 15);
    }

    #[test]
    fn reset_restores_origin() {
        let record = Record::new(10);
        record.add(32);
        record.reset(10);
        assert_eq!(record.get(), 10);
    }

    #[test]
    fn add_wraps_at_the_numeric_edge() {
        let record = Record::new(i64::MAX);
        let origin = record.add(1);
        assert_eq!(origin, i64::MAX);
        assert_eq!(record.get(), i64::MIN);
        record.reset(origin);
        assert_eq!(record.get(), i64::MAX);
    }

    #[test]
    fn lock_dispatch_by_kind() {
        let record = Record::new(0);
        let a = WorkerId::new(0);
        let b = WorkerId::new(1);

        assert!(record.try_acquire(OpKind::Read, a));
        assert!(record.try_acquire(OpKind::Read, b));
        record.release(OpKind::Read, a);
        record.release(OpKind::Read, b);

        assert!(record.try_acquire(OpKind::Write, a));
        assert!(!record.try_acquire(OpKind::Read, b));
        record.release(OpKind::Write, a);
    }
}
