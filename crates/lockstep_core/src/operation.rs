//! A single READ or WRITE step within a transaction.

use crate::error::{EngineError, EngineResult};
use crate::record::Record;
use crate::types::{OpId, WorkerId};

/// Kind of access an operation performs on its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Shared read of the record value.
    Read,
    /// Exclusive read-modify-write of the record value.
    Write,
}

/// Lifecycle of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum OpState {
    Created,
    Acquired,
    Executed,
    Released,
}

/// One request against one record within one transaction.
///
/// Operations are created by the container when a transaction step begins,
/// executed once their lock is acquired, undone and released on abort, and
/// released permanently at commit.
#[derive(Debug)]
pub struct Operation {
    id: OpId,
    worker: WorkerId,
    record: usize,
    kind: OpKind,
    state: OpState,
    origin: i64,
    result: i64,
}

impl Operation {
    pub(crate) fn new(id: OpId, worker: WorkerId, record: usize, kind: OpKind) -> Self {
        Self {
            id,
            worker,
            record,
            kind,
            state: OpState::Created,
            origin: 0,
            result: 0,
        }
    }

    /// Returns the operation's bookkeeping ID.
    #[must_use]
    pub fn id(&self) -> OpId {
        self.id
    }

    /// Returns the owning worker.
    #[must_use]
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Returns the index of the record this operation targets.
    #[must_use]
    pub fn record_index(&self) -> usize {
        self.record
    }

    /// Returns the kind of access.
    #[must_use]
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// Value of the record when this operation executed.
    #[must_use]
    pub fn origin(&self) -> i64 {
        self.origin
    }

    /// Value this operation evaluated to: the read value for a READ,
    /// the post-write value for a WRITE.
    #[must_use]
    pub fn result(&self) -> i64 {
        self.result
    }

    /// Whether the operation has executed (and may therefore be undone).
    #[must_use]
    pub fn is_executed(&self) -> bool {
        self.state >= OpState::Executed
    }

    /// Marks the operation's lock as held. Called once acquisition succeeds.
    pub(crate) fn mark_acquired(&mut self) {
        debug_assert_eq!(self.state, OpState::Created);
        self.state = OpState::Acquired;
    }

    /// Executes the operation against its record.
    ///
    /// READ stores the current value as both origin and result. WRITE adds
    /// `delta`, keeping the pre-add value as origin; if the add leaves the
    /// i64 range the mutation stays applied and `Overflow` is returned, so
    /// the caller must undo using the origin.
    pub(crate) fn execute(&mut self, record: &Record, delta: i64) -> EngineResult<i64> {
        if self.state != OpState::Acquired {
            return Err(EngineError::invalid_state(format!(
                "execute on {} without a held lock",
                self.id
            )));
        }
        match self.kind {
            OpKind::Read => {
                self.origin = record.get();
                self.result = self.origin;
                self.state = OpState::Executed;
                Ok(self.result)
            }
            OpKind::Write => {
                self.origin = record.add(delta);
                self.result = self.origin.wrapping_add(delta);
                self.state = OpState::Executed;
                if self.origin.checked_add(delta).is_none() {
                    return Err(EngineError::Overflow {
                        record: self.record,
                        origin: self.origin,
                        delta,
                    });
                }
                Ok(self.result)
            }
        }
    }

    /// Undoes an executed operation. READ is a no-op; WRITE restores the
    /// origin value. Fails with `InvalidState` before execution.
    pub(crate) fn undo(&self, record: &Record) -> EngineResult<()> {
        if self.state != OpState::Executed {
            return Err(EngineError::invalid_state(format!(
                "undo of {} before execution",
                self.id
            )));
        }
        if self.kind == OpKind::Write {
            record.reset(self.origin);
        }
        Ok(())
    }

    /// Releases the held lock: shared for READ, exclusive for WRITE.
    /// No-op when no lock is held.
    pub(crate) fn release(&mut self, record: &Record) {
        if matches!(self.state, OpState::Acquired | OpState::Executed) {
            record.release(self.kind, self.worker);
            self.state = OpState::Released;
        }
    }
}
