//! Arrival-ordered reader/writer lock.

use crate::types::WorkerId;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// Kind of a queued lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Reader,
    Writer,
}

/// One entry in the arrival queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    kind: Kind,
    id: WorkerId,
}

#[derive(Debug, Default)]
struct State {
    /// Arrival queue. Entries are appended at request time and removed by
    /// the matching unlock, so active holders keep their entries while held.
    queue: VecDeque<Entry>,
    /// Whether a writer currently holds the lock.
    writing: bool,
    /// Number of readers currently holding the lock.
    readers: usize,
}

impl State {
    /// The queue front is this writer's own request.
    fn writer_at_head(&self, id: WorkerId) -> bool {
        matches!(
            self.queue.front(),
            Some(e) if e.kind == Kind::Writer && e.id == id
        )
    }

    /// Some writer arrived before this reader's request.
    fn writer_ahead_of(&self, id: WorkerId) -> bool {
        for entry in &self.queue {
            match entry.kind {
                Kind::Writer => return true,
                Kind::Reader if entry.id == id => return false,
                Kind::Reader => {}
            }
        }
        false
    }

    fn remove_first(&mut self, kind: Kind) {
        if let Some(pos) = self.queue.iter().position(|e| e.kind == kind) {
            self.queue.remove(pos);
        }
    }

    fn remove_entry(&mut self, kind: Kind, id: WorkerId) {
        if let Some(pos) = self
            .queue
            .iter()
            .position(|e| e.kind == kind && e.id == id)
        {
            self.queue.remove(pos);
        }
    }
}

/// A reader/writer lock that grants requests in arrival order.
///
/// Every request — blocking or try — is appended to a single arrival queue.
/// A writer proceeds only once its entry reaches the queue head, which means
/// every earlier arrival (reader or writer) has already released. A reader
/// proceeds only once no writer entry is ahead of it, so readers can neither
/// starve writers nor jump ahead of one that arrived first.
///
/// The lock is advisory: it does not wrap the protected data. A requester
/// may have at most one pending request per lock at a time.
#[derive(Debug, Default)]
pub struct FairRwLock {
    state: Mutex<State>,
    waiters: Condvar,
}

impl FairRwLock {
    /// Creates a new unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock exclusively, blocking until granted.
    pub fn lock(&self, id: WorkerId) {
        self.register_writer(id);
        self.wait_writer(id);
    }

    /// Appends an exclusive request to the arrival queue without waiting.
    ///
    /// Callers that need the arrival position fixed while holding external
    /// bookkeeping locks register first and call
    /// [`wait_writer`](FairRwLock::wait_writer) once those are dropped.
    pub(crate) fn register_writer(&self, id: WorkerId) {
        self.state.lock().queue.push_back(Entry {
            kind: Kind::Writer,
            id,
        });
    }

    /// Blocks until a previously registered exclusive request is granted.
    pub(crate) fn wait_writer(&self, id: WorkerId) {
        let mut state = self.state.lock();
        while !state.writer_at_head(id) {
            self.waiters.wait(&mut state);
        }
        // At the head every earlier arrival has released.
        debug_assert!(!state.writing && state.readers == 0);
        state.writing = true;
    }

    /// Attempts to acquire the lock exclusively without blocking.
    ///
    /// Succeeds only when the arrival queue is empty, and registers the
    /// requester in the queue on success.
    pub fn try_lock(&self, id: WorkerId) -> bool {
        let mut state = self.state.lock();
        if !state.queue.is_empty() {
            return false;
        }
        state.queue.push_back(Entry {
            kind: Kind::Writer,
            id,
        });
        state.writing = true;
        true
    }

    /// Releases an exclusive hold and wakes waiters.
    pub fn unlock(&self) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.writing);
            state.writing = false;
            state.remove_first(Kind::Writer);
        }
        self.waiters.notify_all();
    }

    /// Acquires the lock shared, blocking until granted.
    pub fn lock_shared(&self, id: WorkerId) {
        self.register_reader(id);
        self.wait_reader(id);
    }

    /// Appends a shared request to the arrival queue without waiting.
    pub(crate) fn register_reader(&self, id: WorkerId) {
        self.state.lock().queue.push_back(Entry {
            kind: Kind::Reader,
            id,
        });
    }

    /// Blocks until a previously registered shared request is granted.
    pub(crate) fn wait_reader(&self, id: WorkerId) {
        let mut state = self.state.lock();
        while state.writer_ahead_of(id) {
            self.waiters.wait(&mut state);
        }
        state.readers += 1;
    }

    /// Attempts to acquire the lock shared without blocking.
    ///
    /// Succeeds only when no writer is queued or active, and registers the
    /// requester in the queue on success.
    pub fn try_lock_shared(&self, id: WorkerId) -> bool {
        let mut state = self.state.lock();
        if state.queue.iter().any(|e| e.kind == Kind::Writer) {
            return false;
        }
        state.queue.push_back(Entry {
            kind: Kind::Reader,
            id,
        });
        state.readers += 1;
        true
    }

    /// Releases a shared hold, removing the caller's own queue entry, and
    /// wakes waiters.
    ///
    /// The entry must be removed by identity: several readers hold the
    /// lock at once, and removing another reader's entry would let that
    /// reader's next request alias the stale entry and jump a queued
    /// writer.
    pub fn unlock_shared(&self, id: WorkerId) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.readers > 0);
            state.remove_entry(Kind::Reader, id);
            state.readers -= 1;
        }
        self.waiters.notify_all();
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }
}
