//! Deadlock detection over the container's wait lists.

use crate::container::{OpLink, WaitEntry};
use crate::operation::OpKind;
use crate::types::WorkerId;
use std::collections::{HashSet, VecDeque};

/// Strategy used to refuse lock requests that would close a wait cycle.
///
/// Both strategies run under the container's metadata lock, before the
/// requester enqueues, and treat every earlier entry in a record's wait
/// list as blocking every later one. That approximation can refuse a
/// request that would not actually have deadlocked (the abort is
/// retryable), but it never misses a real cycle the strategy can see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeadlockDetector {
    /// Breadth-first search over the worker wait-for graph implied by the
    /// wait lists. Complete for every transaction topology the container
    /// can produce; cost is proportional to the total number of queued
    /// operations.
    #[default]
    WaitGraph,
    /// Walk of the dependency chain hanging off the target record's newest
    /// waiter. Cheaper, but specialized to the fixed three-step transaction
    /// shape and not complete for arbitrary topologies.
    ChainWalk,
}

impl DeadlockDetector {
    /// Whether granting `worker` a `kind` request on `record`'s wait list
    /// would close a wait-for cycle.
    pub(crate) fn would_deadlock(
        self,
        lists: &[VecDeque<WaitEntry>],
        worker: WorkerId,
        kind: OpKind,
        record: usize,
    ) -> bool {
        let hit = match self {
            Self::WaitGraph => wait_graph_cycle(lists, worker, kind, record),
            Self::ChainWalk => chain_walk_cycle(lists, worker, record),
        };
        if hit {
            tracing::debug!(%worker, record, detector = ?self, "wait cycle detected");
        }
        hit
    }
}

/// Two queued requests conflict unless both are reads.
fn conflicts(a: OpKind, b: OpKind) -> bool {
    a == OpKind::Write || b == OpKind::Write
}

/// BFS from the workers already queued on the target record: if any of them
/// (transitively) waits on `worker`, the new request would close a cycle.
///
/// Edges: a wait-list entry waits on the worker of every conflicting entry
/// ahead of it in the same list.
fn wait_graph_cycle(
    lists: &[VecDeque<WaitEntry>],
    worker: WorkerId,
    kind: OpKind,
    record: usize,
) -> bool {
    let mut frontier: VecDeque<WorkerId> = VecDeque::new();
    let mut visited: HashSet<WorkerId> = HashSet::new();
    for entry in &lists[record] {
        if entry.worker == worker || !conflicts(kind, entry.kind) {
            continue;
        }
        if visited.insert(entry.worker) {
            frontier.push_back(entry.worker);
        }
    }

    while let Some(current) = frontier.pop_front() {
        for list in lists {
            for (pos, entry) in list.iter().enumerate() {
                if entry.worker != current {
                    continue;
                }
                for ahead in list.iter().take(pos) {
                    if !conflicts(entry.kind, ahead.kind) {
                        continue;
                    }
                    if ahead.worker == worker {
                        return true;
                    }
                    if visited.insert(ahead.worker) {
                        frontier.push_back(ahead.worker);
                    }
                }
            }
        }
    }
    false
}

/// The specialized chain walk: start at the target record's newest waiter,
/// hop along its transaction's dependency links to the operation actually
/// waiting, then continue from that entry's predecessor in its own record's
/// wait list. Reaching an entry owned by `worker` means the new request
/// would wait, directly or indirectly, on itself.
fn chain_walk_cycle(lists: &[VecDeque<WaitEntry>], worker: WorkerId, record: usize) -> bool {
    if lists[record].is_empty() {
        return false;
    }
    // Each step consumes a distinct wait-list entry.
    let mut fuel: usize = lists.iter().map(VecDeque::len).sum();
    let mut rec = record;
    let mut pos = lists[record].len() - 1;

    while fuel > 0 {
        fuel -= 1;
        let entry = &lists[rec][pos];
        if entry.worker == worker {
            return true;
        }
        let Some(link) = entry.depends_on else {
            return false;
        };
        let Some((chain_rec, chain_pos)) = chain_end(lists, link) else {
            return false;
        };
        if lists[chain_rec][chain_pos].worker == worker {
            return true;
        }
        if chain_pos == 0 {
            return false;
        }
        rec = chain_rec;
        pos = chain_pos - 1;
    }
    false
}

/// Follows dependency links to the most recently begun operation of a
/// transaction and locates it in its own record's wait list.
fn chain_end(lists: &[VecDeque<WaitEntry>], mut link: OpLink) -> Option<(usize, usize)> {
    loop {
        let pos = lists[link.record].iter().position(|e| e.op == link.op)?;
        match lists[link.record][pos].depends_on {
            Some(next) => link = next,
            None => return Some((link.record, pos)),
        }
    }
}
