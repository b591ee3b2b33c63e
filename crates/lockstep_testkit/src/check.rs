//! Audit log invariant checkers.
//!
//! Because every transaction holds all three of its locks until commit,
//! conflicting transactions serialize in commit order. The audit log must
//! therefore replay: applying each logged transaction in order against the
//! initial values reproduces every logged read and write value exactly.

use lockstep_core::CommitInfo;

/// Replays the audit log serially against the initial record values.
///
/// Verifies, per entry: contiguous commit order starting at one, the read
/// value, and both post-write values. Returns the final record state.
pub fn replay(initial: &[i64], entries: &[CommitInfo]) -> Result<Vec<i64>, String> {
    let mut state = initial.to_vec();
    for (n, entry) in entries.iter().enumerate() {
        let expected = n as u64 + 1;
        if entry.order.as_u64() != expected {
            return Err(format!(
                "commit order {} at log position {n}, expected {expected}",
                entry.order
            ));
        }
        if state[entry.read_index] != entry.read_value {
            return Err(format!(
                "{}: read {} from record {}, state held {}",
                entry.order, entry.read_value, entry.read_index, state[entry.read_index]
            ));
        }
        state[entry.add_index] += entry.read_value + 1;
        if state[entry.add_index] != entry.add_value {
            return Err(format!(
                "{}: record {} at {} after add, logged {}",
                entry.order, entry.add_index, state[entry.add_index], entry.add_value
            ));
        }
        state[entry.sub_index] -= entry.read_value;
        if state[entry.sub_index] != entry.sub_value {
            return Err(format!(
                "{}: record {} at {} after sub, logged {}",
                entry.order, entry.sub_index, state[entry.sub_index], entry.sub_value
            ));
        }
    }
    Ok(state)
}

/// Verifies that `commits` transactions moved the total by exactly
/// `commits` (each commit deposits the read value plus one and debits the
/// read value, net one).
pub fn check_sum(initial: &[i64], finals: &[i64], commits: u64) -> Result<(), String> {
    let before: i64 = initial.iter().sum();
    let after: i64 = finals.iter().sum();
    if after != before + commits as i64 {
        return Err(format!(
            "sum {after} after {commits} commits, expected {}",
            before + commits as i64
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::CommitOrder;

    fn entry(
        order: u64,
        (i, j, k): (usize, usize, usize),
        read: i64,
        add: i64,
        sub: i64,
    ) -> CommitInfo {
        CommitInfo {
            order: CommitOrder::new(order),
            read_index: i,
            add_index: j,
            sub_index: k,
            read_value: read,
            add_value: add,
            sub_value: sub,
        }
    }

    #[test]
    fn replay_accepts_the_reference_scenario() {
        let entries = vec![entry(1, (0, 1, 2), 10, 21, 0)];
        let finals = replay(&[10, 10, 10], &entries).unwrap();
        assert_eq!(finals, vec![10, 21, 0]);
        check_sum(&[10, 10, 10], &finals, 1).unwrap();
    }

    #[test]
    fn replay_rejects_a_skipped_order() {
        let entries = vec![
            entry(1, (0, 1, 2), 10, 21, 0),
            entry(3, (0, 1, 2), 10, 32, -10),
        ];
        let err = replay(&[10, 10, 10], &entries).unwrap_err();
        assert!(err.contains("expected 2"), "{err}");
    }

    #[test]
    fn replay_rejects_a_wrong_read() {
        let entries = vec![entry(1, (0, 1, 2), 11, 22, -1)];
        let err = replay(&[10, 10, 10], &entries).unwrap_err();
        assert!(err.contains("read"), "{err}");
    }

    #[test]
    fn replay_rejects_a_wrong_write() {
        let entries = vec![entry(1, (0, 1, 2), 10, 20, 0)];
        assert!(replay(&[10, 10, 10], &entries).is_err());
    }

    #[test]
    fn sum_check_rejects_a_drifted_total() {
        assert!(check_sum(&[10, 10, 10], &[10, 21, 1], 1).is_err());
    }
}
