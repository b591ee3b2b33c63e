//! Random pairwise-distinct record index generation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Draws pairwise-distinct record indices for the driver.
///
/// Candidates are redrawn until distinct, which is cheap while the record
/// count comfortably exceeds the triple size.
#[derive(Debug)]
pub struct IndexPicker {
    rng: StdRng,
    records: usize,
}

impl IndexPicker {
    /// Creates a picker over `records` indices seeded from OS entropy.
    #[must_use]
    pub fn new(records: usize) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            records,
        }
    }

    /// Creates a deterministic picker for reproducible runs.
    #[must_use]
    pub fn seeded(records: usize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            records,
        }
    }

    /// Returns `n` pairwise-distinct indices in `[0, records)`.
    ///
    /// `n` must not exceed the record count.
    pub fn next_distinct(&mut self, n: usize) -> Vec<usize> {
        debug_assert!(n <= self.records, "cannot draw {n} distinct of {}", self.records);
        let mut picked = Vec::with_capacity(n);
        while picked.len() < n {
            let candidate = self.rng.gen_range(0..self.records);
            if !picked.contains(&candidate) {
                picked.push(candidate);
            }
        }
        picked
    }

    /// Returns a pairwise-distinct `(i, j, k)` triple.
    pub fn next_triple(&mut self) -> (usize, usize, usize) {
        let picked = self.next_distinct(3);
        (picked[0], picked[1], picked[2])
    }
}
