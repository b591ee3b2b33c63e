//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Generates `count` pairwise-distinct index triples rotating through the
/// record space, so benchmark loops touch every record without an RNG in
/// the hot path.
pub fn rotating_triples(records: usize, count: usize) -> Vec<(usize, usize, usize)> {
    assert!(records >= 3, "a transaction spans 3 distinct records");
    (0..count)
        .map(|n| (n % records, (n + 1) % records, (n + 2) % records))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triples_are_pairwise_distinct() {
        for (i, j, k) in rotating_triples(5, 100) {
            assert!(i != j && i != k && j != k);
        }
    }
}
