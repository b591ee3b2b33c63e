//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for a pairwise-distinct `(i, j, k)` triple in `[0, records)`.
///
/// `records` must be at least 3.
pub fn distinct_triple(records: usize) -> impl Strategy<Value = (usize, usize, usize)> {
    (0..records, 0..records, 0..records)
        .prop_filter("indices must be pairwise distinct", |(i, j, k)| {
            i != j && i != k && j != k
        })
}

/// Strategy for per-record initial values that keep several thousand
/// commits comfortably inside the i64 range.
pub fn initial_values(records: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(-1_000_000i64..1_000_000, records)
}
