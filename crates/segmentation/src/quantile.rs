//! Quantile binning on a single numeric column.

use datalens_core::value::finite_float;
use datalens_core::{value_of, Row};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct QuantileFit {
    /// Bucket per input row; `None` when the row's value did not parse.
    pub assignments: Vec<Option<usize>>,
    pub buckets: usize,
    /// Ranks per bucket, `ceil(n / k)` over the parsed values.
    pub segment_size: usize,
}

impl QuantileFit {
    pub fn bucket_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.buckets];
        for bucket in self.assignments.iter().flatten() {
            sizes[*bucket] += 1;
        }
        sizes
    }

    pub fn excluded(&self) -> usize {
        self.assignments.iter().filter(|a| a.is_none()).count()
    }
}

/// Sort the parsed values of `column` and cut them into `k` rank-ordered
/// buckets of `ceil(n / k)` ranks each.
///
/// A row's rank is the first position of its value in the sorted order, so
/// equal values always share a bucket and the buckets after a run of
/// duplicates may come out smaller than `segment_size`.
pub fn quantile_buckets(rows: &[Row], column: &str, k: usize) -> QuantileFit {
    let k = k.max(1);
    let values: Vec<Option<f64>> = rows
        .iter()
        .map(|row| finite_float(value_of(row, column)))
        .collect();

    let mut sorted: Vec<f64> = values.iter().flatten().copied().collect();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let segment_size = n.div_ceil(k).max(1);

    let assignments = values
        .iter()
        .map(|value| {
            value.map(|v| {
                let position = sorted.partition_point(|x| *x < v);
                (position / segment_size).min(k - 1)
            })
        })
        .collect();

    debug!(
        column,
        k,
        parsed = n,
        excluded = rows.len() - n,
        segment_size,
        "Quantile buckets computed"
    );

    QuantileFit {
        assignments,
        buckets: k,
        segment_size,
    }
}
