//! Per-segment descriptive statistics.

use std::collections::HashMap;

use datalens_core::value::finite_float;
use datalens_core::{value_of, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentStats {
    pub count: usize,
    pub avg_values: HashMap<String, f64>,
    pub min_values: HashMap<String, f64>,
    pub max_values: HashMap<String, f64>,
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    sum: f64,
    min: f64,
    max: f64,
    n: usize,
}

impl Accumulator {
    fn new(x: f64) -> Self {
        Self {
            sum: x,
            min: x,
            max: x,
            n: 1,
        }
    }

    fn push(&mut self, x: f64) {
        self.sum += x;
        self.min = self.min.min(x);
        self.max = self.max.max(x);
        self.n += 1;
    }
}

/// Count plus avg/min/max for every column with at least one finite value
/// among `rows`. Columns without one are left out of the maps.
pub fn compute_stats<'a, I>(rows: I, columns: &[String]) -> SegmentStats
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut count = 0;
    let mut accumulators: Vec<Option<Accumulator>> = vec![None; columns.len()];

    for row in rows {
        count += 1;
        for (acc, column) in accumulators.iter_mut().zip(columns) {
            if let Some(x) = finite_float(value_of(row, column)) {
                match acc {
                    Some(a) => a.push(x),
                    None => *acc = Some(Accumulator::new(x)),
                }
            }
        }
    }

    let mut stats = SegmentStats {
        count,
        ..Default::default()
    };
    for (acc, column) in accumulators.into_iter().zip(columns) {
        if let Some(a) = acc {
            stats.avg_values.insert(column.clone(), a.sum / a.n as f64);
            stats.min_values.insert(column.clone(), a.min);
            stats.max_values.insert(column.clone(), a.max);
        }
    }
    stats
}

/// The subset of `columns` holding at least one finite numeric value.
pub fn usable_numeric_columns(rows: &[Row], columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .filter(|column| rows.iter().any(|row| finite_float(value_of(row, column)).is_some()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_basic_stats() {
        let rows = vec![
            row(&[("amount", json!(10)), ("qty", json!("2"))]),
            row(&[("amount", json!(30)), ("qty", json!("x"))]),
        ];
        let stats = compute_stats(&rows, &["amount".into(), "qty".into()]);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.avg_values["amount"], 20.0);
        assert_eq!(stats.min_values["amount"], 10.0);
        assert_eq!(stats.max_values["amount"], 30.0);
        assert_eq!(stats.avg_values["qty"], 2.0);
    }

    #[test]
    fn test_column_without_numbers_is_absent() {
        let rows = vec![row(&[("name", json!("bob"))])];
        let stats = compute_stats(&rows, &["name".into()]);
        assert_eq!(stats.count, 1);
        assert!(stats.avg_values.is_empty());
        assert!(!stats.min_values.contains_key("name"));
    }

    #[test]
    fn test_empty_segment() {
        let stats = compute_stats(&[] as &[Row], &["amount".into()]);
        assert_eq!(stats, SegmentStats::default());
    }

    #[test]
    fn test_usable_numeric_columns() {
        let rows = vec![
            row(&[("a", json!(1)), ("b", json!("text"))]),
            row(&[("a", serde_json::Value::Null), ("c", json!("3.5"))]),
        ];
        let usable = usable_numeric_columns(&rows, &["a".into(), "b".into(), "c".into()]);
        assert_eq!(usable, vec!["a".to_string(), "c".to_string()]);
    }
}
