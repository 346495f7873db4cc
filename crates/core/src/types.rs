use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single record: column name to scalar value.
pub type Row = HashMap<String, serde_json::Value>;

static NULL: serde_json::Value = serde_json::Value::Null;

/// Rows plus the authoritative column list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Build a dataset from rows alone; columns are taken in first-seen order.
    /// Keys within a row are visited in sorted order, since rows do not keep
    /// insertion order.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            let mut keys: Vec<&String> = row.keys().collect();
            keys.sort();
            for key in keys {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Non-null values of one column, in row order.
    pub fn column_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a serde_json::Value> {
        self.rows
            .iter()
            .map(move |row| value_of(row, name))
            .filter(|v| !v.is_null())
    }

    /// Same columns, different rows.
    pub fn with_rows(&self, rows: Vec<Row>) -> Self {
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }
}

/// Value of `column` in `row`; a missing key reads as null.
pub fn value_of<'a>(row: &'a Row, column: &str) -> &'a serde_json::Value {
    row.get(column).unwrap_or(&NULL)
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
    fn test_missing_key_is_null() {
        let r = row(&[("a", json!(1))]);
        assert_eq!(value_of(&r, "a"), &json!(1));
        assert!(value_of(&r, "b").is_null());
    }

    #[test]
    fn test_from_rows_collects_columns() {
        let ds = Dataset::from_rows(vec![
            row(&[("b", json!(1)), ("a", json!(2))]),
            row(&[("c", json!(3))]),
        ]);
        assert_eq!(ds.columns, vec!["a", "b", "c"]);
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn test_column_values_skip_nulls() {
        let ds = Dataset::new(
            vec!["x".into()],
            vec![
                row(&[("x", json!(1))]),
                row(&[("x", serde_json::Value::Null)]),
                row(&[]),
            ],
        );
        assert_eq!(ds.column_values("x").count(), 1);
    }
}
