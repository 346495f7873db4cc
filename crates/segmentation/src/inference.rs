//! Column type inference — classifies each column as numeric, categorical,
//! date, or text from its non-null values.

use std::collections::HashSet;

use datalens_core::config::InferenceConfig;
use datalens_core::value::{display_string, parse_float};
use datalens_core::Dataset;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::predicates::FilterOperator;

static DATE_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("valid ISO date pattern"),
        Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}").expect("valid US date pattern"),
        Regex::new(r"^\d{1,2}-\d{1,2}-\d{4}").expect("valid dashed date pattern"),
    ]
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Date,
    Text,
}

impl ColumnKind {
    /// Filter operators that make sense for this kind of column.
    pub fn allowed_operators(&self) -> &'static [FilterOperator] {
        use FilterOperator::*;
        match self {
            ColumnKind::Numeric => &[Equals, NotEquals, GreaterThan, LessThan, Between],
            ColumnKind::Categorical => &[Equals, NotEquals, InList],
            ColumnKind::Date => &[Equals, NotEquals, GreaterThan, LessThan, DateBetween],
            ColumnKind::Text => &[Equals, NotEquals, Contains],
        }
    }

    pub fn allows(&self, operator: &FilterOperator) -> bool {
        self.allowed_operators().contains(operator)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Date => "date",
            ColumnKind::Text => "text",
        }
    }
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    pub unique_value_count: usize,
}

impl ColumnProfile {
    fn new(name: &str, kind: ColumnKind, unique_value_count: usize) -> Self {
        Self {
            name: name.to_string(),
            kind,
            min_value: None,
            max_value: None,
            categories: None,
            unique_value_count,
        }
    }
}

pub struct ColumnInferencer {
    config: InferenceConfig,
}

impl ColumnInferencer {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    /// Profile every column of the dataset, in column-list order.
    pub fn infer_columns(&self, dataset: &Dataset) -> Vec<ColumnProfile> {
        dataset
            .columns
            .iter()
            .map(|name| {
                let values: Vec<&serde_json::Value> = dataset.column_values(name).collect();
                self.infer_column(name, &values, dataset.len())
            })
            .collect()
    }

    /// Classify one column from its non-null values. `row_count` is the size of
    /// the whole dataset and bounds the categorical threshold.
    pub fn infer_column(
        &self,
        name: &str,
        values: &[&serde_json::Value],
        row_count: usize,
    ) -> ColumnProfile {
        let mut seen = HashSet::new();
        let mut distinct = Vec::new();
        for value in values {
            // JSON rendering keeps 1 and "1" apart.
            if seen.insert(value.to_string()) {
                distinct.push(*value);
            }
        }
        let unique = distinct.len();

        if values.is_empty() {
            debug!(column = name, "Empty column, classified as text");
            return ColumnProfile::new(name, ColumnKind::Text, 0);
        }

        if self.looks_like_dates(values) {
            return ColumnProfile::new(name, ColumnKind::Date, unique);
        }

        let parsed: Vec<f64> = values
            .iter()
            .map(|v| parse_float(v))
            .filter(|f| !f.is_nan())
            .collect();
        let numeric_share = parsed.len() as f64 / values.len() as f64;
        if numeric_share >= self.config.numeric_threshold {
            let mut profile = ColumnProfile::new(name, ColumnKind::Numeric, unique);
            profile.min_value = parsed.iter().copied().reduce(f64::min);
            profile.max_value = parsed.iter().copied().reduce(f64::max);
            return profile;
        }

        let categorical_cap = (self.config.categorical_limit as f64)
            .min(self.config.categorical_ratio * row_count as f64);
        if unique as f64 <= categorical_cap {
            let mut profile = ColumnProfile::new(name, ColumnKind::Categorical, unique);
            profile.categories = Some(
                distinct
                    .iter()
                    .take(self.config.categorical_limit)
                    .map(|v| display_string(v))
                    .collect(),
            );
            return profile;
        }

        ColumnProfile::new(name, ColumnKind::Text, unique)
    }

    fn looks_like_dates(&self, values: &[&serde_json::Value]) -> bool {
        values
            .iter()
            .take(self.config.date_sample_size)
            .filter_map(|v| v.as_str())
            .any(|s| DATE_PATTERNS.iter().any(|re| re.is_match(s)))
    }
}

impl Default for ColumnInferencer {
    fn default() -> Self {
        Self::new(InferenceConfig::default())
    }
}

/// Profile every column with default thresholds.
pub fn infer_columns(dataset: &Dataset) -> Vec<ColumnProfile> {
    ColumnInferencer::default().infer_columns(dataset)
}
