//! Segmentation orchestrator — dispatches to a segmenter, then turns raw
//! assignments into labeled segments with statistics.

use std::collections::HashMap;

use datalens_core::config::MAX_SEGMENTS;
use datalens_core::{Dataset, EngineConfig, EngineError, EngineResult, Row};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::inference::{ColumnInferencer, ColumnProfile};
use crate::kmeans::{feature_vectors, KMeans};
use crate::labels::{self, SegmentLabel};
use crate::predicates::{self, FilterCondition};
use crate::quantile::quantile_buckets;
use crate::rules::rule_segments;
use crate::stats::{compute_stats, usable_numeric_columns, SegmentStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMethod {
    Kmeans,
    Hierarchical,
    Quantile,
    CustomRules,
}

/// The algorithm that actually runs for a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Centroid,
    Quantile,
    Rules,
}

// Hierarchical clustering runs the centroid path until it has its own.
const METHOD_STRATEGIES: [(SegmentationMethod, Strategy); 4] = [
    (SegmentationMethod::Kmeans, Strategy::Centroid),
    (SegmentationMethod::Hierarchical, Strategy::Centroid),
    (SegmentationMethod::Quantile, Strategy::Quantile),
    (SegmentationMethod::CustomRules, Strategy::Rules),
];

impl SegmentationMethod {
    pub fn strategy(&self) -> Strategy {
        METHOD_STRATEGIES
            .iter()
            .find(|(method, _)| method == self)
            .map(|(_, strategy)| *strategy)
            .unwrap_or(Strategy::Centroid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationConfig {
    pub method: SegmentationMethod,
    pub num_segments: usize,
    #[serde(default)]
    pub selected_columns: Vec<String>,
    #[serde(default)]
    pub custom_rules: Option<Vec<String>>,
}

impl SegmentationConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.num_segments == 0 || self.num_segments > MAX_SEGMENTS {
            return Err(EngineError::InvalidSegmentCount(self.num_segments));
        }
        if self.method.strategy() == Strategy::Rules
            && self.custom_rules.as_ref().map_or(true, Vec::is_empty)
        {
            return Err(EngineError::MissingRules);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub name: String,
    pub color: String,
    pub description: String,
    pub count: usize,
    pub avg_values: HashMap<String, f64>,
    pub min_values: HashMap<String, f64>,
    pub max_values: HashMap<String, f64>,
}

impl Segment {
    fn new(label: SegmentLabel, stats: SegmentStats) -> Self {
        Self {
            name: label.name,
            color: label.color,
            description: label.description,
            count: stats.count,
            avg_values: stats.avg_values,
            min_values: stats.min_values,
            max_values: stats.max_values,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationOutcome {
    pub method: SegmentationMethod,
    pub segments: Vec<Segment>,
    /// Segment index per input row; `None` for rows left out of every segment.
    pub assignments: Vec<Option<usize>>,
}

impl SegmentationOutcome {
    pub fn assigned_rows(&self) -> usize {
        self.assignments.iter().flatten().count()
    }

    /// Copies of `rows` with the segment name stored under `label_column`
    /// (null for unassigned rows).
    pub fn labeled_rows(&self, rows: &[Row], label_column: &str) -> Vec<Row> {
        rows.iter()
            .zip(&self.assignments)
            .map(|(row, assignment)| {
                let mut labeled = row.clone();
                let label = assignment
                    .and_then(|idx| self.segments.get(idx))
                    .map_or(serde_json::Value::Null, |s| {
                        serde_json::Value::String(s.name.clone())
                    });
                labeled.insert(label_column.to_string(), label);
                labeled
            })
            .collect()
    }
}

/// Profiles, filtered rows and segments from one filter-then-segment pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub profiles: Vec<ColumnProfile>,
    pub input_rows: usize,
    pub rows: Vec<Row>,
    pub outcome: SegmentationOutcome,
}

pub struct SegmentationEngine {
    config: EngineConfig,
}

impl SegmentationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn profile(&self, dataset: &Dataset) -> Vec<ColumnProfile> {
        ColumnInferencer::new(self.config.inference.clone()).infer_columns(dataset)
    }

    pub fn filter(&self, dataset: &Dataset, conditions: &[FilterCondition]) -> EngineResult<Dataset> {
        let rows = predicates::evaluate_filters(&dataset.rows, conditions)?;
        Ok(dataset.with_rows(rows))
    }

    /// Segment with the configured seed, or a fresh thread RNG when unset.
    pub fn segment(&self, dataset: &Dataset, config: &SegmentationConfig) -> EngineResult<Vec<Segment>> {
        Ok(self.run_seeded(dataset, config)?.segments)
    }

    pub fn run_seeded(
        &self,
        dataset: &Dataset,
        config: &SegmentationConfig,
    ) -> EngineResult<SegmentationOutcome> {
        match self.config.kmeans.seed {
            Some(seed) => self.run(dataset, config, &mut StdRng::seed_from_u64(seed)),
            None => self.run(dataset, config, &mut rand::thread_rng()),
        }
    }

    pub fn run<R: Rng + ?Sized>(
        &self,
        dataset: &Dataset,
        config: &SegmentationConfig,
        rng: &mut R,
    ) -> EngineResult<SegmentationOutcome> {
        config.validate()?;
        let strategy = config.method.strategy();
        let rows = &dataset.rows;
        let columns = &config.selected_columns;

        debug!(
            method = ?config.method,
            ?strategy,
            rows = rows.len(),
            k = config.num_segments,
            "Segmentation started"
        );

        if strategy != Strategy::Rules && usable_numeric_columns(rows, columns).is_empty() {
            info!(
                method = ?config.method,
                "No usable numeric columns selected, returning a single segment"
            );
            return Ok(all_data(config.method, rows));
        }

        let (assignments, segment_labels): (Vec<Option<usize>>, Vec<SegmentLabel>) = match strategy {
            Strategy::Centroid => {
                let k = config.num_segments;
                let points = feature_vectors(rows, columns);
                let fit = KMeans::from_config(k, &self.config.kmeans).fit(&points, rng);
                let assignments = fit.assignments.into_iter().map(Some).collect();
                (assignments, (0..k).map(labels::label_for).collect())
            }
            Strategy::Quantile => {
                let k = config.num_segments;
                let fit = quantile_buckets(rows, &columns[0], k);
                (fit.assignments, (0..k).map(labels::label_for).collect())
            }
            Strategy::Rules => {
                let rules = config.custom_rules.as_deref().unwrap_or_default();
                let fit = rule_segments(rows, rules, &dataset.columns);
                let mut rule_labels: Vec<SegmentLabel> = rules
                    .iter()
                    .enumerate()
                    .map(|(i, rule)| SegmentLabel {
                        description: rule.clone(),
                        ..labels::label_for(i)
                    })
                    .collect();
                if fit.default_count() > 0 {
                    rule_labels.push(SegmentLabel {
                        name: labels::DEFAULT_SEGMENT_NAME.to_string(),
                        color: labels::color_for(rules.len()),
                        description: labels::DEFAULT_SEGMENT_DESCRIPTION.to_string(),
                    });
                }
                (fit.assignments.into_iter().map(Some).collect(), rule_labels)
            }
        };

        let segments = build_segments(rows, &assignments, segment_labels, columns);
        info!(
            method = ?config.method,
            segments = segments.len(),
            assigned = assignments.iter().flatten().count(),
            "Segmentation finished"
        );

        Ok(SegmentationOutcome {
            method: config.method,
            segments,
            assignments,
        })
    }

    /// Profile the dataset, apply filters checked against the profiles, then
    /// segment the surviving rows.
    pub fn analyze(
        &self,
        dataset: &Dataset,
        filters: &[FilterCondition],
        config: &SegmentationConfig,
    ) -> EngineResult<Analysis> {
        let profiles = self.profile(dataset);
        predicates::validate_against_profiles(filters, &profiles)?;
        let filtered = self.filter(dataset, filters)?;
        let outcome = self.run_seeded(&filtered, config)?;
        Ok(Analysis {
            profiles,
            input_rows: dataset.len(),
            rows: filtered.rows,
            outcome,
        })
    }
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn all_data(method: SegmentationMethod, rows: &[Row]) -> SegmentationOutcome {
    let segment = Segment {
        name: labels::ALL_DATA_NAME.to_string(),
        color: labels::color_for(0),
        description: labels::ALL_DATA_DESCRIPTION.to_string(),
        count: rows.len(),
        avg_values: HashMap::new(),
        min_values: HashMap::new(),
        max_values: HashMap::new(),
    };
    SegmentationOutcome {
        method,
        segments: vec![segment],
        assignments: vec![Some(0); rows.len()],
    }
}

/// One segment per label, holding the rows assigned to its index.
fn build_segments(
    rows: &[Row],
    assignments: &[Option<usize>],
    labels: Vec<SegmentLabel>,
    columns: &[String],
) -> Vec<Segment> {
    let mut members: Vec<Vec<&Row>> = vec![Vec::new(); labels.len()];
    for (row, assignment) in rows.iter().zip(assignments) {
        if let Some(group) = assignment.and_then(|idx| members.get_mut(idx)) {
            group.push(row);
        }
    }

    labels
        .into_iter()
        .zip(members)
        .map(|(label, group)| Segment::new(label, compute_stats(group, columns)))
        .collect()
}

/// Segment with default settings.
pub fn segment(dataset: &Dataset, config: &SegmentationConfig) -> EngineResult<Vec<Segment>> {
    SegmentationEngine::default().segment(dataset, config)
}
