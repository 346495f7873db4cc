//! Segmentation builder — fluent API for constructing segmentation configs.

use crate::engine::{SegmentationConfig, SegmentationMethod};

pub struct SegmentationBuilder {
    method: SegmentationMethod,
    num_segments: usize,
    selected_columns: Vec<String>,
    rules: Vec<String>,
}

impl SegmentationBuilder {
    pub fn new(method: SegmentationMethod) -> Self {
        Self {
            method,
            num_segments: 3,
            selected_columns: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn kmeans(k: usize) -> Self {
        Self::new(SegmentationMethod::Kmeans).segments(k)
    }

    pub fn quantile(k: usize) -> Self {
        Self::new(SegmentationMethod::Quantile).segments(k)
    }

    pub fn custom_rules() -> Self {
        Self::new(SegmentationMethod::CustomRules)
    }

    pub fn segments(mut self, k: usize) -> Self {
        self.num_segments = k;
        self
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.selected_columns.push(name.into());
        self
    }

    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_columns
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.rules.push(rule.into());
        self
    }

    pub fn build(self) -> SegmentationConfig {
        SegmentationConfig {
            method: self.method,
            num_segments: self.num_segments,
            selected_columns: self.selected_columns,
            custom_rules: (!self.rules.is_empty()).then_some(self.rules),
        }
    }
}
