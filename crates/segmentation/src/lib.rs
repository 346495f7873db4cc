//! Dataset segmentation engine — column type inference, filter predicates,
//! k-means, quantile and rule-based segmentation with per-segment statistics.

pub mod builder;
pub mod engine;
pub mod inference;
pub mod kmeans;
pub mod labels;
pub mod predicates;
pub mod quantile;
pub mod rules;
pub mod stats;

pub use builder::SegmentationBuilder;
pub use engine::{
    segment, Analysis, Segment, SegmentationConfig, SegmentationEngine, SegmentationMethod,
    SegmentationOutcome,
};
pub use inference::{infer_columns, ColumnKind, ColumnProfile};
pub use predicates::{evaluate_filters, FilterCondition, FilterOperator};
