//! Display names, colors and blurbs for segments. Purely cosmetic; indices
//! wrap around each pool.

const NAMES: [&str; 8] = [
    "Group A", "Group B", "Group C", "Group D", "Group E", "Group F", "Group G", "Group H",
];

const COLORS: [&str; 8] = [
    "#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#ec4899", "#14b8a6", "#f97316",
];

const DESCRIPTIONS: [&str; 6] = [
    "Core segment with typical values",
    "High-value segment",
    "Emerging segment with growth potential",
    "Low-activity segment",
    "Niche segment with distinct characteristics",
    "Outlier segment worth a closer look",
];

pub const ALL_DATA_NAME: &str = "All Data";
pub const ALL_DATA_DESCRIPTION: &str = "Every row in the dataset";
pub const DEFAULT_SEGMENT_NAME: &str = "Default";
pub const DEFAULT_SEGMENT_DESCRIPTION: &str = "Rows matching none of the rules";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentLabel {
    pub name: String,
    pub color: String,
    pub description: String,
}

pub fn label_for(index: usize) -> SegmentLabel {
    SegmentLabel {
        name: NAMES[index % NAMES.len()].to_string(),
        color: color_for(index),
        description: DESCRIPTIONS[index % DESCRIPTIONS.len()].to_string(),
    }
}

pub fn color_for(index: usize) -> String {
    COLORS[index % COLORS.len()].to_string()
}
