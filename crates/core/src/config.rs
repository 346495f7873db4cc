use serde::Deserialize;

/// Hard ceiling on k-means refinement rounds. Configuration may lower it.
pub const MAX_KMEANS_ITERATIONS: usize = 100;

/// Largest accepted segment count. Every segmenter materializes one label
/// (and k-means one centroid) per segment up front.
pub const MAX_SEGMENTS: usize = 1_000;

/// Root engine configuration. Loaded from environment variables
/// with the prefix `DATALENS__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub kmeans: KMeansConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    /// Fraction of values that must parse as numbers for a numeric column.
    #[serde(default = "default_numeric_threshold")]
    pub numeric_threshold: f64,
    #[serde(default = "default_categorical_limit")]
    pub categorical_limit: usize,
    /// Share of the row count a column's distinct values may reach and still
    /// be categorical.
    #[serde(default = "default_categorical_ratio")]
    pub categorical_ratio: f64,
    #[serde(default = "default_date_sample_size")]
    pub date_sample_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KMeansConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Centroid components are drawn from `[0, init_upper_bound)`.
    #[serde(default = "default_init_upper_bound")]
    pub init_upper_bound: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl KMeansConfig {
    pub fn effective_max_iterations(&self) -> usize {
        self.max_iterations.min(MAX_KMEANS_ITERATIONS)
    }
}

// Default functions
fn default_numeric_threshold() -> f64 {
    0.8
}
fn default_categorical_limit() -> usize {
    20
}
fn default_categorical_ratio() -> f64 {
    0.1
}
fn default_date_sample_size() -> usize {
    100
}
fn default_max_iterations() -> usize {
    MAX_KMEANS_ITERATIONS
}
fn default_init_upper_bound() -> f64 {
    100.0
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            numeric_threshold: default_numeric_threshold(),
            categorical_limit: default_categorical_limit(),
            categorical_ratio: default_categorical_ratio(),
            date_sample_size: default_date_sample_size(),
        }
    }
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            init_upper_bound: default_init_upper_bound(),
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("DATALENS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load configuration from a TOML/JSON/YAML file, with environment
    /// variables taking precedence.
    pub fn load_from(path: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("DATALENS")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
