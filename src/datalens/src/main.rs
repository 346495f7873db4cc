//! Datalens — profile, filter and segment tabular JSON datasets.
//!
//! Thin host around the segmentation engine: loads inputs from disk, runs one
//! engine operation and prints the result as JSON on stdout.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use datalens_core::config::EngineConfig;
use datalens_core::{Dataset, Row};
use datalens_segmentation::{FilterCondition, SegmentationConfig, SegmentationEngine};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "datalens")]
#[command(about = "Profile, filter and segment tabular datasets")]
#[command(version)]
struct Cli {
    /// Engine configuration file (TOML, JSON or YAML); environment
    /// variables prefixed with DATALENS__ take precedence
    #[arg(long, env = "DATALENS_CONFIG_FILE")]
    config_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Infer a type profile for every column
    Profile {
        #[arg(long)]
        input: PathBuf,
    },
    /// Keep the rows that satisfy every filter condition
    Filter {
        #[arg(long)]
        input: PathBuf,
        /// JSON array of filter conditions
        #[arg(long)]
        filters: PathBuf,
    },
    /// Partition rows into segments with statistics
    Segment {
        #[arg(long)]
        input: PathBuf,
        /// JSON segmentation config
        #[arg(long)]
        config: PathBuf,
        /// Optional JSON array of filter conditions applied first
        #[arg(long)]
        filters: Option<PathBuf>,
        /// RNG seed for k-means initialization (overrides config)
        #[arg(long)]
        seed: Option<u64>,
        /// Emit the rows with their segment name stored under this column
        #[arg(long)]
        label_column: Option<String>,
    },
}

/// A dataset file is either `{"columns": [...], "rows": [...]}` or a bare
/// array of row objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum DatasetFile {
    Table {
        #[serde(default)]
        columns: Vec<String>,
        rows: Vec<Row>,
    },
    Rows(Vec<Row>),
}

impl From<DatasetFile> for Dataset {
    fn from(file: DatasetFile) -> Self {
        match file {
            DatasetFile::Table { columns, rows } if !columns.is_empty() => Dataset::new(columns, rows),
            DatasetFile::Table { rows, .. } | DatasetFile::Rows(rows) => Dataset::from_rows(rows),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_dataset(path: &Path) -> anyhow::Result<Dataset> {
    let dataset: Dataset = read_json::<DatasetFile>(path)?.into();
    info!(
        path = %path.display(),
        rows = dataset.len(),
        columns = dataset.columns.len(),
        "Dataset loaded"
    );
    Ok(dataset)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "datalens=info,datalens_segmentation=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let loaded = match &cli.config_file {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    };
    let mut config = loaded.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });

    match cli.command {
        Command::Profile { input } => {
            let dataset = load_dataset(&input)?;
            let engine = SegmentationEngine::new(config);
            print_json(&engine.profile(&dataset))?;
        }
        Command::Filter { input, filters } => {
            let dataset = load_dataset(&input)?;
            let conditions: Vec<FilterCondition> = read_json(&filters)?;
            let engine = SegmentationEngine::new(config);
            let filtered = engine.filter(&dataset, &conditions)?;
            info!(
                kept = filtered.len(),
                dropped = dataset.len() - filtered.len(),
                "Filters applied"
            );
            print_json(&filtered)?;
        }
        Command::Segment {
            input,
            config: segmentation_path,
            filters,
            seed,
            label_column,
        } => {
            if let Some(seed) = seed {
                config.kmeans.seed = Some(seed);
            }
            let dataset = load_dataset(&input)?;
            let segmentation: SegmentationConfig = read_json(&segmentation_path)?;
            let engine = SegmentationEngine::new(config);

            let (rows, outcome) = match filters {
                Some(path) => {
                    let conditions: Vec<FilterCondition> = read_json(&path)?;
                    let analysis = engine.analyze(&dataset, &conditions, &segmentation)?;
                    (analysis.rows, analysis.outcome)
                }
                None => {
                    let outcome = engine.run_seeded(&dataset, &segmentation)?;
                    (dataset.rows, outcome)
                }
            };

            match label_column {
                Some(column) => print_json(&serde_json::json!({
                    "segments": outcome.segments,
                    "rows": outcome.labeled_rows(&rows, &column),
                }))?,
                None => print_json(&outcome)?,
            }
        }
    }

    Ok(())
}
