use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dataframe error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot read input directory '{path}': {source}")]
    InputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No CSV files found in '{0}'")]
    NoInputFiles(PathBuf),

    #[error("Header of '{file}' does not match the first input file (expected {expected:?}, found {found:?})")]
    SchemaMismatch {
        file: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Missing required column '{column}' during {stage}")]
    MissingColumn { stage: &'static str, column: String },

    #[error("Cannot cast value '{value}' in column '{column}' (row {row})")]
    CastFailure {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Cannot parse timestamp '{value}' (row {row})")]
    TimestampParse { row: usize, value: String },

    #[error("Layer directory '{dir}' is not a plain directory name under the output root")]
    UnsafeLayerDir { dir: String },

    #[error("Metrics error: {0}")]
    Metrics(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
