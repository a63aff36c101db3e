use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_CONFIG_FILE, DEFAULT_INPUT_DIR, DEFAULT_LOG_DIR, DEFAULT_OUTPUT_DIR,
    DEFAULT_PREVIEW_ROWS,
};
use crate::error::{PipelineError, Result};
use crate::pipeline::anomaly::JoinKey;
use crate::pipeline::cleaning::CastFailurePolicy;
use crate::sink::LayerNames;

pub const ENV_INPUT_DIR: &str = "TURBINE_INPUT_DIR";
pub const ENV_OUTPUT_DIR: &str = "TURBINE_OUTPUT_DIR";
pub const ENV_JOIN_KEY: &str = "TURBINE_JOIN_KEY";
pub const ENV_CAST_POLICY: &str = "TURBINE_CAST_POLICY";
pub const ENV_LOG_DIR: &str = "TURBINE_LOG_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub layers: LayerNames,
    pub join_key: JoinKey,
    pub cast_failure_policy: CastFailurePolicy,
    /// Rows printed in the aggregate and bound previews
    pub preview_rows: usize,
    pub log_dir: PathBuf,
    /// Write a Prometheus text snapshot of the run metrics to the output root
    pub metrics_snapshot: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            layers: LayerNames::default(),
            join_key: JoinKey::default(),
            cast_failure_policy: CastFailurePolicy::default(),
            preview_rows: DEFAULT_PREVIEW_ROWS,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            metrics_snapshot: false,
        }
    }
}

impl PipelineConfig {
    /// Load from `path`, or from `turbine_pipeline.toml` in the working
    /// directory when present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TURBINE_*` overrides from `lookup` (the process environment in
    /// production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty(ENV_INPUT_DIR) {
            self.input_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_LOG_DIR) {
            self.log_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_JOIN_KEY) {
            self.join_key = v
                .parse()
                .map_err(|e| PipelineError::Config(format!("{}: {}", ENV_JOIN_KEY, e)))?;
        }
        if let Some(v) = non_empty(ENV_CAST_POLICY) {
            self.cast_failure_policy = v
                .parse()
                .map_err(|e| PipelineError::Config(format!("{}: {}", ENV_CAST_POLICY, e)))?;
        }
        self.validate()
    }

    /// Layer names must be distinct plain directory names under the
    /// output root
    pub fn validate(&self) -> Result<()> {
        self.layers.validate()
    }
}
