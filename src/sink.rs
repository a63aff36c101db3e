//! Output sinks for the pipeline layers.
//!
//! The pipeline only talks to [`LayerSink`]. [`DirectorySink`] replaces one
//! directory per layer on every run; [`MemorySink`] keeps the rendered CSV in
//! memory for tests.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::constants::{
    ANOMALIES_LAYER_DIR, GOLD_LAYER_DIR, MANIFEST_FILE, PART_FILE, RAW_LAYER_DIR,
    SILVER_LAYER_DIR, SUCCESS_MARKER,
};
use crate::error::{PipelineError, Result};
use crate::manifest::RunManifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Raw,
    Silver,
    Gold,
    Anomalies,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Raw => "raw",
            Layer::Silver => "silver",
            Layer::Gold => "gold",
            Layer::Anomalies => "anomalies",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directory name of each layer under the output root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerNames {
    pub raw: String,
    pub silver: String,
    pub gold: String,
    pub anomalies: String,
}

impl Default for LayerNames {
    fn default() -> Self {
        Self {
            raw: RAW_LAYER_DIR.to_string(),
            silver: SILVER_LAYER_DIR.to_string(),
            gold: GOLD_LAYER_DIR.to_string(),
            anomalies: ANOMALIES_LAYER_DIR.to_string(),
        }
    }
}

/// A single normal path component: no separators, `.`, `..` or root
pub fn is_plain_dir_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

impl LayerNames {
    fn all(&self) -> [&str; 4] {
        [&self.raw, &self.silver, &self.gold, &self.anomalies]
    }

    /// Every name must be a distinct plain directory name
    pub fn validate(&self) -> Result<()> {
        let names = self.all();
        if let Some(bad) = names.iter().find(|n| !is_plain_dir_name(n)) {
            return Err(PipelineError::UnsafeLayerDir {
                dir: bad.to_string(),
            });
        }
        for (i, a) in names.iter().enumerate() {
            if names[i + 1..].contains(a) {
                return Err(PipelineError::Config(format!(
                    "layer directory '{}' is used by more than one layer",
                    a
                )));
            }
        }
        Ok(())
    }

    pub fn dir_for(&self, layer: Layer) -> &str {
        match layer {
            Layer::Raw => &self.raw,
            Layer::Silver => &self.silver,
            Layer::Gold => &self.gold,
            Layer::Anomalies => &self.anomalies,
        }
    }
}

/// What a sink wrote for one layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerReceipt {
    pub layer: Layer,
    pub location: String,
    pub rows: usize,
    /// SHA-256 of the rendered CSV
    pub sha256: String,
}

pub trait LayerSink {
    /// Replace the contents of `layer` with `df`
    fn write_layer(&self, layer: Layer, df: &DataFrame) -> Result<LayerReceipt>;

    /// Called once after the last layer
    fn finish(&self, manifest: &RunManifest) -> Result<()>;
}

/// CSV with a header row; nulls are written as empty fields
pub fn render_csv(df: &DataFrame) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut df = df.clone();
    CsvWriter::new(&mut bytes)
        .include_header(true)
        .finish(&mut df)?;
    Ok(bytes)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Writes each layer as `<root>/<layer dir>/part-00000.csv` plus `_SUCCESS`
pub struct DirectorySink {
    root: PathBuf,
    names: LayerNames,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>, names: LayerNames) -> Self {
        Self {
            root: root.into(),
            names,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory replaced for `layer`; always a direct child of the root
    pub fn layer_dir(&self, layer: Layer) -> Result<PathBuf> {
        let name = self.names.dir_for(layer);
        let dir = self.root.join(name);
        if !is_plain_dir_name(name) || dir.parent() != Some(self.root.as_path()) {
            return Err(PipelineError::UnsafeLayerDir {
                dir: name.to_string(),
            });
        }
        Ok(dir)
    }
}

impl LayerSink for DirectorySink {
    fn write_layer(&self, layer: Layer, df: &DataFrame) -> Result<LayerReceipt> {
        let dir = self.layer_dir(layer)?;
        if dir.exists() {
            debug!("Replacing existing {} layer at {}", layer, dir.display());
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        let bytes = render_csv(df)?;
        fs::write(dir.join(PART_FILE), &bytes)?;
        fs::write(dir.join(SUCCESS_MARKER), b"")?;

        crate::observability::metrics::layer_written(layer.as_str(), df.height());
        Ok(LayerReceipt {
            layer,
            location: dir.to_string_lossy().to_string(),
            rows: df.height(),
            sha256: sha256_hex(&bytes),
        })
    }

    fn finish(&self, manifest: &RunManifest) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(MANIFEST_FILE);
        fs::write(&path, serde_json::to_string_pretty(manifest)?)?;
        info!("Run manifest written to {}", path.display());
        Ok(())
    }
}

/// In-memory sink; keeps the last CSV written per layer
#[derive(Default)]
pub struct MemorySink {
    layers: Mutex<BTreeMap<Layer, Vec<u8>>>,
    manifest: Mutex<Option<RunManifest>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// CSV text written for `layer`, if any
    pub fn layer_text(&self, layer: Layer) -> Option<String> {
        let layers = self.layers.lock().unwrap_or_else(|e| e.into_inner());
        layers
            .get(&layer)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn manifest(&self) -> Option<RunManifest> {
        self.manifest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl LayerSink for MemorySink {
    fn write_layer(&self, layer: Layer, df: &DataFrame) -> Result<LayerReceipt> {
        let bytes = render_csv(df)?;
        let receipt = LayerReceipt {
            layer,
            location: format!("memory://{}", layer),
            rows: df.height(),
            sha256: sha256_hex(&bytes),
        };
        self.layers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(layer, bytes);
        Ok(receipt)
    }

    fn finish(&self, manifest: &RunManifest) -> Result<()> {
        *self.manifest.lock().unwrap_or_else(|e| e.into_inner()) = Some(manifest.clone());
        Ok(())
    }
}
