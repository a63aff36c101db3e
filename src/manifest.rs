use serde::Serialize;

use crate::pipeline::anomaly::JoinKey;
use crate::pipeline::cleaning::{CastFailurePolicy, CleaningReport};
use crate::sink::LayerReceipt;
use crate::stats::Describe;

/// Summary of one pipeline run, written next to the layers.
///
/// Holds no wall-clock data: two runs over the same input produce the same
/// manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunManifest {
    pub input_dir: String,
    pub join_key: JoinKey,
    pub cast_failure_policy: CastFailurePolicy,
    pub cleaning: CleaningReport,
    pub gold_groups: usize,
    pub power_summary: Describe,
    pub anomaly_count: usize,
    pub layers: Vec<LayerReceipt>,
}

impl RunManifest {
    pub fn receipt(&self, layer: crate::sink::Layer) -> Option<&LayerReceipt> {
        self.layers.iter().find(|r| r.layer == layer)
    }
}
