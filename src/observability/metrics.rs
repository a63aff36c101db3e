//! Run metrics for the turbine pipeline
//!
//! Stage code records through the `metrics` facade. Without an installed
//! recorder every call is a no-op; with `metrics_snapshot` enabled a
//! Prometheus recorder is installed and its text rendering is written next
//! to the output layers at the end of the run.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::constants::METRICS_SNAPSHOT_FILE;
use crate::error::{PipelineError, Result};

/// Enum representing all metric names used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    PipelineRuns,
    StageDuration,

    // Ingestion
    IngestFilesRead,
    IngestRowsRead,

    // Cleaning
    CleaningRowsDropped,
    CleaningCastFailures,
    CleaningUnparsedTimestamps,
    CleaningRowsRetained,

    // Aggregation
    AggregationGroups,
    AggregationSingletonGroups,

    // Anomaly detection
    AnomaliesDetected,

    // Layer writes
    LayerRowsWritten,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::PipelineRuns => "turbine_pipeline_runs_total",
            MetricName::StageDuration => "turbine_stage_duration_seconds",
            MetricName::IngestFilesRead => "turbine_ingest_files_read_total",
            MetricName::IngestRowsRead => "turbine_ingest_rows_read_total",
            MetricName::CleaningRowsDropped => "turbine_cleaning_rows_dropped_total",
            MetricName::CleaningCastFailures => "turbine_cleaning_cast_failures_total",
            MetricName::CleaningUnparsedTimestamps => "turbine_cleaning_unparsed_timestamps_total",
            MetricName::CleaningRowsRetained => "turbine_cleaning_rows_retained_total",
            MetricName::AggregationGroups => "turbine_aggregation_groups_total",
            MetricName::AggregationSingletonGroups => "turbine_aggregation_singleton_groups_total",
            MetricName::AnomaliesDetected => "turbine_anomalies_detected_total",
            MetricName::LayerRowsWritten => "turbine_layer_rows_written_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static SNAPSHOT_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder used for end-of-run snapshots.
///
/// Only one global recorder can exist per process; a second call is a no-op.
pub fn install_snapshot_recorder() -> Result<()> {
    if SNAPSHOT_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| PipelineError::Metrics(format!("Failed to install Prometheus recorder: {}", e)))?;
    let _ = SNAPSHOT_HANDLE.set(handle);
    info!("Metrics recorder installed for run snapshot");
    Ok(())
}

/// Write the current metrics rendering into `output_dir`, if a recorder is installed
pub fn write_snapshot(output_dir: &Path) -> Result<Option<String>> {
    let Some(handle) = SNAPSHOT_HANDLE.get() else {
        return Ok(None);
    };
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(METRICS_SNAPSHOT_FILE);
    fs::write(&path, handle.render())?;
    Ok(Some(path.to_string_lossy().to_string()))
}

pub fn run_started() {
    metrics::counter!(MetricName::PipelineRuns.as_str()).increment(1);
}

pub fn stage_finished(stage: &'static str, duration_secs: f64) {
    metrics::histogram!(MetricName::StageDuration.as_str(), "stage" => stage).record(duration_secs);
}

pub fn layer_written(layer: &'static str, rows: usize) {
    metrics::counter!(MetricName::LayerRowsWritten.as_str(), "layer" => layer).increment(rows as u64);
}

pub mod ingestion {
    use super::MetricName;

    pub fn files_read(count: usize) {
        metrics::counter!(MetricName::IngestFilesRead.as_str()).increment(count as u64);
    }

    pub fn rows_read(count: usize) {
        metrics::counter!(MetricName::IngestRowsRead.as_str()).increment(count as u64);
    }
}

pub mod cleaning {
    use super::MetricName;

    pub fn rows_dropped(count: usize) {
        metrics::counter!(MetricName::CleaningRowsDropped.as_str()).increment(count as u64);
    }

    pub fn cast_failures(column: &str, count: usize) {
        metrics::counter!(MetricName::CleaningCastFailures.as_str(), "column" => column.to_string())
            .increment(count as u64);
    }

    pub fn unparsed_timestamps(count: usize) {
        metrics::counter!(MetricName::CleaningUnparsedTimestamps.as_str()).increment(count as u64);
    }

    pub fn rows_retained(count: usize) {
        metrics::counter!(MetricName::CleaningRowsRetained.as_str()).increment(count as u64);
    }
}

pub mod aggregation {
    use super::MetricName;

    pub fn groups(total: usize, singletons: usize) {
        metrics::counter!(MetricName::AggregationGroups.as_str()).increment(total as u64);
        metrics::counter!(MetricName::AggregationSingletonGroups.as_str()).increment(singletons as u64);
    }
}

pub mod anomaly {
    use super::MetricName;

    pub fn detected(count: usize) {
        metrics::counter!(MetricName::AnomaliesDetected.as_str()).increment(count as u64);
    }
}
