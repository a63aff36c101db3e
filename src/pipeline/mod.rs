//! The four-stage batch pipeline: ingestion, cleaning, aggregation and
//! anomaly detection.
//!
//! Stages are pure functions over polars [`DataFrame`]s; [`Pipeline`] runs them in order
//! and hands each layer to a [`LayerSink`] before the next stage starts.

pub mod aggregation;
pub mod anomaly;
pub mod cleaning;
pub mod ingestion;

use std::path::Path;
use std::time::Instant;

use polars::prelude::*;
use serde::Serialize;
use tracing::{info, info_span, instrument};

use crate::config::PipelineConfig;
use crate::constants::{LOWER_BOUND, POWER_OUTPUT, TURBINE_ID, UPPER_BOUND};
use crate::error::Result;
use crate::manifest::RunManifest;
use crate::observability::metrics;
use crate::sink::{Layer, LayerReceipt, LayerSink};
use crate::stats::{self, Describe};

use self::anomaly::JoinKey;
use self::cleaning::{CastFailurePolicy, CleaningReport};

/// Knobs the stages need; everything else in [`PipelineConfig`] is about
/// where data lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOptions {
    pub join_key: JoinKey,
    pub cast_failure_policy: CastFailurePolicy,
    pub preview_rows: usize,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            join_key: JoinKey::default(),
            cast_failure_policy: CastFailurePolicy::default(),
            preview_rows: crate::constants::DEFAULT_PREVIEW_ROWS,
        }
    }
}

impl From<&PipelineConfig> for StageOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            join_key: config.join_key,
            cast_failure_policy: config.cast_failure_policy,
            preview_rows: config.preview_rows,
        }
    }
}

/// Result of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub raw_rows: usize,
    pub silver_rows: usize,
    pub gold_groups: usize,
    pub anomaly_count: usize,
    pub cleaning: CleaningReport,
    pub power_summary: Describe,
    pub receipts: Vec<LayerReceipt>,
}

pub struct Pipeline<S: LayerSink> {
    options: StageOptions,
    sink: S,
}

fn timed<T>(stage: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let _span = info_span!("stage", stage).entered();
    let started = Instant::now();
    let out = f()?;
    metrics::stage_finished(stage, started.elapsed().as_secs_f64());
    Ok(out)
}

impl<S: LayerSink> Pipeline<S> {
    pub fn new(options: StageOptions, sink: S) -> Self {
        Self { options, sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn write(&self, layer: Layer, df: &DataFrame, receipts: &mut Vec<LayerReceipt>) -> Result<()> {
        let receipt = self.sink.write_layer(layer, df)?;
        info!(layer = layer.as_str(), rows = receipt.rows, "Layer written to {}", receipt.location);
        println!("{} data written to {}", layer, receipt.location);
        receipts.push(receipt);
        Ok(())
    }

    /// Read every CSV in `input_dir` and run all stages
    #[instrument(skip(self), fields(input = %input_dir.display()))]
    pub fn run(&self, input_dir: &Path) -> Result<PipelineResult> {
        metrics::run_started();
        info!("🚀 Starting turbine pipeline");
        println!("🚀 Starting turbine pipeline on {}", input_dir.display());

        let raw = timed("ingestion", || ingestion::read_csv_dir(input_dir))?;
        println!("📥 Columns: {:?}", crate::schema::column_names(&raw));
        let result = self.process(raw)?;

        let manifest = RunManifest {
            input_dir: input_dir.to_string_lossy().to_string(),
            join_key: self.options.join_key,
            cast_failure_policy: self.options.cast_failure_policy,
            cleaning: result.cleaning.clone(),
            gold_groups: result.gold_groups,
            power_summary: result.power_summary.clone(),
            anomaly_count: result.anomaly_count,
            layers: result.receipts.clone(),
        };
        self.sink.finish(&manifest)?;

        info!("✅ Pipeline execution completed");
        println!("✅ Pipeline execution completed");
        Ok(result)
    }

    /// Run every stage on an already ingested table
    pub fn process(&self, raw: DataFrame) -> Result<PipelineResult> {
        let mut receipts = Vec::with_capacity(4);
        let raw_rows = raw.height();
        info!(rows = raw_rows, "Ingested raw readings");
        let preview_rows = Some(self.options.preview_rows);

        // Raw layer
        self.write(Layer::Raw, &raw, &mut receipts)?;

        // Silver layer
        let policy = self.options.cast_failure_policy;
        let (silver, mut report) = timed("cleaning", || cleaning::clean(&raw, policy))?;
        metrics::cleaning::rows_dropped(report.rows_dropped_incomplete);
        metrics::cleaning::rows_retained(report.rows_out);
        for (column, count) in &report.cast_failures {
            metrics::cleaning::cast_failures(column, *count);
        }
        info!(
            dropped = report.rows_dropped_incomplete,
            cast_failures = report.total_cast_failures(),
            "🔧 Cleaned {} of {} rows",
            report.rows_out,
            report.rows_in
        );
        self.write(Layer::Silver, &silver, &mut receipts)?;
        let silver_rows = silver.height();

        let (cleaned, unparsed) = cleaning::derive_date(&silver, policy)?;
        report.unparsed_timestamps = unparsed;
        metrics::cleaning::unparsed_timestamps(unparsed);

        // Gold layer
        let gold = timed("aggregation", || aggregation::aggregate_daily(&cleaned))?;
        metrics::aggregation::groups(gold.height(), aggregation::singleton_groups(&gold)?);
        println!("\n DEBUG: Aggregated Data (First {} Rows)", self.options.preview_rows);
        println!("{}", gold.head(preview_rows));
        self.write(Layer::Gold, &gold, &mut receipts)?;

        // Anomalies layer
        let join_key = self.options.join_key;
        let (anomalies, power_summary) = timed("anomaly_detection", || {
            let bounds = anomaly::compute_bounds(&gold)?;
            println!("\n DEBUG: Upper & Lower Bounds (First {} Rows)", self.options.preview_rows);
            println!(
                "{}",
                bounds.select([TURBINE_ID, UPPER_BOUND, LOWER_BOUND])?.head(preview_rows)
            );
            let anomalies = anomaly::detect_anomalies(&cleaned, &bounds, join_key)?;
            let summary = stats::describe(&cleaned, POWER_OUTPUT)?;
            Ok((anomalies, summary))
        })?;

        println!("\n{}", power_summary);
        println!("\n DEBUG: Number of Anomalies Detected: {}", anomalies.height());
        info!(
            anomalies = anomalies.height(),
            join_key = %join_key,
            "🔎 Anomaly detection finished"
        );
        self.write(Layer::Anomalies, &anomalies, &mut receipts)?;

        Ok(PipelineResult {
            raw_rows,
            silver_rows,
            gold_groups: gold.height(),
            anomaly_count: anomalies.height(),
            cleaning: report,
            power_summary,
            receipts,
        })
    }
}

/// Ingest and clean `input_dir` without writing anything, then summarize
/// `column`
pub fn describe_input(input_dir: &Path, column: &str, policy: CastFailurePolicy) -> Result<Describe> {
    let raw = ingestion::read_csv_dir(input_dir)?;
    let (cleaned, _) = cleaning::clean(&raw, policy)?;
    stats::describe(&cleaned, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::fs;

    fn scenario() -> DataFrame {
        let mut power = vec!["500.0"; 5];
        power.push("5000.0");
        df!(
            "turbine_id" => vec!["7"; 6],
            "timestamp" => vec!["2024-01-01 00:00"; 6],
            "power_output" => power,
            "wind_speed" => vec!["12.0"; 6],
            "wind_direction" => vec!["180.0"; 6],
        )
        .unwrap()
    }

    #[test]
    fn test_process_writes_all_layers_in_order() {
        let pipeline = Pipeline::new(StageOptions::default(), MemorySink::new());
        let result = pipeline.process(scenario()).unwrap();

        let layers: Vec<Layer> = result.receipts.iter().map(|r| r.layer).collect();
        assert_eq!(layers, vec![Layer::Raw, Layer::Silver, Layer::Gold, Layer::Anomalies]);
        assert_eq!(result.raw_rows, 6);
        assert_eq!(result.silver_rows, 6);
        assert_eq!(result.gold_groups, 1);
        assert_eq!(result.anomaly_count, 1);
        assert_eq!(result.power_summary.count, 6);
    }

    #[test]
    fn test_silver_layer_has_no_date_column() {
        let pipeline = Pipeline::new(StageOptions::default(), MemorySink::new());
        pipeline.process(scenario()).unwrap();
        let silver = pipeline.sink().layer_text(Layer::Silver).unwrap();
        assert!(silver.starts_with("turbine_id,timestamp,power_output,wind_speed,wind_direction\n"));
        assert!(silver.contains("7,2024-01-01 00:00,500.0,12.0,180.0\n"));
    }

    #[test]
    fn test_missing_timestamp_fails_after_silver_write() {
        let raw = df!("turbine_id" => ["1"], "power_output" => ["2.0"]).unwrap();
        let pipeline = Pipeline::new(StageOptions::default(), MemorySink::new());
        assert!(pipeline.process(raw).is_err());
        assert!(pipeline.sink().layer_text(Layer::Silver).is_some());
        assert!(pipeline.sink().layer_text(Layer::Gold).is_none());
        assert!(pipeline.sink().manifest().is_none());
    }

    #[test]
    fn test_run_hands_manifest_to_sink() {
        let input = tempfile::tempdir().unwrap();
        fs::write(
            input.path().join("readings.csv"),
            "turbine_id,timestamp,power_output,wind_speed,wind_direction\n\
             1,2024-01-01 00:00,100.0,10.0,90.0\n\
             1,2024-01-01 01:00,110.0,10.0,90.0\n\
             2,2024-01-01 00:00,,10.0,90.0\n",
        )
        .unwrap();

        let pipeline = Pipeline::new(StageOptions::default(), MemorySink::new());
        let result = pipeline.run(input.path()).unwrap();
        let manifest = pipeline.sink().manifest().unwrap();

        assert_eq!(manifest.input_dir, input.path().to_string_lossy());
        assert_eq!(manifest.layers, result.receipts);
        assert_eq!(manifest.cleaning.rows_dropped_incomplete, 1);
        assert_eq!(manifest.gold_groups, 1);
        assert_eq!(manifest.anomaly_count, 0);

        let gold = manifest.receipt(Layer::Gold).unwrap();
        assert_eq!(gold.rows, 1);
        assert_eq!(gold.location, "memory://gold");
        let gold_text = pipeline.sink().layer_text(Layer::Gold).unwrap();
        assert!(gold_text.contains("\n1,2024-01-01,100.0,110.0,105.0,7.07"));
        assert!(gold_text.ends_with(",2\n"));
        assert_eq!(manifest.receipt(Layer::Raw).unwrap().rows, 3);
    }
}
