use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use turbine_pipeline::config::PipelineConfig;
use turbine_pipeline::constants::POWER_OUTPUT;
use turbine_pipeline::observability::{self, metrics};
use turbine_pipeline::pipeline::anomaly::JoinKey;
use turbine_pipeline::pipeline::cleaning::CastFailurePolicy;
use turbine_pipeline::pipeline::{describe_input, Pipeline, StageOptions};
use turbine_pipeline::sink::DirectorySink;

#[derive(Parser)]
#[command(name = "turbine_pipeline")]
#[command(about = "Wind turbine sensor batch pipeline: raw, silver, gold layers and anomaly report")]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults to ./turbine_pipeline.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline (the default when no command is given)
    Run {
        /// Directory holding the input CSV files
        #[arg(long)]
        input: Option<PathBuf>,
        /// Root directory for the output layers
        #[arg(long)]
        output: Option<PathBuf>,
        /// Join key for anomaly bounds: turbine_and_date or turbine
        #[arg(long)]
        join_key: Option<JoinKey>,
        /// Cast failure policy: null_on_failure or reject
        #[arg(long)]
        cast_policy: Option<CastFailurePolicy>,
        /// Write a metrics snapshot next to the output layers
        #[arg(long)]
        metrics_snapshot: bool,
    },
    /// Print summary statistics of a cleaned column without writing output
    Describe {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value = POWER_OUTPUT)]
        column: String,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn run_pipeline(config: &PipelineConfig) -> anyhow::Result<()> {
    if config.metrics_snapshot {
        if let Err(e) = metrics::install_snapshot_recorder() {
            warn!("Metrics snapshot disabled: {}", e);
        }
    }

    let sink = DirectorySink::new(&config.output_dir, config.layers.clone());
    let pipeline = Pipeline::new(StageOptions::from(config), sink);

    let result = pipeline
        .run(&config.input_dir)
        .with_context(|| format!("pipeline run over '{}' failed", config.input_dir.display()))?;

    println!("\n📊 Pipeline Results:");
    println!("   Raw rows: {}", result.raw_rows);
    println!("   Silver rows: {}", result.silver_rows);
    println!("   Dropped incomplete rows: {}", result.cleaning.rows_dropped_incomplete);
    println!("   Cast failures: {}", result.cleaning.total_cast_failures());
    println!("   Gold groups: {}", result.gold_groups);
    println!("   Anomalies: {}", result.anomaly_count);
    println!("   Outputs saved in {}", config.output_dir.display());

    if result.cleaning.total_cast_failures() > 0 {
        warn!(
            "{} value(s) could not be cast and were replaced with null",
            result.cleaning.total_cast_failures()
        );
    }

    if let Some(path) = metrics::write_snapshot(&config.output_dir)? {
        info!("Metrics snapshot written to {}", path);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config =
        PipelineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let command = cli.command.unwrap_or(Commands::Run {
        input: None,
        output: None,
        join_key: None,
        cast_policy: None,
        metrics_snapshot: false,
    });

    if let Commands::ShowConfig = command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let _guard = observability::init_logging(&config.log_dir)?;

    match command {
        Commands::Run {
            input,
            output,
            join_key,
            cast_policy,
            metrics_snapshot,
        } => {
            if let Some(input) = input {
                config.input_dir = input;
            }
            if let Some(output) = output {
                config.output_dir = output;
            }
            if let Some(join_key) = join_key {
                config.join_key = join_key;
            }
            if let Some(policy) = cast_policy {
                config.cast_failure_policy = policy;
            }
            config.metrics_snapshot |= metrics_snapshot;

            if let Err(e) = run_pipeline(&config) {
                error!("Pipeline failed: {:#}", e);
                println!("❌ Pipeline failed: {:#}", e);
                return Err(e);
            }
        }
        Commands::Describe { input, column } => {
            let input = input.unwrap_or_else(|| config.input_dir.clone());
            let summary = describe_input(&input, &column, config.cast_failure_policy)
                .with_context(|| format!("failed to describe '{}'", input.display()))?;
            println!("{}", summary);
        }
        Commands::ShowConfig => {}
    }
    Ok(())
}
