/// Column and directory name constants shared across the pipeline stages.

// Reading columns the pipeline relies on
pub const TURBINE_ID: &str = "turbine_id";
pub const TIMESTAMP: &str = "timestamp";
pub const WIND_SPEED: &str = "wind_speed";
pub const WIND_DIRECTION: &str = "wind_direction";
pub const POWER_OUTPUT: &str = "power_output";

// Derived during cleaning
pub const DATE: &str = "date";

// Gold layer columns
pub const MIN_POWER: &str = "min_power";
pub const MAX_POWER: &str = "max_power";
pub const AVG_POWER: &str = "avg_power";
pub const STD_DEV_POWER: &str = "std_dev_power";
pub const DATA_COUNT: &str = "data_count";

// Added by anomaly detection
pub const UPPER_BOUND: &str = "upper_bound";
pub const LOWER_BOUND: &str = "lower_bound";
pub const BOUND_DATE: &str = "bound_date";

// Default locations, relative to the working directory
pub const DEFAULT_INPUT_DIR: &str = "main/resources/input";
pub const DEFAULT_OUTPUT_DIR: &str = "main/resources/output";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_CONFIG_FILE: &str = "turbine_pipeline.toml";

// Layer directory names
pub const RAW_LAYER_DIR: &str = "raw_data";
pub const SILVER_LAYER_DIR: &str = "silver_data";
pub const GOLD_LAYER_DIR: &str = "gold_data";
pub const ANOMALIES_LAYER_DIR: &str = "anomalies_wind_turbine";

// Files written inside the output tree
pub const PART_FILE: &str = "part-00000.csv";
pub const SUCCESS_MARKER: &str = "_SUCCESS";
pub const MANIFEST_FILE: &str = "_manifest.json";
pub const METRICS_SNAPSHOT_FILE: &str = "_metrics.prom";

/// Rows shown in the debug previews printed after aggregation
pub const DEFAULT_PREVIEW_ROWS: usize = 10;
