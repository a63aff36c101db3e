//! Anomaly detection: a fixed ±2σ band per group, joined back onto the
//! cleaned readings.

use std::fmt;
use std::str::FromStr;

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::{
    AVG_POWER, BOUND_DATE, DATA_COUNT, DATE, LOWER_BOUND, MAX_POWER, MIN_POWER, POWER_OUTPUT,
    STD_DEV_POWER, TURBINE_ID, UPPER_BOUND,
};
use crate::error::Result;
use crate::schema::{column_names, require_column};

/// Replaces a null or zero standard deviation so the band never collapses
pub const STD_DEV_FLOOR: f64 = 1e-6;

/// Half-width of the band in standard deviations
pub const SIGMA_MULTIPLIER: f64 = 2.0;

const ROW_INDEX: &str = "__reading_row";

/// Columns matched when joining bounds onto readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKey {
    /// Each reading is compared with its own day's band
    #[default]
    TurbineAndDate,
    /// Each reading is compared with every day's band of its turbine
    Turbine,
}

impl fmt::Display for JoinKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKey::TurbineAndDate => write!(f, "turbine_and_date"),
            JoinKey::Turbine => write!(f, "turbine"),
        }
    }
}

impl FromStr for JoinKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "turbine_and_date" | "turbine_date" => Ok(JoinKey::TurbineAndDate),
            "turbine" => Ok(JoinKey::Turbine),
            other => Err(format!(
                "unknown join key '{}' (expected turbine_and_date or turbine)",
                other
            )),
        }
    }
}

/// `std_dev` with null and zero replaced by [`STD_DEV_FLOOR`]
pub fn floor_std_dev(std_dev: Expr) -> Expr {
    let std_dev = std_dev.fill_null(lit(STD_DEV_FLOOR));
    when(std_dev.clone().eq(lit(0.0)))
        .then(lit(STD_DEV_FLOOR))
        .otherwise(std_dev)
}

/// Gold aggregates with `std_dev_power` floored and the band added as
/// `upper_bound` / `lower_bound`. A null average gives null bounds.
pub fn compute_bounds(gold: &DataFrame) -> Result<DataFrame> {
    for column in [AVG_POWER, STD_DEV_POWER] {
        require_column(gold, column, "bound calculation")?;
    }
    let half_width = || lit(SIGMA_MULTIPLIER) * col(STD_DEV_POWER);

    let bounds = gold
        .clone()
        .lazy()
        .with_column(floor_std_dev(col(STD_DEV_POWER)).alias(STD_DEV_POWER))
        .with_columns([
            (col(AVG_POWER) + half_width()).alias(UPPER_BOUND),
            (col(AVG_POWER) - half_width()).alias(LOWER_BOUND),
        ])
        .collect()?;
    Ok(bounds)
}

/// Column order of the anomaly layer for readings with `reading_columns`
pub fn anomaly_columns(reading_columns: &[String], join_key: JoinKey) -> Vec<String> {
    let mut columns = reading_columns.to_vec();
    if join_key == JoinKey::Turbine {
        columns.push(BOUND_DATE.to_string());
    }
    columns.extend(
        [MIN_POWER, MAX_POWER, AVG_POWER, STD_DEV_POWER, DATA_COUNT, UPPER_BOUND, LOWER_BOUND]
            .iter()
            .map(|c| c.to_string()),
    );
    columns
}

/// Inner-join `bounds` onto `cleaned` and keep the readings strictly outside
/// their band. Null keys never match; a null `power_output` or bound never
/// flags. Rows keep the reading order, then the bound order.
pub fn detect_anomalies(
    cleaned: &DataFrame,
    bounds: &DataFrame,
    join_key: JoinKey,
) -> Result<DataFrame> {
    for column in [TURBINE_ID, DATE, POWER_OUTPUT] {
        require_column(cleaned, column, "anomaly detection")?;
    }

    let band = [MIN_POWER, MAX_POWER, AVG_POWER, STD_DEV_POWER, DATA_COUNT, UPPER_BOUND, LOWER_BOUND]
        .map(col);
    let (keys, bound_cols, order): (Vec<Expr>, Vec<Expr>, Vec<&str>) = match join_key {
        JoinKey::TurbineAndDate => (
            vec![col(TURBINE_ID), col(DATE)],
            vec![col(TURBINE_ID), col(DATE)],
            vec![ROW_INDEX],
        ),
        JoinKey::Turbine => (
            vec![col(TURBINE_ID)],
            vec![col(TURBINE_ID), col(DATE).alias(BOUND_DATE)],
            vec![ROW_INDEX, BOUND_DATE],
        ),
    };
    let right = bounds
        .clone()
        .lazy()
        .select(bound_cols.into_iter().chain(band).collect::<Vec<_>>());

    let output: Vec<Expr> = anomaly_columns(&column_names(cleaned), join_key)
        .iter()
        .map(|c| col(c.as_str()))
        .collect();

    let anomalies = cleaned
        .clone()
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .join(right, keys.clone(), keys, JoinArgs::new(JoinType::Inner))
        .filter(
            col(POWER_OUTPUT)
                .gt(col(UPPER_BOUND))
                .or(col(POWER_OUTPUT).lt(col(LOWER_BOUND))),
        )
        .sort(order, SortMultipleOptions::default())
        .select(output)
        .collect()?;

    crate::observability::metrics::anomaly::detected(anomalies.height());
    Ok(anomalies)
}
