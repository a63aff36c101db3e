//! Declared reading schema.
//!
//! Input files may carry any columns. Only the allow-listed columns in
//! [`KNOWN_COLUMNS`] get a type; everything else passes through as text.

use polars::prelude::*;

use crate::constants::{POWER_OUTPUT, TURBINE_ID, WIND_DIRECTION, WIND_SPEED};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
}

impl ColumnType {
    pub fn dtype(&self) -> DataType {
        match self {
            ColumnType::Integer => DataType::Int32,
            ColumnType::Float => DataType::Float64,
        }
    }
}

/// Columns cast during cleaning
pub const KNOWN_COLUMNS: &[(&str, ColumnType)] = &[
    (TURBINE_ID, ColumnType::Integer),
    (POWER_OUTPUT, ColumnType::Float),
    (WIND_SPEED, ColumnType::Float),
    (WIND_DIRECTION, ColumnType::Float),
];

/// Declared type of a column; `None` for pass-through columns
pub fn column_type(name: &str) -> Option<ColumnType> {
    KNOWN_COLUMNS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, ty)| *ty)
}

/// Non-strict cast of `name` to `ty`: surrounding whitespace is ignored and
/// anything unparseable becomes null.
///
/// Integers go through `Float64` first, so `"7.0"` and `"7.9"` truncate to
/// `7` and values outside the `i32` range become null.
pub fn cast_expr(name: &str, ty: ColumnType) -> Expr {
    let text = col(name)
        .cast(DataType::String)
        .str()
        .strip_chars(lit(NULL));
    match ty {
        ColumnType::Float => text.cast(DataType::Float64),
        ColumnType::Integer => text.cast(DataType::Float64).cast(DataType::Int32),
    }
    .alias(name)
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

/// Fails with [`PipelineError::MissingColumn`] when the stage cannot run
/// without `name`
pub fn require_column(df: &DataFrame, name: &str, stage: &'static str) -> Result<()> {
    if has_column(df, name) {
        Ok(())
    } else {
        Err(PipelineError::MissingColumn {
            stage,
            column: name.to_string(),
        })
    }
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast_one(values: &[&str], ty: ColumnType) -> Series {
        let df = df!("v" => values).unwrap();
        df.lazy()
            .select([cast_expr("v", ty)])
            .collect()
            .unwrap()
            .column("v")
            .unwrap()
            .as_materialized_series()
            .clone()
    }

    #[test]
    fn test_known_columns_have_declared_types() {
        assert_eq!(column_type("turbine_id"), Some(ColumnType::Integer));
        assert_eq!(column_type("power_output"), Some(ColumnType::Float));
        assert_eq!(column_type("wind_speed"), Some(ColumnType::Float));
        assert_eq!(column_type("wind_direction"), Some(ColumnType::Float));
        assert_eq!(column_type("timestamp"), None);
        assert_eq!(column_type("site_name"), None);
    }

    #[test]
    fn test_integer_cast_truncates_and_bounds() {
        let out = cast_one(&["7", " 8 ", "7.0", "-3.9", "T-07", "3000000000"], ColumnType::Integer);
        assert_eq!(out.dtype(), &DataType::Int32);
        let values: Vec<Option<i32>> = out.i32().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(7), Some(8), Some(7), Some(-3), None, None]);
    }

    #[test]
    fn test_float_cast() {
        let out = cast_one(&["500", " 12.5 ", "n/a", "  "], ColumnType::Float);
        let values: Vec<Option<f64>> = out.f64().unwrap().into_iter().collect();
        assert_eq!(values, vec![Some(500.0), Some(12.5), None, None]);
    }

    #[test]
    fn test_require_column_reports_stage() {
        let df = df!("a" => ["1"]).unwrap();
        assert!(require_column(&df, "a", "cleaning").is_ok());
        let err = require_column(&df, "timestamp", "cleaning").unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingColumn { stage: "cleaning", ref column } if column == "timestamp"
        ));
    }
}
