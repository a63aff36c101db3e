//! `describe()`-style summary of one numeric column.

use polars::prelude::*;
use serde::Serialize;
use std::fmt;

use crate::error::Result;
use crate::schema::require_column;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Describe {
    pub column: String,
    pub count: u64,
    pub mean: Option<f64>,
    /// Sample (n-1) standard deviation
    pub stddev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

fn first_f64(df: &DataFrame, name: &str) -> Result<Option<f64>> {
    Ok(df.column(name)?.as_materialized_series().f64()?.get(0))
}

/// Summarize the non-null values of `column`, read as `Float64`
pub fn describe(df: &DataFrame, column: &str) -> Result<Describe> {
    require_column(df, column, "describe")?;
    let values = || col(column).cast(DataType::Float64);

    let summary = df
        .clone()
        .lazy()
        .select([
            values().count().cast(DataType::UInt64).alias("count"),
            values().mean().alias("mean"),
            values().std(1).alias("stddev"),
            values().min().alias("min"),
            values().max().alias("max"),
        ])
        .collect()?;

    let count = summary
        .column("count")?
        .as_materialized_series()
        .u64()?
        .get(0)
        .unwrap_or(0);

    Ok(Describe {
        column: column.to_string(),
        count,
        mean: first_f64(&summary, "mean")?,
        stddev: if count < 2 {
            None
        } else {
            first_f64(&summary, "stddev")?
        },
        min: first_f64(&summary, "min")?,
        max: first_f64(&summary, "max")?,
    })
}

impl fmt::Display for Describe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = |v: Option<f64>| v.map(|x| format!("{:?}", x)).unwrap_or_else(|| "null".to_string());
        writeln!(f, "summary | {}", self.column)?;
        writeln!(f, "count   | {}", self.count)?;
        writeln!(f, "mean    | {}", cell(self.mean))?;
        writeln!(f, "stddev  | {}", cell(self.stddev))?;
        writeln!(f, "min     | {}", cell(self.min))?;
        write!(f, "max     | {}", cell(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_ignores_nulls() {
        let df = df!("power_output" => [Some(1.0), None, Some(3.0)]).unwrap();
        let summary = describe(&df, "power_output").unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.mean, Some(2.0));
        assert_eq!(summary.min, Some(1.0));
        assert_eq!(summary.max, Some(3.0));
        assert!((summary.stddev.unwrap() - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_single_value_has_no_stddev() {
        let df = df!("power_output" => [42.0]).unwrap();
        let summary = describe(&df, "power_output").unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.stddev, None);
    }

    #[test]
    fn test_text_column_is_read_as_numbers() {
        let df = df!("power_output" => ["10", "20", "oops"]).unwrap();
        let summary = describe(&df, "power_output").unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.mean, Some(15.0));
    }

    #[test]
    fn test_display() {
        let df = df!("power_output" => [1.0, 3.0]).unwrap();
        let text = describe(&df, "power_output").unwrap().to_string();
        assert!(text.contains("summary | power_output"));
        assert!(text.contains("count   | 2"));
        assert!(text.contains("mean    | 2.0"));
        assert!(text.contains("max     | 3.0"));
    }

    #[test]
    fn test_missing_column() {
        let df = df!("a" => [1.0]).unwrap();
        assert!(describe(&df, "power_output").is_err());
    }
}
