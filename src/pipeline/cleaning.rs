//! Cleaning: null drop, typed casting of the known columns, and the derived
//! `date` column.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{DATE, TIMESTAMP};
use crate::error::{PipelineError, Result};
use crate::schema::{cast_expr, column_names, has_column, require_column, KNOWN_COLUMNS};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// What happens when a value of a typed column cannot be coerced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastFailurePolicy {
    /// Replace the value with null, count it and keep the row
    #[default]
    NullOnFailure,
    /// Abort the run on the first failure
    Reject,
}

impl fmt::Display for CastFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastFailurePolicy::NullOnFailure => write!(f, "null_on_failure"),
            CastFailurePolicy::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for CastFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "null_on_failure" | "null" => Ok(CastFailurePolicy::NullOnFailure),
            "reject" => Ok(CastFailurePolicy::Reject),
            other => Err(format!(
                "unknown cast failure policy '{}' (expected null_on_failure or reject)",
                other
            )),
        }
    }
}

/// Counters describing what cleaning removed or nullified
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub rows_dropped_incomplete: usize,
    pub rows_out: usize,
    /// Values nullified by a failed cast, per column
    pub cast_failures: BTreeMap<String, usize>,
    pub unparsed_timestamps: usize,
}

impl CleaningReport {
    pub fn total_cast_failures(&self) -> usize {
        self.cast_failures.values().sum()
    }
}

/// Rows where `before` held a value and `after` holds null
fn newly_null(before: &Column, after: &Column) -> Vec<usize> {
    let lost = &before.as_materialized_series().is_not_null()
        & &after.as_materialized_series().is_null();
    (&lost)
        .into_iter()
        .enumerate()
        .filter_map(|(row, flag)| (flag == Some(true)).then_some(row))
        .collect()
}

fn text_at(column: &Column, row: usize) -> Result<String> {
    let text = column.as_materialized_series().cast(&DataType::String)?;
    Ok(text.str()?.get(row).unwrap_or_default().to_string())
}

/// Remove every row holding a null in any column. Returns the number of
/// dropped rows.
pub fn drop_incomplete_rows(df: &DataFrame) -> Result<(DataFrame, usize)> {
    let complete = column_names(df)
        .iter()
        .map(|c| col(c.as_str()).is_not_null())
        .reduce(|all, next| all.and(next));

    let kept = match complete {
        Some(predicate) => df.clone().lazy().filter(predicate).collect()?,
        None => df.clone(),
    };
    let dropped = df.height() - kept.height();
    Ok((kept, dropped))
}

/// Cast the allow-listed columns to their declared types.
///
/// Under [`CastFailurePolicy::NullOnFailure`] a failed value becomes null and
/// the row stays. Because this runs after the null drop, such rows reach the
/// silver layer with a null; the per-column counts are the only trace.
pub fn cast_known_columns(
    df: &DataFrame,
    policy: CastFailurePolicy,
) -> Result<(DataFrame, BTreeMap<String, usize>)> {
    let typed: Vec<_> = KNOWN_COLUMNS
        .iter()
        .filter(|(name, _)| has_column(df, name))
        .copied()
        .collect();

    let casted = df
        .clone()
        .lazy()
        .with_columns(
            typed
                .iter()
                .map(|(name, ty)| cast_expr(name, *ty))
                .collect::<Vec<_>>(),
        )
        .collect()?;

    let mut failures: BTreeMap<String, usize> = BTreeMap::new();
    let mut first_failure: Option<(usize, &str)> = None;
    for (name, _) in &typed {
        let rows = newly_null(df.column(name)?, casted.column(name)?);
        let Some(&row) = rows.first() else {
            continue;
        };
        if first_failure.map_or(true, |(earliest, _)| row < earliest) {
            first_failure = Some((row, *name));
        }
        failures.insert(name.to_string(), rows.len());
    }

    if let Some((row, name)) = first_failure {
        let value = text_at(df.column(name)?, row)?;
        if policy == CastFailurePolicy::Reject {
            return Err(PipelineError::CastFailure {
                column: name.to_string(),
                row,
                value,
            });
        }
        for (column, count) in &failures {
            warn!(
                column = column.as_str(),
                count = *count,
                "Cast failed for {} value(s), replaced with null",
                count
            );
        }
    }

    Ok((casted, failures))
}

/// Calendar day of the `timestamp` text: the first `YYYY-MM-DD` it holds,
/// so RFC 3339 and `YYYY-MM-DD HH:MM[:SS]` values keep their written day
pub fn date_expr() -> Expr {
    col(TIMESTAMP)
        .cast(DataType::String)
        .str()
        .strip_chars(lit(NULL))
        .str()
        .to_date(StrptimeOptions {
            format: Some(DATE_FORMAT.into()),
            strict: false,
            exact: false,
            ..Default::default()
        })
        .alias(DATE)
}

/// Append (or replace) the `date` column derived from `timestamp`.
/// Returns the number of timestamps that could not be parsed.
pub fn derive_date(df: &DataFrame, policy: CastFailurePolicy) -> Result<(DataFrame, usize)> {
    require_column(df, TIMESTAMP, "date derivation")?;
    let dated = df.clone().lazy().with_column(date_expr()).collect()?;

    let unparsed = newly_null(df.column(TIMESTAMP)?, dated.column(DATE)?);
    if let Some(&row) = unparsed.first() {
        let value = text_at(df.column(TIMESTAMP)?, row)?;
        if policy == CastFailurePolicy::Reject {
            return Err(PipelineError::TimestampParse { row, value });
        }
        warn!(
            count = unparsed.len(),
            "Unparseable timestamp(s), date set to null (first: row {} '{}')",
            row,
            value
        );
    }
    Ok((dated, unparsed.len()))
}

/// Null drop followed by casting; the table written to the silver layer
pub fn clean(df: &DataFrame, policy: CastFailurePolicy) -> Result<(DataFrame, CleaningReport)> {
    let (complete, dropped) = drop_incomplete_rows(df)?;
    let (typed, cast_failures) = cast_known_columns(&complete, policy)?;

    let report = CleaningReport {
        rows_in: df.height(),
        rows_dropped_incomplete: dropped,
        rows_out: typed.height(),
        cast_failures,
        unparsed_timestamps: 0,
    };
    Ok((typed, report))
}
