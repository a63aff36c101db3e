//! Aggregation: per-turbine per-day statistics of `power_output`.

use polars::prelude::*;

use crate::constants::{
    AVG_POWER, DATA_COUNT, DATE, MAX_POWER, MIN_POWER, POWER_OUTPUT, STD_DEV_POWER, TURBINE_ID,
};
use crate::error::Result;
use crate::schema::require_column;

pub const GOLD_COLUMNS: &[&str] = &[
    TURBINE_ID,
    DATE,
    MIN_POWER,
    MAX_POWER,
    AVG_POWER,
    STD_DEV_POWER,
    DATA_COUNT,
];

/// Group cleaned readings by (`turbine_id`, `date`), ordered by key with
/// null keys first.
///
/// Null `power_output` values are ignored by every statistic and by
/// `data_count`. `std_dev_power` is the sample (n-1) deviation and stays
/// null for groups with fewer than two values; this is what the gold layer
/// persists.
pub fn aggregate_daily(cleaned: &DataFrame) -> Result<DataFrame> {
    for column in [TURBINE_ID, DATE, POWER_OUTPUT] {
        require_column(cleaned, column, "aggregation")?;
    }
    let power = || col(POWER_OUTPUT).cast(DataType::Float64);

    let gold = cleaned
        .clone()
        .lazy()
        .group_by([col(TURBINE_ID), col(DATE)])
        .agg([
            power().min().alias(MIN_POWER),
            power().max().alias(MAX_POWER),
            power().mean().alias(AVG_POWER),
            power().std(1).alias(STD_DEV_POWER),
            power().count().cast(DataType::Int64).alias(DATA_COUNT),
        ])
        .with_column(
            when(col(DATA_COUNT).lt(lit(2)))
                .then(lit(NULL).cast(DataType::Float64))
                .otherwise(col(STD_DEV_POWER))
                .alias(STD_DEV_POWER),
        )
        .sort([TURBINE_ID, DATE], SortMultipleOptions::default())
        .collect()?;

    Ok(gold)
}

/// Groups holding exactly one `power_output` value
pub fn singleton_groups(gold: &DataFrame) -> Result<usize> {
    let counts = gold.column(DATA_COUNT)?.as_materialized_series().i64()?;
    Ok(counts.into_iter().filter(|c| *c == Some(1)).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::render_csv;

    fn csv_text(df: &DataFrame) -> String {
        String::from_utf8(render_csv(df).unwrap()).unwrap()
    }

    /// Cleaned readings: typed ids and power, day as text turned into a date
    fn cleaned(turbines: &[Option<i32>], days: &[&str], power: &[Option<f64>]) -> DataFrame {
        df!(
            TURBINE_ID => turbines,
            DATE => days,
            POWER_OUTPUT => power,
        )
        .unwrap()
        .lazy()
        .with_column(col(DATE).str().to_date(StrptimeOptions {
            format: Some("%Y-%m-%d".into()),
            ..Default::default()
        }))
        .collect()
        .unwrap()
    }

    fn f64_values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        df.column(name)
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .collect()
    }

    #[test]
    fn test_groups_by_turbine_and_day() {
        let df = cleaned(
            &[Some(2), Some(1), Some(1), Some(1)],
            &["2024-01-01", "2024-01-02", "2024-01-01", "2024-01-01"],
            &[Some(10.0), Some(30.0), Some(10.0), Some(20.0)],
        );
        let gold = aggregate_daily(&df).unwrap();
        assert_eq!(crate::schema::column_names(&gold), GOLD_COLUMNS);

        let summary = gold
            .select([TURBINE_ID, DATE, MIN_POWER, MAX_POWER, AVG_POWER, DATA_COUNT])
            .unwrap();
        let text = csv_text(&summary);
        assert_eq!(
            text,
            "turbine_id,date,min_power,max_power,avg_power,data_count\n\
             1,2024-01-01,10.0,20.0,15.0,2\n\
             1,2024-01-02,30.0,30.0,30.0,1\n\
             2,2024-01-01,10.0,10.0,10.0,1\n"
        );

        let std = f64_values(&gold, STD_DEV_POWER);
        assert!((std[0].unwrap() - 50f64.sqrt()).abs() < 1e-12);
        assert_eq!(std[1], None);
        assert_eq!(singleton_groups(&gold).unwrap(), 2);
    }

    #[test]
    fn test_singleton_group_has_null_std_dev() {
        let gold = aggregate_daily(&cleaned(&[Some(3)], &["2024-01-01"], &[Some(42.0)])).unwrap();
        assert_eq!(
            csv_text(&gold),
            "turbine_id,date,min_power,max_power,avg_power,std_dev_power,data_count\n\
             3,2024-01-01,42.0,42.0,42.0,,1\n"
        );
    }

    #[test]
    fn test_null_power_values_are_not_counted() {
        let gold = aggregate_daily(&cleaned(
            &[Some(1), Some(1), Some(9)],
            &["2024-01-01", "2024-01-01", "2024-01-01"],
            &[None, Some(5.0), None],
        ))
        .unwrap();
        assert_eq!(
            csv_text(&gold.select([TURBINE_ID, AVG_POWER, DATA_COUNT]).unwrap()),
            "turbine_id,avg_power,data_count\n1,5.0,1\n9,,0\n"
        );
    }

    #[test]
    fn test_null_turbine_forms_its_own_group_first() {
        let gold = aggregate_daily(&cleaned(
            &[Some(1), None],
            &["2024-01-01", "2024-01-01"],
            &[Some(1.0), Some(2.0)],
        ))
        .unwrap();
        assert_eq!(gold.height(), 2);
        assert_eq!(gold.column(TURBINE_ID).unwrap().null_count(), 1);
        assert_eq!(f64_values(&gold, AVG_POWER), vec![Some(2.0), Some(1.0)]);
    }

    #[test]
    fn test_requires_date_column() {
        let df = df!(TURBINE_ID => [1], POWER_OUTPUT => [2.0]).unwrap();
        assert!(aggregate_daily(&df).is_err());
    }
}
