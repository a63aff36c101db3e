//! Ingestion: every CSV file of an input directory as one table.

use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::schema::column_names;

/// CSV files directly inside `dir`, sorted by file name
pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| PipelineError::InputDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv && path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(PipelineError::NoInputFiles(dir.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

/// Read one headered CSV file with every column as text.
///
/// Headers and values are kept as written; only empty fields become nulls.
pub fn read_csv_file(path: &Path) -> Result<DataFrame> {
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()?
        .collect()?;

    debug!("Read {} rows from {}", df.height(), path.display());
    Ok(df)
}

/// Stack the tables of several files. The first file fixes the column
/// order; later files must declare the same column set in any order.
pub fn union_by_name(files: Vec<(PathBuf, DataFrame)>) -> Result<DataFrame> {
    let mut iter = files.into_iter();
    let Some((_, mut combined)) = iter.next() else {
        return Ok(DataFrame::empty());
    };
    let columns = column_names(&combined);

    for (path, df) in iter {
        let found = column_names(&df);
        let same_set = found.len() == columns.len() && columns.iter().all(|c| found.contains(c));
        if !same_set {
            return Err(PipelineError::SchemaMismatch {
                file: path,
                expected: columns,
                found,
            });
        }
        combined.vstack_mut(&df.select(columns.clone())?)?;
    }

    Ok(combined)
}

/// Read every CSV file in `dir` into one table
pub fn read_csv_dir(dir: &Path) -> Result<DataFrame> {
    let files = discover_csv_files(dir)?;
    info!("Found {} CSV file(s) in {}", files.len(), dir.display());
    crate::observability::metrics::ingestion::files_read(files.len());

    let tables = files
        .into_iter()
        .map(|path| read_csv_file(&path).map(|df| (path, df)))
        .collect::<Result<Vec<_>>>()?;

    let df = union_by_name(tables)?;
    crate::observability::metrics::ingestion::rows_read(df.height());
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn text_values(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        df.column(name)
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    #[test]
    fn test_missing_directory_is_input_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            discover_csv_files(&missing),
            Err(PipelineError::InputDir { .. })
        ));
    }

    #[test]
    fn test_directory_without_csv_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        assert!(matches!(
            discover_csv_files(dir.path()),
            Err(PipelineError::NoInputFiles(_))
        ));
    }

    #[test]
    fn test_discovery_is_sorted_and_case_insensitive() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "a\n1\n").unwrap();
        fs::write(dir.path().join("a.CSV"), "a\n2\n").unwrap();
        fs::write(dir.path().join("c.json"), "{}").unwrap();
        let files = discover_csv_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.CSV", "b.csv"]);
    }

    #[test]
    fn test_read_csv_file_keeps_text_and_nulls_empty_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "turbine_id,power_output,site\n1,,north\n2,10.5,  \n").unwrap();
        let df = read_csv_file(&path).unwrap();
        assert_eq!(column_names(&df), vec!["turbine_id", "power_output", "site"]);
        assert_eq!(df.height(), 2);
        assert_eq!(
            text_values(&df, "power_output"),
            vec![None, Some("10.5".to_string())]
        );
        // Whitespace-only text is a value, not a missing field
        assert_eq!(
            text_values(&df, "site"),
            vec![Some("north".to_string()), Some("  ".to_string())]
        );
    }

    #[test]
    fn test_union_reorders_columns_by_name() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("1.csv"), "a,b\n1,2\n").unwrap();
        fs::write(dir.path().join("2.csv"), "b,a\n4,3\n").unwrap();
        let df = read_csv_dir(dir.path()).unwrap();
        assert_eq!(column_names(&df), vec!["a", "b"]);
        assert_eq!(
            text_values(&df, "a"),
            vec![Some("1".to_string()), Some("3".to_string())]
        );
        assert_eq!(
            text_values(&df, "b"),
            vec![Some("2".to_string()), Some("4".to_string())]
        );
    }

    #[test]
    fn test_union_rejects_different_column_sets() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("1.csv"), "a,b\n1,2\n").unwrap();
        fs::write(dir.path().join("2.csv"), "a,c\n3,4\n").unwrap();
        assert!(matches!(
            read_csv_dir(dir.path()),
            Err(PipelineError::SchemaMismatch { .. })
        ));
    }
}
