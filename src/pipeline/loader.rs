//! Dataset loader for CSV and Parquet survey extracts

use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::utils::{create_spinner, finish_with_success};

/// Open a survey extract lazily (CSV or Parquet based on extension)
pub fn load_dataset(path: &Path, infer_schema_length: usize) -> Result<LazyFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    // 0 means full table scan
    let schema_length = if infer_schema_length == 0 {
        None
    } else {
        Some(infer_schema_length)
    };

    let lf = match extension.as_str() {
        "csv" => LazyCsvReader::new(path)
            .with_infer_schema_length(schema_length)
            .finish()
            .with_context(|| format!("Failed to load CSV file: {}", path.display()))?,
        "parquet" => LazyFrame::scan_parquet(path, Default::default())
            .with_context(|| format!("Failed to load Parquet file: {}", path.display()))?,
        _ => anyhow::bail!(
            "Unsupported file format: {}. Supported formats: csv, parquet",
            extension
        ),
    };

    Ok(lf)
}

/// Load a survey extract into memory behind a spinner.
///
/// Returns the frame together with its row count, column count and
/// estimated size in megabytes.
pub fn load_dataset_with_progress(
    path: &Path,
    infer_schema_length: usize,
) -> Result<(DataFrame, usize, usize, f64)> {
    let spinner = create_spinner("Loading survey extract...");
    let df = load_dataset(path, infer_schema_length)?
        .collect()
        .with_context(|| format!("Failed to read dataset: {}", path.display()))?;
    let (rows, cols) = df.shape();
    let memory_mb = df.estimated_size() as f64 / (1024.0 * 1024.0);
    finish_with_success(&spinner, &format!("Loaded {} rows", rows));

    log::info!(
        "loaded {} ({} rows, {} columns, {:.2} MB)",
        path.display(),
        rows,
        cols,
        memory_mb
    );

    Ok((df, rows, cols, memory_mb))
}

/// Column names of a dataset without materialising its rows
pub fn get_column_names(path: &Path) -> Result<Vec<String>> {
    let schema = load_dataset(path, 100)?
        .collect_schema()
        .with_context(|| format!("Failed to read schema: {}", path.display()))?;
    Ok(schema.iter_names().map(|name| name.to_string()).collect())
}
