//! Survey weight extraction and validation

use polars::prelude::*;

use crate::error::{AnalysisError, Result};

/// Extract analysis weights from a DataFrame column.
///
/// # Returns
/// * `Ok(Vec<f64>)` - One weight per row
/// * `Err` - If the column is absent, non-numeric, or holds a null,
///   NaN, infinite or negative value
///
/// Design-based variance needs a weight on every record, so unlike a
/// descriptive analysis a null weight is an error here.
pub fn get_design_weights(df: &DataFrame, weight_column: &str) -> Result<Vec<f64>> {
    let column = df.column(weight_column).map_err(|_| {
        AnalysisError::Schema(format!(
            "Weight column '{}' not found in DataFrame",
            weight_column
        ))
    })?;

    let float_col = column.cast(&DataType::Float64).map_err(|_| {
        AnalysisError::Design(format!(
            "Weight column '{}' must be numeric (cannot cast to Float64)",
            weight_column
        ))
    })?;
    let ca = float_col.f64()?;

    let mut weights = Vec::with_capacity(df.height());
    for (row, opt_val) in ca.iter().enumerate() {
        let w = opt_val.ok_or_else(|| {
            AnalysisError::Design(format!(
                "Weight column '{}' has a null value at row {}. Every record needs a weight.",
                weight_column, row
            ))
        })?;
        if w.is_nan() {
            return Err(AnalysisError::Design(format!(
                "Weight column '{}' contains NaN value. All weights must be valid numbers.",
                weight_column
            )));
        }
        if w.is_infinite() {
            return Err(AnalysisError::Design(format!(
                "Weight column '{}' contains infinite value. All weights must be finite.",
                weight_column
            )));
        }
        if w < 0.0 {
            return Err(AnalysisError::Design(format!(
                "Weight column '{}' contains negative value: {}. All weights must be non-negative.",
                weight_column, w
            )));
        }
        weights.push(w);
    }

    Ok(weights)
}

/// Calculate the total weight (sum of all weights).
#[inline]
pub fn total_weight(weights: &[f64]) -> f64 {
    weights.iter().sum()
}

/// Rescale the selected weights to mean 1; unselected entries become 0.
pub fn rescale_to_unit_mean(weights: &[f64], selected: &[bool]) -> Vec<f64> {
    let (sum, count) = weights
        .iter()
        .zip(selected)
        .filter(|(_, &keep)| keep)
        .fold((0.0, 0usize), |(s, n), (&w, _)| (s + w, n + 1));

    if count == 0 || sum <= 0.0 {
        return vec![0.0; weights.len()];
    }
    let scale = count as f64 / sum;

    weights
        .iter()
        .zip(selected)
        .map(|(&w, &keep)| if keep { w * scale } else { 0.0 })
        .collect()
}
