//! Variable selection, recoding and missing-row exclusion
//!
//! Produces a fresh cleaned table; the raw table is never mutated.

use polars::prelude::*;
use serde::Serialize;

use super::recode::{recode_age, table_for};
use crate::config::{CleaningConfig, DesignConfig};
use crate::error::{AnalysisError, Result};

/// Fields a record must carry to stay in the analysis
pub const MANDATORY_FIELDS: [&str; 5] = ["employment_status", "year", "age", "nativity", "sector"];

/// Level of `employment_status` that defines the response
pub const RETIRED_LEVEL: &str = "retired";

/// Derived columns
pub const AGE_IN_DECADES: &str = "age_in_decades";
pub const IS_RETIRED: &str = "is_retired";

/// Row accounting for one cleaning pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub rows_outside_years: usize,
    pub rows_missing_mandatory: usize,
    pub rows_out: usize,
    /// Missing count per mandatory field among rows inside the year range
    pub missing_by_field: Vec<(String, usize)>,
}

/// Verify every requested source column exists.
///
/// Runs before any transformation so a bad request halts the pipeline early.
pub fn check_requested_columns(raw: &DataFrame, requested: &[String]) -> Result<()> {
    let available: Vec<String> = raw
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let missing: Vec<&String> = requested
        .iter()
        .filter(|name| !available.contains(name))
        .collect();

    if !missing.is_empty() {
        return Err(AnalysisError::Schema(format!(
            "requested column(s) {:?} not found in source table. Available columns: {:?}",
            missing, available
        )));
    }
    Ok(())
}

/// Clean a raw survey extract.
///
/// # Arguments
/// * `raw` - Source table with raw survey codes
/// * `cleaning` - Retained columns, renames and year range
/// * `design` - Design fields that must survive selection
///
/// # Returns
/// The cleaned table (recoded levels, derived `age_in_decades` and
/// `is_retired`) and a row-accounting report.
pub fn clean_dataset(
    raw: &DataFrame,
    cleaning: &CleaningConfig,
    design: &DesignConfig,
) -> Result<(DataFrame, CleaningReport)> {
    check_requested_columns(raw, &cleaning.retained_columns)?;

    // Required fields must be among the retained (cleaned) names
    let cleaned_names: Vec<&str> = cleaning
        .retained_columns
        .iter()
        .map(|source| cleaning.cleaned_name(source))
        .collect();
    let required = MANDATORY_FIELDS
        .iter()
        .copied()
        .chain(std::iter::once(design.cluster.as_str()))
        .chain(std::iter::once(design.weight.as_str()))
        .chain(design.strata.iter().map(String::as_str));
    let not_retained: Vec<&str> = required.filter(|r| !cleaned_names.contains(r)).collect();
    if !not_retained.is_empty() {
        return Err(AnalysisError::Schema(format!(
            "required field(s) {:?} are not among the retained columns",
            not_retained
        )));
    }

    let mut columns: Vec<Column> = Vec::with_capacity(cleaning.retained_columns.len() + 2);
    for source in &cleaning.retained_columns {
        let raw_col = raw.column(source)?;
        let cleaned = cleaning.cleaned_name(source);

        let col = if let Some(table) = table_for(cleaned) {
            table.recode_column(raw_col)?
        } else if cleaned == "age" {
            recode_age(raw_col, cleaned)?
        } else if cleaned == "year" {
            raw_col.cast(&DataType::Int64)?.with_name(cleaned.into())
        } else {
            raw_col.clone().with_name(cleaned.into())
        };
        columns.push(col);
    }
    let selected = DataFrame::new(columns)?;
    let rows_in = selected.height();

    // Year range (inclusive); a null year is handled by the mandatory rule
    let years = selected.column("year")?.i64()?;
    let in_years: Vec<bool> = years
        .iter()
        .map(|y| y.map_or(true, |y| y >= cleaning.year_min && y <= cleaning.year_max))
        .collect();
    let rows_outside_years = in_years.iter().filter(|keep| !**keep).count();

    let mut keep = in_years.clone();
    let mut missing_by_field = Vec::with_capacity(MANDATORY_FIELDS.len());
    for field in MANDATORY_FIELDS {
        let nulls = selected.column(field)?.is_null();
        let mut missing = 0usize;
        for (row, is_null) in nulls.iter().enumerate() {
            if is_null.unwrap_or(false) && in_years[row] {
                missing += 1;
                keep[row] = false;
            }
        }
        missing_by_field.push((field.to_string(), missing));
    }
    let rows_missing_mandatory = in_years
        .iter()
        .zip(keep.iter())
        .filter(|(inside, kept)| **inside && !**kept)
        .count();

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    let mut cleaned = selected.filter(&mask)?;

    // Derived columns, computed after recoding
    let age_in_decades: Vec<Option<f64>> = cleaned
        .column("age")?
        .f64()?
        .iter()
        .map(|age| age.map(|a| a / 10.0))
        .collect();
    let is_retired: Vec<bool> = cleaned
        .column("employment_status")?
        .str()?
        .iter()
        .map(|status| status == Some(RETIRED_LEVEL))
        .collect();
    cleaned.with_column(Column::new(AGE_IN_DECADES.into(), age_in_decades))?;
    cleaned.with_column(Column::new(IS_RETIRED.into(), is_retired))?;

    let report = CleaningReport {
        rows_in,
        rows_outside_years,
        rows_missing_mandatory,
        rows_out: cleaned.height(),
        missing_by_field,
    };

    log::info!(
        "cleaning kept {} of {} rows ({} outside {}-{}, {} missing mandatory fields)",
        report.rows_out,
        report.rows_in,
        report.rows_outside_years,
        cleaning.year_min,
        cleaning.year_max,
        report.rows_missing_mandatory
    );

    Ok((cleaned, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame() -> DataFrame {
        df! {
            "year" => [1998i64, 2000, 2008, 2016, 2018, 2010],
            "id" => [1i64, 2, 3, 4, 5, 6],
            "age" => [70i64, 66, 98, 45, 30, 89],
            "race" => [1i64, 2, 3, 1, 1, 2],
            "sex" => [1i64, 2, 1, 2, 1, 2],
            "wrkstat" => [5i64, 5, 1, 1, 2, 5],
            "degree" => [1i64, 3, 4, 0, 8, 2],
            "marital" => [1i64, 2, 3, 4, 5, 9],
            "born" => [1i64, 2, 1, 1, 1, 2],
            "wrkgovt" => [1i64, 2, 2, 1, 0, 1],
            "vpsu" => [1i64, 1, 2, 1, 2, 2],
            "vstrat" => [10i64, 10, 11, 12, 10, 11],
            "oversamp" => [1.0f64, 1.0, 1.0, 1.0, 1.0, 1.0],
            "formwt" => [1.0f64, 1.0, 1.0, 1.0, 1.0, 1.0],
            "wtssall" => [0.8f64, 1.2, 1.0, 0.9, 1.1, 1.0],
            "sampcode" => [501i64, 501, 502, 503, 501, 502],
            "sample" => [9i64, 9, 9, 10, 10, 10],
        }
        .unwrap()
    }

    #[test]
    fn test_year_filter_and_mandatory_drop() {
        let raw = raw_frame();
        let (cleaned, report) =
            clean_dataset(&raw, &CleaningConfig::default(), &DesignConfig::default()).unwrap();

        // 1998 and 2018 fall outside; 2008 has age 98 (missing)
        assert_eq!(report.rows_in, 6);
        assert_eq!(report.rows_outside_years, 2);
        assert_eq!(report.rows_missing_mandatory, 1);
        assert_eq!(report.rows_out, 3);
        assert_eq!(cleaned.height(), 3);

        let years: Vec<i64> = cleaned
            .column("year")
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(years, vec![2000, 2016, 2010]);
    }

    #[test]
    fn test_derived_columns() {
        let raw = raw_frame();
        let (cleaned, _) =
            clean_dataset(&raw, &CleaningConfig::default(), &DesignConfig::default()).unwrap();

        let decades: Vec<Option<f64>> = cleaned
            .column(AGE_IN_DECADES)
            .unwrap()
            .f64()
            .unwrap()
            .iter()
            .collect();
        assert_eq!(decades, vec![Some(6.6), Some(4.5), Some(8.9)]);

        let retired: Vec<Option<bool>> = cleaned
            .column(IS_RETIRED)
            .unwrap()
            .bool()
            .unwrap()
            .iter()
            .collect();
        assert_eq!(retired, vec![Some(true), Some(false), Some(true)]);
    }

    #[test]
    fn test_raw_table_untouched() {
        let raw = raw_frame();
        let before = raw.clone();
        let _ = clean_dataset(&raw, &CleaningConfig::default(), &DesignConfig::default()).unwrap();
        assert!(raw.equals_missing(&before));
        assert!(raw.column("wrkstat").is_ok());
    }

    #[test]
    fn test_non_mandatory_sentinels_kept_as_null() {
        let raw = raw_frame();
        let (cleaned, _) =
            clean_dataset(&raw, &CleaningConfig::default(), &DesignConfig::default()).unwrap();
        // Row 2010 has marital code 9 but is still retained
        let marital = cleaned.column("marital_status").unwrap();
        assert_eq!(marital.null_count(), 1);
    }

    #[test]
    fn test_missing_requested_column_is_schema_error() {
        let raw = raw_frame().drop("wrkgovt").unwrap();
        let err = clean_dataset(&raw, &CleaningConfig::default(), &DesignConfig::default())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Schema(_)));
        assert!(err.to_string().contains("wrkgovt"));
    }

    #[test]
    fn test_required_field_not_retained_is_schema_error() {
        let raw = raw_frame();
        let mut config = CleaningConfig::default();
        config.retained_columns.retain(|c| c != "born");
        let err = clean_dataset(&raw, &config, &DesignConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::Schema(_)));
        assert!(err.to_string().contains("nativity"));
    }
}
