//! Integration tests for variable selection and recoding

use polars::prelude::*;
use svyretire::config::{CleaningConfig, DesignConfig};
use svyretire::error::AnalysisError;
use svyretire::pipeline::*;

#[path = "common/mod.rs"]
mod common;

use common::*;

fn clean(raw: &DataFrame) -> (DataFrame, CleaningReport) {
    clean_dataset(raw, &CleaningConfig::default(), &DesignConfig::default()).unwrap()
}

#[test]
fn test_cleaned_columns_use_domain_names() {
    let raw = create_raw_survey(200, 7);
    let (cleaned, _) = clean(&raw);

    assert_has_columns(
        &cleaned,
        &[
            "year",
            "employment_status",
            "education_level",
            "marital_status",
            "nativity",
            "sector",
            "primary_sampling_unit_id",
            "stratum_id",
            "analysis_weight",
            AGE_IN_DECADES,
            IS_RETIRED,
        ],
    );
    assert!(cleaned.column("wrkstat").is_err());
}

#[test]
fn test_is_retired_matches_employment_status() {
    let raw = create_raw_survey(500, 11);
    let (cleaned, _) = clean(&raw);

    let status = cleaned.column("employment_status").unwrap().str().unwrap();
    let retired = cleaned.column(IS_RETIRED).unwrap().bool().unwrap();
    for (s, r) in status.iter().zip(retired.iter()) {
        assert_eq!(r, Some(s == Some(RETIRED_LEVEL)));
    }
}

#[test]
fn test_years_within_range() {
    let raw = create_raw_survey(630, 3);
    let (cleaned, report) = clean(&raw);

    // 4 of 21 generated years fall outside 2000-2016
    assert_eq!(report.rows_outside_years, 120);
    assert_eq!(report.rows_out, cleaned.height());

    let years = cleaned.column("year").unwrap().i64().unwrap();
    assert!(years
        .into_no_null_iter()
        .all(|y| (2000..=2016).contains(&y)));
}

#[test]
fn test_custom_year_range() {
    let raw = create_raw_survey(210, 5);
    let config = CleaningConfig {
        year_min: 2010,
        year_max: 2012,
        ..CleaningConfig::default()
    };
    let (cleaned, report) = clean_dataset(&raw, &config, &DesignConfig::default()).unwrap();

    assert_eq!(report.rows_out, 30);
    let years = cleaned.column("year").unwrap().i64().unwrap();
    assert!(years.into_no_null_iter().all(|y| (2010..=2012).contains(&y)));
}

#[test]
fn test_missing_mandatory_rows_dropped() {
    let mut raw = create_raw_survey(40, 9);
    // Row 2 is a 2000 record; code 8 is "don't know"
    let sector: Vec<i64> = raw
        .column("wrkgovt")
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .enumerate()
        .map(|(row, code)| if row == 2 { 8 } else { code })
        .collect();
    raw.with_column(Column::new("wrkgovt".into(), sector)).unwrap();

    let (cleaned, report) = clean(&raw);
    assert_eq!(report.rows_missing_mandatory, 1);
    let sector_missing = report
        .missing_by_field
        .iter()
        .find(|(field, _)| field == "sector")
        .map(|(_, count)| *count);
    assert_eq!(sector_missing, Some(1));
    assert_eq!(cleaned.column("sector").unwrap().null_count(), 0);
}

#[test]
fn test_unrecognized_code_fails_loudly() {
    let mut raw = create_raw_survey(30, 1);
    let status: Vec<i64> = raw
        .column("wrkstat")
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .enumerate()
        .map(|(row, code)| if row == 4 { 42 } else { code })
        .collect();
    raw.with_column(Column::new("wrkstat".into(), status)).unwrap();

    let err = clean_dataset(&raw, &CleaningConfig::default(), &DesignConfig::default())
        .unwrap_err();
    match err {
        AnalysisError::UnrecognizedCode { field, code } => {
            assert_eq!(field, "employment_status");
            assert_eq!(code, "42");
        }
        other => panic!("expected UnrecognizedCode, got {:?}", other),
    }
}

#[test]
fn test_text_labels_are_recoded() {
    let raw = df! {
        "year" => [2004i64, 2006],
        "id" => [1i64, 2],
        "age" => ["89 or older", "45"],
        "race" => ["White", "Black"],
        "sex" => ["Male", "Female"],
        "wrkstat" => ["Retired", "Working fulltime"],
        "degree" => ["Bachelor's", "High school"],
        "marital" => ["Married", "No answer"],
        "born" => ["Yes", "No"],
        "wrkgovt" => ["Government", "Private"],
        "vpsu" => [1i64, 2],
        "vstrat" => [10i64, 10],
        "oversamp" => [1.0f64, 1.0],
        "formwt" => [1.0f64, 1.0],
        "wtssall" => [1.2f64, 0.8],
        "sampcode" => [501i64, 501],
        "sample" => [10i64, 10],
    }
    .unwrap();

    let (cleaned, report) = clean(&raw);
    assert_eq!(report.rows_out, 2);

    let as_strings = |name: &str| -> Vec<Option<String>> {
        cleaned
            .column(name)
            .unwrap()
            .str()
            .unwrap()
            .iter()
            .map(|v| v.map(str::to_string))
            .collect()
    };
    assert_eq!(
        as_strings("employment_status"),
        vec![Some("retired".to_string()), Some("working full time".to_string())]
    );
    assert_eq!(
        as_strings("nativity"),
        vec![Some("native-born".to_string()), Some("foreign-born".to_string())]
    );
    assert_eq!(
        as_strings("sector"),
        vec![Some("public".to_string()), Some("private".to_string())]
    );
    assert_eq!(as_strings("marital_status")[1], None);

    let ages: Vec<Option<f64>> = cleaned.column("age").unwrap().f64().unwrap().iter().collect();
    assert_eq!(ages, vec![Some(89.0), Some(45.0)]);
}

#[test]
fn test_requested_column_absent_is_schema_error() {
    let raw = create_raw_survey(20, 2).drop("vstrat").unwrap();
    let err = check_requested_columns(&raw, &CleaningConfig::default().retained_columns)
        .unwrap_err();
    assert!(matches!(err, AnalysisError::Schema(_)));
    assert!(err.to_string().contains("vstrat"));
}
