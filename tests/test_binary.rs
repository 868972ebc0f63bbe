//! Smoke tests for the svyretire binary

use assert_cmd::Command;
use predicates::prelude::*;

#[path = "common/mod.rs"]
mod common;

use common::*;

#[test]
fn test_binary_writes_reports() {
    let mut raw = create_raw_survey(500, 77);
    let (temp_dir, csv_path) = create_temp_csv(&mut raw);
    let output_dir = temp_dir.path().join("reports");

    Command::cargo_bin("svyretire")
        .unwrap()
        .arg("-i")
        .arg(&csv_path)
        .arg("-o")
        .arg(&output_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("COEFFICIENTS: age_only"))
        .stdout(predicate::str::contains("Analysis complete"));

    assert!(output_dir.join("gss_extract_report.json").exists());
    assert!(output_dir.join("gss_extract_coefficients.csv").exists());
    assert!(output_dir.join("gss_extract_predictions.csv").exists());
}

#[test]
fn test_binary_bundle_flag() {
    let mut raw = create_raw_survey(400, 78);
    let (temp_dir, csv_path) = create_temp_csv(&mut raw);

    Command::cargo_bin("svyretire")
        .unwrap()
        .arg("-i")
        .arg(&csv_path)
        .arg("--bundle")
        .arg("--no-parallel")
        .assert()
        .success();

    assert!(temp_dir.path().join("gss_extract_reports.zip").exists());
    assert!(!temp_dir.path().join("gss_extract_report.json").exists());
}

#[test]
fn test_binary_reports_missing_column() {
    let mut raw = create_raw_survey(100, 79).drop("vstrat").unwrap();
    let (_temp_dir, csv_path) = create_temp_csv(&mut raw);

    Command::cargo_bin("svyretire")
        .unwrap()
        .arg("-i")
        .arg(&csv_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("vstrat"));
}

#[test]
fn test_binary_requires_input() {
    Command::cargo_bin("svyretire")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("--input"));
}
