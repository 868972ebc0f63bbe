//! Tests for CLI argument parsing

use clap::Parser;
use std::path::PathBuf;
use svyretire::cli::Cli;
use svyretire::pipeline::{LonelyPsu, ModelSpec};

#[test]
fn test_cli_default_values() {
    let cli = Cli::parse_from(["svyretire", "-i", "gss.csv"]);

    assert_eq!(cli.input, PathBuf::from("gss.csv"));
    assert!(cli.output.is_none());
    assert!(cli.config.is_none());
    assert!(cli.levels.is_empty());
    assert!(cli.models.is_empty());
    assert!(!cli.bundle, "Default bundle should be false");
    assert!(!cli.no_parallel);
    assert_eq!(
        cli.infer_schema_length, 10000,
        "Default schema inference should be 10000"
    );

    let config = cli.analysis_config().unwrap();
    assert_eq!(config.cleaning.year_min, 2000);
    assert_eq!(config.cleaning.year_max, 2016);
    assert_eq!(config.diagnostics.cutoff, 0.5);
    assert_eq!(config.diagnostics.prediction_levels, vec![0.90, 0.95, 0.99]);
    assert_eq!(config.design.lonely_psu, LonelyPsu::Adjust);
    assert_eq!(config.models, ModelSpec::standard_sequence());
}

#[test]
fn test_cli_overrides() {
    let cli = Cli::parse_from([
        "svyretire",
        "-i",
        "gss.parquet",
        "--year-min",
        "2004",
        "--year-max",
        "2014",
        "--cutoff",
        "0.4",
        "--levels",
        "0.8,0.95",
        "--coefficient-level",
        "0.9",
        "--lonely-psu",
        "certainty",
        "--no-parallel",
        "--bundle",
    ]);

    let config = cli.analysis_config().unwrap();
    assert_eq!(config.cleaning.year_min, 2004);
    assert_eq!(config.cleaning.year_max, 2014);
    assert_eq!(config.diagnostics.cutoff, 0.4);
    assert_eq!(config.diagnostics.prediction_levels, vec![0.8, 0.95]);
    assert_eq!(config.diagnostics.coefficient_level, 0.9);
    assert_eq!(config.design.lonely_psu, LonelyPsu::Certainty);
    assert!(!config.fit.parallel);
    assert!(cli.bundle);
}

#[test]
fn test_cli_model_formulas() {
    let cli = Cli::parse_from([
        "svyretire",
        "-i",
        "gss.csv",
        "-m",
        "age=is_retired ~ age_in_decades",
        "--model",
        "interaction=is_retired ~ age_in_decades * sex",
    ]);

    assert_eq!(cli.models.len(), 2);
    assert_eq!(cli.models[0].name, "age");
    assert_eq!(cli.models[1].terms, ModelSpec::age_by_sex().terms);

    let config = cli.analysis_config().unwrap();
    assert_eq!(config.models.len(), 2);
}

#[test]
fn test_cli_rejects_bad_values() {
    assert!(Cli::try_parse_from(["svyretire", "-i", "gss.csv", "--cutoff", "1.5"]).is_err());
    assert!(Cli::try_parse_from(["svyretire", "-i", "gss.csv", "--levels", "0.9,1.0"]).is_err());
    assert!(Cli::try_parse_from(["svyretire", "-i", "gss.csv", "--lonely-psu", "drop"]).is_err());
    assert!(Cli::try_parse_from(["svyretire", "-i", "gss.csv", "-m", "no formula"]).is_err());
    assert!(
        Cli::try_parse_from(["svyretire", "-i", "gss.csv", "-m", "x=is_retired ~ income"])
            .is_err()
    );
}

#[test]
fn test_cli_requires_input() {
    assert!(Cli::try_parse_from(["svyretire"]).is_err());
}

#[test]
fn test_inverted_years_rejected_after_overrides() {
    let cli = Cli::parse_from(["svyretire", "-i", "gss.csv", "--year-min", "2015", "--year-max", "2005"]);
    assert!(cli.analysis_config().is_err());
}

#[test]
fn test_config_file_then_flags() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let config_path = temp_dir.path().join("analysis.json");
    std::fs::write(
        &config_path,
        r#"{ "cleaning": { "year_min": 2006 }, "diagnostics": { "cutoff": 0.3 } }"#,
    )
    .unwrap();

    let cli = Cli::parse_from([
        "svyretire",
        "-i",
        "gss.csv",
        "-c",
        config_path.to_str().unwrap(),
        "--cutoff",
        "0.6",
    ]);
    let config = cli.analysis_config().unwrap();
    assert_eq!(config.cleaning.year_min, 2006);
    assert_eq!(config.diagnostics.cutoff, 0.6);
}

#[test]
fn test_output_dir_derivation() {
    let cli = Cli::parse_from(["svyretire", "-i", "/path/to/gss.csv"]);
    assert_eq!(cli.output_dir(), PathBuf::from("/path/to"));
    assert_eq!(cli.report_stem(), "gss");

    let bare = Cli::parse_from(["svyretire", "-i", "gss.csv"]);
    assert_eq!(bare.output_dir(), PathBuf::from("."));

    let explicit = Cli::parse_from(["svyretire", "-i", "gss.csv", "-o", "reports"]);
    assert_eq!(explicit.output_dir(), PathBuf::from("reports"));
}
