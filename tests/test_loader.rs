//! Tests for dataset loading

use svyretire::pipeline::*;

#[path = "common/mod.rs"]
mod common;

use common::*;

#[test]
fn test_load_csv() {
    let mut raw = create_raw_survey(120, 1);
    let (_temp_dir, csv_path) = create_temp_csv(&mut raw);

    let (df, rows, cols, memory_mb) = load_dataset_with_progress(&csv_path, 100).unwrap();
    assert_eq!(rows, 120);
    assert_eq!(cols, 17);
    assert!(memory_mb > 0.0);
    assert_has_columns(&df, &["year", "wrkstat", "vpsu", "vstrat", "wtssall"]);
}

#[test]
fn test_load_parquet() {
    let mut raw = create_raw_survey(80, 2);
    let (_temp_dir, parquet_path) = create_temp_parquet(&mut raw);

    let (df, rows, cols, _) = load_dataset_with_progress(&parquet_path, 100).unwrap();
    assert_eq!((rows, cols), (80, 17));
    assert!(df.equals_missing(&raw));
}

#[test]
fn test_csv_round_trip_cleans_like_in_memory() {
    let mut raw = create_raw_survey(300, 3);
    let (_temp_dir, csv_path) = create_temp_csv(&mut raw);
    let (loaded, _, _, _) = load_dataset_with_progress(&csv_path, 0).unwrap();

    let from_file = build_default_design(&loaded);
    let in_memory = build_default_design(&raw);
    assert_eq!(from_file.n_records(), in_memory.n_records());
    assert_eq!(from_file.n_strata(), in_memory.n_strata());
    assert_eq!(from_file.n_psu(), in_memory.n_psu());
}

#[test]
fn test_column_names_without_loading_rows() {
    let mut raw = create_raw_survey(10, 4);
    let (_temp_dir, csv_path) = create_temp_csv(&mut raw);

    let names = get_column_names(&csv_path).unwrap();
    assert_eq!(names.len(), 17);
    assert_eq!(names[0], "year");
    assert!(names.contains(&"wtssall".to_string()));
}

#[test]
fn test_unsupported_extension() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("extract.sav");
    std::fs::write(&path, b"not a dataset").unwrap();

    match load_dataset(&path, 100) {
        Ok(_) => panic!("expected an unsupported format error"),
        Err(err) => assert!(err.to_string().contains("Unsupported file format")),
    }
}

#[test]
fn test_missing_file_is_error() {
    let result = load_dataset_with_progress(std::path::Path::new("/nonexistent/extract.csv"), 100);
    assert!(result.is_err());
}
