//! Shared test utilities and fixture generators

#![allow(dead_code)]

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use tempfile::TempDir;

use svyretire::config::{CleaningConfig, DesignConfig};
use svyretire::pipeline::{clean_dataset, SurveyDesign};

/// Generating parameters of the synthetic retirement relationship
pub const TRUE_INTERCEPT: f64 = -12.0;
pub const TRUE_SLOPE: f64 = 1.76;

pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Raw columns in source order, filled by the generators below
#[derive(Default)]
struct RawColumns {
    year: Vec<i64>,
    id: Vec<i64>,
    age: Vec<i64>,
    race: Vec<i64>,
    sex: Vec<i64>,
    wrkstat: Vec<i64>,
    degree: Vec<i64>,
    marital: Vec<i64>,
    born: Vec<i64>,
    wrkgovt: Vec<i64>,
    vpsu: Vec<i64>,
    vstrat: Vec<i64>,
    wtssall: Vec<f64>,
}

impl RawColumns {
    fn into_frame(self) -> DataFrame {
        let n = self.year.len();
        let sampcode: Vec<i64> = self.vstrat.iter().map(|s| 500 + s).collect();
        df! {
            "year" => self.year,
            "id" => self.id,
            "age" => self.age,
            "race" => self.race,
            "sex" => self.sex,
            "wrkstat" => self.wrkstat,
            "degree" => self.degree,
            "marital" => self.marital,
            "born" => self.born,
            "wrkgovt" => self.wrkgovt,
            "vpsu" => self.vpsu,
            "vstrat" => self.vstrat,
            "oversamp" => vec![1.0f64; n],
            "formwt" => vec![1.0f64; n],
            "wtssall" => self.wtssall,
            "sampcode" => sampcode,
            "sample" => vec![10i64; n],
        }
        .unwrap()
    }
}

/// Random raw extract with survey codes.
///
/// Years run 1998..=2018 so the year filter has work to do, retirement
/// follows `logit(p) = TRUE_INTERCEPT + TRUE_SLOPE * age / 10`, and each
/// (year, stratum) holds two PSUs where the draw allows.
pub fn create_raw_survey(n: usize, seed: u64) -> DataFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut raw = RawColumns::default();
    let not_retired = [1i64, 2, 3, 4, 6, 7, 8];

    for i in 0..n {
        let age: i64 = rng.gen_range(18..=89);
        let p = logistic(TRUE_INTERCEPT + TRUE_SLOPE * age as f64 / 10.0);
        let retired = rng.gen::<f64>() < p;

        raw.year.push(1998 + (i % 21) as i64);
        raw.id.push(i as i64 + 1);
        raw.age.push(age);
        raw.race.push(rng.gen_range(1..=3));
        raw.sex.push(rng.gen_range(1..=2));
        raw.wrkstat.push(if retired {
            5
        } else {
            not_retired[rng.gen_range(0..not_retired.len())]
        });
        raw.degree.push(rng.gen_range(0..=4));
        raw.marital.push(rng.gen_range(1..=5));
        raw.born.push(rng.gen_range(1..=2));
        raw.wrkgovt.push(rng.gen_range(1..=2));
        raw.vstrat.push(rng.gen_range(1..=3));
        raw.vpsu.push(rng.gen_range(1..=2));
        raw.wtssall.push(rng.gen_range(0.5..1.5));
    }
    raw.into_frame()
}

/// 1,000 records with unit weights whose retirement shares follow the
/// generating curve as closely as 40 records per age allow.
///
/// Ages 41, 43, …, 89; within each age the first `round(40 p)` records are
/// retired. No sampling noise, so fits land near the generating values.
pub fn create_known_logistic_survey() -> DataFrame {
    let mut raw = RawColumns::default();
    let per_age = 40usize;
    let mut i = 0usize;

    for age in (41i64..=89).step_by(2) {
        let p = logistic(TRUE_INTERCEPT + TRUE_SLOPE * age as f64 / 10.0);
        let retired_count = (p * per_age as f64).round() as usize;
        for k in 0..per_age {
            raw.year.push(2000 + (i % 17) as i64);
            raw.id.push(i as i64 + 1);
            raw.age.push(age);
            raw.race.push(1 + (i % 3) as i64);
            raw.sex.push(1 + (i % 2) as i64);
            raw.wrkstat.push(if k < retired_count { 5 } else { 1 });
            raw.degree.push((i % 5) as i64);
            raw.marital.push(1 + (i % 5) as i64);
            raw.born.push(1 + ((i / 2) % 2) as i64);
            raw.wrkgovt.push(1 + ((i / 3) % 2) as i64);
            raw.vstrat.push(1 + ((i / 17) % 3) as i64);
            raw.vpsu.push(1 + ((i / 51) % 2) as i64);
            raw.wtssall.push(1.0);
            i += 1;
        }
    }
    raw.into_frame()
}

/// Small cleaned-shape table for design tests: strata "2004.1" and
/// "2004.2" hold two PSUs each, "2006.1" holds one.
pub fn create_lonely_psu_frame() -> DataFrame {
    df! {
        "year" => [2004i64, 2004, 2004, 2004, 2004, 2004, 2004, 2004, 2006, 2006],
        "stratum_id" => [1i64, 1, 1, 1, 2, 2, 2, 2, 1, 1],
        "primary_sampling_unit_id" => [1i64, 1, 2, 2, 1, 1, 2, 2, 1, 1],
        "analysis_weight" => [1.0f64, 1.5, 0.8, 1.2, 1.0, 0.9, 1.1, 1.3, 2.0, 0.7],
        "age" => [66.0f64, 45.0, 71.0, 30.0, 80.0, 52.0, 38.0, 69.0, 75.0, 41.0],
        "is_retired" => [true, false, true, false, true, false, false, true, true, false],
        "sex" => ["male", "female", "female", "male", "female", "male", "female", "male", "male", "female"],
    }
    .unwrap()
}

/// Clean a raw extract with default settings and attach its design
pub fn build_default_design(raw: &DataFrame) -> SurveyDesign {
    let design_config = DesignConfig::default();
    let (cleaned, _) = clean_dataset(raw, &CleaningConfig::default(), &design_config).unwrap();
    SurveyDesign::build(cleaned, &design_config).unwrap()
}

/// Create a temporary directory with a test CSV file
pub fn create_temp_csv(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let csv_path = temp_dir.path().join("gss_extract.csv");

    let mut file = std::fs::File::create(&csv_path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();

    (temp_dir, csv_path)
}

/// Create a temporary directory with a test Parquet file
pub fn create_temp_parquet(df: &mut DataFrame) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let parquet_path = temp_dir.path().join("gss_extract.parquet");

    let file = std::fs::File::create(&parquet_path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();

    (temp_dir, parquet_path)
}

/// Assert that a DataFrame contains specific columns
pub fn assert_has_columns(df: &DataFrame, expected_cols: &[&str]) {
    let actual_cols: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    for col in expected_cols {
        assert!(
            actual_cols.contains(&col.to_string()),
            "Missing expected column: '{}'. Actual columns: {:?}",
            col,
            actual_cols
        );
    }
}
