//! Command-line argument definitions using clap

use clap::Parser;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::AnalysisConfig;
use crate::pipeline::{LonelyPsu, ModelSpec};

/// svyretire - Fit survey-weighted logistic models of retirement
#[derive(Parser, Debug)]
#[command(name = "svyretire")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input file path (CSV or Parquet)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory for the JSON/CSV reports.
    /// Defaults to the directory of the input file.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON configuration file. Flags given on the command line override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// First survey year kept (inclusive)
    #[arg(long)]
    pub year_min: Option<i64>,

    /// Last survey year kept (inclusive)
    #[arg(long)]
    pub year_max: Option<i64>,

    /// Probability at or above which a respondent is classified retired
    #[arg(long, value_parser = validate_probability)]
    pub cutoff: Option<f64>,

    /// Confidence levels for prediction bands (comma-separated, e.g. 0.9,0.95,0.99)
    #[arg(long, value_delimiter = ',', value_parser = validate_level)]
    pub levels: Vec<f64>,

    /// Confidence level for coefficient intervals
    #[arg(long, value_parser = validate_level)]
    pub coefficient_level: Option<f64>,

    /// Policy for strata holding a single PSU.
    /// Options: "adjust" (default), "average", "certainty", "remove", "fail"
    #[arg(long)]
    pub lonely_psu: Option<LonelyPsu>,

    /// Model to fit as NAME=FORMULA, e.g. "age=is_retired ~ age_in_decades".
    /// Repeat for several models; replaces the default sequence.
    #[arg(short, long = "model", value_parser = parse_model)]
    pub models: Vec<ModelSpec>,

    /// Bundle the reports into a single zip archive
    #[arg(long, default_value = "false")]
    pub bundle: bool,

    /// Fit models one after another instead of on the thread pool
    #[arg(long, default_value = "false")]
    pub no_parallel: bool,

    /// Number of rows to use for schema inference (CSV only).
    /// Use 0 for full table scan.
    #[arg(long, default_value = "10000")]
    pub infer_schema_length: usize,
}

impl Cli {
    /// Output directory, defaulting to the directory of the input file
    pub fn output_dir(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            self.input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf()
        })
    }

    /// File stem shared by every report written for this input
    pub fn report_stem(&self) -> String {
        self.input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("svyretire")
            .to_string()
    }

    /// Configuration from `--config` (or defaults) with flag overrides applied
    pub fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)?,
            None => AnalysisConfig::default(),
        };

        if let Some(year_min) = self.year_min {
            config.cleaning.year_min = year_min;
        }
        if let Some(year_max) = self.year_max {
            config.cleaning.year_max = year_max;
        }
        if let Some(cutoff) = self.cutoff {
            config.diagnostics.cutoff = cutoff;
        }
        if !self.levels.is_empty() {
            config.diagnostics.prediction_levels = self.levels.clone();
        }
        if let Some(level) = self.coefficient_level {
            config.diagnostics.coefficient_level = level;
        }
        if let Some(policy) = self.lonely_psu {
            config.design.lonely_psu = policy;
        }
        if !self.models.is_empty() {
            config.models = self.models.clone();
        }
        if self.no_parallel {
            config.fit.parallel = false;
        }

        config
            .validate()
            .context("Invalid configuration after applying command-line flags")?;
        Ok(config)
    }
}

/// Validator for the classification cutoff
fn validate_probability(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;

    if !(0.0..=1.0).contains(&value) {
        Err(format!("cutoff must be between 0.0 and 1.0, got {}", value))
    } else {
        Ok(value)
    }
}

/// Validator for confidence levels
fn validate_level(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;

    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(format!(
            "confidence level must lie strictly between 0 and 1, got {}",
            value
        ))
    }
}

/// Parser for `NAME=FORMULA` model arguments
fn parse_model(s: &str) -> Result<ModelSpec, String> {
    let (name, formula) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=FORMULA, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("model name is empty in '{}'", s));
    }
    ModelSpec::parse(name, formula).map_err(|e| e.to_string())
}
