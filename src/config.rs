//! Analysis configuration
//!
//! Every option that shapes cleaning, design construction, fitting and
//! diagnostics lives here and is passed explicitly down the pipeline.
//! Values load from a JSON file and are then overridden by CLI flags.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pipeline::{LonelyPsu, ModelSpec};

/// Source column name → cleaned column name, in cleaned-table order
pub const DEFAULT_COLUMN_MAP: [(&str, &str); 17] = [
    ("year", "year"),
    ("id", "id"),
    ("age", "age"),
    ("race", "race"),
    ("sex", "sex"),
    ("wrkstat", "employment_status"),
    ("degree", "education_level"),
    ("marital", "marital_status"),
    ("born", "nativity"),
    ("wrkgovt", "sector"),
    ("vpsu", "primary_sampling_unit_id"),
    ("vstrat", "stratum_id"),
    ("oversamp", "oversampling_flag"),
    ("formwt", "experiment_weight"),
    ("wtssall", "analysis_weight"),
    ("sampcode", "sampling_error_code"),
    ("sample", "sample_id"),
];

/// Variable selection and filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Source columns to keep (must all exist in the source table)
    pub retained_columns: Vec<String>,
    /// Source → cleaned column names; unmapped columns keep their name
    pub column_map: BTreeMap<String, String>,
    /// First survey year kept (inclusive)
    pub year_min: i64,
    /// Last survey year kept (inclusive)
    pub year_max: i64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            retained_columns: DEFAULT_COLUMN_MAP
                .iter()
                .map(|(source, _)| source.to_string())
                .collect(),
            column_map: DEFAULT_COLUMN_MAP
                .iter()
                .map(|(source, cleaned)| (source.to_string(), cleaned.to_string()))
                .collect(),
            year_min: 2000,
            year_max: 2016,
        }
    }
}

impl CleaningConfig {
    /// Cleaned name of a source column
    pub fn cleaned_name<'a>(&'a self, source: &'a str) -> &'a str {
        self.column_map
            .get(source)
            .map(String::as_str)
            .unwrap_or(source)
    }
}

/// Sampling metadata used to build the survey design
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignConfig {
    /// Cleaned column holding the primary sampling unit id
    pub cluster: String,
    /// Cleaned column holding the analysis weight
    pub weight: String,
    /// Cleaned columns whose interaction defines the strata
    pub strata: Vec<String>,
    /// Cluster ids are only unique within a stratum
    pub nest: bool,
    /// Policy for strata with a single PSU
    pub lonely_psu: LonelyPsu,
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            cluster: "primary_sampling_unit_id".to_string(),
            weight: "analysis_weight".to_string(),
            strata: vec!["year".to_string(), "stratum_id".to_string()],
            nest: true,
            lonely_psu: LonelyPsu::default(),
        }
    }
}

/// Iteratively reweighted least squares settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IrlsConfig {
    /// Iterations allowed before the fit fails
    pub max_iterations: usize,
    /// Relative deviance change that counts as converged
    pub tolerance: f64,
}

impl Default for IrlsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            tolerance: 1e-8,
        }
    }
}

/// Model fitting options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub irls: IrlsConfig,
    /// Rescale prior weights to mean 1 over the fitted rows
    pub rescale_weights: bool,
    /// Treatment-contrast reference level per factor (defaults to first level)
    pub reference_levels: BTreeMap<String, String>,
    /// Fit independent specs on the rayon pool
    pub parallel: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            irls: IrlsConfig::default(),
            rescale_weights: true,
            reference_levels: BTreeMap::new(),
            parallel: true,
        }
    }
}

/// Diagnostics and prediction-grid options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Probability at or above which a respondent is classified retired
    pub cutoff: f64,
    /// Confidence levels for prediction bands
    pub prediction_levels: Vec<f64>,
    /// Confidence level for coefficient tables
    pub coefficient_level: f64,
    /// Age range of prediction grids, in decades
    pub grid_age_min: f64,
    pub grid_age_max: f64,
    /// Points per prediction grid
    pub grid_points: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            cutoff: 0.5,
            prediction_levels: vec![0.90, 0.95, 0.99],
            coefficient_level: 0.95,
            grid_age_min: 1.8,
            grid_age_max: 8.9,
            grid_points: 100,
        }
    }
}

/// Complete configuration for one analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub cleaning: CleaningConfig,
    pub design: DesignConfig,
    pub fit: FitConfig,
    pub diagnostics: DiagnosticsConfig,
    /// Models to fit, in order of increasing complexity
    pub models: Vec<ModelSpec>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            cleaning: CleaningConfig::default(),
            design: DesignConfig::default(),
            fit: FitConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            models: ModelSpec::standard_sequence(),
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration file; missing sections take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AnalysisConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could satisfy
    pub fn validate(&self) -> Result<()> {
        if self.cleaning.year_min > self.cleaning.year_max {
            anyhow::bail!(
                "year_min ({}) must not exceed year_max ({})",
                self.cleaning.year_min,
                self.cleaning.year_max
            );
        }
        if !(0.0..=1.0).contains(&self.diagnostics.cutoff) {
            anyhow::bail!(
                "cutoff must be between 0.0 and 1.0, got {}",
                self.diagnostics.cutoff
            );
        }
        let levels = self
            .diagnostics
            .prediction_levels
            .iter()
            .chain(std::iter::once(&self.diagnostics.coefficient_level));
        for &level in levels {
            if !(level > 0.0 && level < 1.0) {
                anyhow::bail!("confidence levels must lie in (0, 1), got {}", level);
            }
        }
        if self.diagnostics.grid_points < 2 {
            anyhow::bail!("grid_points must be at least 2");
        }
        if self.diagnostics.grid_age_min >= self.diagnostics.grid_age_max {
            anyhow::bail!("grid age range is empty");
        }
        if self.fit.irls.max_iterations == 0 || self.fit.irls.tolerance <= 0.0 {
            anyhow::bail!("IRLS needs at least one iteration and a positive tolerance");
        }
        if self.models.is_empty() {
            anyhow::bail!("at least one model specification is required");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.cleaning.year_min, 2000);
        assert_eq!(config.cleaning.year_max, 2016);
        assert_eq!(config.diagnostics.cutoff, 0.5);
        assert_eq!(config.diagnostics.prediction_levels, vec![0.90, 0.95, 0.99]);
        assert_eq!(config.design.lonely_psu, LonelyPsu::Adjust);
        assert_eq!(config.models.len(), 3);
        assert_eq!(config.cleaning.retained_columns.len(), 17);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cleaned_name_falls_back_to_source() {
        let config = CleaningConfig::default();
        assert_eq!(config.cleaned_name("wrkstat"), "employment_status");
        assert_eq!(config.cleaned_name("region"), "region");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{ "cleaning": { "year_min": 2004 }, "design": { "lonely_psu": "certainty" } }"#,
        )
        .unwrap();
        assert_eq!(config.cleaning.year_min, 2004);
        assert_eq!(config.cleaning.year_max, 2016);
        assert_eq!(config.design.lonely_psu, LonelyPsu::Certainty);
        assert_eq!(config.design.cluster, "primary_sampling_unit_id");
    }

    #[test]
    fn test_validate_rejects_bad_cutoff() {
        let mut config = AnalysisConfig::default();
        config.diagnostics.cutoff = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_years() {
        let mut config = AnalysisConfig::default();
        config.cleaning.year_min = 2017;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "diagnostics": { "cutoff": 0.4 } }"#).unwrap();
        let config = AnalysisConfig::from_json_file(&path).unwrap();
        assert_eq!(config.diagnostics.cutoff, 0.4);
    }
}
