//! One full pass: clean → design → describe → fit → diagnose

use polars::prelude::*;
use serde::Serialize;

use super::classification::{classification_accuracy, ClassificationAccuracy};
use super::cleaner::{check_requested_columns, clean_dataset, CleaningReport, IS_RETIRED};
use super::design::{DesignSummary, SurveyDesign};
use super::estimate::{BoxSummary, DomainEstimate, Estimate};
use super::inference::{aic, coefficient_table, compare_nested, wald_test, AicSummary, CoefficientTable, WaldTest};
use super::model::{fit_models, FailedFit, FittedModel};
use super::prediction::{prediction_grids, PredictionGrid};
use super::roc::{roc_curve, RocCurve};
use crate::config::AnalysisConfig;
use crate::error::Result;

/// Design-based descriptive statistics of the cleaned sample
#[derive(Debug, Clone, Serialize)]
pub struct Descriptives {
    pub retired_share: Estimate,
    pub retired_by_year: Vec<DomainEstimate>,
    pub retired_by_sex: Vec<DomainEstimate>,
    pub retired_by_nativity: Vec<DomainEstimate>,
    pub retired_by_sector: Vec<DomainEstimate>,
    pub age_by_retirement: Vec<BoxSummary>,
}

/// Everything reported about one fitted model
#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub name: String,
    pub formula: String,
    pub records_used: usize,
    pub iterations: usize,
    pub deviance: f64,
    pub null_deviance: f64,
    pub dispersion: f64,
    pub coefficients: CoefficientTable,
    pub aic: AicSummary,
    pub term_tests: Vec<WaldTest>,
    pub accuracy: Option<ClassificationAccuracy>,
    pub roc: Option<RocCurve>,
    /// Diagnostics that could not be computed for this model
    pub warnings: Vec<String>,
}

/// Result of a complete analysis run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub cleaning: CleaningReport,
    pub design: DesignSummary,
    pub descriptives: Descriptives,
    pub models: Vec<ModelReport>,
    pub comparisons: Vec<WaldTest>,
    pub prediction_grids: Vec<PredictionGrid>,
    pub failed_models: Vec<FailedFit>,
    #[serde(skip)]
    pub fitted: Vec<FittedModel>,
}

fn describe(design: &SurveyDesign, level: f64) -> Result<Descriptives> {
    Ok(Descriptives {
        retired_share: design.proportion(IS_RETIRED, level)?,
        retired_by_year: design.proportion_by(IS_RETIRED, "year", level)?,
        retired_by_sex: optional_domain(design, "sex", level)?,
        retired_by_nativity: design.proportion_by(IS_RETIRED, "nativity", level)?,
        retired_by_sector: design.proportion_by(IS_RETIRED, "sector", level)?,
        age_by_retirement: design.box_summaries_by("age", IS_RETIRED)?,
    })
}

/// Domain estimates for a column the cleaner may have dropped
fn optional_domain(design: &SurveyDesign, column: &str, level: f64) -> Result<Vec<DomainEstimate>> {
    if design.frame().column(column).is_err() {
        log::warn!("column '{}' not retained; skipping its domain estimates", column);
        return Ok(Vec::new());
    }
    design.proportion_by(IS_RETIRED, column, level)
}

fn report_model(model: &FittedModel, config: &AnalysisConfig) -> ModelReport {
    let diagnostics = &config.diagnostics;
    let mut warnings = Vec::new();
    let mut note = |what: &str, e: &dyn std::fmt::Display| {
        log::warn!("model '{}': {} unavailable: {}", model.name(), what, e);
        warnings.push(format!("{} unavailable: {}", what, e));
    };

    let accuracy = classification_accuracy(model.fitted(), model.observed(), diagnostics.cutoff)
        .map_err(|e| note("accuracy", &e))
        .ok();
    let roc = roc_curve(model.name(), model.fitted(), model.observed())
        .map_err(|e| note("ROC", &e))
        .ok();

    let mut term_tests = Vec::with_capacity(model.term_columns().len());
    for (term, columns) in model.term_columns() {
        let indices: Vec<usize> = columns.clone().collect();
        let label = term.to_string();
        match wald_test(model, &indices, &label) {
            Ok(test) => term_tests.push(test),
            Err(e) => note(&format!("test of '{}'", label), &e),
        }
    }

    ModelReport {
        name: model.name().to_string(),
        formula: model.spec().formula(),
        records_used: model.n_used(),
        iterations: model.iterations(),
        deviance: model.deviance(),
        null_deviance: model.null_deviance(),
        dispersion: model.dispersion(),
        coefficients: coefficient_table(model, diagnostics.coefficient_level),
        aic: aic(model),
        term_tests,
        accuracy,
        roc,
        warnings,
    }
}

/// Run the whole analysis on a raw survey extract.
///
/// Cleaning and design errors abort. A model that fails to converge is
/// listed in `failed_models` and the others are still reported. Diagnostics
/// that fail for one model are noted in its `warnings`.
pub fn run_analysis(raw: &DataFrame, config: &AnalysisConfig) -> Result<AnalysisOutcome> {
    check_requested_columns(raw, &config.cleaning.retained_columns)?;
    let (cleaned, cleaning) = clean_dataset(raw, &config.cleaning, &config.design)?;
    let design = SurveyDesign::build(cleaned, &config.design)?;

    let descriptives = describe(&design, config.diagnostics.coefficient_level)?;
    let fits = fit_models(&design, &config.models, &config.fit)?;

    let mut models: Vec<ModelReport> = fits
        .models
        .iter()
        .map(|model| report_model(model, config))
        .collect();

    let mut comparisons = Vec::new();
    for pair in fits.models.windows(2) {
        match compare_nested(&pair[0], &pair[1]) {
            Ok(test) => comparisons.push(test),
            Err(e) => log::warn!(
                "skipping comparison of '{}' and '{}': {}",
                pair[0].name(),
                pair[1].name(),
                e
            ),
        }
    }

    let mut grids = Vec::new();
    for (model, report) in fits.models.iter().zip(models.iter_mut()) {
        match prediction_grids(std::slice::from_ref(model), &config.diagnostics) {
            Ok(model_grids) => grids.extend(model_grids),
            Err(e) => {
                log::warn!("model '{}': prediction grids unavailable: {}", model.name(), e);
                report.warnings.push(format!("prediction grids unavailable: {}", e));
            }
        }
    }

    log::info!(
        "analysis complete: {} model(s) fitted, {} failed, {} prediction grid(s)",
        fits.models.len(),
        fits.failures.len(),
        grids.len()
    );

    Ok(AnalysisOutcome {
        cleaning,
        design: design.summary(),
        descriptives,
        models,
        comparisons,
        prediction_grids: grids,
        failed_models: fits.failures,
        fitted: fits.models,
    })
}
