//! Design-weighted quasi-binomial logistic regression
//!
//! Coefficients come from IRLS on the (rescaled) survey weights. Their
//! covariance is the design-based sandwich: per-record influence functions
//! `U_i (XᵀWX)⁻¹` are totalled by PSU and fed through the design's
//! Taylor-linearisation variance.

use std::ops::Range;

use faer::Mat;
use rayon::prelude::*;
use serde::Serialize;

use super::design::SurveyDesign;
use super::irls::{binomial_deviance, fit_irls};
use super::terms::{response_values, Contrasts, DesignMatrix, ModelSpec, Term};
use super::weights::rescale_to_unit_mean;
use crate::config::FitConfig;
use crate::error::{AnalysisError, Result};

/// An immutable fitted model
#[derive(Debug, Clone)]
pub struct FittedModel {
    spec: ModelSpec,
    contrasts: Contrasts,
    column_names: Vec<String>,
    term_columns: Vec<(Term, Range<usize>)>,
    coefficients: Vec<f64>,
    covariance: Mat<f64>,
    naive_covariance: Mat<f64>,
    information: Mat<f64>,
    fitted: Vec<f64>,
    observed: Vec<f64>,
    prior_weights: Vec<f64>,
    deviance: f64,
    null_deviance: f64,
    dispersion: f64,
    df_residual: f64,
    iterations: usize,
}

impl FittedModel {
    /// Assemble a model from known coefficients and covariance.
    ///
    /// Used for prediction with published estimates; no data is attached,
    /// so accuracy and ROC are unavailable.
    pub fn from_parts(
        spec: ModelSpec,
        contrasts: Contrasts,
        column_names: Vec<String>,
        coefficients: Vec<f64>,
        covariance: Mat<f64>,
        df_residual: f64,
    ) -> Result<Self> {
        let p = coefficients.len();
        if column_names.len() != p || covariance.nrows() != p || covariance.ncols() != p {
            return Err(AnalysisError::InvalidInput(format!(
                "{} coefficients need {} names and a {}×{} covariance",
                p, p, p, p
            )));
        }
        Ok(Self {
            spec,
            contrasts,
            column_names,
            term_columns: Vec::new(),
            coefficients,
            naive_covariance: covariance.clone(),
            information: Mat::zeros(p, p),
            covariance,
            fitted: Vec::new(),
            observed: Vec::new(),
            prior_weights: Vec::new(),
            deviance: f64::NAN,
            null_deviance: f64::NAN,
            dispersion: f64::NAN,
            df_residual,
            iterations: 0,
        })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn contrasts(&self) -> &Contrasts {
        &self.contrasts
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Coefficient columns belonging to each term
    pub fn term_columns(&self) -> &[(Term, Range<usize>)] {
        &self.term_columns
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Design-based covariance of the coefficients
    pub fn covariance(&self) -> &Mat<f64> {
        &self.covariance
    }

    /// Model-based (XᵀWX)⁻¹, unscaled by the dispersion
    pub fn naive_covariance(&self) -> &Mat<f64> {
        &self.naive_covariance
    }

    /// XᵀWX at the solution
    pub fn information(&self) -> &Mat<f64> {
        &self.information
    }

    /// Fitted probabilities of the rows used in the fit
    pub fn fitted(&self) -> &[f64] {
        &self.fitted
    }

    /// Observed 0/1 responses of the rows used in the fit
    pub fn observed(&self) -> &[f64] {
        &self.observed
    }

    /// Rescaled prior weights of the rows used in the fit
    pub fn prior_weights(&self) -> &[f64] {
        &self.prior_weights
    }

    pub fn deviance(&self) -> f64 {
        self.deviance
    }

    pub fn null_deviance(&self) -> f64 {
        self.null_deviance
    }

    pub fn dispersion(&self) -> f64 {
        self.dispersion
    }

    pub fn df_residual(&self) -> f64 {
        self.df_residual
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn n_used(&self) -> usize {
        self.fitted.len()
    }

    /// Standard errors from the design-based covariance
    pub fn std_errors(&self) -> Vec<f64> {
        (0..self.coefficients.len())
            .map(|i| self.covariance[(i, i)].max(0.0).sqrt())
            .collect()
    }

    /// Index of a coefficient by column name
    pub fn coefficient_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }
}

/// Fit one specification against a survey design.
///
/// Rows missing the response or a covariate are left out of the fit but
/// keep a zero score in the variance, so standard errors respect the full
/// design.
pub fn fit_model(design: &SurveyDesign, spec: &ModelSpec, config: &FitConfig) -> Result<FittedModel> {
    let contrasts = Contrasts::new(&config.reference_levels)?;
    let matrix = DesignMatrix::build(design.frame(), spec, &contrasts)?;
    let response = response_values(design.frame())?;

    let used: Vec<bool> = matrix
        .complete
        .iter()
        .zip(&response)
        .map(|(&complete, y)| complete && y.is_some())
        .collect();
    let n_used = used.iter().filter(|u| **u).count();
    if n_used == 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "model '{}' has no complete records to fit",
            spec.name
        )));
    }
    let dropped = design.n_records() - n_used;
    if dropped > 0 {
        log::warn!(
            "model '{}': {} record(s) with missing covariates left out of the fit",
            spec.name,
            dropped
        );
    }

    let prior: Vec<f64> = if config.rescale_weights {
        rescale_to_unit_mean(design.weights(), &used)
    } else {
        design
            .weights()
            .iter()
            .zip(&used)
            .map(|(&w, &keep)| if keep { w } else { 0.0 })
            .collect()
    };
    let y: Vec<f64> = response.iter().map(|v| v.unwrap_or(0.0)).collect();

    let fit = fit_irls(&matrix.x, &y, &prior, &config.irls).map_err(|e| {
        AnalysisError::Convergence {
            model: spec.name.clone(),
            iterations: e.iterations(),
            reason: e.to_string(),
        }
    })?;

    // Influence functions U_i (XᵀWX)⁻¹, zero for rows outside the fit
    let n = design.n_records();
    let p = matrix.n_coefficients();
    let mut influence = Mat::<f64>::zeros(n, p);
    for row in 0..n {
        if !used[row] || prior[row] == 0.0 {
            continue;
        }
        let residual = prior[row] * (y[row] - fit.fitted[row]);
        for j in 0..p {
            let mut value = 0.0;
            for k in 0..p {
                value += residual * matrix.x[(row, k)] * fit.cov_unscaled[(k, j)];
            }
            influence[(row, j)] = value;
        }
    }
    let covariance = design.total_covariance(&influence)?;

    let mut weight_total = 0.0;
    let mut pearson = 0.0;
    let mut weighted_y = 0.0;
    let mut fitted = Vec::with_capacity(n_used);
    let mut observed = Vec::with_capacity(n_used);
    let mut prior_weights = Vec::with_capacity(n_used);
    for row in (0..n).filter(|&row| used[row]) {
        let mu = fit.fitted[row];
        weight_total += prior[row];
        weighted_y += prior[row] * y[row];
        pearson += prior[row] * (y[row] - mu).powi(2) / (mu * (1.0 - mu));
        fitted.push(mu);
        observed.push(y[row]);
        prior_weights.push(prior[row]);
    }
    let dispersion = pearson / weight_total;
    let null_mu = vec![weighted_y / weight_total; n];
    let null_deviance = binomial_deviance(&y, &null_mu, &prior);
    let df_residual = design.degrees_of_freedom() + 1.0 - p as f64;

    log::info!(
        "fitted '{}' in {} iteration(s): deviance {:.3}, null deviance {:.3}, dispersion {:.4}",
        spec.name,
        fit.iterations,
        fit.deviance,
        null_deviance,
        dispersion
    );

    Ok(FittedModel {
        spec: spec.clone(),
        contrasts,
        column_names: matrix.column_names,
        term_columns: matrix.term_columns,
        coefficients: fit.coefficients,
        covariance,
        naive_covariance: fit.cov_unscaled,
        information: fit.information,
        fitted,
        observed,
        prior_weights,
        deviance: fit.deviance,
        null_deviance,
        dispersion,
        df_residual,
        iterations: fit.iterations,
    })
}

/// A specification that could not be fit
#[derive(Debug, Clone, Serialize)]
pub struct FailedFit {
    pub model: String,
    pub error: String,
}

/// Models that fit, in spec order, and those that did not
#[derive(Debug, Clone, Default)]
pub struct ModelFits {
    pub models: Vec<FittedModel>,
    pub failures: Vec<FailedFit>,
}

/// Fit several specifications, optionally on the rayon pool.
///
/// A spec that fails to converge is recorded and the rest proceed; schema
/// or design errors abort the whole call.
pub fn fit_models(design: &SurveyDesign, specs: &[ModelSpec], config: &FitConfig) -> Result<ModelFits> {
    let results: Vec<Result<FittedModel>> = if config.parallel {
        specs
            .par_iter()
            .map(|spec| fit_model(design, spec, config))
            .collect()
    } else {
        specs
            .iter()
            .map(|spec| fit_model(design, spec, config))
            .collect()
    };

    let mut fits = ModelFits::default();
    for (spec, result) in specs.iter().zip(results) {
        match result {
            Ok(model) => fits.models.push(model),
            Err(e) if !e.is_fatal() => {
                log::warn!("model '{}' failed: {}", spec.name, e);
                fits.failures.push(FailedFit {
                    model: spec.name.clone(),
                    error: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(fits)
}
