//! Coefficient tables, Wald tests and information criteria

use serde::Serialize;

use super::distributions::{chi_squared_upper_p, f_upper_p, t_critical, t_two_sided_p};
use super::linalg::{quadratic_form, spd_inverse, submatrix, trace_product};
use super::model::FittedModel;
use crate::error::{AnalysisError, Result};

/// One row of a coefficient table
#[derive(Debug, Clone, Serialize)]
pub struct CoefficientRow {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_value: f64,
    pub p_value: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoefficientTable {
    pub model: String,
    pub level: f64,
    pub df_residual: f64,
    pub rows: Vec<CoefficientRow>,
}

/// Wald test of a set of coefficients being jointly zero
#[derive(Debug, Clone, Serialize)]
pub struct WaldTest {
    pub label: String,
    pub coefficients: Vec<String>,
    /// Wald chi-square divided by `df1`
    pub f_statistic: f64,
    pub df1: f64,
    /// Denominator df; 0 when the design leaves none and chi-square is used
    pub df2: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AicSummary {
    pub deviance: f64,
    pub log_likelihood: f64,
    pub parameters: usize,
    pub aic: f64,
    /// trace(XᵀWX · V_design)
    pub effective_parameters: f64,
    /// Mean design effect of the coefficients
    pub deltabar: f64,
    pub design_aic: f64,
}

/// Coefficient table with t statistics on the residual degrees of freedom
pub fn coefficient_table(model: &FittedModel, level: f64) -> CoefficientTable {
    let df = model.df_residual();
    let q = t_critical(level, df);
    let rows = model
        .column_names()
        .iter()
        .zip(model.coefficients())
        .zip(model.std_errors())
        .map(|((name, &estimate), std_error)| {
            let t_value = estimate / std_error;
            CoefficientRow {
                term: name.clone(),
                estimate,
                std_error,
                t_value,
                p_value: t_two_sided_p(t_value, df),
                lower: estimate - q * std_error,
                upper: estimate + q * std_error,
            }
        })
        .collect();

    CoefficientTable {
        model: model.name().to_string(),
        level,
        df_residual: df,
        rows,
    }
}

/// Wald test on coefficient indices of one model
pub fn wald_test(model: &FittedModel, indices: &[usize], label: &str) -> Result<WaldTest> {
    if indices.is_empty() {
        return Err(AnalysisError::InvalidInput(format!(
            "Wald test '{}' has no coefficients",
            label
        )));
    }
    let beta: Vec<f64> = indices.iter().map(|&i| model.coefficients()[i]).collect();
    let v = submatrix(model.covariance(), indices);
    let v_inv = spd_inverse(&v).ok_or_else(|| {
        AnalysisError::InvalidInput(format!(
            "covariance of the coefficients tested by '{}' is singular",
            label
        ))
    })?;

    let chi_square = quadratic_form(&beta, &v_inv);
    let df1 = indices.len() as f64;
    let df2 = model.df_residual();
    let f_statistic = chi_square / df1;
    let (df2, p_value) = if df2 > 0.0 {
        (df2, f_upper_p(f_statistic, df1, df2))
    } else {
        (0.0, chi_squared_upper_p(chi_square, df1))
    };

    Ok(WaldTest {
        label: label.to_string(),
        coefficients: indices
            .iter()
            .map(|&i| model.column_names()[i].clone())
            .collect(),
        f_statistic,
        df1,
        df2,
        p_value,
    })
}

/// One Wald F-test per model term
pub fn term_tests(model: &FittedModel) -> Result<Vec<WaldTest>> {
    model
        .term_columns()
        .iter()
        .map(|(term, columns)| {
            let indices: Vec<usize> = columns.clone().collect();
            wald_test(model, &indices, &term.to_string())
        })
        .collect()
}

/// Test the coefficients the larger model adds over the smaller one
pub fn compare_nested(smaller: &FittedModel, larger: &FittedModel) -> Result<WaldTest> {
    let missing: Vec<&String> = smaller
        .column_names()
        .iter()
        .filter(|name| larger.coefficient_index(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(AnalysisError::InvalidInput(format!(
            "model '{}' is not nested in '{}' (extra coefficients {:?})",
            smaller.name(),
            larger.name(),
            missing
        )));
    }
    let added: Vec<usize> = larger
        .column_names()
        .iter()
        .enumerate()
        .filter(|(_, name)| smaller.coefficient_index(name).is_none())
        .map(|(i, _)| i)
        .collect();
    if added.is_empty() {
        return Err(AnalysisError::InvalidInput(format!(
            "model '{}' adds no coefficients to '{}'",
            larger.name(),
            smaller.name()
        )));
    }
    wald_test(
        larger,
        &added,
        &format!("{} vs {}", larger.name(), smaller.name()),
    )
}

/// Standard and design-adjusted AIC
pub fn aic(model: &FittedModel) -> AicSummary {
    let p = model.coefficients().len();
    let deviance = model.deviance();
    let effective_parameters = trace_product(model.information(), model.covariance());
    AicSummary {
        deviance,
        log_likelihood: -deviance / 2.0,
        parameters: p,
        aic: deviance + 2.0 * p as f64,
        effective_parameters,
        deltabar: effective_parameters / p as f64,
        design_aic: deviance + 2.0 * effective_parameters,
    }
}
