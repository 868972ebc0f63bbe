//! Iteratively reweighted least squares for the binomial logit model
//!
//! A pure function of (X, y, prior weights, settings). Rows with zero prior
//! weight take no part in the fit but still receive fitted values.

use faer::Mat;
use thiserror::Error;

use super::linalg::{spd_inverse, weighted_cross_product};
use crate::config::IrlsConfig;

/// Fitted probabilities are kept this far from 0 and 1
const MU_EPSILON: f64 = 1e-10;

#[derive(Debug, Error, PartialEq)]
pub enum IrlsError {
    #[error("dimension mismatch: {0}")]
    Dimension(String),

    #[error("weighted cross-product matrix is singular at iteration {iteration}")]
    Singular { iteration: usize },

    #[error("deviance became non-finite at iteration {iteration}")]
    Diverged { iteration: usize },

    #[error("no convergence within {iterations} iterations")]
    NotConverged { iterations: usize },
}

impl IrlsError {
    /// Iterations completed before the failure
    pub fn iterations(&self) -> usize {
        match self {
            IrlsError::Dimension(_) => 0,
            IrlsError::Singular { iteration } | IrlsError::Diverged { iteration } => *iteration,
            IrlsError::NotConverged { iterations } => *iterations,
        }
    }
}

/// Output of a converged fit
#[derive(Debug, Clone)]
pub struct IrlsFit {
    pub coefficients: Vec<f64>,
    /// (Xᵀ W X)⁻¹ at the solution
    pub cov_unscaled: Mat<f64>,
    /// Xᵀ W X at the solution
    pub information: Mat<f64>,
    pub deviance: f64,
    pub iterations: usize,
    /// Fitted probabilities for every row
    pub fitted: Vec<f64>,
    pub linear_predictor: Vec<f64>,
}

#[inline]
pub fn expit(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

#[inline]
pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// Binomial deviance of 0/1 outcomes under fitted probabilities
pub fn binomial_deviance(y: &[f64], mu: &[f64], weights: &[f64]) -> f64 {
    y.iter()
        .zip(mu)
        .zip(weights)
        .filter(|(_, &w)| w > 0.0)
        .map(|((&y, &mu), &w)| {
            let mu = mu.clamp(MU_EPSILON, 1.0 - MU_EPSILON);
            -2.0 * w * (y * mu.ln() + (1.0 - y) * (1.0 - mu).ln())
        })
        .sum()
}

fn linear_predictor(x: &Mat<f64>, beta: &[f64]) -> Vec<f64> {
    (0..x.nrows())
        .map(|row| (0..x.ncols()).map(|j| x[(row, j)] * beta[j]).sum())
        .collect()
}

/// Fit a logistic regression by IRLS.
///
/// Converged when `|dev − dev_old| / (|dev| + 0.1) < tolerance`.
pub fn fit_irls(
    x: &Mat<f64>,
    y: &[f64],
    weights: &[f64],
    config: &IrlsConfig,
) -> Result<IrlsFit, IrlsError> {
    let n = x.nrows();
    let p = x.ncols();
    if y.len() != n || weights.len() != n {
        return Err(IrlsError::Dimension(format!(
            "X has {} rows, y has {}, weights have {}",
            n,
            y.len(),
            weights.len()
        )));
    }
    if p == 0 {
        return Err(IrlsError::Dimension("X has no columns".to_string()));
    }

    // Same starting values as the binomial family in classic GLM software
    let mut mu: Vec<f64> = y
        .iter()
        .zip(weights)
        .map(|(&y, &w)| (w * y + 0.5) / (w + 1.0))
        .collect();
    let mut eta: Vec<f64> = mu.iter().map(|&m| logit(m)).collect();
    let mut deviance_old = binomial_deviance(y, &mu, weights);
    let mut beta = vec![0.0; p];

    for iteration in 1..=config.max_iterations {
        let working_weights: Vec<f64> = mu
            .iter()
            .zip(weights)
            .map(|(&m, &w)| w * m * (1.0 - m))
            .collect();

        let xtwx = weighted_cross_product(x, &working_weights);
        let mut xtwz = vec![0.0; p];
        for row in 0..n {
            if working_weights[row] == 0.0 {
                continue;
            }
            let z = eta[row] + (y[row] - mu[row]) / (mu[row] * (1.0 - mu[row]));
            for (j, acc) in xtwz.iter_mut().enumerate() {
                *acc += x[(row, j)] * working_weights[row] * z;
            }
        }

        let inverse = spd_inverse(&xtwx).ok_or(IrlsError::Singular { iteration })?;
        beta = (0..p)
            .map(|i| (0..p).map(|j| inverse[(i, j)] * xtwz[j]).sum())
            .collect();

        eta = linear_predictor(x, &beta);
        mu = eta
            .iter()
            .map(|&e| expit(e).clamp(MU_EPSILON, 1.0 - MU_EPSILON))
            .collect();

        let deviance = binomial_deviance(y, &mu, weights);
        if !deviance.is_finite() {
            return Err(IrlsError::Diverged { iteration });
        }
        let change = (deviance - deviance_old).abs() / (deviance.abs() + 0.1);
        log::debug!(
            "IRLS iteration {}: deviance {:.6}, relative change {:.3e}",
            iteration,
            deviance,
            change
        );

        if change < config.tolerance {
            let final_weights: Vec<f64> = mu
                .iter()
                .zip(weights)
                .map(|(&m, &w)| w * m * (1.0 - m))
                .collect();
            let information = weighted_cross_product(x, &final_weights);
            let cov_unscaled =
                spd_inverse(&information).ok_or(IrlsError::Singular { iteration })?;

            return Ok(IrlsFit {
                coefficients: beta,
                cov_unscaled,
                information,
                deviance,
                iterations: iteration,
                fitted: mu,
                linear_predictor: eta,
            });
        }
        deviance_old = deviance;
    }

    log::debug!("IRLS stopped at {:?} without converging", beta);
    Err(IrlsError::NotConverged {
        iterations: config.max_iterations,
    })
}
