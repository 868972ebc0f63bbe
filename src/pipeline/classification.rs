//! Classification accuracy of fitted probabilities at a cutoff

use serde::Serialize;

use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationAccuracy {
    pub cutoff: f64,
    pub true_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    /// Share of retired respondents predicted retired
    pub sensitivity: f64,
    /// Share of non-retired respondents predicted non-retired
    pub specificity: f64,
    pub accuracy: f64,
}

/// Shared checks for probability/outcome pairs
pub(crate) fn validate_scores(probabilities: &[f64], observed: &[f64]) -> Result<()> {
    if probabilities.len() != observed.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "{} probabilities but {} observed outcomes",
            probabilities.len(),
            observed.len()
        )));
    }
    if let Some(bad) = probabilities
        .iter()
        .find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0)
    {
        return Err(AnalysisError::InvalidInput(format!(
            "probability {} is outside [0, 1]",
            bad
        )));
    }
    if let Some(bad) = observed.iter().find(|y| **y != 0.0 && **y != 1.0) {
        return Err(AnalysisError::InvalidInput(format!(
            "observed outcome {} is not 0 or 1",
            bad
        )));
    }
    Ok(())
}

/// Sensitivity and specificity when `p ≥ cutoff` predicts retirement.
///
/// Fails when the outcomes hold no positives or no negatives, since one of
/// the two rates is then undefined.
pub fn classification_accuracy(
    probabilities: &[f64],
    observed: &[f64],
    cutoff: f64,
) -> Result<ClassificationAccuracy> {
    validate_scores(probabilities, observed)?;
    if !(0.0..=1.0).contains(&cutoff) {
        return Err(AnalysisError::InvalidInput(format!(
            "cutoff {} is outside [0, 1]",
            cutoff
        )));
    }

    let (mut tp, mut fn_, mut tn, mut fp) = (0usize, 0usize, 0usize, 0usize);
    for (&p, &y) in probabilities.iter().zip(observed) {
        match (p >= cutoff, y == 1.0) {
            (true, true) => tp += 1,
            (false, true) => fn_ += 1,
            (false, false) => tn += 1,
            (true, false) => fp += 1,
        }
    }

    if tp + fn_ == 0 {
        return Err(AnalysisError::InvalidInput(
            "observed outcomes contain no positives; sensitivity is undefined".to_string(),
        ));
    }
    if tn + fp == 0 {
        return Err(AnalysisError::InvalidInput(
            "observed outcomes contain no negatives; specificity is undefined".to_string(),
        ));
    }

    Ok(ClassificationAccuracy {
        cutoff,
        true_positives: tp,
        false_negatives: fn_,
        true_negatives: tn,
        false_positives: fp,
        sensitivity: tp as f64 / (tp + fn_) as f64,
        specificity: tn as f64 / (tn + fp) as f64,
        accuracy: (tp + tn) as f64 / observed.len() as f64,
    })
}
