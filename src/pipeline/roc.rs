//! Receiver operating characteristic curves and AUC

use serde::Serialize;

use super::classification::validate_scores;
use super::model::FittedModel;
use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RocPoint {
    /// Scores at or above this value are classified positive
    pub threshold: f64,
    pub false_positive_rate: f64,
    pub true_positive_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RocCurve {
    pub model: String,
    pub points: Vec<RocPoint>,
    pub auc: f64,
}

/// ROC curve from (0, 0) to (1, 1) with area by the trapezoid rule.
///
/// Tied scores move the curve in a single diagonal step.
pub fn roc_curve(model: &str, probabilities: &[f64], observed: &[f64]) -> Result<RocCurve> {
    validate_scores(probabilities, observed)?;
    let positives = observed.iter().filter(|y| **y == 1.0).count();
    let negatives = observed.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(AnalysisError::InvalidInput(format!(
            "ROC for '{}' needs both outcomes ({} positive, {} negative)",
            model, positives, negatives
        )));
    }

    let mut order: Vec<usize> = (0..probabilities.len()).collect();
    order.sort_by(|&a, &b| probabilities[b].total_cmp(&probabilities[a]));

    let mut points = vec![RocPoint {
        threshold: f64::INFINITY,
        false_positive_rate: 0.0,
        true_positive_rate: 0.0,
    }];
    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < order.len() {
        let threshold = probabilities[order[i]];
        while i < order.len() && probabilities[order[i]] == threshold {
            if observed[order[i]] == 1.0 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        points.push(RocPoint {
            threshold,
            false_positive_rate: fp as f64 / negatives as f64,
            true_positive_rate: tp as f64 / positives as f64,
        });
    }

    let auc = points
        .windows(2)
        .map(|pair| {
            let width = pair[1].false_positive_rate - pair[0].false_positive_rate;
            width * (pair[0].true_positive_rate + pair[1].true_positive_rate) / 2.0
        })
        .sum();

    Ok(RocCurve {
        model: model.to_string(),
        points,
        auc,
    })
}

/// ROC curves for several fitted models on their own fitted rows
pub fn roc_curves(models: &[FittedModel]) -> Result<Vec<RocCurve>> {
    models
        .iter()
        .map(|m| roc_curve(m.name(), m.fitted(), m.observed()))
        .collect()
}
