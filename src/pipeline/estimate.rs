//! Design-based descriptive estimators: means, proportions, domains, quantiles

use faer::Mat;
use polars::prelude::*;
use serde::Serialize;

use super::design::SurveyDesign;
use super::distributions::t_critical;
use crate::error::{AnalysisError, Result};

/// A point estimate with its design-based uncertainty
#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    pub estimate: f64,
    pub std_error: f64,
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
}

/// Estimate for one domain (subpopulation) of the design
#[derive(Debug, Clone, Serialize)]
pub struct DomainEstimate {
    pub group: String,
    /// Unweighted records in the domain
    pub records: usize,
    pub estimate: Estimate,
}

/// Weighted five-number summary for one group
#[derive(Debug, Clone, Serialize)]
pub struct BoxSummary {
    pub group: String,
    pub records: usize,
    pub min: f64,
    pub lower_quartile: f64,
    pub median: f64,
    pub upper_quartile: f64,
    pub max: f64,
    pub mean: f64,
}

fn numeric_values(design: &SurveyDesign, column: &str) -> Result<Vec<Option<f64>>> {
    let col = design.frame().column(column).map_err(|_| {
        AnalysisError::Schema(format!("column '{}' not found in design frame", column))
    })?;
    let floats = col.cast(&DataType::Float64)?;
    Ok(floats.f64()?.iter().collect())
}

fn group_labels(design: &SurveyDesign, column: &str) -> Result<Vec<Option<String>>> {
    let col = design.frame().column(column).map_err(|_| {
        AnalysisError::Schema(format!("column '{}' not found in design frame", column))
    })?;
    let labels = col.cast(&DataType::String)?;
    Ok(labels
        .str()?
        .iter()
        .map(|label| label.map(str::to_string))
        .collect())
}

/// Distinct non-null labels in order of first appearance
fn distinct_groups(labels: &[Option<String>]) -> Vec<String> {
    let mut groups: Vec<String> = Vec::new();
    for label in labels.iter().flatten() {
        if !groups.contains(label) {
            groups.push(label.clone());
        }
    }
    groups
}

/// Weighted mean over the rows where `values` is present (and `domain` holds).
///
/// Rows outside the domain contribute zero scores, so the variance keeps the
/// full design structure.
fn domain_mean(
    design: &SurveyDesign,
    values: &[Option<f64>],
    domain: &[bool],
    level: f64,
) -> Result<Estimate> {
    let weights = design.weights();
    let (weighted_sum, weight_total) = values
        .iter()
        .zip(weights)
        .zip(domain)
        .filter_map(|((v, &w), &inside)| v.filter(|_| inside).map(|v| (v, w)))
        .fold((0.0, 0.0), |(s, t), (v, w)| (s + w * v, t + w));

    if weight_total <= 0.0 {
        return Err(AnalysisError::InvalidInput(
            "no weighted records available for the estimate".to_string(),
        ));
    }
    let mean = weighted_sum / weight_total;

    let scores = Mat::from_fn(values.len(), 1, |i, _| match values[i] {
        Some(v) if domain[i] => weights[i] * (v - mean) / weight_total,
        _ => 0.0,
    });
    let variance = design.total_covariance(&scores)?[(0, 0)];
    let std_error = variance.max(0.0).sqrt();
    let q = t_critical(level, design.degrees_of_freedom());

    Ok(Estimate {
        estimate: mean,
        std_error,
        lower: mean - q * std_error,
        upper: mean + q * std_error,
        level,
    })
}

/// Logit-scale interval for a proportion; degenerate at 0 and 1
fn proportion_interval(mean: Estimate, df: f64) -> Estimate {
    let p = mean.estimate;
    if p <= 0.0 || p >= 1.0 || mean.std_error <= 0.0 {
        let p = p.clamp(0.0, 1.0);
        return Estimate {
            estimate: p,
            lower: p,
            upper: p,
            ..mean
        };
    }
    let q = t_critical(mean.level, df);
    let logit = (p / (1.0 - p)).ln();
    let half_width = q * mean.std_error / (p * (1.0 - p));
    let expit = |x: f64| 1.0 / (1.0 + (-x).exp());
    Estimate {
        lower: expit(logit - half_width).min(p),
        upper: expit(logit + half_width).max(p),
        ..mean
    }
}

impl SurveyDesign {
    /// Design-weighted mean of a numeric column (nulls excluded)
    pub fn mean(&self, column: &str, level: f64) -> Result<Estimate> {
        let values = numeric_values(self, column)?;
        let everyone = vec![true; values.len()];
        domain_mean(self, &values, &everyone, level)
    }

    /// Design-weighted proportion of a boolean (or 0/1) column
    pub fn proportion(&self, column: &str, level: f64) -> Result<Estimate> {
        let values = numeric_values(self, column)?;
        let everyone = vec![true; values.len()];
        let mean = domain_mean(self, &values, &everyone, level)?;
        Ok(proportion_interval(mean, self.degrees_of_freedom()))
    }

    /// Proportion of `column` within each level of `by`
    pub fn proportion_by(&self, column: &str, by: &str, level: f64) -> Result<Vec<DomainEstimate>> {
        let values = numeric_values(self, column)?;
        let labels = group_labels(self, by)?;

        distinct_groups(&labels)
            .into_iter()
            .map(|group| {
                let domain: Vec<bool> = labels
                    .iter()
                    .map(|label| label.as_deref() == Some(group.as_str()))
                    .collect();
                let records = domain
                    .iter()
                    .zip(&values)
                    .filter(|(inside, v)| **inside && v.is_some())
                    .count();
                let mean = domain_mean(self, &values, &domain, level)?;
                Ok(DomainEstimate {
                    group,
                    records,
                    estimate: proportion_interval(mean, self.degrees_of_freedom()),
                })
            })
            .collect()
    }

    /// Weighted quartile summaries of `column` within each level of `by`
    pub fn box_summaries_by(&self, column: &str, by: &str) -> Result<Vec<BoxSummary>> {
        let values = numeric_values(self, column)?;
        let labels = group_labels(self, by)?;
        let weights = self.weights();

        distinct_groups(&labels)
            .into_iter()
            .map(|group| {
                let pairs: Vec<(f64, f64)> = values
                    .iter()
                    .zip(weights)
                    .zip(&labels)
                    .filter(|(_, label)| label.as_deref() == Some(group.as_str()))
                    .filter_map(|((v, &w), _)| v.map(|v| (v, w)))
                    .collect();
                box_summary(group, &pairs)
            })
            .collect()
    }
}

fn box_summary(group: String, pairs: &[(f64, f64)]) -> Result<BoxSummary> {
    let values: Vec<f64> = pairs.iter().map(|(v, _)| *v).collect();
    let weights: Vec<f64> = pairs.iter().map(|(_, w)| *w).collect();
    let total: f64 = weights.iter().sum();
    if pairs.is_empty() || total <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "group '{}' has no weighted records",
            group
        )));
    }
    let mean = pairs.iter().map(|(v, w)| v * w).sum::<f64>() / total;
    Ok(BoxSummary {
        group,
        records: pairs.len(),
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        lower_quartile: weighted_quantile(&values, &weights, 0.25)?,
        median: weighted_quantile(&values, &weights, 0.5)?,
        upper_quartile: weighted_quantile(&values, &weights, 0.75)?,
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean,
    })
}

/// Smallest value whose cumulative weight share reaches `q`
pub fn weighted_quantile(values: &[f64], weights: &[f64], q: f64) -> Result<f64> {
    if values.len() != weights.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "values ({}) and weights ({}) differ in length",
            values.len(),
            weights.len()
        )));
    }
    if !(0.0..=1.0).contains(&q) {
        return Err(AnalysisError::InvalidInput(format!(
            "quantile must lie in [0, 1], got {}",
            q
        )));
    }
    let mut order: Vec<usize> = (0..values.len()).filter(|&i| weights[i] > 0.0).collect();
    if order.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "no positively weighted values".to_string(),
        ));
    }
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let total: f64 = order.iter().map(|&i| weights[i]).sum();
    let target = q * total;
    let mut cumulative = 0.0;
    for &i in &order {
        cumulative += weights[i];
        if cumulative >= target - 1e-12 * total {
            return Ok(values[i]);
        }
    }
    Ok(values[order[order.len() - 1]])
}
