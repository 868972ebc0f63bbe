//! Delta-method predictions and age grids
//!
//! Intervals are built on the link scale and back-transformed, so bounds
//! always lie inside (0, 1).

use std::collections::BTreeMap;

use polars::prelude::*;
use serde::Serialize;

use super::cleaner::AGE_IN_DECADES;
use super::distributions::normal_critical;
use super::irls::expit;
use super::linalg::quadratic_form;
use super::model::FittedModel;
use super::terms::DesignMatrix;
use crate::config::DiagnosticsConfig;
use crate::error::{AnalysisError, Result};

/// Predicted retirement probability for one covariate row
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub link: f64,
    pub link_se: f64,
    pub probability: f64,
    /// Standard error on the probability scale
    pub std_error: f64,
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
}

/// Factor values held fixed along an age grid
pub type CovariateProfile = BTreeMap<String, String>;

/// Interval at one confidence level
#[derive(Debug, Clone, Serialize)]
pub struct Band {
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GridPoint {
    pub age_in_decades: f64,
    pub probability: f64,
    pub std_error: f64,
    pub bands: Vec<Band>,
}

/// Predictions along evenly spaced ages for one covariate profile
#[derive(Debug, Clone, Serialize)]
pub struct PredictionGrid {
    pub model: String,
    pub profile: CovariateProfile,
    pub points: Vec<GridPoint>,
}

fn check_level(level: f64) -> Result<()> {
    if !(level > 0.0 && level < 1.0) {
        return Err(AnalysisError::InvalidInput(format!(
            "confidence level must lie in (0, 1), got {}",
            level
        )));
    }
    Ok(())
}

impl FittedModel {
    /// Linear predictors and their standard errors for new covariate rows
    fn link_with_se(&self, data: &DataFrame) -> Result<Vec<(f64, f64)>> {
        let matrix = DesignMatrix::build(data, self.spec(), self.contrasts())?;
        if matrix.column_names != self.column_names() {
            return Err(AnalysisError::InvalidInput(format!(
                "covariates encode to {:?} but model '{}' has {:?}",
                matrix.column_names,
                self.name(),
                self.column_names()
            )));
        }
        if let Some(row) = matrix.complete.iter().position(|c| !c) {
            return Err(AnalysisError::InvalidInput(format!(
                "prediction row {} has a missing covariate",
                row
            )));
        }

        let p = matrix.n_coefficients();
        Ok((0..matrix.n_rows())
            .map(|row| {
                let x: Vec<f64> = (0..p).map(|j| matrix.x[(row, j)]).collect();
                let eta: f64 = x.iter().zip(self.coefficients()).map(|(a, b)| a * b).sum();
                let variance = quadratic_form(&x, self.covariance());
                (eta, variance.max(0.0).sqrt())
            })
            .collect())
    }

    /// Predict with a `level` confidence interval for every row of `data`
    pub fn predict(&self, data: &DataFrame, level: f64) -> Result<Vec<Prediction>> {
        check_level(level)?;
        let q = normal_critical(level);
        Ok(self
            .link_with_se(data)?
            .into_iter()
            .map(|(link, link_se)| {
                let probability = expit(link);
                Prediction {
                    link,
                    link_se,
                    probability,
                    std_error: probability * (1.0 - probability) * link_se,
                    lower: expit(link - q * link_se),
                    upper: expit(link + q * link_se),
                    level,
                }
            })
            .collect())
    }

    /// Predict for a single age and factor profile
    pub fn predict_one(
        &self,
        age_in_decades: f64,
        profile: &CovariateProfile,
        level: f64,
    ) -> Result<Prediction> {
        let frame = self.profile_frame(&[age_in_decades], profile)?;
        self.predict(&frame, level)?
            .into_iter()
            .next()
            .ok_or_else(|| AnalysisError::InvalidInput("empty prediction frame".to_string()))
    }

    /// Covariate frame for the given ages; factors not in `profile` take
    /// their reference level.
    fn profile_frame(&self, ages: &[f64], profile: &CovariateProfile) -> Result<DataFrame> {
        let mut columns = vec![Column::new(AGE_IN_DECADES.into(), ages)];
        for predictor in self.spec().predictors() {
            let Some(table) = predictor.table() else {
                continue;
            };
            let level = match profile.get(table.field) {
                Some(level) => level.clone(),
                None => self
                    .contrasts()
                    .reference(table.field)
                    .unwrap_or(table.levels[0])
                    .to_string(),
            };
            columns.push(Column::new(table.field.into(), vec![level; ages.len()]));
        }
        Ok(DataFrame::new(columns)?)
    }

    /// Evenly spaced ages with bands at each of `levels`
    pub fn prediction_grid(
        &self,
        profile: &CovariateProfile,
        age_min: f64,
        age_max: f64,
        points: usize,
        levels: &[f64],
    ) -> Result<PredictionGrid> {
        if points < 2 || age_min.is_nan() || age_max.is_nan() || age_min >= age_max {
            return Err(AnalysisError::InvalidInput(format!(
                "grid needs at least 2 points over a non-empty age range, got {} over [{}, {}]",
                points, age_min, age_max
            )));
        }
        for &level in levels {
            check_level(level)?;
        }
        let step = (age_max - age_min) / (points - 1) as f64;
        let ages: Vec<f64> = (0..points).map(|i| age_min + step * i as f64).collect();
        let frame = self.profile_frame(&ages, profile)?;
        let criticals: Vec<(f64, f64)> = levels.iter().map(|&l| (l, normal_critical(l))).collect();

        let points = ages
            .iter()
            .zip(self.link_with_se(&frame)?)
            .map(|(&age, (link, link_se))| {
                let probability = expit(link);
                GridPoint {
                    age_in_decades: age,
                    probability,
                    std_error: probability * (1.0 - probability) * link_se,
                    bands: criticals
                        .iter()
                        .map(|&(level, q)| Band {
                            level,
                            lower: expit(link - q * link_se),
                            upper: expit(link + q * link_se),
                        })
                        .collect(),
                }
            })
            .collect();

        Ok(PredictionGrid {
            model: self.name().to_string(),
            profile: profile.clone(),
            points,
        })
    }

    /// Every combination of the model's factor levels
    pub fn factor_profiles(&self) -> Vec<CovariateProfile> {
        let mut profiles = vec![CovariateProfile::new()];
        for predictor in self.spec().predictors() {
            let Some(table) = predictor.table() else {
                continue;
            };
            profiles = profiles
                .into_iter()
                .flat_map(|profile| {
                    table.levels.iter().map(move |level| {
                        let mut next = profile.clone();
                        next.insert(table.field.to_string(), level.to_string());
                        next
                    })
                })
                .collect();
        }
        profiles
    }
}

/// Grids for every factor profile of every model
pub fn prediction_grids(
    models: &[FittedModel],
    config: &DiagnosticsConfig,
) -> Result<Vec<PredictionGrid>> {
    let mut grids = Vec::new();
    for model in models {
        for profile in model.factor_profiles() {
            grids.push(model.prediction_grid(
                &profile,
                config.grid_age_min,
                config.grid_age_max,
                config.grid_points,
                &config.prediction_levels,
            )?);
        }
    }
    Ok(grids)
}
