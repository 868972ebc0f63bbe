//! Complex survey design: strata, nested PSUs, weights and Taylor-linearised variance
//!
//! The design keeps the cleaned table alongside per-row stratum and PSU
//! indices. Estimators hand it per-row score vectors; the design turns them
//! into the variance of their estimated population total.

use std::collections::HashMap;

use faer::Mat;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::weights::{get_design_weights, total_weight};
use crate::config::DesignConfig;
use crate::error::{AnalysisError, Result};

/// Policy for strata that contain a single primary sampling unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LonelyPsu {
    /// Centre the lonely PSU on the grand mean of PSU totals (conservative)
    #[default]
    Adjust,
    /// Treat the lonely PSU as sampled with certainty (zero contribution)
    Certainty,
    /// Drop the stratum from the variance sum
    Remove,
    /// Inflate the variance by the share of strata that could contribute
    Average,
    /// Refuse to build the design
    Fail,
}

impl std::fmt::Display for LonelyPsu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LonelyPsu::Adjust => write!(f, "adjust"),
            LonelyPsu::Certainty => write!(f, "certainty"),
            LonelyPsu::Remove => write!(f, "remove"),
            LonelyPsu::Average => write!(f, "average"),
            LonelyPsu::Fail => write!(f, "fail"),
        }
    }
}

impl std::str::FromStr for LonelyPsu {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "adjust" => Ok(LonelyPsu::Adjust),
            "certainty" => Ok(LonelyPsu::Certainty),
            "remove" => Ok(LonelyPsu::Remove),
            "average" => Ok(LonelyPsu::Average),
            "fail" => Ok(LonelyPsu::Fail),
            _ => Err(format!(
                "Unknown lonely PSU policy: '{}'. Use 'adjust', 'certainty', 'remove', 'average' or 'fail'.",
                s
            )),
        }
    }
}

/// Shape of a built design
#[derive(Debug, Clone, Serialize)]
pub struct DesignSummary {
    pub records: usize,
    pub strata: usize,
    pub psus: usize,
    pub lonely_strata: Vec<String>,
    pub lonely_psu_policy: LonelyPsu,
    pub degrees_of_freedom: f64,
    pub total_weight: f64,
}

/// Weighted analysis frame usable for design-based inference
#[derive(Debug, Clone)]
pub struct SurveyDesign {
    frame: DataFrame,
    weights: Vec<f64>,
    row_psu: Vec<usize>,
    psus_by_stratum: Vec<Vec<usize>>,
    stratum_labels: Vec<String>,
    lonely_psu: LonelyPsu,
}

/// Render a design column as string keys; nulls are design errors
fn column_keys(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let col = df.column(name).map_err(|_| {
        AnalysisError::Schema(format!("Design column '{}' not found in DataFrame", name))
    })?;
    let as_str = col.cast(&DataType::String)?;
    as_str
        .str()?
        .iter()
        .enumerate()
        .map(|(row, value)| {
            value.map(str::to_string).ok_or_else(|| {
                AnalysisError::Design(format!(
                    "Design column '{}' is missing at row {}",
                    name, row
                ))
            })
        })
        .collect()
}

impl SurveyDesign {
    /// Attach sampling metadata to a cleaned table.
    ///
    /// Strata are the interaction of `config.strata`; with `config.nest`
    /// the PSU identity is (stratum, cluster id).
    pub fn build(frame: DataFrame, config: &DesignConfig) -> Result<Self> {
        if frame.height() == 0 {
            return Err(AnalysisError::Design(
                "cannot build a survey design over an empty table".to_string(),
            ));
        }
        if config.strata.is_empty() {
            return Err(AnalysisError::Design(
                "at least one stratum column is required".to_string(),
            ));
        }

        let weights = get_design_weights(&frame, &config.weight)?;

        let strata_keys: Vec<Vec<String>> = config
            .strata
            .iter()
            .map(|name| column_keys(&frame, name))
            .collect::<Result<_>>()?;
        let cluster_keys = column_keys(&frame, &config.cluster)?;

        let n = frame.height();
        let mut stratum_index: HashMap<String, usize> = HashMap::new();
        let mut stratum_labels: Vec<String> = Vec::new();
        let mut psu_index: HashMap<(usize, String), usize> = HashMap::new();
        let mut cluster_home: HashMap<&str, usize> = HashMap::new();
        let mut psus_by_stratum: Vec<Vec<usize>> = Vec::new();
        let mut row_psu = Vec::with_capacity(n);

        for row in 0..n {
            let label = strata_keys
                .iter()
                .map(|keys| keys[row].as_str())
                .collect::<Vec<_>>()
                .join(".");
            let stratum = *stratum_index.entry(label.clone()).or_insert_with(|| {
                stratum_labels.push(label);
                psus_by_stratum.push(Vec::new());
                stratum_labels.len() - 1
            });

            let cluster = cluster_keys[row].as_str();
            if !config.nest {
                let home = *cluster_home.entry(cluster).or_insert(stratum);
                if home != stratum {
                    return Err(AnalysisError::Design(format!(
                        "cluster '{}' appears in strata '{}' and '{}'; clusters are not nested in strata (set nest = true)",
                        cluster, stratum_labels[home], stratum_labels[stratum]
                    )));
                }
            }

            let next_psu = psu_index.len();
            let psu = *psu_index
                .entry((stratum, cluster.to_string()))
                .or_insert(next_psu);
            if psu == next_psu {
                psus_by_stratum[stratum].push(psu);
            }
            row_psu.push(psu);
        }

        let design = Self {
            frame,
            weights,
            row_psu,
            psus_by_stratum,
            stratum_labels,
            lonely_psu: config.lonely_psu,
        };

        let lonely = design.lonely_strata();
        if !lonely.is_empty() {
            if design.lonely_psu == LonelyPsu::Fail {
                return Err(AnalysisError::Design(format!(
                    "{} stratum/strata contain a single PSU: {:?}",
                    lonely.len(),
                    lonely
                )));
            }
            log::warn!(
                "{} stratum/strata with a single PSU, applying '{}' policy: {:?}",
                lonely.len(),
                design.lonely_psu,
                lonely
            );
        }

        log::info!(
            "survey design: {} records, {} strata, {} PSUs, {} df",
            design.frame.height(),
            design.n_strata(),
            design.n_psu(),
            design.degrees_of_freedom()
        );

        Ok(design)
    }

    /// The cleaned table the design is attached to
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn n_records(&self) -> usize {
        self.frame.height()
    }

    pub fn n_strata(&self) -> usize {
        self.psus_by_stratum.len()
    }

    pub fn n_psu(&self) -> usize {
        self.psus_by_stratum.iter().map(Vec::len).sum()
    }

    pub fn lonely_psu_policy(&self) -> LonelyPsu {
        self.lonely_psu
    }

    /// Design degrees of freedom: PSUs minus strata
    pub fn degrees_of_freedom(&self) -> f64 {
        self.n_psu() as f64 - self.n_strata() as f64
    }

    /// Labels of strata holding exactly one PSU
    pub fn lonely_strata(&self) -> Vec<String> {
        self.psus_by_stratum
            .iter()
            .zip(self.stratum_labels.iter())
            .filter(|(psus, _)| psus.len() == 1)
            .map(|(_, label)| label.clone())
            .collect()
    }

    pub fn summary(&self) -> DesignSummary {
        DesignSummary {
            records: self.n_records(),
            strata: self.n_strata(),
            psus: self.n_psu(),
            lonely_strata: self.lonely_strata(),
            lonely_psu_policy: self.lonely_psu,
            degrees_of_freedom: self.degrees_of_freedom(),
            total_weight: total_weight(&self.weights),
        }
    }

    /// Covariance of the estimated total `Σ_i scores_i`.
    ///
    /// `scores` is n × p with one row per record (already weighted). PSU
    /// totals are centred within each stratum and scaled by n_h/(n_h − 1);
    /// single-PSU strata follow the lonely-PSU policy.
    pub fn total_covariance(&self, scores: &Mat<f64>) -> Result<Mat<f64>> {
        let n = self.n_records();
        if scores.nrows() != n {
            return Err(AnalysisError::InvalidInput(format!(
                "score matrix has {} rows but the design has {} records",
                scores.nrows(),
                n
            )));
        }
        let p = scores.ncols();

        let mut psu_totals = Mat::<f64>::zeros(self.n_psu(), p);
        for row in 0..n {
            let psu = self.row_psu[row];
            for j in 0..p {
                psu_totals[(psu, j)] += scores[(row, j)];
            }
        }

        let grand_mean: Vec<f64> = (0..p)
            .map(|j| (0..psu_totals.nrows()).map(|i| psu_totals[(i, j)]).sum::<f64>())
            .map(|total| total / self.n_psu() as f64)
            .collect();

        let mut covariance = Mat::<f64>::zeros(p, p);
        let mut lonely = 0usize;
        let mut centred = vec![0.0; p];

        for psus in &self.psus_by_stratum {
            let n_h = psus.len();
            if n_h == 1 {
                lonely += 1;
                match self.lonely_psu {
                    LonelyPsu::Adjust => {
                        let psu = psus[0];
                        for j in 0..p {
                            centred[j] = psu_totals[(psu, j)] - grand_mean[j];
                        }
                        accumulate_outer(&mut covariance, &centred, 1.0);
                    }
                    LonelyPsu::Certainty | LonelyPsu::Remove | LonelyPsu::Average => {}
                    LonelyPsu::Fail => {
                        return Err(AnalysisError::Design(
                            "stratum with a single PSU under the 'fail' policy".to_string(),
                        ))
                    }
                }
                continue;
            }

            let mean: Vec<f64> = (0..p)
                .map(|j| psus.iter().map(|&psu| psu_totals[(psu, j)]).sum::<f64>() / n_h as f64)
                .collect();
            let scale = n_h as f64 / (n_h as f64 - 1.0);
            for &psu in psus {
                for j in 0..p {
                    centred[j] = psu_totals[(psu, j)] - mean[j];
                }
                accumulate_outer(&mut covariance, &centred, scale);
            }
        }

        if self.lonely_psu == LonelyPsu::Average && lonely > 0 && lonely < self.n_strata() {
            let inflation = self.n_strata() as f64 / (self.n_strata() - lonely) as f64;
            for i in 0..p {
                for j in 0..p {
                    covariance[(i, j)] *= inflation;
                }
            }
        }

        Ok(covariance)
    }
}

/// covariance += scale · v vᵀ
fn accumulate_outer(covariance: &mut Mat<f64>, v: &[f64], scale: f64) {
    for i in 0..v.len() {
        for j in 0..v.len() {
            covariance[(i, j)] += scale * v[i] * v[j];
        }
    }
}
