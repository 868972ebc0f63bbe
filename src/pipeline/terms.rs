//! Model term specifications and design-matrix construction
//!
//! Terms are main effects or pairwise interactions over a closed set of
//! predictors. Factors use treatment contrasts: one indicator column per
//! non-reference level. Specs read as R-style formulas such as
//! `is_retired ~ age_in_decades * sex + nativity`.

use std::collections::BTreeMap;
use std::fmt;

use faer::Mat;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::cleaner::{AGE_IN_DECADES, IS_RETIRED};
use super::recode::{CodeTable, NATIVITY, SECTOR, SEX};
use crate::error::{AnalysisError, Result};

/// Name of the intercept column
pub const INTERCEPT: &str = "(Intercept)";

/// Covariates a model may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Predictor {
    AgeInDecades,
    Sex,
    Nativity,
    Sector,
}

impl Predictor {
    pub const ALL: [Predictor; 4] = [
        Predictor::AgeInDecades,
        Predictor::Sex,
        Predictor::Nativity,
        Predictor::Sector,
    ];

    /// Column of the cleaned table holding this predictor
    pub fn column(&self) -> &'static str {
        match self {
            Predictor::AgeInDecades => AGE_IN_DECADES,
            Predictor::Sex => SEX.field,
            Predictor::Nativity => NATIVITY.field,
            Predictor::Sector => SECTOR.field,
        }
    }

    /// Recoding table for factors, `None` for the numeric predictor
    pub fn table(&self) -> Option<&'static CodeTable> {
        match self {
            Predictor::AgeInDecades => None,
            Predictor::Sex => Some(&SEX),
            Predictor::Nativity => Some(&NATIVITY),
            Predictor::Sector => Some(&SECTOR),
        }
    }
}

impl fmt::Display for Predictor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column())
    }
}

impl std::str::FromStr for Predictor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim();
        Predictor::ALL
            .iter()
            .copied()
            .find(|p| p.column() == name)
            .ok_or_else(|| {
                format!(
                    "Unknown predictor: '{}'. Use one of age_in_decades, sex, nativity, sector.",
                    name
                )
            })
    }
}

/// One model term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Term {
    Main(Predictor),
    Interaction(Predictor, Predictor),
}

impl Term {
    /// Pairwise interaction with its operands in predictor order, so
    /// `sector:sex` and `sex:sector` name the same columns.
    pub fn interaction(a: Predictor, b: Predictor) -> Self {
        if b < a {
            Term::Interaction(b, a)
        } else {
            Term::Interaction(a, b)
        }
    }

    /// 1 for main effects, 2 for interactions
    pub fn order(&self) -> usize {
        match self {
            Term::Main(_) => 1,
            Term::Interaction(_, _) => 2,
        }
    }

    pub fn predictors(&self) -> Vec<Predictor> {
        match self {
            Term::Main(p) => vec![*p],
            Term::Interaction(a, b) => vec![*a, *b],
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Main(p) => write!(f, "{}", p),
            Term::Interaction(a, b) => write!(f, "{}:{}", a, b),
        }
    }
}

impl std::str::FromStr for Term {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [single] => Ok(Term::Main(single.parse()?)),
            [a, b] => {
                let (a, b): (Predictor, Predictor) = (a.parse()?, b.parse()?);
                if a == b {
                    return Err(format!("Interaction of '{}' with itself", a));
                }
                Ok(Term::interaction(a, b))
            }
            _ => Err(format!("Only pairwise interactions are supported: '{}'", s)),
        }
    }
}

impl TryFrom<String> for Term {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Term> for String {
    fn from(term: Term) -> Self {
        term.to_string()
    }
}

/// A named model: intercept plus an ordered list of terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub terms: Vec<Term>,
}

impl ModelSpec {
    /// Build a spec, dropping duplicate terms and ordering main effects
    /// before interactions.
    pub fn new(name: impl Into<String>, terms: Vec<Term>) -> Self {
        let mut unique: Vec<Term> = Vec::with_capacity(terms.len());
        for term in terms {
            if !unique.contains(&term) {
                unique.push(term);
            }
        }
        unique.sort_by_key(Term::order);
        Self {
            name: name.into(),
            terms: unique,
        }
    }

    /// `is_retired ~ age_in_decades`
    pub fn age_only() -> Self {
        Self::new("age_only", vec![Term::Main(Predictor::AgeInDecades)])
    }

    /// `is_retired ~ age_in_decades * sex`
    pub fn age_by_sex() -> Self {
        use Predictor::*;
        Self::new(
            "age_by_sex",
            vec![
                Term::Main(AgeInDecades),
                Term::Main(Sex),
                Term::interaction(AgeInDecades, Sex),
            ],
        )
    }

    /// Age, sex, nativity and sector with age×sex and sector×sex
    pub fn full() -> Self {
        use Predictor::*;
        Self::new(
            "full",
            vec![
                Term::Main(AgeInDecades),
                Term::Main(Sex),
                Term::Main(Nativity),
                Term::Main(Sector),
                Term::interaction(AgeInDecades, Sex),
                Term::interaction(Sex, Sector),
            ],
        )
    }

    /// The three nested models of the retirement analysis
    pub fn standard_sequence() -> Vec<Self> {
        vec![Self::age_only(), Self::age_by_sex(), Self::full()]
    }

    /// Parse an R-style formula. `a * b` expands to `a + b + a:b`.
    pub fn parse(name: impl Into<String>, formula: &str) -> Result<Self> {
        let parts: Vec<&str> = formula.split('~').collect();
        if parts.len() != 2 {
            return Err(AnalysisError::InvalidInput(format!(
                "Formula must contain exactly one '~': {}",
                formula
            )));
        }
        let response = parts[0].trim();
        if response != IS_RETIRED {
            return Err(AnalysisError::InvalidInput(format!(
                "Unsupported response '{}'; models predict '{}'",
                response, IS_RETIRED
            )));
        }

        let invalid = |msg: String| AnalysisError::InvalidInput(msg);
        let mut terms = Vec::new();
        for piece in parts[1].split('+').map(str::trim) {
            if piece.is_empty() || piece == "1" {
                continue;
            }
            if piece.contains('*') {
                let factors: Vec<&str> = piece.split('*').map(str::trim).collect();
                if factors.len() != 2 {
                    return Err(invalid(format!(
                        "Only pairwise interactions are supported: '{}'",
                        piece
                    )));
                }
                let a: Predictor = factors[0].parse().map_err(invalid)?;
                let b: Predictor = factors[1].parse().map_err(invalid)?;
                terms.push(Term::Main(a));
                terms.push(Term::Main(b));
                terms.push(format!("{}:{}", a, b).parse().map_err(invalid)?);
            } else {
                let compact: String = piece.split_whitespace().collect();
                terms.push(compact.parse().map_err(invalid)?);
            }
        }
        if terms.is_empty() {
            return Err(AnalysisError::InvalidInput(format!(
                "Formula has no terms: {}",
                formula
            )));
        }
        Ok(Self::new(name, terms))
    }

    /// Predictors used by any term
    pub fn predictors(&self) -> Vec<Predictor> {
        let mut used: Vec<Predictor> = self.terms.iter().flat_map(Term::predictors).collect();
        used.sort();
        used.dedup();
        used
    }

    pub fn formula(&self) -> String {
        let rhs: Vec<String> = self.terms.iter().map(Term::to_string).collect();
        format!("{} ~ {}", IS_RETIRED, rhs.join(" + "))
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.formula())
    }
}

/// Treatment-contrast reference level per factor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Contrasts {
    references: BTreeMap<String, String>,
}

impl Contrasts {
    /// Validate overrides; factors without one use their first level
    pub fn new(overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut references = BTreeMap::new();
        for predictor in Predictor::ALL {
            let Some(table) = predictor.table() else {
                continue;
            };
            let reference = match overrides.get(table.field) {
                Some(level) => {
                    if table.level_index(level).is_none() {
                        return Err(AnalysisError::InvalidInput(format!(
                            "reference level '{}' is not a level of '{}' (levels: {:?})",
                            level, table.field, table.levels
                        )));
                    }
                    level.clone()
                }
                None => table.levels[0].to_string(),
            };
            references.insert(table.field.to_string(), reference);
        }
        Ok(Self { references })
    }

    pub fn reference(&self, factor: &str) -> Option<&str> {
        self.references.get(factor).map(String::as_str)
    }

    /// Non-reference levels of a factor, in factor order
    fn contrast_levels(&self, table: &CodeTable) -> Vec<&'static str> {
        let reference = self.reference(table.field).unwrap_or(table.levels[0]);
        table
            .levels
            .iter()
            .copied()
            .filter(|level| *level != reference)
            .collect()
    }
}

/// One encoded column of a predictor
enum Encoding {
    Numeric,
    Indicator(&'static str),
}

/// Encoded columns of a predictor with their names
fn predictor_columns(predictor: Predictor, contrasts: &Contrasts) -> Vec<(String, Encoding)> {
    match predictor.table() {
        None => vec![(predictor.column().to_string(), Encoding::Numeric)],
        Some(table) => contrasts
            .contrast_levels(table)
            .into_iter()
            .map(|level| (format!("{}{}", table.field, level), Encoding::Indicator(level)))
            .collect(),
    }
}

/// Per-row values of a predictor, `None` where missing
enum PredictorValues {
    Numeric(Vec<Option<f64>>),
    Factor(Vec<Option<String>>),
}

impl PredictorValues {
    fn read(df: &DataFrame, predictor: Predictor) -> Result<Self> {
        let col = df.column(predictor.column()).map_err(|_| {
            AnalysisError::Schema(format!(
                "predictor column '{}' not found",
                predictor.column()
            ))
        })?;
        if predictor.table().is_none() {
            let floats = col.cast(&DataType::Float64)?;
            return Ok(PredictorValues::Numeric(floats.f64()?.iter().collect()));
        }
        let strings = col.cast(&DataType::String)?;
        Ok(PredictorValues::Factor(
            strings.str()?.iter().map(|v| v.map(str::to_string)).collect(),
        ))
    }

    fn is_missing(&self, row: usize) -> bool {
        match self {
            PredictorValues::Numeric(v) => v[row].map_or(true, |x| !x.is_finite()),
            PredictorValues::Factor(v) => v[row].is_none(),
        }
    }

    fn encode(&self, row: usize, encoding: &Encoding) -> f64 {
        match (self, encoding) {
            (PredictorValues::Numeric(v), Encoding::Numeric) => v[row].unwrap_or(0.0),
            (PredictorValues::Factor(v), Encoding::Indicator(level)) => {
                if v[row].as_deref() == Some(*level) {
                    1.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

/// Model matrix for a spec over a table
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    pub column_names: Vec<String>,
    /// Index range of each term's columns (intercept excluded)
    pub term_columns: Vec<(Term, std::ops::Range<usize>)>,
    /// n × p; rows with a missing covariate are zero
    pub x: Mat<f64>,
    /// Rows with every covariate present
    pub complete: Vec<bool>,
}

impl DesignMatrix {
    /// Encode `df` for `spec`. Factor values outside the known levels are
    /// an error; missing values mark the row incomplete.
    pub fn build(df: &DataFrame, spec: &ModelSpec, contrasts: &Contrasts) -> Result<Self> {
        let n = df.height();
        let mut values: BTreeMap<Predictor, PredictorValues> = BTreeMap::new();
        for predictor in spec.predictors() {
            let read = PredictorValues::read(df, predictor)?;
            if let (Some(table), PredictorValues::Factor(levels)) = (predictor.table(), &read) {
                if let Some(unknown) = levels
                    .iter()
                    .flatten()
                    .find(|level| table.level_index(level).is_none())
                {
                    return Err(AnalysisError::InvalidInput(format!(
                        "'{}' is not a level of '{}'",
                        unknown, table.field
                    )));
                }
            }
            values.insert(predictor, read);
        }

        // Column layout: intercept, then each term's encoded columns
        let mut column_names = vec![INTERCEPT.to_string()];
        let mut layout: Vec<Vec<(Predictor, usize)>> = vec![Vec::new()];
        let mut encodings: BTreeMap<Predictor, Vec<(String, Encoding)>> = BTreeMap::new();
        for predictor in spec.predictors() {
            encodings.insert(predictor, predictor_columns(predictor, contrasts));
        }
        let mut term_columns = Vec::with_capacity(spec.terms.len());
        for term in &spec.terms {
            let start = column_names.len();
            match *term {
                Term::Main(p) => {
                    for (k, (name, _)) in encodings[&p].iter().enumerate() {
                        column_names.push(name.clone());
                        layout.push(vec![(p, k)]);
                    }
                }
                Term::Interaction(a, b) => {
                    for (i, (name_a, _)) in encodings[&a].iter().enumerate() {
                        for (j, (name_b, _)) in encodings[&b].iter().enumerate() {
                            column_names.push(format!("{}:{}", name_a, name_b));
                            layout.push(vec![(a, i), (b, j)]);
                        }
                    }
                }
            }
            term_columns.push((*term, start..column_names.len()));
        }

        let complete: Vec<bool> = (0..n)
            .map(|row| values.values().all(|v| !v.is_missing(row)))
            .collect();

        let p = column_names.len();
        let mut x = Mat::<f64>::zeros(n, p);
        for row in 0..n {
            if !complete[row] {
                continue;
            }
            x[(row, 0)] = 1.0;
            for (col, parts) in layout.iter().enumerate().skip(1) {
                x[(row, col)] = parts
                    .iter()
                    .map(|(predictor, k)| {
                        values[predictor].encode(row, &encodings[predictor][*k].1)
                    })
                    .product();
            }
        }

        Ok(Self {
            column_names,
            term_columns,
            x,
            complete,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_coefficients(&self) -> usize {
        self.x.ncols()
    }
}

/// Response indicator from the cleaned table; missing counts as incomplete
pub fn response_values(df: &DataFrame) -> Result<Vec<Option<f64>>> {
    let col = df.column(IS_RETIRED).map_err(|_| {
        AnalysisError::Schema(format!("response column '{}' not found", IS_RETIRED))
    })?;
    let floats = col.cast(&DataType::Float64)?;
    Ok(floats.f64()?.iter().collect())
}
