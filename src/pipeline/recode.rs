//! Table-driven recoding of raw survey codes into domain levels
//!
//! Each categorical field owns one `CodeTable` listing every numeric code and
//! text label the source is allowed to contain. Sentinel codes ("not
//! applicable", "don't know", "no answer", "refused") become missing values.
//! Anything outside the table is an error rather than a silent null.

use polars::prelude::*;

use crate::error::{AnalysisError, Result};

/// What a raw code maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// A domain-meaningful level
    Level(&'static str),
    /// Not applicable / don't know / no answer / refused
    Missing,
}

/// Mapping table for one categorical field
#[derive(Debug)]
pub struct CodeTable {
    /// Cleaned field name the recoded column is written to
    pub field: &'static str,
    /// Levels in factor order; the first level is the default reference
    pub levels: &'static [&'static str],
    codes: &'static [(i64, Code)],
    labels: &'static [(&'static str, Code)],
}

/// Text labels that always denote a missing answer
const SENTINEL_LABELS: &[&str] = &[
    "iap",
    "inapplicable",
    "not applicable",
    "dk",
    "don't know",
    "dont know",
    "do not know",
    "do not know/cannot choose",
    "na",
    "no answer",
    "refused",
    "skipped on web",
    "uncodeable",
];

use Code::{Level, Missing};

pub static EMPLOYMENT_STATUS: CodeTable = CodeTable {
    field: "employment_status",
    levels: &[
        "working full time",
        "working part time",
        "temporarily not working",
        "unemployed",
        "retired",
        "in school",
        "keeping house",
        "other",
    ],
    codes: &[
        (0, Missing),
        (1, Level("working full time")),
        (2, Level("working part time")),
        (3, Level("temporarily not working")),
        (4, Level("unemployed")),
        (5, Level("retired")),
        (6, Level("in school")),
        (7, Level("keeping house")),
        (8, Level("other")),
        (9, Missing),
    ],
    labels: &[
        ("working fulltime", Level("working full time")),
        ("working parttime", Level("working part time")),
        ("temp not working", Level("temporarily not working")),
        (
            "with a job, but not at work because of temporary illness, vacation, strike",
            Level("temporarily not working"),
        ),
        ("unempl, laid off", Level("unemployed")),
        ("unemployed, laid off", Level("unemployed")),
        ("unemployed, laid off, looking for work", Level("unemployed")),
        ("school", Level("in school")),
    ],
};

pub static SEX: CodeTable = CodeTable {
    field: "sex",
    levels: &["male", "female"],
    codes: &[
        (0, Missing),
        (1, Level("male")),
        (2, Level("female")),
        (8, Missing),
        (9, Missing),
    ],
    labels: &[],
};

pub static RACE: CodeTable = CodeTable {
    field: "race",
    levels: &["white", "black", "other"],
    codes: &[
        (0, Missing),
        (1, Level("white")),
        (2, Level("black")),
        (3, Level("other")),
        (8, Missing),
        (9, Missing),
    ],
    labels: &[],
};

pub static EDUCATION_LEVEL: CodeTable = CodeTable {
    field: "education_level",
    levels: &[
        "less than high school",
        "high school",
        "junior college",
        "bachelor",
        "graduate",
    ],
    codes: &[
        (0, Level("less than high school")),
        (1, Level("high school")),
        (2, Level("junior college")),
        (3, Level("bachelor")),
        (4, Level("graduate")),
        (7, Missing),
        (8, Missing),
        (9, Missing),
    ],
    labels: &[
        ("lt high school", Level("less than high school")),
        ("bachelor's", Level("bachelor")),
    ],
};

pub static MARITAL_STATUS: CodeTable = CodeTable {
    field: "marital_status",
    levels: &["married", "widowed", "divorced", "separated", "never married"],
    codes: &[
        (1, Level("married")),
        (2, Level("widowed")),
        (3, Level("divorced")),
        (4, Level("separated")),
        (5, Level("never married")),
        (9, Missing),
    ],
    labels: &[],
};

pub static NATIVITY: CodeTable = CodeTable {
    field: "nativity",
    levels: &["native-born", "foreign-born"],
    codes: &[
        (0, Missing),
        (1, Level("native-born")),
        (2, Level("foreign-born")),
        (8, Missing),
        (9, Missing),
    ],
    labels: &[("yes", Level("native-born")), ("no", Level("foreign-born"))],
};

pub static SECTOR: CodeTable = CodeTable {
    field: "sector",
    levels: &["public", "private"],
    codes: &[
        (0, Missing),
        (1, Level("public")),
        (2, Level("private")),
        (8, Missing),
        (9, Missing),
    ],
    labels: &[
        ("government", Level("public")),
        ("private", Level("private")),
    ],
};

/// All categorical tables, in cleaned-column order
pub static CATEGORICAL_TABLES: [&CodeTable; 7] = [
    &RACE,
    &SEX,
    &EMPLOYMENT_STATUS,
    &EDUCATION_LEVEL,
    &MARITAL_STATUS,
    &NATIVITY,
    &SECTOR,
];

/// Oldest recorded age; the survey top-codes "89 or older" to 89
pub const AGE_TOP_CODE: i64 = 89;
/// Youngest eligible respondent
pub const AGE_MIN: i64 = 18;

/// Look up the table for a cleaned field name
pub fn table_for(field: &str) -> Option<&'static CodeTable> {
    CATEGORICAL_TABLES.iter().copied().find(|t| t.field == field)
}

impl CodeTable {
    /// Map a numeric survey code
    pub fn lookup_code(&self, code: i64) -> Option<Code> {
        self.codes
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, mapped)| *mapped)
    }

    /// Map a text label. Levels themselves are accepted so already-recoded
    /// extracts pass through unchanged.
    pub fn lookup_label(&self, label: &str) -> Option<Code> {
        let normalized = label.trim().to_lowercase();

        if let Some(level) = self.levels.iter().find(|l| **l == normalized) {
            return Some(Level(*level));
        }
        if let Some((_, mapped)) = self.labels.iter().find(|(l, _)| *l == normalized) {
            return Some(*mapped);
        }
        if is_sentinel_label(&normalized) {
            return Some(Missing);
        }
        // Numeric codes stored as text
        if let Ok(code) = normalized.parse::<i64>() {
            return self.lookup_code(code);
        }
        None
    }

    /// Position of a level in factor order
    pub fn level_index(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|l| *l == level)
    }

    fn unrecognized(&self, code: impl ToString) -> AnalysisError {
        AnalysisError::UnrecognizedCode {
            field: self.field.to_string(),
            code: code.to_string(),
        }
    }

    /// Recode a raw column into a String column named after `self.field`.
    ///
    /// Nulls and sentinel codes become nulls; unknown codes fail.
    pub fn recode_column(&self, col: &Column) -> Result<Column> {
        let values: Vec<Option<&'static str>> = if col.dtype().is_primitive_numeric() {
            let float_col = col.cast(&DataType::Float64)?;
            float_col
                .f64()?
                .iter()
                .map(|opt| match opt {
                    None => Ok(None),
                    Some(v) if v.fract() != 0.0 || !v.is_finite() => Err(self.unrecognized(v)),
                    Some(v) => match self.lookup_code(v as i64) {
                        Some(Level(level)) => Ok(Some(level)),
                        Some(Missing) => Ok(None),
                        None => Err(self.unrecognized(v as i64)),
                    },
                })
                .collect::<Result<_>>()?
        } else {
            let str_col = col.cast(&DataType::String)?;
            str_col
                .str()?
                .iter()
                .map(|opt| match opt {
                    None => Ok(None),
                    Some(label) => match self.lookup_label(label) {
                        Some(Level(level)) => Ok(Some(level)),
                        Some(Missing) => Ok(None),
                        None => Err(self.unrecognized(label)),
                    },
                })
                .collect::<Result<_>>()?
        };

        Ok(Column::new(self.field.into(), values))
    }
}

/// Sentinel labels include the Stata-style extended missing values (".i: Inapplicable")
fn is_sentinel_label(normalized: &str) -> bool {
    normalized.is_empty()
        || normalized.starts_with('.')
        || SENTINEL_LABELS.contains(&normalized)
}

/// Recode the raw age column to Float64 years.
///
/// Accepts 18..=89, "89 or older", and the 98/99 sentinels (missing).
pub fn recode_age(col: &Column, field: &str) -> Result<Column> {
    let unrecognized = |code: String| AnalysisError::UnrecognizedCode {
        field: field.to_string(),
        code,
    };

    let check = |age: f64| -> Result<Option<f64>> {
        if age.fract() != 0.0 || !age.is_finite() {
            return Err(unrecognized(age.to_string()));
        }
        match age as i64 {
            a if (AGE_MIN..=AGE_TOP_CODE).contains(&a) => Ok(Some(age)),
            98 | 99 => Ok(None),
            a => Err(unrecognized(a.to_string())),
        }
    };

    let values: Vec<Option<f64>> = if col.dtype().is_primitive_numeric() {
        let float_col = col.cast(&DataType::Float64)?;
        float_col
            .f64()?
            .iter()
            .map(|opt| opt.map_or(Ok(None), check))
            .collect::<Result<_>>()?
    } else {
        let str_col = col.cast(&DataType::String)?;
        str_col
            .str()?
            .iter()
            .map(|opt| match opt {
                None => Ok(None),
                Some(label) => {
                    let normalized = label.trim().to_lowercase();
                    if normalized == "89 or older" {
                        Ok(Some(AGE_TOP_CODE as f64))
                    } else if is_sentinel_label(&normalized) {
                        Ok(None)
                    } else {
                        match normalized.parse::<f64>() {
                            Ok(age) => check(age),
                            Err(_) => Err(unrecognized(label.to_string())),
                        }
                    }
                }
            })
            .collect::<Result<_>>()?
    };

    Ok(Column::new(field.into(), values))
}
