//! Reference distributions for intervals and tests
//!
//! Degrees of freedom at or below zero fall back to the standard normal,
//! which is what a design with as many strata as PSUs supports.

use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};

fn standard_normal() -> Option<Normal> {
    Normal::new(0.0, 1.0).ok()
}

/// Two-sided critical value for a confidence `level` on the standard normal
pub fn normal_critical(level: f64) -> f64 {
    match standard_normal() {
        Some(normal) => normal.inverse_cdf(1.0 - (1.0 - level) / 2.0),
        None => f64::NAN,
    }
}

/// Two-sided critical value on Student's t with `df` degrees of freedom
pub fn t_critical(level: f64, df: f64) -> f64 {
    if !df.is_finite() || df <= 0.0 {
        return normal_critical(level);
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(t) => t.inverse_cdf(1.0 - (1.0 - level) / 2.0),
        Err(_) => f64::NAN,
    }
}

/// Two-sided p-value of a t statistic
pub fn t_two_sided_p(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return f64::NAN;
    }
    if !df.is_finite() || df <= 0.0 {
        return match standard_normal() {
            Some(normal) => 2.0 * normal.sf(t.abs()),
            None => f64::NAN,
        };
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => 2.0 * dist.sf(t.abs()),
        Err(_) => f64::NAN,
    }
}

/// Upper-tail p-value of an F statistic
pub fn f_upper_p(f: f64, df1: f64, df2: f64) -> f64 {
    if !f.is_finite() || f < 0.0 || df1.is_nan() || df1 <= 0.0 || df2.is_nan() || df2 <= 0.0 {
        return f64::NAN;
    }
    match FisherSnedecor::new(df1, df2) {
        Ok(dist) => dist.sf(f),
        Err(_) => f64::NAN,
    }
}

/// Upper-tail p-value of a chi-squared statistic
pub fn chi_squared_upper_p(x: f64, df: f64) -> f64 {
    if !x.is_finite() || x < 0.0 || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    match ChiSquared::new(df) {
        Ok(dist) => dist.sf(x),
        Err(_) => f64::NAN,
    }
}
