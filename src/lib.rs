//! svyretire: survey-weighted models of retirement
//!
//! Cleans a social-survey extract, attaches its stratified and clustered
//! sampling design, fits design-weighted quasi-binomial logistic
//! regressions and computes the coefficient tables, predictions and
//! diagnostics a report layer needs.

pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod utils;
