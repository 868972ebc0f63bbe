//! Integration tests for coefficient tables, Wald tests, AIC and predictions

use faer::Mat;
use polars::prelude::*;
use svyretire::config::{DiagnosticsConfig, FitConfig};
use svyretire::pipeline::*;

#[path = "common/mod.rs"]
mod common;

use common::*;

fn fitted_sequence() -> Vec<FittedModel> {
    let design = build_default_design(&create_raw_survey(900, 42));
    let fits = fit_models(&design, &ModelSpec::standard_sequence(), &FitConfig::default()).unwrap();
    assert!(fits.failures.is_empty());
    fits.models
}

/// Age-only model with published coefficients
fn published_age_model() -> FittedModel {
    let covariance = Mat::from_fn(2, 2, |i, j| [[0.36, -0.05], [-0.05, 0.0081]][i][j]);
    FittedModel::from_parts(
        ModelSpec::age_only(),
        Contrasts::default(),
        vec![INTERCEPT.to_string(), "age_in_decades".to_string()],
        vec![-12.60, 1.9],
        covariance,
        60.0,
    )
    .unwrap()
}

#[test]
fn test_coefficient_table_rows() {
    let models = fitted_sequence();
    for model in &models {
        let table = coefficient_table(model, 0.95);
        assert_eq!(table.rows.len(), model.coefficients().len());
        assert_eq!(table.df_residual, model.df_residual());
        for row in &table.rows {
            assert!(row.lower <= row.estimate && row.estimate <= row.upper);
            assert!((0.0..=1.0).contains(&row.p_value));
            assert!((row.t_value - row.estimate / row.std_error).abs() < 1e-12);
        }
    }
}

#[test]
fn test_age_effect_is_significant() {
    let models = fitted_sequence();
    let table = coefficient_table(&models[0], 0.95);
    let age = table
        .rows
        .iter()
        .find(|row| row.term == "age_in_decades")
        .unwrap();
    assert!(age.estimate > 0.0);
    assert!(age.p_value < 0.001);
}

#[test]
fn test_term_tests_cover_every_term() {
    let models = fitted_sequence();
    let full = &models[2];
    let tests = term_tests(full).unwrap();

    let labels: Vec<&str> = tests.iter().map(|t| t.label.as_str()).collect();
    assert!(labels.contains(&"age_in_decades"));
    assert!(labels.contains(&"age_in_decades:sex"));
    for test in &tests {
        assert!(test.f_statistic >= 0.0);
        assert!((0.0..=1.0).contains(&test.p_value));
        assert_eq!(test.df2, full.df_residual());
    }
}

#[test]
fn test_nested_comparison_tests_added_coefficients() {
    let models = fitted_sequence();
    let test = compare_nested(&models[0], &models[1]).unwrap();

    assert_eq!(test.df1, 2.0);
    assert_eq!(
        test.coefficients,
        vec!["sexfemale".to_string(), "age_in_decades:sexfemale".to_string()]
    );
    assert!((0.0..=1.0).contains(&test.p_value));

    // Reversed order is not a nesting
    assert!(compare_nested(&models[1], &models[0]).is_err());
}

#[test]
fn test_nesting_ignores_interaction_operand_order() {
    let design = build_default_design(&create_raw_survey(900, 42));
    let specs = vec![
        ModelSpec::parse("sector_by_sex", "is_retired ~ age_in_decades + sector*sex").unwrap(),
        ModelSpec::full(),
    ];
    let fits = fit_models(&design, &specs, &FitConfig::default()).unwrap();
    assert!(fits.failures.is_empty());

    let test = compare_nested(&fits.models[0], &fits.models[1]).unwrap();
    assert_eq!(
        test.coefficients,
        vec![
            "nativityforeign-born".to_string(),
            "age_in_decades:sexfemale".to_string()
        ]
    );
}

#[test]
fn test_aic_definitions() {
    let models = fitted_sequence();
    for model in &models {
        let summary = aic(model);
        let p = model.coefficients().len() as f64;
        assert!((summary.aic - (model.deviance() + 2.0 * p)).abs() < 1e-9);
        assert!(summary.effective_parameters > 0.0);
        assert!(
            (summary.design_aic - (summary.deviance + 2.0 * summary.effective_parameters)).abs()
                < 1e-9
        );
    }
}

#[test]
fn test_published_coefficients_predict_inverse_logit() {
    let model = published_age_model();
    let prediction = model.predict_one(6.5, &CovariateProfile::new(), 0.95).unwrap();

    let expected = 1.0 / (1.0 + (-(-12.60 + 1.9 * 6.5f64)).exp());
    assert!((prediction.probability - expected).abs() < 1e-12);
    assert!((prediction.probability - 0.4378).abs() < 1e-4);
    assert!(prediction.lower < prediction.probability);
    assert!(prediction.probability < prediction.upper);
}

#[test]
fn test_predict_frame_matches_fitted_values() {
    let models = fitted_sequence();
    let model = &models[0];
    let frame = df! {
        "age_in_decades" => [3.0f64, 6.0, 8.5],
    }
    .unwrap();

    let predictions = model.predict(&frame, 0.90).unwrap();
    assert_eq!(predictions.len(), 3);
    assert!(predictions[0].probability < predictions[1].probability);
    assert!(predictions[1].probability < predictions[2].probability);
    for (p, age) in predictions.iter().zip([3.0, 6.0, 8.5]) {
        let link = model.coefficients()[0] + model.coefficients()[1] * age;
        assert!((p.link - link).abs() < 1e-12);
        assert!(p.lower <= p.probability && p.probability <= p.upper);
    }
}

#[test]
fn test_prediction_grids_per_factor_profile() {
    let models = fitted_sequence();
    let config = DiagnosticsConfig::default();
    let grids = prediction_grids(&models, &config).unwrap();

    // age_only: 1 profile, age_by_sex: 2, full: 2 × 2 × 2
    assert_eq!(grids.len(), 1 + 2 + 8);
    for grid in &grids {
        assert_eq!(grid.points.len(), config.grid_points);
        let first = &grid.points[0];
        let last = &grid.points[grid.points.len() - 1];
        assert!((first.age_in_decades - config.grid_age_min).abs() < 1e-12);
        assert!((last.age_in_decades - config.grid_age_max).abs() < 1e-9);
        for point in &grid.points {
            assert_eq!(point.bands.len(), 3);
            // 90% inside 95% inside 99%
            assert!(point.bands[0].lower >= point.bands[1].lower);
            assert!(point.bands[1].lower >= point.bands[2].lower);
            assert!(point.bands[0].upper <= point.bands[1].upper);
            assert!(point.bands[1].upper <= point.bands[2].upper);
        }
    }
}
