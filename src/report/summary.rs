//! Console summary of an analysis run

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;

use crate::pipeline::{AnalysisOutcome, CoefficientTable, DomainEstimate, ModelReport};

fn print_section(title: &str) {
    println!();
    println!("    {}", style(title).white().bold());
    println!("    {}", style("─".repeat(50)).dim());
    println!();
}

fn print_indented(table: &Table) {
    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

fn header(names: &[&str]) -> Vec<Cell> {
    names
        .iter()
        .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
        .collect()
}

/// Cell for a p-value, highlighted below 0.05
fn p_value_cell(p: f64) -> Cell {
    let text = if p < 1e-4 {
        "<0.0001".to_string()
    } else {
        format!("{:.4}", p)
    };
    let cell = Cell::new(text);
    if p < 0.05 {
        cell.fg(Color::Green)
    } else {
        cell
    }
}

/// Sample and design overview
pub fn display_overview(outcome: &AnalysisOutcome) {
    print_section("SAMPLE AND DESIGN");

    let cleaning = &outcome.cleaning;
    let design = &outcome.design;
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(header(&["Metric", "Value"]));
    table.add_row(vec![Cell::new("Records read"), Cell::new(cleaning.rows_in)]);
    table.add_row(vec![
        Cell::new("Outside survey years"),
        Cell::new(cleaning.rows_outside_years),
    ]);
    table.add_row(vec![
        Cell::new("Missing mandatory fields"),
        Cell::new(cleaning.rows_missing_mandatory).fg(if cleaning.rows_missing_mandatory > 0 {
            Color::Yellow
        } else {
            Color::White
        }),
    ]);
    table.add_row(vec![
        Cell::new("Records analysed"),
        Cell::new(cleaning.rows_out)
            .fg(Color::Green)
            .add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![Cell::new("Strata"), Cell::new(design.strata)]);
    table.add_row(vec![Cell::new("PSUs"), Cell::new(design.psus)]);
    table.add_row(vec![
        Cell::new("Design df"),
        Cell::new(format!("{:.0}", design.degrees_of_freedom)),
    ]);
    table.add_row(vec![
        Cell::new(format!("Lonely strata ({})", design.lonely_psu_policy)),
        Cell::new(design.lonely_strata.len()).fg(if design.lonely_strata.is_empty() {
            Color::White
        } else {
            Color::Yellow
        }),
    ]);
    print_indented(&table);

    let share = &outcome.descriptives.retired_share;
    println!();
    println!(
        "      Retired share: {} {}",
        style(format!("{:.1}%", share.estimate * 100.0)).yellow().bold(),
        style(format!(
            "({:.0}% CI {:.1}% to {:.1}%)",
            share.level * 100.0,
            share.lower * 100.0,
            share.upper * 100.0
        ))
        .dim()
    );
}

/// Retired share by domain (year, sex, nativity or sector)
pub fn display_domains(title: &str, domains: &[DomainEstimate]) {
    print_section(title);
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(header(&["Group", "Records", "Share", "Lower", "Upper"]));
    for domain in domains {
        let e = &domain.estimate;
        table.add_row(vec![
            Cell::new(&domain.group),
            Cell::new(domain.records),
            Cell::new(format!("{:.3}", e.estimate)),
            Cell::new(format!("{:.3}", e.lower)),
            Cell::new(format!("{:.3}", e.upper)),
        ]);
    }
    print_indented(&table);
}

/// Coefficient table of one model
pub fn display_coefficients(table: &CoefficientTable) {
    print_section(&format!("COEFFICIENTS: {}", table.model));
    let mut out = Table::new();
    out.load_preset(UTF8_FULL_CONDENSED);
    out.set_header(header(&["Term", "Estimate", "Std. Error", "t", "p", "CI"]));
    for row in &table.rows {
        out.add_row(vec![
            Cell::new(&row.term),
            Cell::new(format!("{:.4}", row.estimate)),
            Cell::new(format!("{:.4}", row.std_error)),
            Cell::new(format!("{:.2}", row.t_value)),
            p_value_cell(row.p_value),
            Cell::new(format!("[{:.3}, {:.3}]", row.lower, row.upper)),
        ]);
    }
    print_indented(&out);
    println!(
        "      {}",
        style(format!(
            "{:.0}% intervals on {:.0} residual df",
            table.level * 100.0,
            table.df_residual
        ))
        .dim()
    );
}

/// Side-by-side fit statistics of all models
pub fn display_model_comparison(models: &[ModelReport]) {
    print_section("MODEL COMPARISON");
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(header(&[
        "Model",
        "Deviance",
        "AIC",
        "Design AIC",
        "Sensitivity",
        "Specificity",
        "AUC",
    ]));

    let best_aic = models
        .iter()
        .map(|m| m.aic.design_aic)
        .fold(f64::INFINITY, f64::min);
    let rate = |value: Option<f64>| value.map_or("n/a".to_string(), |v| format!("{:.3}", v));

    for model in models {
        let design_aic = Cell::new(format!("{:.1}", model.aic.design_aic));
        table.add_row(vec![
            Cell::new(&model.name),
            Cell::new(format!("{:.1}", model.deviance)),
            Cell::new(format!("{:.1}", model.aic.aic)),
            if model.aic.design_aic == best_aic {
                design_aic.fg(Color::Green).add_attribute(Attribute::Bold)
            } else {
                design_aic
            },
            Cell::new(rate(model.accuracy.as_ref().map(|a| a.sensitivity))),
            Cell::new(rate(model.accuracy.as_ref().map(|a| a.specificity))),
            Cell::new(rate(model.roc.as_ref().map(|r| r.auc))),
        ]);
    }
    print_indented(&table);
}

/// Everything, in reading order
pub fn display_outcome(outcome: &AnalysisOutcome) {
    display_overview(outcome);
    display_domains("RETIRED SHARE BY YEAR", &outcome.descriptives.retired_by_year);

    for model in &outcome.models {
        display_coefficients(&model.coefficients);
    }
    if !outcome.models.is_empty() {
        display_model_comparison(&outcome.models);
    }

    if !outcome.comparisons.is_empty() {
        print_section("NESTED MODEL TESTS");
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(header(&["Comparison", "F", "df1", "df2", "p"]));
        for test in &outcome.comparisons {
            table.add_row(vec![
                Cell::new(&test.label),
                Cell::new(format!("{:.3}", test.f_statistic)),
                Cell::new(format!("{:.0}", test.df1)),
                Cell::new(format!("{:.0}", test.df2)),
                p_value_cell(test.p_value),
            ]);
        }
        print_indented(&table);
    }

    if outcome.models.iter().any(|m| !m.warnings.is_empty()) {
        print_section("DIAGNOSTIC WARNINGS");
        for model in &outcome.models {
            for warning in &model.warnings {
                println!(
                    "      {} {}: {}",
                    style("!").yellow().bold(),
                    model.name,
                    style(warning).dim()
                );
            }
        }
    }

    if !outcome.failed_models.is_empty() {
        print_section("FAILED MODELS");
        for failure in &outcome.failed_models {
            println!(
                "      {} {}: {}",
                style("✗").red().bold(),
                failure.model,
                style(&failure.error).dim()
            );
        }
    }
}
