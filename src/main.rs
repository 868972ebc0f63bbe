//! svyretire: survey-weighted retirement models from the command line

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;

use svyretire::cli::Cli;
use svyretire::pipeline::{load_dataset_with_progress, run_analysis};
use svyretire::report::{display_outcome, write_reports, ReportPaths};
use svyretire::utils::{
    create_spinner, finish_with_success, finish_with_warning, print_banner, print_completion,
    print_config, print_info, print_step_header, print_step_time, print_success, print_warning,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = cli.analysis_config()?;
    let output_dir = cli.output_dir();

    print_banner(env!("CARGO_PKG_VERSION"));
    print_config(&cli.input, &output_dir, &config);

    let run_start = Instant::now();

    // Step 1: Load the extract
    print_step_header(1, "Load Survey Extract");
    let step_start = Instant::now();
    let (raw, rows, cols, memory_mb) =
        load_dataset_with_progress(&cli.input, cli.infer_schema_length)?;
    println!("\n    {} Dataset Statistics:", style("✧").cyan());
    println!("      Rows: {}", rows);
    println!("      Columns: {}", cols);
    println!("      Estimated memory: {:.2} MB", memory_mb);
    print_step_time(step_start.elapsed());

    // Step 2: Clean, build the design, fit and diagnose
    print_step_header(2, "Design-Based Analysis");
    let step_start = Instant::now();
    let spinner = create_spinner(&format!("Fitting {} model(s)...", config.models.len()));
    let outcome = run_analysis(&raw, &config).context("Analysis failed")?;
    if outcome.failed_models.is_empty() {
        finish_with_success(
            &spinner,
            &format!("Fitted {} model(s)", outcome.models.len()),
        );
    } else {
        finish_with_warning(
            &spinner,
            &format!(
                "Fitted {} model(s), {} failed",
                outcome.models.len(),
                outcome.failed_models.len()
            ),
        );
    }
    if outcome.cleaning.rows_missing_mandatory > 0 {
        print_warning(&format!(
            "Dropped {} record(s) with missing mandatory fields",
            outcome.cleaning.rows_missing_mandatory
        ));
    }
    if !outcome.design.lonely_strata.is_empty() {
        print_info(&format!(
            "{} stratum/strata with a single PSU handled by '{}'",
            outcome.design.lonely_strata.len(),
            outcome.design.lonely_psu_policy
        ));
    }
    print_step_time(step_start.elapsed());

    display_outcome(&outcome);

    // Step 3: Write reports
    print_step_header(3, "Save Reports");
    let step_start = Instant::now();
    std::fs::create_dir_all(&output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_dir.display()
        )
    })?;
    let paths = ReportPaths::in_dir(&output_dir, &cli.report_stem());
    let written = write_reports(&cli.input, &config, &outcome, &paths, cli.bundle)?;
    for path in &written {
        print_success(&format!("Saved {}", path.display()));
    }
    print_step_time(step_start.elapsed());

    print_completion(run_start.elapsed());

    Ok(())
}
