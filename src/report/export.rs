//! JSON, CSV and zip export of an analysis run
//!
//! The JSON report carries everything an external renderer needs for the
//! figures and tables; the CSV files are flat views of the coefficient
//! tables and prediction grids.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::pipeline::AnalysisOutcome;

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub timestamp: String,
    pub svyretire_version: String,
    pub input_file: String,
    pub config: AnalysisConfig,
}

/// Complete analysis report written as JSON
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport<'a> {
    pub metadata: ReportMetadata,
    #[serde(flatten)]
    pub outcome: &'a AnalysisOutcome,
}

impl<'a> AnalysisReport<'a> {
    pub fn new(input: &Path, config: &AnalysisConfig, outcome: &'a AnalysisOutcome) -> Self {
        Self {
            metadata: ReportMetadata {
                timestamp: Utc::now().to_rfc3339(),
                svyretire_version: env!("CARGO_PKG_VERSION").to_string(),
                input_file: input.display().to_string(),
                config: config.clone(),
            },
            outcome,
        }
    }
}

/// Paths of the files one run writes
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub coefficients_csv: PathBuf,
    pub grids_csv: PathBuf,
    pub zip: PathBuf,
}

impl ReportPaths {
    /// Files named `<stem>_report.json`, `<stem>_coefficients.csv`,
    /// `<stem>_predictions.csv` and `<stem>_reports.zip` inside `dir`
    pub fn in_dir(dir: &Path, stem: &str) -> Self {
        Self {
            json: dir.join(format!("{}_report.json", stem)),
            coefficients_csv: dir.join(format!("{}_coefficients.csv", stem)),
            grids_csv: dir.join(format!("{}_predictions.csv", stem)),
            zip: dir.join(format!("{}_reports.zip", stem)),
        }
    }
}

/// Export the analysis report to a JSON file
pub fn export_analysis_report(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialize analysis report to JSON")?;

    std::fs::write(output_path, json)
        .with_context(|| format!("Failed to write analysis report to {}", output_path.display()))?;

    Ok(())
}

/// One row per model coefficient
pub fn export_coefficients_csv(outcome: &AnalysisOutcome, output_path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(output_path)
        .with_context(|| format!("Failed to create CSV file: {}", output_path.display()))?;

    writeln!(
        file,
        "model,term,estimate,std_error,t_value,p_value,lower,upper,level,df_residual"
    )?;
    for model in &outcome.models {
        let table = &model.coefficients;
        for row in &table.rows {
            writeln!(
                file,
                "{},{},{:.6},{:.6},{:.4},{:e},{:.6},{:.6},{},{}",
                escape_csv_field(&model.name),
                escape_csv_field(&row.term),
                row.estimate,
                row.std_error,
                row.t_value,
                row.p_value,
                row.lower,
                row.upper,
                table.level,
                table.df_residual
            )?;
        }
    }
    Ok(())
}

/// Long-format prediction grids: one row per model, profile, age and level
pub fn export_prediction_grids_csv(outcome: &AnalysisOutcome, output_path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(output_path)
        .with_context(|| format!("Failed to create CSV file: {}", output_path.display()))?;

    writeln!(
        file,
        "model,profile,age_in_decades,probability,std_error,level,lower,upper"
    )?;
    for grid in &outcome.prediction_grids {
        let profile = grid
            .profile
            .iter()
            .map(|(factor, level)| format!("{}={}", factor, level))
            .collect::<Vec<_>>()
            .join(";");
        for point in &grid.points {
            for band in &point.bands {
                writeln!(
                    file,
                    "{},{},{:.4},{:.6},{:.6},{},{:.6},{:.6}",
                    escape_csv_field(&grid.model),
                    escape_csv_field(&profile),
                    point.age_in_decades,
                    point.probability,
                    point.std_error,
                    band.level,
                    band.lower,
                    band.upper
                )?;
            }
        }
    }
    Ok(())
}

/// Escape a field for CSV (handle commas and quotes)
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Package the report files into a zip archive and remove the originals
pub fn package_reports(files: &[&Path], zip_path: &Path) -> Result<()> {
    use std::io::Read;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    let zip_file = std::fs::File::create(zip_path)
        .with_context(|| format!("Failed to create zip file: {}", zip_path.display()))?;

    let mut zip = ZipWriter::new(zip_file);
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for path in files {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid file name: {}", path.display()))?;
        zip.start_file(filename, options)
            .with_context(|| format!("Failed to add {} to zip", filename))?;
        let mut content = Vec::new();
        std::fs::File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?
            .read_to_end(&mut content)?;
        zip.write_all(&content)?;
    }

    zip.finish().context("Failed to finalize zip file")?;

    for path in files {
        std::fs::remove_file(path).ok();
    }
    Ok(())
}

/// Write the JSON report and both CSV files, optionally bundling them
pub fn write_reports(
    input: &Path,
    config: &AnalysisConfig,
    outcome: &AnalysisOutcome,
    paths: &ReportPaths,
    bundle: bool,
) -> Result<Vec<PathBuf>> {
    let report = AnalysisReport::new(input, config, outcome);
    export_analysis_report(&report, &paths.json)?;
    export_coefficients_csv(outcome, &paths.coefficients_csv)?;
    export_prediction_grids_csv(outcome, &paths.grids_csv)?;

    if bundle {
        package_reports(
            &[
                paths.json.as_path(),
                paths.coefficients_csv.as_path(),
                paths.grids_csv.as_path(),
            ],
            &paths.zip,
        )?;
        log::info!("reports bundled into {}", paths.zip.display());
        return Ok(vec![paths.zip.clone()]);
    }
    Ok(vec![
        paths.json.clone(),
        paths.coefficients_csv.clone(),
        paths.grids_csv.clone(),
    ])
}
