use crate::errors::EngineResult;
use crate::state::{ConvergenceRecord, PricingParams};
use crate::sweep::convergence::SweepReport;
use chrono::NaiveDateTime;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const EXPORT_TITLE: &str = "Convergence Analysis - Binomial with Black-Scholes";
const COLUMNS: [&str; 5] = ["steps", "binomial_price", "bs_price", "error", "relative_error"];

#[derive(Debug, serde::Serialize)]
struct ExportRow {
    steps: usize,
    binomial_price: f64,
    bs_price: f64,
    error: f64,
    relative_error: f64,
}

impl From<&ConvergenceRecord> for ExportRow {
    fn from(rec: &ConvergenceRecord) -> Self {
        Self {
            steps: rec.steps,
            binomial_price: rec.lattice_price,
            bs_price: rec.reference_price,
            error: rec.absolute_error,
            relative_error: rec.relative_error(),
        }
    }
}

/// Write a sweep as delimited text: three `#` comment lines (title,
/// timestamp, parameters), a blank line, the column header, one row per record.
pub fn write_convergence_csv<W: Write>(
    mut out: W,
    params: &PricingParams,
    report: &SweepReport,
    generated_at: NaiveDateTime,
) -> EngineResult<()> {
    writeln!(out, "# {EXPORT_TITLE}")?;
    writeln!(out, "# Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "# Parameters: {params}")?;
    writeln!(out)?;

    // header written by hand so an empty sweep still gets one
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);
    wtr.write_record(COLUMNS)?;
    for rec in &report.records {
        wtr.serialize(ExportRow::from(rec))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Export a sweep to `path`, stamped with the local time.
pub fn export_convergence_csv(path: &Path, params: &PricingParams, report: &SweepReport) -> EngineResult<()> {
    let file = File::create(path)?;
    let generated_at = chrono::Local::now().naive_local();
    write_convergence_csv(BufWriter::new(file), params, report, generated_at)?;
    tracing::info!(path = %path.display(), rows = report.records.len(), "convergence data exported");
    Ok(())
}
