//! JSON batch report.

use std::io::Write;
use std::path::Path;

use crate::pipeline::BatchReport;

/// Pretty-printed JSON of the whole report.
pub fn to_json(report: &BatchReport) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Write the report as JSON to `output_path`.
pub fn export_json(report: &BatchReport, output_path: &Path) -> anyhow::Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(output_path)?);
    serde_json::to_writer_pretty(&mut file, report)?;
    writeln!(file)?;
    file.flush()?;
    Ok(())
}
