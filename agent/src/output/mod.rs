//! Local report sinks: console echo and output file

use crate::config::{OutputFormat, Settings};
use anyhow::{Context, Result};
use protocol::Report;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct OutputManager {
    quiet: bool,
    output: Option<PathBuf>,
    format: OutputFormat,
}

impl OutputManager {
    pub fn new(settings: &Settings) -> Self {
        Self {
            quiet: settings.quiet,
            output: settings.output.clone(),
            format: settings.format,
        }
    }

    /// Echo the report and write the output file, if any
    pub fn emit(&self, report: &Report, json: &str) -> Result<()> {
        if !self.quiet {
            println!("{}", json);
        }

        let Some(path) = &self.output else {
            return Ok(());
        };
        match self.format {
            OutputFormat::Json => std::fs::write(path, json)
                .with_context(|| format!("Failed to write output file: {:?}", path))?,
            OutputFormat::Csv => export_csv(report, path)?,
        }
        debug!("Report written to {:?}", path);

        Ok(())
    }
}

/// Export the host table as CSV
pub fn export_csv(report: &Report, output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create output file: {:?}", output_path))?;

    writer.write_record([
        "id", "address", "status", "sent", "received", "losts", "min", "avg", "max", "jitter", "total",
    ])?;

    for (id, host) in &report.ping_table {
        writer.write_record(&[
            id.to_string(),
            host.address.clone(),
            host.status.code().to_string(),
            host.sent.to_string(),
            host.received.to_string(),
            host.losts.to_string(),
            host.min.to_string(),
            host.avg.to_string(),
            host.max.to_string(),
            host.jitter.to_string(),
            host.total.to_string(),
        ])?;
    }

    writer.flush()?;

    Ok(())
}
