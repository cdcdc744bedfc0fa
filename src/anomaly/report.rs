use std::io::Write;

use crate::config::OutputFormat;

use super::types::{AnomalyReport, EdgeScore};

/// Destination for per-window anomaly reports.
pub trait ReportSink {
    fn emit(&mut self, report: &AnomalyReport) -> eyre::Result<()>;
}

/// Collects reports in memory.
impl ReportSink for Vec<AnomalyReport> {
    fn emit(&mut self, report: &AnomalyReport) -> eyre::Result<()> {
        self.push(report.clone());
        Ok(())
    }
}

/// Renders reports as text or JSON lines onto an output stream (stdout in production).
/// Diagnostics go through `tracing` to stderr, so the two never interleave on one stream.
pub struct ReportWriter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_text(&mut self, report: &AnomalyReport) -> std::io::Result<()> {
        writeln!(
            self.out,
            "=== window {} @ {} | nodes: {} | edges: {} ===",
            report.window,
            report.generated_at.format("%Y-%m-%d %H:%M:%S"),
            report.node_count,
            report.edge_count
        )?;
        for entry in &report.entries {
            write_edge(&mut self.out, entry)?;
        }
        writeln!(
            self.out,
            "--- flagged (error > {}): {} ---",
            report.threshold,
            report.flagged.len()
        )?;
        for entry in &report.flagged {
            write_edge(&mut self.out, entry)?;
        }
        Ok(())
    }
}

fn write_edge<W: Write>(out: &mut W, entry: &EdgeScore) -> std::io::Result<()> {
    writeln!(
        out,
        "  {} -> {}: orig {:.6}, recon {:.4}, error {:.4}",
        entry.src_address,
        entry.dst_address,
        entry.original_weight,
        entry.reconstructed_score,
        entry.absolute_error
    )
}

impl<W: Write> ReportSink for ReportWriter<W> {
    fn emit(&mut self, report: &AnomalyReport) -> eyre::Result<()> {
        match self.format {
            OutputFormat::Text => self.write_text(report)?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, report)?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()?;
        Ok(())
    }
}
