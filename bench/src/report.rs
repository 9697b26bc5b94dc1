use crate::orchestrator::RunReport;
use anyhow::{Context, Result};
use log::info;
use std::fs::File;
use std::path::Path;

pub fn write(report: &RunReport, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create report file {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    info!("report written to {}", path.display());
    Ok(())
}

pub fn log_summary(report: &RunReport) {
    info!(
        "{} rounds completed, {} abandoned, {} writes submitted",
        report.rounds.len(),
        report.abandoned_rounds,
        report.submitted_total
    );
    for stat in &report.aggregates {
        info!(
            "count {:>6}: put {:>9.1} ms  get {:>9.1} ms  ({} rounds)",
            stat.count, stat.mean_put_ms, stat.mean_get_ms, stat.samples
        );
    }
}
