use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use propcid_core::config::EngineConfig;
use tracing::info;

use super::execute;
use crate::args::ReportArgs;
use crate::io::export;

/// Per-file failures end up in the error CSV; only output failures fail the
/// process.
pub async fn run(
    cfg: &EngineConfig,
    input: &Path,
    output_zip: &Path,
    output_csv: &Path,
    report: &ReportArgs,
) -> Result<ExitCode> {
    let (outcome, mut summary) = execute("hash", cfg, input, report).await?;

    let entries = export::write_zip(output_zip, &outcome.hashed_files, &outcome.assets)
        .context("writing output archive")?;
    export::write_result_csv(output_csv, &outcome.hashed_files, &outcome.metrics.finished_at)
        .context("writing result csv")?;
    info!(
        archive = %output_zip.display(),
        entries,
        documents = outcome.hashed_files.len(),
        assets = outcome.assets.len(),
        "outputs written"
    );

    summary.output_zip = Some(output_zip.display().to_string());
    summary.output_csv = Some(output_csv.display().to_string());
    summary.print(summary.errors == 0)?;
    Ok(ExitCode::SUCCESS)
}
