use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use propcid_core::config::EngineConfig;

use super::execute;
use crate::args::ReportArgs;

/// Fails the process when any file violated its schema.
pub async fn run(cfg: &EngineConfig, input: &Path, report: &ReportArgs) -> Result<ExitCode> {
    let (outcome, summary) = execute("validate", cfg, input, report).await?;
    let ok = !outcome.validation_failed;
    summary.print(ok)?;
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
