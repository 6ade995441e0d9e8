use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use propcid_core::config::EngineConfig;
use propcid_core::pipeline::{Orchestrator, Phase, PipelineServices, ProgressSink, RunOutcome};
use propcid_core::report::{CsvReporter, Reporter};
use serde::Serialize;
use tracing::{info, warn};

use crate::args::{Cli, Command, ReportArgs};
use crate::io::scan::scan_input;
use crate::progress::BarProgress;
use crate::{output, settings};

mod hash;
mod validate;

pub async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let cfg = settings::load(&cli.engine)?;
    match cli.command {
        Command::Validate { input, report } => validate::run(&cfg, &input, &report).await,
        Command::Hash {
            input,
            output_zip,
            output_csv,
            report,
        } => hash::run(&cfg, &input, &output_zip, &output_csv, &report).await,
    }
}

/// Printed on stdout at the end of every command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub command: &'static str,
    pub run_id: String,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total: usize,
    pub start_time: String,
    pub finished_at: String,
    pub error_rows: usize,
    pub warning_rows: usize,
    pub validation_failed: bool,
    pub errors_csv: String,
    pub warnings_csv: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_zip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_csv: Option<String>,
}

impl RunSummary {
    fn new(command: &'static str, outcome: &RunOutcome, reporter: &CsvReporter, report: &ReportArgs) -> Self {
        let m = &outcome.metrics;
        Self {
            command,
            run_id: m.run_id.clone(),
            processed: m.processed,
            skipped: m.skipped,
            errors: m.errors,
            total: m.total,
            start_time: m.start_time.clone(),
            finished_at: m.finished_at.clone(),
            error_rows: reporter.error_count(),
            warning_rows: reporter.warning_count(),
            validation_failed: outcome.validation_failed,
            errors_csv: report.errors_csv.display().to_string(),
            warnings_csv: report.warnings_csv.display().to_string(),
            output_zip: None,
            output_csv: None,
        }
    }

    fn print(&self, ok: bool) -> Result<()> {
        if output::is_json() {
            return output::print(self);
        }
        output::status(
            ok,
            &format!(
                "{}: {} processed, {} skipped, {} failed of {}",
                self.command, self.processed, self.skipped, self.errors, self.total
            ),
        )?;
        output::line(&format!("errors:   {} ({} rows)", self.errors_csv, self.error_rows));
        output::line(&format!("warnings: {} ({} rows)", self.warnings_csv, self.warning_rows));
        if let Some(zip) = &self.output_zip {
            output::line(&format!("archive:  {zip}"));
        }
        if let Some(csv) = &self.output_csv {
            output::line(&format!("results:  {csv}"));
        }
        Ok(())
    }
}

/// Scan `input`, run both pipeline phases and finalize the report CSVs.
async fn execute(
    command: &'static str,
    cfg: &EngineConfig,
    input: &Path,
    report: &ReportArgs,
) -> Result<(RunOutcome, RunSummary)> {
    let progress = Arc::new(BarProgress::new(output::is_json()));
    progress.on_phase(Phase::Initializing);

    let reporter = Arc::new(
        CsvReporter::create(&report.errors_csv, &report.warnings_csv).context("opening report files")?,
    );
    let outcome = match run_pipeline(command, cfg, input, reporter.clone(), progress.clone()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // Flush rows written before the failure.
            if let Err(fe) = reporter.finalize() {
                warn!(error = %fe, "report files could not be finalized");
            }
            return Err(e);
        }
    };

    reporter.finalize().context("writing report files")?;
    let summary = RunSummary::new(command, &outcome, &reporter, report);
    Ok((outcome, summary))
}

async fn run_pipeline(
    command: &'static str,
    cfg: &EngineConfig,
    input: &Path,
    reporter: Arc<CsvReporter>,
    progress: Arc<BarProgress>,
) -> Result<RunOutcome> {
    let services = PipelineServices::from_config(cfg, reporter)?.with_progress(progress.clone());

    progress.on_phase(Phase::Discovering);
    let entries = scan_input(input)?;
    info!(command, input = %input.display(), entries = entries.len(), "input scanned");
    progress.set_total(entries.len());

    let outcome = Orchestrator::new(services, cfg).run(entries).await;
    progress.finish();
    Ok(outcome?)
}
