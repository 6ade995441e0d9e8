//! Two-phase orchestration.
//!
//! Per property directory:
//!
//! ```text
//! Pending -> seed running -> SeedSucceeded(cid) -> dependents running -> done
//!                         -> SeedFailed         -> dependents skipped
//! ```
//!
//! All seeds finish before any dependent starts. Within a phase, entries run
//! concurrently on a `JoinSet` gated by a semaphore of `concurrency` permits.
//! Tasks return their results; the orchestrator alone writes to the reporter
//! and builds the output lists.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::concurrency::default_concurrency;
use super::file::{process_entry, FileFailure, FileResult, FileSettings, FileSuccess};
use super::{Phase, PipelineServices};
use crate::config::EngineConfig;
use crate::errors::{FileError, PropcidResult};
use crate::model::{
    BinaryAsset, Clock, DirectoryOutcome, ErrorRecord, FileEntry, HashedFile, PropertyRef, RunMetrics,
    WarningRecord,
};
use crate::validate::messages::display_path;

/// Everything a run produced besides report rows.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Sorted by (property CID, calculated CID, path).
    pub hashed_files: Vec<HashedFile>,
    /// Sorted by (property CID, CID).
    pub assets: Vec<BinaryAsset>,
    pub metrics: RunMetrics,
    pub directory_outcomes: BTreeMap<PathBuf, DirectoryOutcome>,
    /// True if any file failed schema validation.
    pub validation_failed: bool,
}

pub struct Orchestrator {
    services: PipelineServices,
    seed_schema_id: String,
    concurrency: usize,
    settings: FileSettings,
    clock: Clock,
}

/// An entry ready to run and the property CID it will be recorded under.
struct Job {
    entry: FileEntry,
    property_cid: Option<String>,
}

#[derive(Default)]
struct Tally {
    processed: usize,
    skipped: usize,
    errors: usize,
    validation_failed: bool,
    hashed: Vec<HashedFile>,
    assets: Vec<BinaryAsset>,
}

impl Orchestrator {
    pub fn new(services: PipelineServices, cfg: &EngineConfig) -> Self {
        let concurrency = cfg
            .pipeline
            .max_concurrency
            .unwrap_or_else(default_concurrency)
            .max(1);
        Self {
            services,
            seed_schema_id: cfg.pipeline.seed_schema_id.clone(),
            concurrency,
            settings: FileSettings {
                resolve_local_refs: cfg.pipeline.resolve_local_refs,
                max_file_bytes: cfg.limits.max_file_bytes,
            },
            clock: Clock::System,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn is_seed(&self, entry: &FileEntry) -> bool {
        entry.data_group_id == self.seed_schema_id
    }

    /// Run every entry. Per-file failures go to the reporter; only reporter
    /// failures abort the run.
    pub async fn run(&self, entries: Vec<FileEntry>) -> PropcidResult<RunOutcome> {
        let run_id = Uuid::new_v4().to_string();
        let start_time = self.clock.now_rfc3339();
        let total = entries.len();
        self.services.progress.on_phase(Phase::RunningPipeline);

        let (seeds, dependents): (Vec<FileEntry>, Vec<FileEntry>) =
            entries.into_iter().partition(|e| self.is_seed(e));
        info!(
            run_id = %run_id,
            seeds = seeds.len(),
            dependents = dependents.len(),
            concurrency = self.concurrency,
            "pipeline started"
        );

        let mut tally = Tally::default();
        let mut outcomes: BTreeMap<PathBuf, DirectoryOutcome> = BTreeMap::new();

        // Phase 1: seeds.
        let seed_jobs: Vec<Job> = seeds
            .into_iter()
            .map(|entry| {
                outcomes.entry(entry.directory()).or_insert(DirectoryOutcome::Pending);
                let property_cid = entry.property.resolved_cid().map(str::to_string);
                Job { entry, property_cid }
            })
            .collect();
        for result in self.run_batch(seed_jobs).await {
            let dir = match &result {
                Ok(ok) => ok.entry.directory(),
                Err(failure) => failure.entry.directory(),
            };
            match result {
                Ok(ok) => {
                    let cid = ok.hashed.property_cid.clone();
                    debug!(directory = %dir.display(), property = %cid, "seed succeeded");
                    let current = outcomes.entry(dir).or_insert(DirectoryOutcome::Pending);
                    if *current == DirectoryOutcome::Pending {
                        *current = DirectoryOutcome::SeedSucceeded(cid);
                    }
                    self.record_success(ok, &mut tally)?;
                }
                Err(failure) => {
                    warn!(directory = %dir.display(), error = %failure.error, "seed failed");
                    let reason = failure.error.to_string();
                    self.record_failure(&failure, &mut tally)?;
                    outcomes.insert(dir, DirectoryOutcome::SeedFailed { reason });
                }
            }
        }

        // Phase 2: dependents.
        let mut jobs = Vec::with_capacity(dependents.len());
        for entry in dependents {
            let dir = entry.directory();
            let seed = outcomes.get(&dir).cloned();
            let resolved = entry.property.resolved_cid().map(str::to_string);
            match (seed, resolved) {
                (Some(DirectoryOutcome::SeedFailed { .. }), _) => {
                    tally.skipped += 1;
                    self.services.reporter.log_warning(WarningRecord {
                        property_id: entry.property.to_string(),
                        data_group_id: entry.data_group_id.clone(),
                        file_path: entry.file_path.display().to_string(),
                        error_path: String::new(),
                        message: FileError::SeedFailure { directory: dir }.to_string(),
                        timestamp: self.clock.now_rfc3339(),
                    })?;
                }
                (_, Some(cid)) => jobs.push(Job {
                    entry,
                    property_cid: Some(cid),
                }),
                (Some(DirectoryOutcome::SeedSucceeded(cid)), None) => jobs.push(Job {
                    entry: FileEntry {
                        property: PropertyRef::Resolved(cid.clone()),
                        ..entry
                    },
                    property_cid: Some(cid),
                }),
                (_, None) => {
                    tally.skipped += 1;
                    warn!(path = %entry.file_path.display(), "no seed for pending entry");
                    self.report_failure(&FileFailure {
                        error: FileError::MissingSeed { directory: dir },
                        entry,
                    })?;
                }
            }
        }

        for result in self.run_batch(jobs).await {
            match result {
                Ok(ok) => self.record_success(ok, &mut tally)?,
                Err(failure) => self.record_failure(&failure, &mut tally)?,
            }
        }

        tally.hashed.sort_by(|a, b| {
            (&a.property_cid, &a.calculated_cid, &a.original_path)
                .cmp(&(&b.property_cid, &b.calculated_cid, &b.original_path))
        });
        tally.hashed.dedup_by(|a, b| {
            a.property_cid == b.property_cid
                && a.calculated_cid == b.calculated_cid
                && a.original_path == b.original_path
        });
        tally
            .assets
            .sort_by(|a, b| (&a.property_cid, &a.cid).cmp(&(&b.property_cid, &b.cid)));
        tally
            .assets
            .dedup_by(|a, b| a.property_cid == b.property_cid && a.cid == b.cid);

        let metrics = RunMetrics {
            run_id,
            processed: tally.processed,
            skipped: tally.skipped,
            errors: tally.errors,
            total,
            start_time,
            finished_at: self.clock.now_rfc3339(),
        };
        info!(
            processed = metrics.processed,
            skipped = metrics.skipped,
            errors = metrics.errors,
            total = metrics.total,
            "pipeline completed"
        );
        self.services.progress.on_phase(Phase::Completed);

        Ok(RunOutcome {
            hashed_files: tally.hashed,
            assets: tally.assets,
            metrics,
            directory_outcomes: outcomes,
            validation_failed: tally.validation_failed,
        })
    }

    /// Run `jobs` concurrently, at most `concurrency` at a time. Results come
    /// back in job order.
    async fn run_batch(&self, jobs: Vec<Job>) -> Vec<FileResult> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set: JoinSet<(usize, FileResult)> = JoinSet::new();
        let entries: Vec<FileEntry> = jobs.iter().map(|j| j.entry.clone()).collect();

        for (idx, job) in jobs.into_iter().enumerate() {
            let services = self.services.clone();
            let settings = self.settings;
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await;
                let path = job.entry.file_path.clone();
                services.progress.on_file_started(&path);
                let result = process_entry(&services, job.entry, job.property_cid, settings).await;
                services.progress.on_file_finished(&path, result.is_ok());
                (idx, result)
            });
        }

        let mut slots: Vec<Option<FileResult>> = (0..entries.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => warn!(error = %e, "pipeline task aborted"),
            }
        }

        slots
            .into_iter()
            .zip(entries)
            .map(|(slot, entry)| {
                slot.unwrap_or_else(|| {
                    Err(FileFailure {
                        entry,
                        error: FileError::Internal("pipeline task aborted".to_string()),
                    })
                })
            })
            .collect()
    }

    fn record_success(&self, ok: FileSuccess, tally: &mut Tally) -> PropcidResult<()> {
        tally.processed += 1;
        let FileSuccess {
            entry,
            hashed,
            derived,
            assets,
            link_errors,
        } = ok;

        for link in &link_errors {
            self.services.reporter.log_error(ErrorRecord {
                property_id: hashed.property_cid.clone(),
                data_group_id: entry.data_group_id.clone(),
                file_path: entry.file_path.display().to_string(),
                error_path: display_path(&link.pointer, &entry.file_path),
                message: link.error.to_string(),
                current_value: link.error.path().display().to_string(),
                timestamp: self.clock.now_rfc3339(),
            })?;
        }

        tally.hashed.push(hashed);
        tally.hashed.extend(derived);
        tally.assets.extend(assets);
        Ok(())
    }

    fn record_failure(&self, failure: &FileFailure, tally: &mut Tally) -> PropcidResult<()> {
        tally.errors += 1;
        if matches!(failure.error, FileError::Validation(_)) {
            tally.validation_failed = true;
        }
        debug!(
            path = %failure.entry.file_path.display(),
            code = failure.error.code(),
            "file failed"
        );
        self.report_failure(failure)
    }

    /// One row per validation issue, one row for anything else.
    fn report_failure(&self, failure: &FileFailure) -> PropcidResult<()> {
        let entry = &failure.entry;
        let row = |error_path: String, message: String, current_value: String| ErrorRecord {
            property_id: entry.property.to_string(),
            data_group_id: entry.data_group_id.clone(),
            file_path: entry.file_path.display().to_string(),
            error_path,
            message,
            current_value,
            timestamp: self.clock.now_rfc3339(),
        };

        match &failure.error {
            FileError::Validation(issues) => {
                for issue in issues {
                    self.services.reporter.log_error(row(
                        issue.display_path.clone(),
                        issue.message.clone(),
                        issue.value.clone(),
                    ))?;
                }
            }
            other => {
                self.services
                    .reporter
                    .log_error(row(String::new(), other.to_string(), String::new()))?;
            }
        }
        Ok(())
    }
}
