//! Error and warning sinks.
//!
//! Reporters are append-only and shared by every pipeline task, so all
//! methods take `&self` and serialize writers internally.
//!
//! Lifecycle: `log_*` any number of times, then `finalize` once. Logging after
//! finalize is an error; a second finalize reports `AlreadyFinalized`.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::errors::{PropcidError, PropcidResult};
use crate::model::{ErrorRecord, WarningRecord};

pub mod csv;

pub use self::csv::CsvReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    Finalized,
    AlreadyFinalized,
}

pub trait Reporter: Send + Sync {
    fn log_error(&self, record: ErrorRecord) -> PropcidResult<()>;
    fn log_warning(&self, record: WarningRecord) -> PropcidResult<()>;
    fn finalize(&self) -> PropcidResult<FinalizeOutcome>;
    fn error_count(&self) -> usize;
    fn warning_count(&self) -> usize;
}

/// Keeps rows in memory. Used by tests and embedders that render rows
/// themselves.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    errors: Mutex<Vec<ErrorRecord>>,
    warnings: Mutex<Vec<WarningRecord>>,
    finalized: AtomicBool,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.errors.lock().clone()
    }

    pub fn warnings(&self) -> Vec<WarningRecord> {
        self.warnings.lock().clone()
    }

    fn ensure_open(&self) -> PropcidResult<()> {
        if self.finalized.load(Ordering::Acquire) {
            return Err(PropcidError::report("reporter already finalized"));
        }
        Ok(())
    }
}

impl Reporter for MemoryReporter {
    fn log_error(&self, record: ErrorRecord) -> PropcidResult<()> {
        self.ensure_open()?;
        self.errors.lock().push(record);
        Ok(())
    }

    fn log_warning(&self, record: WarningRecord) -> PropcidResult<()> {
        self.ensure_open()?;
        self.warnings.lock().push(record);
        Ok(())
    }

    fn finalize(&self) -> PropcidResult<FinalizeOutcome> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return Ok(FinalizeOutcome::AlreadyFinalized);
        }
        Ok(FinalizeOutcome::Finalized)
    }

    fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    fn warning_count(&self) -> usize {
        self.warnings.lock().len()
    }
}
