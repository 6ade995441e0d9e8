//! CSV report sinks.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::{FinalizeOutcome, Reporter};
use crate::errors::{PropcidError, PropcidResult};
use crate::model::{ErrorRecord, WarningRecord};

pub const ERROR_HEADER: [&str; 7] = [
    "property_cid",
    "data_group_cid",
    "file_path",
    "error_path",
    "error_message",
    "current_value",
    "timestamp",
];

pub const WARNING_HEADER: [&str; 6] = [
    "property_cid",
    "data_group_cid",
    "file_path",
    "error_path",
    "reason",
    "timestamp",
];

struct Sinks {
    errors: csv::Writer<File>,
    warnings: csv::Writer<File>,
}

/// Writes errors and warnings to two CSV files.
pub struct CsvReporter {
    sinks: Mutex<Option<Sinks>>,
    errors: AtomicUsize,
    warnings: AtomicUsize,
}

impl CsvReporter {
    /// Create both files (truncating) and write their headers.
    pub fn create(errors_path: &Path, warnings_path: &Path) -> PropcidResult<Self> {
        let mut errors = csv::Writer::from_path(errors_path)?;
        errors.write_record(ERROR_HEADER)?;
        let mut warnings = csv::Writer::from_path(warnings_path)?;
        warnings.write_record(WARNING_HEADER)?;
        debug!(
            errors = %errors_path.display(),
            warnings = %warnings_path.display(),
            "report sinks opened"
        );

        Ok(Self {
            sinks: Mutex::new(Some(Sinks { errors, warnings })),
            errors: AtomicUsize::new(0),
            warnings: AtomicUsize::new(0),
        })
    }

    fn closed() -> PropcidError {
        PropcidError::report("reporter already finalized")
    }
}

impl Reporter for CsvReporter {
    fn log_error(&self, r: ErrorRecord) -> PropcidResult<()> {
        let mut guard = self.sinks.lock();
        let sinks = guard.as_mut().ok_or_else(Self::closed)?;
        sinks.errors.write_record([
            &r.property_id,
            &r.data_group_id,
            &r.file_path,
            &r.error_path,
            &r.message,
            &r.current_value,
            &r.timestamp,
        ])?;
        self.errors.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn log_warning(&self, r: WarningRecord) -> PropcidResult<()> {
        let mut guard = self.sinks.lock();
        let sinks = guard.as_mut().ok_or_else(Self::closed)?;
        sinks.warnings.write_record([
            &r.property_id,
            &r.data_group_id,
            &r.file_path,
            &r.error_path,
            &r.message,
            &r.timestamp,
        ])?;
        self.warnings.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn finalize(&self) -> PropcidResult<FinalizeOutcome> {
        let Some(mut sinks) = self.sinks.lock().take() else {
            return Ok(FinalizeOutcome::AlreadyFinalized);
        };
        sinks.errors.flush()?;
        sinks.warnings.flush()?;
        Ok(FinalizeOutcome::Finalized)
    }

    fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }
}
