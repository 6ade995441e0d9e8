//! propcid data models.
//!
//! Models are mostly "dumb" data. The orchestrator applies policy and the
//! host performs output I/O.
//!
//! Lifetimes:
//! - `FileEntry` is produced by the directory scanner and read-only afterwards.
//! - `HashedFile` / `BinaryAsset` are created once a pipeline succeeds and live
//!   for the duration of a run.
//! - `ErrorRecord` / `WarningRecord` are append-only report rows.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Property identifier of a file entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyRef {
    /// Already known property CID.
    Resolved(String),
    /// Not known until the seed file of `directory` has been hashed.
    Pending { directory: PathBuf },
}

impl PropertyRef {
    pub fn pending(directory: impl Into<PathBuf>) -> Self {
        Self::Pending {
            directory: directory.into(),
        }
    }

    pub fn resolved_cid(&self) -> Option<&str> {
        match self {
            Self::Resolved(cid) => Some(cid),
            Self::Pending { .. } => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolved(cid) => f.write_str(cid),
            Self::Pending { directory } => write!(f, "pending:{}", directory.display()),
        }
    }
}

/// One input document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub property: PropertyRef,
    /// Content ID of the data-group schema the file conforms to.
    pub data_group_id: String,
    pub file_path: PathBuf,
}

impl FileEntry {
    pub fn new(property: PropertyRef, data_group_id: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            property,
            data_group_id: data_group_id.into(),
            file_path: file_path.into(),
        }
    }

    /// The property directory this entry belongs to.
    pub fn directory(&self) -> PathBuf {
        match &self.property {
            PropertyRef::Pending { directory } => directory.clone(),
            PropertyRef::Resolved(_) => self
                .file_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }
}

/// A successfully hashed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashedFile {
    pub original_path: PathBuf,
    pub property_cid: String,
    pub data_group_cid: String,
    pub calculated_cid: String,
    pub canonical_json: String,
}

/// A binary payload (image) referenced from a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryAsset {
    pub original_path: PathBuf,
    pub property_cid: String,
    pub cid: String,
    pub extension: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// How a linked file was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedKind {
    Json,
    Text,
    Binary,
}

/// A file discovered while resolving links.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedDocument {
    pub path: PathBuf,
    pub cid: String,
    pub kind: DerivedKind,
    /// Canonical bytes for JSON, original bytes otherwise.
    pub bytes: Vec<u8>,
    /// Parsed, link-resolved value for JSON documents.
    pub value: Option<Value>,
}

/// Per-directory consistency state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryOutcome {
    Pending,
    SeedSucceeded(String),
    SeedFailed { reason: String },
}

/// Error report row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub property_id: String,
    pub data_group_id: String,
    pub file_path: String,
    pub error_path: String,
    pub message: String,
    pub current_value: String,
    pub timestamp: String,
}

/// Warning report row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningRecord {
    pub property_id: String,
    pub data_group_id: String,
    pub file_path: String,
    pub error_path: String,
    pub message: String,
    pub timestamp: String,
}

/// Final run metrics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub run_id: String,
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total: usize,
    pub start_time: String,
    pub finished_at: String,
}

/// Timestamp source for report rows.
///
/// Tests pin the clock so report output is byte-stable.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(String),
}

impl Clock {
    pub fn now_rfc3339(&self) -> String {
        match self {
            Self::System => OffsetDateTime::now_utc()
                .format(&Rfc3339)
                .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string()),
            Self::Fixed(ts) => ts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_directory_for_pending_and_resolved() {
        let pending = FileEntry::new(PropertyRef::pending("/in/prop-a"), "bafy", "/in/prop-a/x.json");
        assert_eq!(pending.directory(), PathBuf::from("/in/prop-a"));

        let resolved = FileEntry::new(PropertyRef::Resolved("bafyprop".into()), "bafy", "/in/bafyprop/x.json");
        assert_eq!(resolved.directory(), PathBuf::from("/in/bafyprop"));
    }

    #[test]
    fn pending_property_renders_with_directory() {
        let p = PropertyRef::pending("/in/prop-a");
        assert_eq!(p.to_string(), "pending:/in/prop-a");
        assert!(p.resolved_cid().is_none());
    }

    #[test]
    fn fixed_clock_is_stable() {
        let c = Clock::Fixed("2024-01-01T00:00:00Z".to_string());
        assert_eq!(c.now_rfc3339(), "2024-01-01T00:00:00Z");
    }
}
