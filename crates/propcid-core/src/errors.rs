//! Error types for propcid-core.
//!
//! Two layers:
//! - `PropcidError`: infrastructure and argument errors (config, reporter, I/O
//!   that is not tied to one input file). These abort a run.
//! - `FileError`: the per-file taxonomy. These are caught at the pipeline
//!   boundary and routed to the report sinks; they never abort a run.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience result alias.
pub type PropcidResult<T> = Result<T, PropcidError>;

/// Engine-level error.
#[derive(Debug, Error)]
pub enum PropcidError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("report sink error: {0}")]
    Report(String),
}

impl PropcidError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    pub fn report(msg: impl Into<String>) -> Self {
        Self::Report(msg.into())
    }
}

impl From<std::io::Error> for PropcidError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<csv::Error> for PropcidError {
    fn from(e: csv::Error) -> Self {
        Self::Report(e.to_string())
    }
}

/// Schema source/cache failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Transport or decode failure. Recoverable: a later attempt may succeed.
    #[error("failed to fetch schema {id}: {reason}")]
    Fetch { id: String, reason: String },

    /// The schema is not a data-group schema.
    #[error(
        "schema {id} is not a valid data group schema: {reason}. \
         Data group schemas must describe an object with exactly two properties, \
         `label` and `relationships`. See {docs_url}"
    )]
    Shape {
        id: String,
        reason: String,
        docs_url: String,
    },
}

impl SchemaError {
    pub fn fetch(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape { .. })
    }
}

/// Failure to resolve a single link. Recoverable: the reference is left as is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("linked file {path} could not be read: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("linked file {path} could not be parsed: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("reference cycle detected at {path}")]
    Cycle { path: PathBuf },

    #[error("link nesting exceeds max depth {max_depth} at {path}")]
    TooDeep { path: PathBuf, max_depth: usize },

    #[error("unsupported ipfs_uri target {path}: only image files or CIDs can be referenced")]
    UnsupportedTarget { path: PathBuf },

    #[error("linked file {path} could not be hashed: {reason}")]
    Hash { path: PathBuf, reason: String },
}

impl LinkError {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Read { path, .. }
            | Self::Parse { path, .. }
            | Self::Cycle { path }
            | Self::TooDeep { path, .. }
            | Self::UnsupportedTarget { path }
            | Self::Hash { path, .. } => path,
        }
    }
}

/// A resolution error together with the JSON pointer of the reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkResolutionError {
    pub pointer: String,
    pub error: LinkError,
}

/// A single schema violation in user-facing form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// JSON pointer into the validated document (`""` for the root).
    pub path: String,
    /// Human readable message.
    pub message: String,
    /// The offending value, rendered for the CSV "current value" column.
    pub value: String,
    /// `path` prefixed with the property directory name.
    pub display_path: String,
}

/// Per-file pipeline failure.
#[derive(Debug, Clone, Error)]
pub enum FileError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("{} validation error(s)", .0.len())]
    Validation(Vec<ValidationIssue>),

    #[error("seed file for {directory} failed; dependent file skipped")]
    SeedFailure { directory: PathBuf },

    #[error("no seed file found in {directory}")]
    MissingSeed { directory: PathBuf },

    #[error("internal pipeline failure: {0}")]
    Internal(String),
}

impl FileError {
    /// Stable code used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Schema(SchemaError::Fetch { .. }) => "schema.fetch",
            Self::Schema(SchemaError::Shape { .. }) => "schema.shape",
            Self::Read { .. } => "file.read",
            Self::Parse { .. } => "file.parse",
            Self::Validation(_) => "validation",
            Self::SeedFailure { .. } => "seed.failed",
            Self::MissingSeed { .. } => "seed.missing",
            Self::Internal(_) => "internal",
        }
    }
}
