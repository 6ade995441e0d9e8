//! Validation and hashing pipeline.
//!
//! Every input file goes through the same stages:
//! - fetch its data-group schema
//! - read and parse the document
//! - validate it against the schema
//! - resolve local references into CIDs
//! - canonicalize and compute the document CID
//!
//! `file` runs the stages for one entry. `orchestrator` schedules entries in
//! two phases (seeds, then dependents) on a bounded worker pool.
//!
//! Collaborators are injected as trait objects through `PipelineServices`, so
//! hosts and tests can swap any of them.

use std::path::Path;
use std::sync::Arc;

use crate::config::{EngineConfig, SchemaConfig};
use crate::errors::{PropcidError, PropcidResult};
use crate::ipld::{IpldResolver, LinkResolver};
use crate::report::Reporter;
use crate::schema::{DirectorySchemaSource, SchemaCache, SchemaProvider, SchemaSource};
use crate::validate::{JsonValidator, SchemaValidator};

pub mod concurrency;
pub mod file;
pub mod orchestrator;
pub mod parse;

pub use file::{process_entry, FileFailure, FileResult, FileSettings, FileSuccess};
pub use orchestrator::{Orchestrator, RunOutcome};

/// Run phases reported to the progress hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Discovering,
    RunningPipeline,
    Completed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Discovering => "discovering",
            Self::RunningPipeline => "running pipeline",
            Self::Completed => "completed",
        }
    }
}

/// Progress hook. Rendering is up to the host.
pub trait ProgressSink: Send + Sync {
    fn on_phase(&self, phase: Phase);

    fn on_file_started(&self, _path: &Path) {}

    fn on_file_finished(&self, _path: &Path, _ok: bool) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_phase(&self, _phase: Phase) {}
}

/// Collaborators shared by every pipeline task.
#[derive(Clone)]
pub struct PipelineServices {
    pub schemas: Arc<dyn SchemaProvider>,
    pub validator: Arc<dyn JsonValidator>,
    pub resolver: Arc<dyn LinkResolver>,
    pub reporter: Arc<dyn Reporter>,
    pub progress: Arc<dyn ProgressSink>,
}

impl PipelineServices {
    pub fn new(
        schemas: Arc<dyn SchemaProvider>,
        validator: Arc<dyn JsonValidator>,
        resolver: Arc<dyn LinkResolver>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            schemas,
            validator,
            resolver,
            reporter,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Default services for `cfg`: a schema cache over the configured source
    /// (directory if set, gateway otherwise), the `jsonschema` validator and
    /// the filesystem resolver.
    pub fn from_config(cfg: &EngineConfig, reporter: Arc<dyn Reporter>) -> PropcidResult<Self> {
        let source: Arc<dyn SchemaSource> = match &cfg.schema.schema_dir {
            Some(dir) => Arc::new(DirectorySchemaSource::new(dir)),
            None => gateway_source(&cfg.schema)?,
        };
        let cache = Arc::new(SchemaCache::new(source, &cfg.schema, cfg.limits.max_schema_bytes));
        let validator = SchemaValidator::new(cache.clone(), cfg.resolver.max_depth, cfg.limits.max_file_bytes);
        let resolver = IpldResolver::new(&cfg.resolver, cfg.limits.max_file_bytes);
        Ok(Self::new(cache, Arc::new(validator), Arc::new(resolver), reporter))
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }
}

#[cfg(feature = "gateway")]
fn gateway_source(cfg: &SchemaConfig) -> PropcidResult<Arc<dyn SchemaSource>> {
    let source = crate::schema::GatewaySchemaSource::new(cfg)
        .map_err(|e| PropcidError::invalid_argument(e.to_string()))?;
    Ok(Arc::new(source))
}

#[cfg(not(feature = "gateway"))]
fn gateway_source(_cfg: &SchemaConfig) -> PropcidResult<Arc<dyn SchemaSource>> {
    Err(PropcidError::invalid_argument(
        "built without the `gateway` feature; configure a schema directory",
    ))
}
