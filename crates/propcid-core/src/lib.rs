//! propcid-core
//!
//! Core engine for propcid:
//! - Canonical JSON encoding (RFC 8785) and CIDv1 computation
//! - Content-addressed schema cache with data-group shape checks
//! - JSON Schema validation with property formats and `cid` links
//! - IPLD link resolution of local file references
//! - Two-phase (seed, then dependents) concurrent orchestration
//! - CSV and in-memory report sinks

pub mod config;
pub mod determinism;
pub mod errors;
pub mod ipld;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod validate;

pub use crate::errors::{PropcidError, PropcidResult};

/// Convenience re-exports.
pub mod prelude {
    pub use crate::config::{validate_config, EngineConfig, DEFAULT_SEED_SCHEMA_ID};
    pub use crate::determinism::{
        calculate_cid_from_canonical_json, calculate_cid_v1, calculate_cid_v1_for_raw_data, canonicalize,
        canonicalize_to_string, is_valid_cid,
    };
    pub use crate::errors::{FileError, LinkError, SchemaError, ValidationIssue};
    pub use crate::ipld::{IpldResolver, LinkResolver, ResolvedDocument};
    pub use crate::model::{BinaryAsset, Clock, FileEntry, HashedFile, PropertyRef, RunMetrics};
    pub use crate::pipeline::{NoopProgress, Orchestrator, Phase, PipelineServices, ProgressSink, RunOutcome};
    pub use crate::report::{CsvReporter, FinalizeOutcome, MemoryReporter, Reporter};
    pub use crate::schema::{DirectorySchemaSource, SchemaCache, SchemaProvider, SchemaSource};
    pub use crate::validate::{JsonValidator, SchemaValidator, ValidationResult};
    pub use crate::{PropcidError, PropcidResult};
}
