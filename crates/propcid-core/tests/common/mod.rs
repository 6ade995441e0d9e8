//! Shared fixtures for the black-box pipeline tests.
//!
//! Each test builds a temporary input tree of property directories and runs
//! the orchestrator against in-memory schemas.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use propcid_core::config::{EngineConfig, ResolverConfig, DEFAULT_SEED_SCHEMA_ID};
use propcid_core::ipld::IpldResolver;
use propcid_core::model::{Clock, FileEntry, PropertyRef};
use propcid_core::pipeline::{Orchestrator, PipelineServices};
use propcid_core::report::MemoryReporter;
use propcid_core::schema::{MemorySchemaSource, SchemaCache};
use propcid_core::validate::SchemaValidator;
use serde_json::{json, Value};
use tempfile::TempDir;

pub const SEED: &str = DEFAULT_SEED_SCHEMA_ID;
pub const DEPENDENT: &str = "bafkreiby6hypzaay6iu7u5jthlnhvfev2ptncmaukrpfc4r2akrlu2j7xm";
pub const BAD_SHAPE: &str = "bafkreicqhfmt2dr2wuorra6vdurzzgy5hduibdgyp77skm4rdfukc6cynu";
pub const OWNER_CLASS: &str = "bafkreieyyor6lhpnyczy7mjw47gs4p64ftw43cgnmwbhas6cr7mhpbspke";
pub const FIXED_TIME: &str = "2024-05-01T12:00:00Z";

pub fn seed_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "label": {"type": "string"},
            "relationships": {
                "type": "object",
                "properties": {
                    "parcel_id": {"type": "string"},
                    "photo": {"type": "string", "format": "ipfs_uri"}
                },
                "required": ["parcel_id"]
            }
        },
        "required": ["label", "relationships"]
    })
}

pub fn dependent_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "label": {"type": "string"},
            "relationships": {
                "type": "object",
                "properties": {
                    "owner": {"cid": OWNER_CLASS},
                    "photos": {"type": "array", "items": {"type": "string", "format": "ipfs_uri"}}
                }
            }
        },
        "required": ["label", "relationships"]
    })
}

pub fn schema_source() -> MemorySchemaSource {
    MemorySchemaSource::new()
        .with_json(SEED, &seed_schema())
        .with_json(DEPENDENT, &dependent_schema())
        .with_json(
            BAD_SHAPE,
            &json!({"type": "object", "properties": {"label": {}, "relationships": {}, "name": {}}}),
        )
        .with_json(
            OWNER_CLASS,
            &json!({"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]}),
        )
}

pub struct Harness {
    pub input: TempDir,
    pub reporter: Arc<MemoryReporter>,
    pub cache: Arc<SchemaCache>,
    pub config: EngineConfig,
}

impl Harness {
    pub fn new() -> Self {
        let mut config = EngineConfig::default();
        config.pipeline.max_concurrency = Some(4);
        let source = Arc::new(schema_source());
        Self {
            input: tempfile::tempdir().expect("tempdir"),
            reporter: Arc::new(MemoryReporter::new()),
            cache: Arc::new(SchemaCache::new(source, &config.schema, config.limits.max_schema_bytes)),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        self.input.path()
    }

    pub fn write(&self, rel: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let p = self.root().join(rel);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).expect("create fixture dir");
        }
        fs::write(&p, contents).expect("write fixture");
        p
    }

    pub fn write_json(&self, rel: &str, v: &Value) -> PathBuf {
        self.write(rel, serde_json::to_vec_pretty(v).expect("fixture json"))
    }

    /// A pending entry for `<dir>/<group>.json`.
    pub fn pending(&self, dir: &str, group: &str) -> FileEntry {
        let d = self.root().join(dir);
        FileEntry::new(PropertyRef::pending(&d), group, d.join(format!("{group}.json")))
    }

    pub fn services(&self) -> PipelineServices {
        let validator = SchemaValidator::new(
            self.cache.clone(),
            self.config.resolver.max_depth,
            self.config.limits.max_file_bytes,
        );
        let resolver = IpldResolver::new(&ResolverConfig::default(), self.config.limits.max_file_bytes);
        PipelineServices::new(
            self.cache.clone(),
            Arc::new(validator),
            Arc::new(resolver),
            self.reporter.clone(),
        )
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.services(), &self.config).with_clock(Clock::Fixed(FIXED_TIME.to_string()))
    }

    /// Seed document for `dir`.
    pub fn seed(&self, dir: &str, parcel: &str) -> FileEntry {
        self.write_json(
            &format!("{dir}/{SEED}.json"),
            &json!({"label": "Property Seed", "relationships": {"parcel_id": parcel}}),
        );
        self.pending(dir, SEED)
    }
}
