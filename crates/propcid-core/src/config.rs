//! Configuration structures for propcid-core.
//!
//! This module defines explicit, serializable configuration objects used by
//! the host (CLI) to control schema fetching, orchestration, link resolution
//! and limits.
//!
//! The core crate itself does not read environment variables. All configuration
//! must be provided explicitly by the caller.

use serde::{Deserialize, Serialize};

use crate::determinism::cid::is_valid_cid;
use crate::errors::{PropcidError, PropcidResult};

/// Content ID of the well-known seed data-group schema.
pub const DEFAULT_SEED_SCHEMA_ID: &str =
    "bafkreih4qutkovzyvb5n76wodbayovicrjbahbwkwml66udgdths5zgh2y";

/// Public IPFS gateway used for schema fetching when none is configured.
pub const DEFAULT_GATEWAY_URL: &str = "https://ipfs.io";

/// Where shape errors point users to.
pub const DEFAULT_SHAPE_DOCS_URL: &str = "https://lexicon.elephant.xyz";

/// Global configuration container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub schema: SchemaConfig,
    pub pipeline: PipelineConfig,
    pub resolver: ResolverConfig,
    pub limits: LimitsConfig,
}

/// Schema fetching and caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchemaConfig {
    /// Gateway base URL; schemas are fetched from `{gateway_url}/ipfs/{id}`.
    pub gateway_url: String,
    /// Optional local directory holding `{id}.json` schemas. Takes precedence
    /// over the gateway when set.
    pub schema_dir: Option<String>,
    /// LRU capacity (number of schemas).
    pub cache_capacity: usize,
    /// Retries on rate limiting / server errors, per fetch.
    pub max_retries: u32,
    /// Base backoff; attempt `n` waits `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
    pub request_timeout_ms: u64,
    pub shape_docs_url: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            schema_dir: None,
            cache_capacity: 256,
            max_retries: 3,
            retry_backoff_ms: 500,
            request_timeout_ms: 30_000,
            shape_docs_url: DEFAULT_SHAPE_DOCS_URL.to_string(),
        }
    }
}

/// Orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Data-group schema id that marks a seed file.
    pub seed_schema_id: String,
    /// Explicit concurrency limit. `None` derives one from the OS.
    pub max_concurrency: Option<usize>,
    /// Dereference local link targets during validation.
    pub resolve_local_refs: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed_schema_id: DEFAULT_SEED_SCHEMA_ID.to_string(),
            max_concurrency: None,
            resolve_local_refs: false,
        }
    }
}

/// IPLD resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverConfig {
    pub max_depth: usize,
    /// Lowercase extensions treated as binary images.
    pub image_extensions: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            image_extensions: ["png", "jpg", "jpeg", "gif", "webp", "bmp", "svg", "tif", "tiff", "heic"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LimitsConfig {
    pub max_file_bytes: u64,
    pub max_schema_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 64 * 1024 * 1024,
            max_schema_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Validate a full configuration object.
pub fn validate_config(cfg: &EngineConfig) -> PropcidResult<()> {
    if cfg.schema.cache_capacity == 0 {
        return Err(PropcidError::invalid_argument(
            "schema cache capacity must be greater than zero",
        ));
    }

    if cfg.schema.schema_dir.is_none() && cfg.schema.gateway_url.trim().is_empty() {
        return Err(PropcidError::invalid_argument(
            "either a schema gateway url or a schema directory is required",
        ));
    }

    if !is_valid_cid(&cfg.pipeline.seed_schema_id) {
        return Err(PropcidError::invalid_argument(format!(
            "seed schema id is not a valid CID: {}",
            cfg.pipeline.seed_schema_id
        )));
    }

    if cfg.pipeline.max_concurrency == Some(0) {
        return Err(PropcidError::invalid_argument(
            "max_concurrency must be greater than zero",
        ));
    }

    if cfg.resolver.max_depth == 0 {
        return Err(PropcidError::invalid_argument(
            "resolver max_depth must be greater than zero",
        ));
    }

    if cfg.limits.max_file_bytes == 0 || cfg.limits.max_schema_bytes == 0 {
        return Err(PropcidError::invalid_argument("byte limits must be greater than zero"));
    }

    Ok(())
}
