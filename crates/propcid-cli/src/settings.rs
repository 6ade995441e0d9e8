use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use propcid_core::config::{validate_config, EngineConfig};

use crate::args::EngineArgs;

/// Build the engine config: file (if any), then flag overrides, then
/// validation.
pub fn load(args: &EngineArgs) -> Result<EngineConfig> {
    let mut cfg = match &args.config {
        Some(path) => read_config_file(path)?,
        None => EngineConfig::default(),
    };
    apply_overrides(&mut cfg, args);
    validate_config(&cfg)?;
    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<EngineConfig> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

fn apply_overrides(cfg: &mut EngineConfig, args: &EngineArgs) {
    if let Some(url) = &args.gateway {
        cfg.schema.gateway_url = url.clone();
    }
    if let Some(dir) = &args.schema_dir {
        cfg.schema.schema_dir = Some(dir.clone());
    }
    if let Some(id) = &args.seed_schema {
        cfg.pipeline.seed_schema_id = id.clone();
    }
    if let Some(k) = args.max_concurrency {
        cfg.pipeline.max_concurrency = Some(k);
    }
    if let Some(n) = args.cache_capacity {
        cfg.schema.cache_capacity = n;
    }
    if args.resolve_local_refs {
        cfg.pipeline.resolve_local_refs = true;
    }
}
