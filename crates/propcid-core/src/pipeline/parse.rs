//! Input reading and parsing helpers.
//!
//! All readers take explicit byte limits; nothing here consults the
//! environment.
//!
//! Errors are plain strings so each caller can wrap them in its own error
//! type (`FileError` for entries, `LinkError` for linked files).

use std::path::{Path, PathBuf};

use serde_json::Value;

/// Read a file, refusing anything larger than `max_bytes`.
pub async fn read_file_limited(path: &Path, max_bytes: u64) -> Result<Vec<u8>, String> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| e.to_string())?;
    if !meta.is_file() {
        return Err("not a regular file".to_string());
    }
    if meta.len() > max_bytes {
        return Err(format!(
            "file too large ({} bytes > limit {})",
            meta.len(),
            max_bytes
        ));
    }
    tokio::fs::read(path).await.map_err(|e| e.to_string())
}

/// Parse JSON bytes into `serde_json::Value` with a hard size limit.
pub fn parse_json_bytes(bytes: &[u8], max_bytes: u64) -> Result<Value, String> {
    if bytes.len() as u64 > max_bytes {
        return Err(format!(
            "JSON payload too large ({} bytes > limit {})",
            bytes.len(),
            max_bytes
        ));
    }
    serde_json::from_slice(bytes).map_err(|e| format!("invalid JSON: {e}"))
}

/// Resolve `target` against the directory holding `source_path`.
pub fn resolve_relative(source_path: &Path, target: &str) -> PathBuf {
    let base = source_path.parent().unwrap_or_else(|| Path::new(""));
    path_clean::clean(base.join(target))
}

/// Lowercase extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}
