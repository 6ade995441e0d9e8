//! Input discovery.
//!
//! ```text
//! <input>/
//!   <property dir>/          CID name => resolved, anything else => pending
//!     <dataGroupCid>.json    entry
//!     photo.jpg              not an entry (reached through links)
//! ```

use std::path::{Path, PathBuf};

use propcid_core::determinism::is_valid_cid;
use propcid_core::model::{FileEntry, PropertyRef};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("input is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("failed to walk input: {0}")]
    Walk(#[from] walkdir::Error),
}

/// All entries under `root`, sorted by path.
pub fn scan_input(root: &Path) -> Result<Vec<FileEntry>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut entries = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter();

    for item in walker {
        let item = item?;
        if !item.file_type().is_file() {
            continue;
        }
        let path = item.path();
        let Some(data_group_id) = data_group_of(path) else {
            debug!(path = %path.display(), "not an entry");
            continue;
        };
        let Some(dir) = path.parent() else {
            continue;
        };
        entries.push(FileEntry::new(property_of(dir), data_group_id, path));
    }

    if entries.is_empty() {
        warn!(input = %root.display(), "no entries found");
    }
    entries.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    Ok(entries)
}

/// `<cid>.json` => `cid`.
fn data_group_of(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !ext.eq_ignore_ascii_case("json") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    is_valid_cid(stem).then(|| stem.to_string())
}

fn property_of(dir: &Path) -> PropertyRef {
    match dir.file_name().and_then(|n| n.to_str()) {
        Some(name) if is_valid_cid(name) => PropertyRef::Resolved(name.to_string()),
        _ => PropertyRef::pending(dir),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;
    use propcid_core::config::DEFAULT_SEED_SCHEMA_ID;

    use super::*;

    const GROUP: &str = "bafkreibm6jg3ux5qumhcn2b3flc3tyu6dmlb4xa7u5bf44yegnrjhc4yeq";

    fn touch(root: &Path, rel: &str) {
        let p = root.join(rel);
        fs::create_dir_all(p.parent().expect("parent")).expect("mkdir");
        fs::write(p, "{}").expect("write");
    }

    #[test]
    fn pending_and_resolved_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(root, &format!("prop-a/{DEFAULT_SEED_SCHEMA_ID}.json"));
        touch(root, &format!("prop-a/{GROUP}.json"));
        touch(root, "prop-a/photo.jpg");
        touch(root, "prop-a/owner.json");
        touch(root, &format!("{GROUP}/{GROUP}.json"));

        let entries = scan_input(root).expect("scan");
        assert_eq!(entries.len(), 3);

        let resolved: Vec<_> = entries.iter().filter(|e| !e.property.is_pending()).collect();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].property.resolved_cid(), Some(GROUP));

        let pending: Vec<_> = entries.iter().filter(|e| e.property.is_pending()).collect();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|e| e.directory() == root.join("prop-a")));
        assert!(pending.iter().any(|e| e.data_group_id == DEFAULT_SEED_SCHEMA_ID));
    }

    #[test]
    fn entries_are_sorted_by_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(root, &format!("b/{GROUP}.json"));
        touch(root, &format!("a/{GROUP}.json"));
        let entries = scan_input(root).expect("scan");
        let paths: Vec<_> = entries.iter().map(|e| e.file_path.clone()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn top_level_and_nested_files_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(root, &format!("{GROUP}.json"));
        touch(root, &format!("prop/deeper/{GROUP}.json"));
        assert!(scan_input(root).expect("scan").is_empty());
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = scan_input(&dir.path().join("nope")).expect_err("missing input");
        assert_matches!(err, ScanError::NotADirectory(_));
    }
}
