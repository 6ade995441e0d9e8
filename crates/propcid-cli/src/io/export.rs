use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use propcid_core::model::{BinaryAsset, HashedFile};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

pub const RESULT_HEADER: [&str; 5] = ["propertyCid", "dataGroupCid", "dataCid", "filePath", "uploadedAt"];

/// Write `<propertyCid>/<calculatedCid>.json` for every hashed document and
/// `<propertyCid>/<cid>.<ext>` for every asset. Returns the number of
/// archive entries.
pub fn write_zip(path: &Path, hashed: &[HashedFile], assets: &[BinaryAsset]) -> Result<usize> {
    ensure_parent(path)?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut zip = ZipWriter::new(file);
    // Fixed timestamps keep the archive byte-stable across runs.
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut written = BTreeSet::new();
    for doc in hashed {
        let name = format!("{}/{}.json", doc.property_cid, doc.calculated_cid);
        if written.insert(name.clone()) {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(doc.canonical_json.as_bytes())?;
        }
    }
    for asset in assets {
        let name = format!("{}/{}.{}", asset.property_cid, asset.cid, asset.extension);
        if written.insert(name.clone()) {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(&asset.bytes)?;
        }
    }

    zip.finish().with_context(|| format!("finishing {}", path.display()))?;
    Ok(written.len())
}

/// One row per hashed document.
pub fn write_result_csv(path: &Path, hashed: &[HashedFile], uploaded_at: &str) -> Result<()> {
    ensure_parent(path)?;
    let mut w = csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    w.write_record(RESULT_HEADER)?;
    for doc in hashed {
        let file_path = doc.original_path.display().to_string();
        w.write_record([
            doc.property_cid.as_str(),
            doc.data_group_cid.as_str(),
            doc.calculated_cid.as_str(),
            file_path.as_str(),
            uploaded_at,
        ])?;
    }
    w.flush()?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))
        }
        _ => Ok(()),
    }
}
