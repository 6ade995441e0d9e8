//! Single-entry pipeline.

use tracing::debug;

use super::parse::{extension_of, parse_json_bytes, read_file_limited};
use super::PipelineServices;
use crate::determinism::canonical_json::canonicalize;
use crate::determinism::cid::calculate_cid_from_canonical_json;
use crate::errors::{FileError, LinkResolutionError};
use crate::model::{BinaryAsset, DerivedDocument, DerivedKind, FileEntry, HashedFile};

/// Per-file knobs taken from `EngineConfig`.
#[derive(Debug, Clone, Copy)]
pub struct FileSettings {
    pub resolve_local_refs: bool,
    pub max_file_bytes: u64,
}

/// A file that made it through every stage.
#[derive(Debug, Clone)]
pub struct FileSuccess {
    pub entry: FileEntry,
    /// The entry's own document.
    pub hashed: HashedFile,
    /// JSON documents reached through links.
    pub derived: Vec<HashedFile>,
    /// Images and other non-JSON payloads.
    pub assets: Vec<BinaryAsset>,
    /// References left unresolved; the file still succeeded.
    pub link_errors: Vec<LinkResolutionError>,
}

#[derive(Debug, Clone)]
pub struct FileFailure {
    pub entry: FileEntry,
    pub error: FileError,
}

pub type FileResult = Result<FileSuccess, FileFailure>;

/// Run one entry through schema fetch, validation, resolution and hashing.
///
/// `property_cid` is the CID recorded on the outputs. `None` means the entry
/// is a seed whose property CID is its own calculated CID.
pub async fn process_entry(
    services: &PipelineServices,
    entry: FileEntry,
    property_cid: Option<String>,
    settings: FileSettings,
) -> FileResult {
    match run_stages(services, &entry, property_cid, settings).await {
        Ok((hashed, derived, assets, link_errors)) => Ok(FileSuccess {
            entry,
            hashed,
            derived,
            assets,
            link_errors,
        }),
        Err(error) => Err(FileFailure { entry, error }),
    }
}

type StageOutput = (HashedFile, Vec<HashedFile>, Vec<BinaryAsset>, Vec<LinkResolutionError>);

async fn run_stages(
    services: &PipelineServices,
    entry: &FileEntry,
    property_cid: Option<String>,
    settings: FileSettings,
) -> Result<StageOutput, FileError> {
    let path = entry.file_path.as_path();

    let schema = services
        .schemas
        .get_data_group_schema(&entry.data_group_id)
        .await?;

    let bytes = read_file_limited(path, settings.max_file_bytes)
        .await
        .map_err(|reason| FileError::Read {
            path: path.to_path_buf(),
            reason,
        })?;
    let doc = parse_json_bytes(&bytes, settings.max_file_bytes).map_err(|reason| FileError::Parse {
        path: path.to_path_buf(),
        reason,
    })?;

    let report = services
        .validator
        .validate(&doc, &schema, path, settings.resolve_local_refs)
        .await?;
    if !report.valid {
        return Err(FileError::Validation(report.errors));
    }

    let resolved = services.resolver.resolve(doc, Some(schema.as_ref()), path).await;

    let canonical = canonicalize(&resolved.value);
    let calculated_cid = calculate_cid_from_canonical_json(&canonical, &resolved.value)
        .map_err(|e| FileError::Internal(e.to_string()))?;
    let property_cid = property_cid.unwrap_or_else(|| calculated_cid.clone());
    debug!(
        path = %path.display(),
        cid = %calculated_cid,
        property = %property_cid,
        derived = resolved.derived.len(),
        "file hashed"
    );

    let hashed = HashedFile {
        original_path: path.to_path_buf(),
        property_cid: property_cid.clone(),
        data_group_cid: entry.data_group_id.clone(),
        calculated_cid,
        canonical_json: into_text(canonical),
    };

    let mut derived = Vec::new();
    let mut assets = Vec::new();
    for doc in resolved.derived.into_iter().chain(resolved.assets) {
        match doc.kind {
            DerivedKind::Json => derived.push(HashedFile {
                original_path: doc.path,
                property_cid: property_cid.clone(),
                data_group_cid: entry.data_group_id.clone(),
                calculated_cid: doc.cid,
                canonical_json: into_text(doc.bytes),
            }),
            DerivedKind::Text | DerivedKind::Binary => assets.push(to_asset(doc, &property_cid)),
        }
    }

    Ok((hashed, derived, assets, resolved.link_errors))
}

fn to_asset(doc: DerivedDocument, property_cid: &str) -> BinaryAsset {
    let extension = extension_of(&doc.path).unwrap_or_else(|| match doc.kind {
        DerivedKind::Text => "txt".to_string(),
        _ => "bin".to_string(),
    });
    BinaryAsset {
        original_path: doc.path,
        property_cid: property_cid.to_string(),
        cid: doc.cid,
        extension,
        bytes: doc.bytes,
    }
}

/// Canonical JSON is always UTF-8.
fn into_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
