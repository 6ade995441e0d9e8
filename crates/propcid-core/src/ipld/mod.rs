//! IPLD link resolution.
//!
//! A document is walked together with its schema and every local file
//! reference is replaced by a content identifier:
//! - `ipfs_uri` strings (by schema format, or a field named `ipfs_url`):
//!   `ipfs://` values stay, bare CIDs gain the `ipfs://` prefix, local image
//!   paths are hashed as raw bytes
//! - link objects `{"/": target}`: CID targets stay, local files are loaded,
//!   resolved recursively without a schema, canonicalized and hashed
//! - arrays follow `items`, objects follow `properties`; properties without a
//!   subschema are left alone
//!
//! Failures are per reference. The reference keeps its original value and the
//! error is returned next to the document.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::LinkResolutionError;
use crate::model::DerivedDocument;

pub mod resolver;

pub use resolver::IpldResolver;

/// Output of resolving one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedDocument {
    /// The rewritten document.
    pub value: Value,
    /// Files reached through link objects, each recorded once per `(path, cid)`.
    pub derived: Vec<DerivedDocument>,
    /// Images reached through `ipfs_uri` values.
    pub assets: Vec<DerivedDocument>,
    pub link_errors: Vec<LinkResolutionError>,
}

#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Resolve `doc`, whose local references are relative to the directory of
    /// `source_path`.
    async fn resolve(&self, doc: Value, schema: Option<&Value>, source_path: &Path) -> ResolvedDocument;
}
