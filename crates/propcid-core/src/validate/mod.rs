//! JSON Schema validation.
//!
//! Schemas are compiled with `jsonschema` after two adjustments:
//! - property formats (`ipfs_uri`, `cid`, `currency`, `rate_percent`, `date`)
//!   are registered and enforced
//! - nodes carrying the `cid` keyword are rewritten to the IPLD link shape
//!   `{"/": string}`
//!
//! With `resolve_local_refs = false` local file paths are opaque strings. With
//! `resolve_local_refs = true` an `ipfs_uri` path must name an existing file,
//! and a link under a `cid` node is loaded and validated against the class
//! schema it names. Errors found in the linked document are reported under the
//! link's pointer.

use std::future::Future;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::determinism::cid::{is_valid_cid, link_target};
use crate::errors::{FileError, ValidationIssue};
use crate::pipeline::parse::{parse_json_bytes, read_file_limited, resolve_relative};
use crate::schema::SchemaProvider;

pub mod formats;
pub mod messages;

pub use messages::get_error_messages;

/// Outcome of validating one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn from_issues(errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

#[async_trait]
pub trait JsonValidator: Send + Sync {
    async fn validate(
        &self,
        doc: &Value,
        schema: &Value,
        source_path: &Path,
        resolve_local_refs: bool,
    ) -> Result<ValidationResult, FileError>;
}

/// Keywords whose values are data, not subschemas.
const DATA_KEYWORDS: [&str; 4] = ["const", "enum", "default", "examples"];

/// The schema every `cid` node is replaced with.
pub fn link_shape() -> Value {
    json!({
        "type": "object",
        "properties": {"/": {"type": "string"}},
        "required": ["/"],
        "additionalProperties": false
    })
}

/// Replace every `{"cid": "<id>"}` node with `link_shape()`.
pub fn rewrite_cid_keywords(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            if map.get("cid").is_some_and(Value::is_string) {
                return link_shape();
            }
            let out: Map<String, Value> = map
                .iter()
                .map(|(k, v)| {
                    let v = if DATA_KEYWORDS.contains(&k.as_str()) {
                        v.clone()
                    } else {
                        rewrite_cid_keywords(v)
                    };
                    (k.clone(), v)
                })
                .collect();
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(rewrite_cid_keywords).collect()),
        other => other.clone(),
    }
}

/// A link found under a `cid` schema node.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ClassLink {
    pointer: String,
    target: String,
    class_schema_id: String,
}

fn collect_class_links(doc: &Value, schema: &Value, pointer: &str, out: &mut Vec<ClassLink>) {
    let Some(node) = schema.as_object() else {
        return;
    };

    if let Some(class_schema_id) = node.get("cid").and_then(Value::as_str) {
        if let Some(target) = link_target(doc) {
            out.push(ClassLink {
                pointer: pointer.to_string(),
                target: target.to_string(),
                class_schema_id: class_schema_id.to_string(),
            });
        }
        return;
    }

    match doc {
        Value::Object(map) => {
            if let Some(props) = node.get("properties").and_then(Value::as_object) {
                for (key, sub) in props {
                    if let Some(child) = map.get(key) {
                        let p = format!("{pointer}/{}", key.replace('~', "~0").replace('/', "~1"));
                        collect_class_links(child, sub, &p, out);
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(sub) = node.get("items") {
                for (i, child) in items.iter().enumerate() {
                    collect_class_links(child, sub, &format!("{pointer}/{i}"), out);
                }
            }
        }
        _ => {}
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Compiled validators kept per validator instance.
const COMPILED_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

/// Schema text plus the base directory strict `ipfs_uri` checks resolve against.
type CompiledKey = (String, Option<PathBuf>);

/// `jsonschema`-backed validator.
///
/// Compiled validators are reused across files that share a schema. In strict
/// mode the `ipfs_uri` check is bound to the document's directory, so the
/// directory is part of the key.
pub struct SchemaValidator {
    schemas: Arc<dyn SchemaProvider>,
    max_depth: usize,
    max_file_bytes: u64,
    compiled: Mutex<LruCache<CompiledKey, Arc<jsonschema::Validator>>>,
    compiles: AtomicUsize,
}

impl SchemaValidator {
    pub fn new(schemas: Arc<dyn SchemaProvider>, max_depth: usize, max_file_bytes: u64) -> Self {
        Self {
            schemas,
            max_depth,
            max_file_bytes,
            compiled: Mutex::new(LruCache::new(COMPILED_CAPACITY)),
            compiles: AtomicUsize::new(0),
        }
    }

    /// Number of schema compilations performed so far.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::Relaxed)
    }

    fn compiled(
        &self,
        schema: &Value,
        source_path: &Path,
        resolve_local_refs: bool,
    ) -> Result<Arc<jsonschema::Validator>, FileError> {
        let text = serde_json::to_string(schema)
            .map_err(|e| FileError::Internal(format!("schema could not be serialized: {e}")))?;
        let key = (text, resolve_local_refs.then(|| base_dir(source_path)));
        if let Some(hit) = self.compiled.lock().get(&key) {
            return Ok(hit.clone());
        }

        let validator = Arc::new(Self::compile(schema, source_path, resolve_local_refs)?);
        self.compiles.fetch_add(1, Ordering::Relaxed);
        self.compiled.lock().put(key, validator.clone());
        Ok(validator)
    }

    fn compile(schema: &Value, source_path: &Path, resolve_local_refs: bool) -> Result<jsonschema::Validator, FileError> {
        let rewritten = rewrite_cid_keywords(schema);
        let mut opts = jsonschema::options()
            .should_validate_formats(true)
            .with_format("cid", formats::is_cid)
            .with_format("currency", formats::is_currency)
            .with_format("rate_percent", formats::is_rate_percent)
            .with_format("date", formats::is_date);

        opts = if resolve_local_refs {
            let base = base_dir(source_path);
            opts.with_format("ipfs_uri", move |s: &str| {
                formats::is_ipfs_uri(s) || is_valid_cid(s) || local_file_exists(&base, s)
            })
        } else {
            opts.with_format("ipfs_uri", formats::is_ipfs_uri_or_local)
        };

        opts.build(&rewritten)
            .map_err(|e| FileError::Internal(format!("schema could not be compiled: {e}")))
    }

    fn validate_at<'a>(
        &'a self,
        doc: &'a Value,
        schema: &'a Value,
        source_path: &'a Path,
        resolve_local_refs: bool,
        depth: usize,
    ) -> BoxFuture<'a, Result<Vec<ValidationIssue>, FileError>> {
        Box::pin(async move {
            let mut issues = {
                let validator = self.compiled(schema, source_path, resolve_local_refs)?;
                get_error_messages(validator.iter_errors(doc), source_path)
            };

            if !resolve_local_refs {
                return Ok(issues);
            }

            let mut links = Vec::new();
            collect_class_links(doc, schema, "", &mut links);

            for link in links {
                if is_valid_cid(&link.target) {
                    continue;
                }
                let target_ptr = format!("{}/~1", link.pointer);
                if depth >= self.max_depth {
                    issues.push(messages::issue(
                        target_ptr,
                        format!("link nesting exceeds max depth {}", self.max_depth),
                        link.target,
                        source_path,
                    ));
                    continue;
                }

                let path = resolve_relative(source_path, &link.target);
                let linked = match self.load(&path).await {
                    Ok(v) => v,
                    Err(reason) => {
                        issues.push(messages::issue(
                            target_ptr,
                            format!("linked file could not be loaded: {reason}"),
                            link.target,
                            source_path,
                        ));
                        continue;
                    }
                };

                debug!(
                    path = %path.display(),
                    class = %link.class_schema_id,
                    "validating linked document"
                );
                let class_schema = self.schemas.get_schema(&link.class_schema_id).await?;
                let nested = self
                    .validate_at(&linked, &class_schema, &path, true, depth + 1)
                    .await?;
                issues.extend(
                    nested
                        .into_iter()
                        .map(|i| messages::nest_issue(i, &link.pointer, source_path)),
                );
            }

            Ok(issues)
        })
    }

    async fn load(&self, path: &Path) -> Result<Value, String> {
        let bytes = read_file_limited(path, self.max_file_bytes).await?;
        parse_json_bytes(&bytes, self.max_file_bytes)
    }
}

#[async_trait]
impl JsonValidator for SchemaValidator {
    async fn validate(
        &self,
        doc: &Value,
        schema: &Value,
        source_path: &Path,
        resolve_local_refs: bool,
    ) -> Result<ValidationResult, FileError> {
        let issues = self
            .validate_at(doc, schema, source_path, resolve_local_refs, 0)
            .await?;
        Ok(ValidationResult::from_issues(issues))
    }
}

fn base_dir(source_path: &Path) -> PathBuf {
    source_path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn local_file_exists(base: &Path, s: &str) -> bool {
    !s.contains("://") && path_clean::clean(base.join(s)).is_file()
}
