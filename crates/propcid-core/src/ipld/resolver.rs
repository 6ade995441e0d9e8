//! Filesystem-backed `LinkResolver`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{LinkResolver, ResolvedDocument};
use crate::config::ResolverConfig;
use crate::determinism::canonical_json::canonicalize;
use crate::determinism::cid::{
    calculate_cid_from_canonical_json, calculate_cid_v1, calculate_cid_v1_for_raw_data, is_valid_cid,
    link_target, to_ipfs_uri,
};
use crate::errors::{LinkError, LinkResolutionError, PropcidResult};
use crate::model::{DerivedDocument, DerivedKind};
use crate::pipeline::parse::{extension_of, read_file_limited, resolve_relative};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Field name that is always treated as an `ipfs_uri`.
const IPFS_URL_FIELD: &str = "ipfs_url";

#[derive(Debug, Clone)]
pub struct IpldResolver {
    image_extensions: Vec<String>,
    max_depth: usize,
    max_file_bytes: u64,
}

impl IpldResolver {
    pub fn new(cfg: &ResolverConfig, max_file_bytes: u64) -> Self {
        Self {
            image_extensions: cfg
                .image_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_depth: cfg.max_depth,
            max_file_bytes,
        }
    }

    fn is_image(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.image_extensions.contains(&ext))
    }
}

#[async_trait]
impl LinkResolver for IpldResolver {
    async fn resolve(&self, doc: Value, schema: Option<&Value>, source_path: &Path) -> ResolvedDocument {
        let mut walk = Walk::new(self);
        let chain = vec![path_clean::clean(source_path)];
        let value = walk
            .walk(doc, schema, None, String::new(), source_path, &chain)
            .await;
        ResolvedDocument {
            value,
            derived: walk.derived,
            assets: walk.assets,
            link_errors: walk.errors,
        }
    }
}

/// State of one resolution. Discovered files and errors are collected here
/// and handed back with the document.
struct Walk<'r> {
    resolver: &'r IpldResolver,
    derived: Vec<DerivedDocument>,
    assets: Vec<DerivedDocument>,
    errors: Vec<LinkResolutionError>,
}

impl<'r> Walk<'r> {
    fn new(resolver: &'r IpldResolver) -> Self {
        Self {
            resolver,
            derived: Vec::new(),
            assets: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// `schema == None` means schema-less: every child is visited.
    /// With a schema, children without a subschema are left untouched.
    fn walk<'a>(
        &'a mut self,
        value: Value,
        schema: Option<&'a Value>,
        field: Option<&'a str>,
        pointer: String,
        source: &'a Path,
        chain: &'a [PathBuf],
    ) -> BoxFuture<'a, Value> {
        Box::pin(async move {
            if let Value::String(s) = &value {
                let is_uri = field == Some(IPFS_URL_FIELD) || format_of(schema) == Some("ipfs_uri");
                if is_uri {
                    if let Some(rewritten) = self.resolve_ipfs_uri(s, &pointer, source).await {
                        return Value::String(rewritten);
                    }
                }
                return value;
            }

            if let Some(target) = link_target(&value).map(str::to_string) {
                return match self.resolve_link(&target, &pointer, source, chain).await {
                    Some(cid) => json!({ "/": cid }),
                    None => value,
                };
            }

            match value {
                Value::Array(items) => {
                    let item_schema = match schema {
                        None => None,
                        Some(s) => match s.get("items") {
                            Some(sub) if sub.is_object() => Some(sub),
                            _ => return Value::Array(items),
                        },
                    };
                    let mut out = Vec::with_capacity(items.len());
                    for (i, item) in items.into_iter().enumerate() {
                        let p = format!("{pointer}/{i}");
                        out.push(self.walk(item, item_schema, None, p, source, chain).await);
                    }
                    Value::Array(out)
                }
                Value::Object(map) => {
                    let props = schema.and_then(|s| s.get("properties"));
                    let mut out = Map::new();
                    for (key, child) in map {
                        let p = format!("{pointer}/{}", escape_token(&key));
                        let next = match (schema, props.and_then(|ps| ps.get(&key))) {
                            (None, _) => self.walk(child, None, Some(&key), p, source, chain).await,
                            (Some(_), Some(sub)) => {
                                self.walk(child, Some(sub), Some(&key), p, source, chain).await
                            }
                            (Some(_), None) if key == IPFS_URL_FIELD && child.is_string() => {
                                self.walk(child, None, Some(&key), p, source, chain).await
                            }
                            (Some(_), None) => child,
                        };
                        out.insert(key, next);
                    }
                    Value::Object(out)
                }
                other => other,
            }
        })
    }

    /// Rewrite one `ipfs_uri` value. `None` leaves it unchanged.
    async fn resolve_ipfs_uri(&mut self, s: &str, pointer: &str, source: &Path) -> Option<String> {
        if s.starts_with("ipfs://") {
            return None;
        }
        if is_valid_cid(s) {
            return Some(to_ipfs_uri(s));
        }

        let path = resolve_relative(source, s);
        if !self.resolver.is_image(&path) {
            self.fail(pointer, LinkError::UnsupportedTarget { path });
            return None;
        }

        let bytes = match read_file_limited(&path, self.resolver.max_file_bytes).await {
            Ok(b) => b,
            Err(reason) => {
                self.fail(pointer, LinkError::Read { path, reason });
                return None;
            }
        };

        let cid = match calculate_cid_v1_for_raw_data(&bytes) {
            Ok(cid) => cid,
            Err(e) => {
                self.fail(
                    pointer,
                    LinkError::Hash {
                        path,
                        reason: e.to_string(),
                    },
                );
                return None;
            }
        };
        debug!(path = %path.display(), %cid, "image hashed");
        let asset = DerivedDocument {
            path,
            cid: cid.clone(),
            kind: DerivedKind::Binary,
            bytes,
            value: None,
        };
        record_once(&mut self.assets, asset);
        Some(to_ipfs_uri(&cid))
    }

    /// Resolve one link target. Returns the CID to link to, or `None` to leave
    /// the link unchanged.
    async fn resolve_link(
        &mut self,
        target: &str,
        pointer: &str,
        source: &Path,
        chain: &[PathBuf],
    ) -> Option<String> {
        if is_valid_cid(target) {
            return None;
        }

        let path = resolve_relative(source, target);
        if chain.contains(&path) {
            self.fail(pointer, LinkError::Cycle { path });
            return None;
        }
        if chain.len() > self.resolver.max_depth {
            let max_depth = self.resolver.max_depth;
            self.fail(pointer, LinkError::TooDeep { path, max_depth });
            return None;
        }

        let bytes = match read_file_limited(&path, self.resolver.max_file_bytes).await {
            Ok(b) => b,
            Err(reason) => {
                self.fail(pointer, LinkError::Read { path, reason });
                return None;
            }
        };

        let built = if self.resolver.is_image(&path) {
            binary(path.clone(), bytes)
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(parsed) => {
                    let mut next_chain = chain.to_vec();
                    next_chain.push(path.clone());
                    let resolved = self
                        .walk(parsed, None, None, pointer.to_string(), &path, &next_chain)
                        .await;
                    let canonical = canonicalize(&resolved);
                    calculate_cid_from_canonical_json(&canonical, &resolved).map(|cid| DerivedDocument {
                        path: path.clone(),
                        cid,
                        kind: DerivedKind::Json,
                        bytes: canonical,
                        value: Some(resolved),
                    })
                }
                Err(e) if extension_of(&path).as_deref() == Some("json") => {
                    self.fail(
                        pointer,
                        LinkError::Parse {
                            path,
                            reason: e.to_string(),
                        },
                    );
                    return None;
                }
                Err(_) => match String::from_utf8(bytes) {
                    Ok(text) => calculate_cid_v1(text.as_bytes()).map(|cid| DerivedDocument {
                        path: path.clone(),
                        cid,
                        kind: DerivedKind::Text,
                        bytes: text.into_bytes(),
                        value: None,
                    }),
                    Err(e) => binary(path.clone(), e.into_bytes()),
                },
            }
        };
        let doc = match built {
            Ok(doc) => doc,
            Err(e) => {
                self.fail(
                    pointer,
                    LinkError::Hash {
                        path,
                        reason: e.to_string(),
                    },
                );
                return None;
            }
        };

        debug!(path = %doc.path.display(), cid = %doc.cid, kind = ?doc.kind, "link resolved");
        let cid = doc.cid.clone();
        record_once(&mut self.derived, doc);
        Some(cid)
    }

    fn fail(&mut self, pointer: &str, error: LinkError) {
        warn!(pointer, error = %error, "link left unresolved");
        self.errors.push(LinkResolutionError {
            pointer: pointer.to_string(),
            error,
        });
    }
}

fn binary(path: PathBuf, bytes: Vec<u8>) -> PropcidResult<DerivedDocument> {
    Ok(DerivedDocument {
        path,
        cid: calculate_cid_v1_for_raw_data(&bytes)?,
        kind: DerivedKind::Binary,
        bytes,
        value: None,
    })
}

fn record_once(list: &mut Vec<DerivedDocument>, doc: DerivedDocument) {
    if !list.iter().any(|d| d.path == doc.path && d.cid == doc.cid) {
        list.push(doc);
    }
}

fn format_of(schema: Option<&Value>) -> Option<&str> {
    schema?.get("format")?.as_str()
}

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
