//! LRU schema cache.
//!
//! The cache is shared by every pipeline task. Concurrent misses for the same
//! id are collapsed: the first caller fetches while the others wait on a
//! per-id gate and then read the populated entry.
//!
//! Shape verdicts are cached with the schema, so every file that references a
//! malformed data-group schema fails with the same `SchemaError::Shape`.
//! Fetch failures are not cached; the next caller tries again.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use super::{check_data_group_shape, SchemaProvider, SchemaSource};
use crate::config::SchemaConfig;
use crate::errors::SchemaError;

#[derive(Debug, Clone)]
struct CachedSchema {
    value: Arc<Value>,
    shape: Result<(), SchemaError>,
}

pub struct SchemaCache {
    source: Arc<dyn SchemaSource>,
    entries: Mutex<LruCache<String, CachedSchema>>,
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    docs_url: String,
    max_bytes: u64,
    fetches: AtomicUsize,
}

impl SchemaCache {
    pub fn new(source: Arc<dyn SchemaSource>, cfg: &SchemaConfig, max_bytes: u64) -> Self {
        let capacity = NonZeroUsize::new(cfg.cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            entries: Mutex::new(LruCache::new(capacity)),
            inflight: Mutex::new(HashMap::new()),
            docs_url: cfg.shape_docs_url.clone(),
            max_bytes,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Number of source fetches performed so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, id: &str) -> Option<CachedSchema> {
        self.entries.lock().get(id).cloned()
    }

    async fn load(&self, id: &str) -> Result<CachedSchema, SchemaError> {
        if let Some(hit) = self.lookup(id) {
            return Ok(hit);
        }

        let gate = self
            .inflight
            .lock()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // Another task may have populated the entry while we waited.
        if let Some(hit) = self.lookup(id) {
            return Ok(hit);
        }

        let result = self.fetch_and_check(id).await;
        if let Ok(entry) = &result {
            self.entries.lock().put(id.to_string(), entry.clone());
        }
        self.release_gate(id, &gate);
        result
    }

    /// Drop the gate for `id` only if it is still the one this caller waited
    /// on. A failed fetch lets a newer caller install a fresh gate before a
    /// stale waiter gets here.
    fn release_gate(&self, id: &str, gate: &Arc<tokio::sync::Mutex<()>>) {
        let mut inflight = self.inflight.lock();
        if inflight.get(id).is_some_and(|current| Arc::ptr_eq(current, gate)) {
            inflight.remove(id);
        }
    }

    async fn fetch_and_check(&self, id: &str) -> Result<CachedSchema, SchemaError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let bytes = self.source.fetch(id).await?;

        if bytes.len() as u64 > self.max_bytes {
            return Err(SchemaError::fetch(
                id,
                format!("schema too large ({} bytes > limit {})", bytes.len(), self.max_bytes),
            ));
        }

        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| SchemaError::fetch(id, format!("schema is not valid JSON: {e}")))?;
        if !value.is_object() {
            return Err(SchemaError::fetch(id, "schema is not a JSON object"));
        }

        let shape = check_data_group_shape(&value).map_err(|reason| SchemaError::Shape {
            id: id.to_string(),
            reason,
            docs_url: self.docs_url.clone(),
        });
        debug!(schema = id, data_group = shape.is_ok(), "schema cached");

        Ok(CachedSchema {
            value: Arc::new(value),
            shape,
        })
    }
}

#[async_trait]
impl SchemaProvider for SchemaCache {
    async fn get_schema(&self, id: &str) -> Result<Arc<Value>, SchemaError> {
        Ok(self.load(id).await?.value)
    }

    async fn get_data_group_schema(&self, id: &str) -> Result<Arc<Value>, SchemaError> {
        let entry = self.load(id).await?;
        if let Err(e) = entry.shape {
            warn!(schema = id, "rejecting schema with invalid data group shape");
            return Err(e);
        }
        Ok(entry.value)
    }
}
