//! Schema sources.
//!
//! A source turns a content id into raw schema bytes. Sources do not parse or
//! cache; `SchemaCache` does both.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::determinism::cid::is_valid_cid;
use crate::errors::SchemaError;

#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, SchemaError>;
}

/// Reads `{dir}/{id}.json`.
#[derive(Debug, Clone)]
pub struct DirectorySchemaSource {
    dir: PathBuf,
}

impl DirectorySchemaSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SchemaSource for DirectorySchemaSource {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, SchemaError> {
        if !is_valid_cid(id) {
            return Err(SchemaError::fetch(id, "schema id is not a valid CID"));
        }
        let path = self.dir.join(format!("{id}.json"));
        debug!(schema = id, path = %path.display(), "reading schema from directory");
        tokio::fs::read(&path)
            .await
            .map_err(|e| SchemaError::fetch(id, format!("{}: {e}", path.display())))
    }
}

/// In-memory source keyed by id.
#[derive(Debug, Clone, Default)]
pub struct MemorySchemaSource {
    schemas: HashMap<String, Vec<u8>>,
}

impl MemorySchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> &mut Self {
        self.schemas.insert(id.into(), bytes.into());
        self
    }

    pub fn with_json(mut self, id: impl Into<String>, schema: &serde_json::Value) -> Self {
        self.schemas.insert(id.into(), schema.to_string().into_bytes());
        self
    }
}

#[async_trait]
impl SchemaSource for MemorySchemaSource {
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, SchemaError> {
        self.schemas
            .get(id)
            .cloned()
            .ok_or_else(|| SchemaError::fetch(id, "schema not found"))
    }
}

#[cfg(feature = "gateway")]
pub use gateway::GatewaySchemaSource;

#[cfg(feature = "gateway")]
mod gateway {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use tracing::{debug, warn};

    use super::SchemaSource;
    use crate::config::SchemaConfig;
    use crate::determinism::cid::is_valid_cid;
    use crate::errors::SchemaError;

    /// Fetches `{gateway}/ipfs/{id}` over HTTP.
    ///
    /// Rate limiting (429) and server errors (5xx) are retried up to
    /// `max_retries` times; attempt `n` sleeps `n * retry_backoff_ms` first.
    #[derive(Debug, Clone)]
    pub struct GatewaySchemaSource {
        client: reqwest::Client,
        base_url: String,
        max_retries: u32,
        backoff: Duration,
    }

    impl GatewaySchemaSource {
        pub fn new(cfg: &SchemaConfig) -> Result<Self, SchemaError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_millis(cfg.request_timeout_ms))
                .build()
                .map_err(|e| SchemaError::fetch("*", format!("failed to build http client: {e}")))?;
            Ok(Self {
                client,
                base_url: cfg.gateway_url.trim_end_matches('/').to_string(),
                max_retries: cfg.max_retries,
                backoff: Duration::from_millis(cfg.retry_backoff_ms),
            })
        }

        fn url_for(&self, id: &str) -> String {
            format!("{}/ipfs/{id}", self.base_url)
        }
    }

    fn retryable(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    #[async_trait]
    impl SchemaSource for GatewaySchemaSource {
        async fn fetch(&self, id: &str) -> Result<Vec<u8>, SchemaError> {
            if !is_valid_cid(id) {
                return Err(SchemaError::fetch(id, "schema id is not a valid CID"));
            }
            let url = self.url_for(id);

            let mut attempt: u32 = 0;
            loop {
                if attempt > 0 {
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                debug!(schema = id, %url, attempt, "fetching schema");

                let last_error = match self.client.get(&url).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        let bytes = resp
                            .bytes()
                            .await
                            .map_err(|e| SchemaError::fetch(id, format!("failed to read body: {e}")))?;
                        return Ok(bytes.to_vec());
                    }
                    Ok(resp) if retryable(resp.status()) => format!("HTTP {}", resp.status()),
                    Ok(resp) => return Err(SchemaError::fetch(id, format!("HTTP {}", resp.status()))),
                    Err(e) if e.is_timeout() || e.is_connect() => e.to_string(),
                    Err(e) => return Err(SchemaError::fetch(id, e.to_string())),
                };

                if attempt >= self.max_retries {
                    return Err(SchemaError::fetch(
                        id,
                        format!("{last_error} after {} attempt(s)", attempt + 1),
                    ));
                }
                warn!(schema = id, error = %last_error, attempt, "schema fetch failed, retrying");
                attempt += 1;
            }
        }
    }

}
