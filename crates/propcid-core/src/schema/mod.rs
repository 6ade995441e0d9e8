//! Content-addressed JSON Schemas.
//!
//! - `source`: where schema bytes come from (gateway, directory, memory)
//! - `cache`: bounded LRU in front of a source, with single-flight misses
//! - `check_data_group_shape`: the data-group invariant
//!
//! A data-group schema describes an object with exactly two properties,
//! `label` and `relationships`. Anything else is rejected before use.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SchemaError;

pub mod cache;
pub mod source;

pub use cache::SchemaCache;
pub use source::{DirectorySchemaSource, MemorySchemaSource, SchemaSource};

#[cfg(feature = "gateway")]
pub use source::GatewaySchemaSource;

/// Schema lookup as seen by the pipeline.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Any schema by content id (class schemas referenced via `cid`).
    async fn get_schema(&self, id: &str) -> Result<Arc<Value>, SchemaError>;

    /// A data-group schema; fails with `SchemaError::Shape` if the shape is wrong.
    async fn get_data_group_schema(&self, id: &str) -> Result<Arc<Value>, SchemaError>;
}

/// Check the data-group shape. Returns a human readable reason on violation.
pub fn check_data_group_shape(schema: &Value) -> Result<(), String> {
    let obj = schema
        .as_object()
        .ok_or_else(|| "schema is not a JSON object".to_string())?;

    match obj.get("type").and_then(Value::as_str) {
        Some("object") => {}
        Some(other) => return Err(format!("schema type is `{other}`, expected `object`")),
        None => return Err("schema has no `type: object`".to_string()),
    }

    let props = obj
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| "schema has no `properties` object".to_string())?;

    let mut keys: Vec<&str> = props.keys().map(String::as_str).collect();
    keys.sort_unstable();
    if keys != ["label", "relationships"] {
        return Err(format!(
            "schema properties are [{}], expected [label, relationships]",
            keys.join(", ")
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_label_and_relationships() {
        let s = json!({
            "type": "object",
            "properties": {"label": {"type": "string"}, "relationships": {"type": "object"}},
            "required": ["label", "relationships"]
        });
        check_data_group_shape(&s).unwrap();
    }

    #[test]
    fn rejects_extra_or_missing_properties() {
        let extra = json!({"type": "object", "properties": {"label": {}, "relationships": {}, "name": {}}});
        assert!(check_data_group_shape(&extra).unwrap_err().contains("name"));

        let missing = json!({"type": "object", "properties": {"label": {}}});
        assert!(check_data_group_shape(&missing).is_err());
    }

    #[test]
    fn rejects_non_object_type() {
        let s = json!({"type": "array", "properties": {"label": {}, "relationships": {}}});
        assert!(check_data_group_shape(&s).unwrap_err().contains("array"));
        assert!(check_data_group_shape(&json!([1])).is_err());
    }
}
