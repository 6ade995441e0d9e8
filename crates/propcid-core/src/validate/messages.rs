//! User-facing rendering of schema violations.

use std::path::Path;

use jsonschema::error::ValidationErrorKind;
use jsonschema::ValidationError;
use serde_json::Value;

use crate::errors::ValidationIssue;

/// Convert validator errors into report rows.
///
/// `display_path` is the JSON pointer prefixed with the name of the directory
/// holding `source_path`, e.g. `prop-a/address/postal_code`.
pub fn get_error_messages<'a>(
    errors: impl IntoIterator<Item = ValidationError<'a>>,
    source_path: &Path,
) -> Vec<ValidationIssue> {
    errors
        .into_iter()
        .map(|e| issue_from_error(&e, source_path))
        .collect()
}

pub fn issue_from_error(error: &ValidationError<'_>, source_path: &Path) -> ValidationIssue {
    let pointer = error.instance_path.to_string();
    let (path, message, value) = match &error.kind {
        ValidationErrorKind::Required { property } => {
            let name = property.as_str().map(str::to_string).unwrap_or_else(|| property.to_string());
            (
                format!("{pointer}/{}", escape_token(&name)),
                format!("missing required property `{name}`"),
                String::new(),
            )
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => (
            pointer,
            format!("unexpected propert{} {}", plural_y(unexpected.len()), unexpected.join(", ")),
            render_value(&error.instance),
        ),
        ValidationErrorKind::Format { format } => (
            pointer,
            format!("value does not match format `{format}`"),
            render_value(&error.instance),
        ),
        _ => (pointer, error.to_string(), render_value(&error.instance)),
    };
    issue(path, message, value, source_path)
}

/// Build an issue, deriving `display_path` from `source_path`.
pub fn issue(path: String, message: String, value: String, source_path: &Path) -> ValidationIssue {
    let display_path = display_path(&path, source_path);
    ValidationIssue {
        path,
        message,
        value,
        display_path,
    }
}

/// Re-anchor an issue found in a linked document under `pointer` of the
/// referencing document.
pub fn nest_issue(nested: ValidationIssue, pointer: &str, source_path: &Path) -> ValidationIssue {
    issue(
        format!("{pointer}{}", nested.path),
        nested.message,
        nested.value,
        source_path,
    )
}

pub fn display_path(pointer: &str, source_path: &Path) -> String {
    let dir = source_path
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{dir}{pointer}")
}

/// Render a JSON value for the "current value" column.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn plural_y(n: usize) -> &'static str {
    if n == 1 {
        "y"
    } else {
        "ies"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn errors_for(schema: &Value, doc: &Value) -> Vec<ValidationIssue> {
        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(schema)
            .unwrap();
        get_error_messages(validator.iter_errors(doc), Path::new("/in/prop-a/doc.json"))
    }

    #[test]
    fn required_property_points_at_missing_key() {
        let schema = json!({"type": "object", "required": ["label"]});
        let issues = errors_for(&schema, &json!({}));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "/label");
        assert_eq!(issues[0].display_path, "prop-a/label");
        assert!(issues[0].message.contains("label"));
        assert_eq!(issues[0].value, "");
    }

    #[test]
    fn type_error_carries_current_value() {
        let schema = json!({"type": "object", "properties": {"year": {"type": "integer"}}});
        let issues = errors_for(&schema, &json!({"year": "1999"}));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "/year");
        assert_eq!(issues[0].value, "1999");
    }

    #[test]
    fn every_violation_is_reported() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}, "b": {"type": "string"}},
            "additionalProperties": false
        });
        let issues = errors_for(&schema, &json!({"a": 1, "b": 2, "c": 3}));
        assert_eq!(issues.len(), 3);
    }

    #[test]
    fn nested_issue_is_reanchored() {
        let inner = issue("/name".into(), "bad".into(), "x".into(), Path::new("/in/prop-a/sub/l.json"));
        let outer = nest_issue(inner, "/relationships/0", Path::new("/in/prop-a/doc.json"));
        assert_eq!(outer.path, "/relationships/0/name");
        assert_eq!(outer.display_path, "prop-a/relationships/0/name");
    }

    #[test]
    fn root_pointer_renders_directory_only() {
        assert_eq!(display_path("", Path::new("/in/prop-a/doc.json")), "prop-a");
    }
}
