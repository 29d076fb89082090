//! Schema document parsing

use std::fs;
use std::path::Path;

use crate::error::SchemaError;
use crate::link::link;
use crate::schema::Schema;
use crate::types::SchemaSpec;

pub fn parse_schema_file<P: AsRef<Path>>(path: P) -> Result<SchemaSpec, SchemaError> {
    let display = path.as_ref().display().to_string();
    let content = fs::read_to_string(&path).map_err(|e| SchemaError::Parse {
        path: display.clone(),
        source: e.to_string(),
    })?;

    parse_schema_content(&content).map_err(|e| match e {
        SchemaError::Parse { source, .. } => SchemaError::Parse {
            path: display,
            source,
        },
        other => other,
    })
}

pub fn parse_schema_content(content: &str) -> Result<SchemaSpec, SchemaError> {
    serde_json::from_str(content).map_err(|e| SchemaError::Parse {
        path: "<inline>".to_string(),
        source: e.to_string(),
    })
}

/// Parse and link a schema file in one step.
pub fn load_schema<P: AsRef<Path>>(path: P) -> Result<Schema, SchemaError> {
    link(&parse_schema_file(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StreamKind, TypeExpr};

    #[test]
    fn test_parse_type_expressions() {
        let spec = parse_schema_content(
            r#"{
                "name": "svc",
                "types": [
                    { "name": "Tags", "type": { "array": "string" } },
                    { "name": "Scores", "type": { "map": ["int32", "float64"] } },
                    { "name": "Shape", "type": { "union": [
                        { "name": "circle", "type": "float64" },
                        { "name": "label", "type": "string" }
                    ] } }
                ]
            }"#,
        )
        .expect("should parse");

        assert!(matches!(spec.types[0].type_, TypeExpr::Array(_)));
        assert!(matches!(spec.types[1].type_, TypeExpr::Map(_)));
        assert!(matches!(spec.types[2].type_, TypeExpr::Union(_)));
    }

    #[test]
    fn test_method_defaults() {
        let spec = parse_schema_content(
            r#"{ "name": "svc", "services": [{ "name": "s", "methods": [{ "name": "ping" }] }] }"#,
        )
        .expect("should parse");
        let method = &spec.services[0].methods[0];
        assert_eq!(method.stream, StreamKind::None);
        assert!(method.payload.is_none());
        assert!(method.errors.is_empty());
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = parse_schema_content("{ not json").unwrap_err();
        assert!(matches!(err, SchemaError::Parse { .. }));
    }
}
