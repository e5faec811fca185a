//! # Schema Dialects
//!
//! The set of dialects is closed; which marker selects which dialect is an
//! open table. Registering a marker twice replaces the earlier entry.

use crate::error::{AppError, AppResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// `$schema` marker of JSON Schema draft-04.
pub const DRAFT_04_MARKER: &str = "http://json-schema.org/draft-04/schema#";
/// `$schema` marker of JSON Schema 2020-12.
pub const DRAFT_2020_12_MARKER: &str = "https://json-schema.org/draft/2020-12/schema";
/// Schema dialect of OpenAPI 3.0 documents.
pub const OPENAPI_30_MARKER: &str = "https://spec.openapis.org/oas/3.0/schema/2021-09-28";
/// Default schema dialect of OpenAPI 3.1 documents.
pub const OPENAPI_31_MARKER: &str = "https://spec.openapis.org/oas/3.1/dialect/base";
/// Schema dialect of Swagger 2.0 documents.
pub const SWAGGER_2_MARKER: &str = "http://swagger.io/v2/schema.json#";

/// Supported schema dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaDialect {
    /// JSON Schema draft-04.
    Draft04,
    /// JSON Schema 2020-12.
    Draft202012,
    /// OpenAPI 3.0 / 3.1 schema objects.
    OpenApi3,
    /// Swagger 2.0 schema objects.
    Swagger2,
}

impl SchemaDialect {
    /// Keyword declaring a node identifier, if the dialect has one.
    pub fn id_keyword(self) -> Option<&'static str> {
        match self {
            Self::Draft04 => Some("id"),
            Self::Draft202012 | Self::OpenApi3 => Some("$id"),
            Self::Swagger2 => None,
        }
    }

    /// True when keywords next to `$ref` are ignored.
    pub fn ref_siblings_ignored(self) -> bool {
        matches!(self, Self::Draft04 | Self::Swagger2)
    }

    /// True when `true` / `false` are valid schemas.
    pub fn allows_boolean_schemas(self) -> bool {
        matches!(self, Self::Draft202012 | Self::OpenApi3)
    }

    /// True when the dialect has applicators beyond `allOf` (`anyOf`, `not`, ...).
    pub fn has_full_applicators(self) -> bool {
        !matches!(self, Self::Swagger2)
    }

    /// True when the dialect knows `$anchor`, `const`, `prefixItems` and friends.
    pub fn is_modern(self) -> bool {
        matches!(self, Self::Draft202012 | Self::OpenApi3)
    }
}

/// Marker -> dialect lookup.
#[derive(Debug, Clone, Default)]
pub struct DialectTable {
    markers: HashMap<String, SchemaDialect>,
}

impl DialectTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table knowing the built-in markers.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register(DRAFT_04_MARKER, SchemaDialect::Draft04);
        table.register(DRAFT_2020_12_MARKER, SchemaDialect::Draft202012);
        table.register(OPENAPI_30_MARKER, SchemaDialect::OpenApi3);
        table.register(OPENAPI_31_MARKER, SchemaDialect::OpenApi3);
        table.register(SWAGGER_2_MARKER, SchemaDialect::Swagger2);
        table
    }

    /// Registers a marker. Returns the dialect it previously selected.
    pub fn register(&mut self, marker: &str, dialect: SchemaDialect) -> Option<SchemaDialect> {
        self.markers.insert(normalize_marker(marker), dialect)
    }

    /// Dialect selected by a marker.
    pub fn lookup(&self, marker: &str) -> Option<SchemaDialect> {
        self.markers.get(&normalize_marker(marker)).copied()
    }

    /// Like `lookup`, failing with a dialect error for unknown markers.
    pub fn resolve(&self, marker: &str) -> AppResult<SchemaDialect> {
        self.lookup(marker)
            .ok_or_else(|| AppError::Dialect(format!("Unknown dialect marker '{}'", marker)))
    }
}

/// Dialect marker implied by the structure of a whole document.
///
/// A root `$schema` wins; otherwise `swagger: 2.x` and `openapi: 3.x` select
/// their schema dialects (3.1 honours `jsonSchemaDialect`).
pub fn document_marker(root: &Value) -> Option<String> {
    if let Some(marker) = root.get("$schema").and_then(Value::as_str) {
        return Some(marker.to_string());
    }
    if let Some(version) = root.get("swagger").and_then(Value::as_str) {
        if version.starts_with("2.") {
            return Some(SWAGGER_2_MARKER.to_string());
        }
    }
    if let Some(version) = root.get("openapi").and_then(Value::as_str) {
        if version.starts_with("3.0") {
            return Some(OPENAPI_30_MARKER.to_string());
        }
        if version.starts_with("3.") {
            let marker = root
                .get("jsonSchemaDialect")
                .and_then(Value::as_str)
                .unwrap_or(OPENAPI_31_MARKER);
            return Some(marker.to_string());
        }
    }
    None
}

/// Markers match with or without an empty trailing `#`.
fn normalize_marker(marker: &str) -> String {
    marker.trim().trim_end_matches('#').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_resolve() {
        let table = DialectTable::with_defaults();
        assert_eq!(table.lookup(DRAFT_04_MARKER), Some(SchemaDialect::Draft04));
        assert_eq!(
            table.lookup("http://json-schema.org/draft-04/schema"),
            Some(SchemaDialect::Draft04)
        );
        assert_eq!(table.lookup(OPENAPI_31_MARKER), Some(SchemaDialect::OpenApi3));
        assert!(table.lookup("urn:unknown").is_none());
    }

    #[test]
    fn test_later_registration_wins() {
        let mut table = DialectTable::with_defaults();
        let previous = table.register(DRAFT_2020_12_MARKER, SchemaDialect::OpenApi3);
        assert_eq!(previous, Some(SchemaDialect::Draft202012));
        assert_eq!(table.lookup(DRAFT_2020_12_MARKER), Some(SchemaDialect::OpenApi3));
    }

    #[test]
    fn test_unknown_marker_is_dialect_error() {
        let err = DialectTable::new().resolve("urn:x").unwrap_err();
        assert!(matches!(err, AppError::Dialect(_)));
    }

    #[test]
    fn test_document_marker_sniffing() {
        assert_eq!(
            document_marker(&json!({ "swagger": "2.0" })).as_deref(),
            Some(SWAGGER_2_MARKER)
        );
        assert_eq!(
            document_marker(&json!({ "openapi": "3.0.3" })).as_deref(),
            Some(OPENAPI_30_MARKER)
        );
        assert_eq!(
            document_marker(&json!({ "openapi": "3.1.0", "jsonSchemaDialect": DRAFT_2020_12_MARKER }))
                .as_deref(),
            Some(DRAFT_2020_12_MARKER)
        );
        assert_eq!(
            document_marker(&json!({ "$schema": DRAFT_04_MARKER, "openapi": "3.1.0" })).as_deref(),
            Some(DRAFT_04_MARKER)
        );
        assert!(document_marker(&json!({ "type": "object" })).is_none());
    }
}
