#![deny(missing_docs)]

//! # Schema Registry Module
//!
//! - **dialect**: marker table and the closed set of supported schema dialects.
//! - **reader**: reads one node of a given dialect into dialect-neutral content.
//! - **registry**: walks documents and references, one entry per address.
//! - **loader**: fetches referenced documents, one in-flight fetch per address.
//!
//! The finished registry is frozen into a `SchemaArena`, which model records
//! point into by address.

/// Dialect markers.
pub mod dialect;
/// Document fetching.
pub mod loader;
/// Per-dialect node reading.
pub mod reader;
/// The schema registry.
pub mod registry;

use crate::address::CanonicalAddress;
use crate::config::NamingOptions;
use crate::error::AppResult;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};

pub use dialect::{DialectTable, SchemaDialect};
pub use loader::{DocumentFetcher, DocumentLoader, FileFetcher, MemoryFetcher, NoFetcher};
pub use registry::SchemaRegistry;

/// `$schema` of the document handed to an intermediate schema consumer.
pub const INTERMEDIATE_SCHEMA_ID: &str =
    "https://schema.JsonSchema42.org/jns42-intermediate/schema.json";

/// Dialect-neutral value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaType {
    /// Accepts nothing (`false` schema).
    Never,
    /// Accepts anything (`true` schema).
    Any,
    /// JSON `null`.
    Null,
    /// JSON boolean.
    Boolean,
    /// Whole number.
    Integer,
    /// Any number.
    Number,
    /// JSON string.
    String,
    /// JSON array.
    Array,
    /// JSON object.
    Map,
}

/// Dialect-neutral structural content of one schema node.
///
/// Sub-schemas are never inlined; they are referenced by address and have
/// their own entry in the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaContent {
    /// Allowed value types; empty means unconstrained.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<SchemaType>,
    /// Target of `$ref`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<CanonicalAddress>,

    /// `allOf` members.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all_of: Vec<CanonicalAddress>,
    /// `anyOf` members.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub any_of: Vec<CanonicalAddress>,
    /// `oneOf` members.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<CanonicalAddress>,
    /// `not`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not: Option<CanonicalAddress>,
    /// `if`.
    #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_schema: Option<CanonicalAddress>,
    /// `then`.
    #[serde(rename = "then", skip_serializing_if = "Option::is_none")]
    pub then_schema: Option<CanonicalAddress>,
    /// `else`.
    #[serde(rename = "else", skip_serializing_if = "Option::is_none")]
    pub else_schema: Option<CanonicalAddress>,
    /// `dependentSchemas` (or schema-valued draft-04 `dependencies`).
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub dependent_schemas: IndexMap<String, CanonicalAddress>,

    /// Positional item schemas.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tuple_items: Vec<CanonicalAddress>,
    /// Schema for every (remaining) item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_items: Option<CanonicalAddress>,
    /// `contains`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contains: Option<CanonicalAddress>,

    /// Named property schemas.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub object_properties: IndexMap<String, CanonicalAddress>,
    /// Schema of properties not named in `object_properties`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map_properties: Option<CanonicalAddress>,
    /// `patternProperties`.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub pattern_properties: IndexMap<String, CanonicalAddress>,
    /// `propertyNames`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_names: Option<CanonicalAddress>,
    /// `additionalProperties: false` yields `Some(false)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
    /// Required property names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_properties: Vec<String>,

    /// Allowed values (`enum`, `const`).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<Value>,

    /// Inclusive lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_inclusive: Option<f64>,
    /// Exclusive lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_exclusive: Option<f64>,
    /// Inclusive upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_inclusive: Option<f64>,
    /// Exclusive upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_exclusive: Option<f64>,
    /// `multipleOf`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,

    /// `minLength`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_length: Option<u64>,
    /// `maxLength`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_length: Option<u64>,
    /// `pattern`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_pattern: Option<String>,
    /// `format`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_format: Option<String>,

    /// `minItems`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_items: Option<u64>,
    /// `maxItems`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_items: Option<u64>,
    /// `uniqueItems`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<bool>,
    /// `minProperties`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_properties: Option<u64>,
    /// `maxProperties`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_properties: Option<u64>,

    /// `title`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// `description`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `default`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// `examples` / `example`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<Value>,
    /// `deprecated`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    /// `readOnly`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
    /// `writeOnly`.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub write_only: bool,
}

/// One registered schema node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaEntry {
    /// Where the node lives.
    pub address: CanonicalAddress,
    /// Absolute `$id` (or draft-04 `id`) when the node declares one.
    pub id: Option<String>,
    /// Dialect the node was read with.
    pub dialect: SchemaDialect,
    /// Dialect-neutral content.
    pub content: SchemaContent,
}

impl SchemaEntry {
    /// Identifier used for cross-document reference: the declared id, else the address.
    pub fn stable_id(&self) -> &str {
        self.id.as_deref().unwrap_or_else(|| self.address.as_str())
    }
}

/// Opaque downstream collaborator that turns schema entries into named types.
pub trait IntermediateSchemaConsumer {
    /// Whatever the consumer produces (names, type arenas, ...).
    type Output;

    /// Consumes `(stable id, content)` pairs under the given naming policy.
    fn consume(
        &self,
        entries: Vec<(&str, &SchemaContent)>,
        options: &NamingOptions,
    ) -> AppResult<Self::Output>;
}

/// Immutable set of schema entries produced by `SchemaRegistry::finish`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SchemaArena {
    entries: IndexMap<CanonicalAddress, SchemaEntry>,
}

impl SchemaArena {
    pub(crate) fn new(entries: IndexMap<CanonicalAddress, SchemaEntry>) -> Self {
        Self { entries }
    }

    /// Entry at `address`.
    pub fn get(&self, address: &CanonicalAddress) -> Option<&SchemaEntry> {
        self.entries.get(address)
    }

    /// True when `address` has an entry.
    pub fn contains(&self, address: &CanonicalAddress) -> bool {
        self.entries.contains_key(address)
    }

    /// Stable identifier of the entry at `address`.
    pub fn stable_id(&self, address: &CanonicalAddress) -> Option<&str> {
        self.get(address).map(SchemaEntry::stable_id)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no schema was registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &SchemaEntry> {
        self.entries.values()
    }

    /// `(stable id, content)` pairs in discovery order.
    pub fn entries(&self) -> Vec<(&str, &SchemaContent)> {
        self.iter()
            .map(|entry| (entry.stable_id(), &entry.content))
            .collect()
    }

    /// The intermediate schema document (`{"$schema", "schemas"}`) as JSON.
    pub fn intermediate_document(&self) -> Value {
        let schemas: serde_json::Map<String, Value> = self
            .iter()
            .map(|entry| {
                (
                    entry.stable_id().to_string(),
                    serde_json::to_value(&entry.content).unwrap_or(Value::Null),
                )
            })
            .collect();
        json!({ "$schema": INTERMEDIATE_SCHEMA_ID, "schemas": schemas })
    }

    /// Hands the entries to a consumer.
    pub fn consume_with<C: IntermediateSchemaConsumer>(
        &self,
        consumer: &C,
        options: &NamingOptions,
    ) -> AppResult<C::Output> {
        consumer.consume(self.entries(), options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(location: &str, id: Option<&str>) -> SchemaEntry {
        SchemaEntry {
            address: CanonicalAddress::parse(location).unwrap(),
            id: id.map(str::to_string),
            dialect: SchemaDialect::Draft202012,
            content: SchemaContent {
                types: vec![SchemaType::String],
                ..Default::default()
            },
        }
    }

    struct CountingConsumer;

    impl IntermediateSchemaConsumer for CountingConsumer {
        type Output = Vec<(String, String)>;

        fn consume(
            &self,
            entries: Vec<(&str, &SchemaContent)>,
            options: &NamingOptions,
        ) -> AppResult<Self::Output> {
            Ok(entries
                .into_iter()
                .map(|(id, _)| (id.to_string(), options.default_type_name.clone()))
                .collect())
        }
    }

    #[test]
    fn test_stable_id_prefers_declared_id() {
        let with_id = entry("https://example.com/a.json#/x", Some("https://example.com/x.json"));
        let without = entry("https://example.com/a.json#/y", None);
        assert_eq!(with_id.stable_id(), "https://example.com/x.json");
        assert_eq!(without.stable_id(), "https://example.com/a.json#/y");
    }

    #[test]
    fn test_intermediate_document_shape() {
        let e = entry("https://example.com/a.json#/y", None);
        let mut map = IndexMap::new();
        map.insert(e.address.clone(), e);
        let arena = SchemaArena::new(map);
        let doc = arena.intermediate_document();
        assert_eq!(doc["$schema"], INTERMEDIATE_SCHEMA_ID);
        assert_eq!(
            doc["schemas"]["https://example.com/a.json#/y"]["types"],
            json!(["string"])
        );
    }

    #[test]
    fn test_consume_with_passes_entries_and_options() {
        let e = entry("https://example.com/a.json#/y", None);
        let mut map = IndexMap::new();
        map.insert(e.address.clone(), e);
        let arena = SchemaArena::new(map);
        let out = arena
            .consume_with(&CountingConsumer, &NamingOptions::default())
            .unwrap();
        assert_eq!(
            out,
            vec![(
                "https://example.com/a.json#/y".to_string(),
                "schema-document".to_string()
            )]
        );
    }
}
