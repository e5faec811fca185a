#![deny(missing_docs)]

//! # Document Adapters
//!
//! One adapter per description format, chosen once by sniffing the
//! `swagger` / `openapi` version field. Each adapter can
//!
//! - list the schema nodes its format embeds (`select_schemas`), which seed
//!   the schema registry, and
//! - walk paths and operations into an `ApiModel` (`build_api_model`).
//!
//! `load_api_model` runs both steps for one parsed document.

/// OpenAPI 3.0 / 3.1.
pub mod openapi3;
/// Swagger 2.0.
pub mod swagger2;

use crate::address::{resolve_pointer, CanonicalAddress};
use crate::config::ModelOptions;
use crate::error::{AppError, AppResult};
use crate::model::ApiModel;
use crate::schema::dialect::document_marker;
use crate::schema::loader::{parse_document_str, DocumentLoader};
use crate::schema::{SchemaArena, SchemaRegistry};
use serde_json::Value;

pub use openapi3::OpenApi3Adapter;
pub use swagger2::Swagger2Adapter;

/// Decoded JSON-pointer keys from a document root.
pub type Pointer = Vec<String>;

/// A schema node and where it sits.
pub type Selected<'a> = (Pointer, &'a Value);

/// Boxed lazy sequence of schema positions.
pub type SchemaIter<'a> = Box<dyn Iterator<Item = Selected<'a>> + 'a>;

/// Supported description formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// `swagger: "2.0"`
    Swagger2,
    /// `openapi: "3.0.x"` or `"3.1.x"`
    OpenApi3,
}

impl DocumentFormat {
    /// Detects the format from the root version field.
    pub fn sniff(root: &Value) -> AppResult<Self> {
        if let Some(version) = root.get("swagger").and_then(Value::as_str) {
            if version == "2.0" {
                return Ok(Self::Swagger2);
            }
            return Err(AppError::Document(format!(
                "Unsupported swagger version '{}'",
                version
            )));
        }
        if let Some(version) = root.get("openapi").and_then(Value::as_str) {
            if version.starts_with("3.0") || version.starts_with("3.1") {
                return Ok(Self::OpenApi3);
            }
            return Err(AppError::Document(format!(
                "Unsupported openapi version '{}'",
                version
            )));
        }
        Err(AppError::Document(
            "Missing 'swagger' or 'openapi' version field".to_string(),
        ))
    }
}

/// Capabilities every format adapter provides.
pub trait DocumentAdapter: Send + Sync {
    /// Schema nodes embedded by the format, lazily, in document order.
    fn select_schemas(&self) -> SchemaIter<'_>;

    /// Walks paths and operations against the finished schema arena.
    fn build_api_model(&self, schemas: SchemaArena) -> AppResult<ApiModel>;
}

/// Picks the adapter for `root`.
pub fn adapter_for<'a>(
    address: &'a CanonicalAddress,
    root: &'a Value,
) -> AppResult<Box<dyn DocumentAdapter + 'a>> {
    let view = DocumentView::new(address, root)?;
    Ok(match DocumentFormat::sniff(root)? {
        DocumentFormat::Swagger2 => Box::new(Swagger2Adapter::new(view)),
        DocumentFormat::OpenApi3 => Box::new(OpenApi3Adapter::new(view)),
    })
}

/// Loads every schema of a parsed document and builds its model.
pub async fn load_api_model(
    address: &CanonicalAddress,
    root: &Value,
    loader: DocumentLoader,
    options: &ModelOptions,
) -> AppResult<ApiModel> {
    let address = address.document();
    let adapter = adapter_for(&address, root)?;
    let fallback = options
        .fallback_dialect
        .clone()
        .or_else(|| document_marker(root));

    let selected: Vec<Pointer> = adapter.select_schemas().map(|(pointer, _)| pointer).collect();
    tracing::debug!("{} schema position(s) selected in {}", selected.len(), address);

    let mut registry = SchemaRegistry::new(loader);
    for pointer in selected {
        let at = address.append(&pointer);
        registry
            .load(&at, &at, None, root, fallback.as_deref())
            .await?;
    }
    adapter.build_api_model(registry.finish())
}

/// Parses YAML or JSON text and runs `load_api_model`.
pub async fn load_api_model_from_str(
    location: &str,
    text: &str,
    loader: DocumentLoader,
    options: &ModelOptions,
) -> AppResult<ApiModel> {
    let address = CanonicalAddress::parse(location)?;
    let root = parse_document_str(&address, text)?;
    load_api_model(&address, &root, loader, options).await
}

/// Read-only view of one document with local reference handling.
#[derive(Debug, Clone, Copy)]
pub struct DocumentView<'a> {
    address: &'a CanonicalAddress,
    root: &'a Value,
}

impl<'a> DocumentView<'a> {
    /// Fails unless `root` is a map.
    pub fn new(address: &'a CanonicalAddress, root: &'a Value) -> AppResult<Self> {
        if !root.is_object() {
            return Err(AppError::Document(format!(
                "Document '{}' must be a map at the root",
                address
            )));
        }
        Ok(Self { address, root })
    }

    /// Document root address.
    pub fn address(self) -> &'a CanonicalAddress {
        self.address
    }

    /// Parsed root.
    pub fn root(self) -> &'a Value {
        self.root
    }

    /// Address of a node.
    pub fn at(self, pointer: &[String]) -> CanonicalAddress {
        self.address.append(pointer)
    }

    /// Node at a pointer.
    pub fn get<S: AsRef<str>>(self, pointer: &[S]) -> Option<&'a Value> {
        resolve_pointer(self.root, pointer)
    }

    /// Follows local `$ref` chains starting at `node`.
    ///
    /// References into other documents are unsupported here; dangling and
    /// cyclic chains are reference errors.
    pub fn deref(self, pointer: Pointer, node: &'a Value) -> AppResult<Selected<'a>> {
        let mut pointer = pointer;
        let mut node = node;
        let mut seen: Vec<Pointer> = Vec::new();
        while let Some(reference) = node.get("$ref") {
            let from = self.at(&pointer);
            let Some(reference) = reference.as_str() else {
                return Err(AppError::Document(format!("'$ref' at '{}' must be a string", from)));
            };
            if seen.contains(&pointer) {
                return Err(AppError::Reference(format!(
                    "Reference cycle through '{}'",
                    from
                )));
            }
            let target = self.local_target(reference, &from)?;
            node = self.get(&target).ok_or_else(|| {
                AppError::Reference(format!(
                    "Unresolved reference '{}' (referenced from '{}')",
                    self.at(&target),
                    from
                ))
            })?;
            seen.push(std::mem::replace(&mut pointer, target));
        }
        Ok((pointer, node))
    }

    fn local_target(self, reference: &str, from: &CanonicalAddress) -> AppResult<Pointer> {
        let url = from.join(reference)?;
        let mut document = url.clone();
        document.set_fragment(None);
        if document != self.address.document_url() {
            return Err(AppError::UnsupportedConstruct(format!(
                "Reference '{}' at '{}' points into another document",
                reference, from
            )));
        }
        Ok(CanonicalAddress::from_url(url)?.segments())
    }
}

/// `pointer` extended by one key.
pub fn child(pointer: &[String], key: &str) -> Pointer {
    let mut out = Vec::with_capacity(pointer.len() + 1);
    out.extend_from_slice(pointer);
    out.push(key.to_string());
    out
}

/// Members of a map node (nothing for other nodes).
pub fn members<'a>(pointer: Pointer, node: Option<&'a Value>) -> impl Iterator<Item = Selected<'a>> + 'a {
    node.and_then(Value::as_object)
        .into_iter()
        .flat_map(|map| map.iter())
        .map(move |(key, value)| (child(&pointer, key), value))
}

/// Elements of a list node (nothing for other nodes).
pub fn items<'a>(pointer: Pointer, node: Option<&'a Value>) -> impl Iterator<Item = Selected<'a>> + 'a {
    node.and_then(Value::as_array)
        .into_iter()
        .flat_map(|list| list.iter().enumerate())
        .map(move |(index, value)| (child(&pointer, &index.to_string()), value))
}

/// True for `x-*` extension keys.
pub fn is_extension(pointer: &[String]) -> bool {
    pointer.last().is_some_and(|key| key.starts_with("x-"))
}

/// Last pointer key.
pub fn key_of(pointer: &[String]) -> &str {
    pointer.last().map(String::as_str).unwrap_or("")
}

/// String member of a node.
pub fn str_field(node: &Value, key: &str) -> Option<String> {
    node.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Boolean member of a node, false when absent.
pub fn bool_field(node: &Value, key: &str) -> bool {
    node.get(key).and_then(Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Value {
        json!({
            "openapi": "3.0.3",
            "components": {
                "parameters": {
                    "A": { "$ref": "#/components/parameters/B" },
                    "B": { "name": "b", "in": "query" },
                    "Loop": { "$ref": "#/components/parameters/Loop" },
                    "Remote": { "$ref": "other.yaml#/components/parameters/X" },
                    "Gone": { "$ref": "#/components/parameters/Nope" }
                }
            }
        })
    }

    fn param(view: DocumentView<'_>, name: &str) -> AppResult<Pointer> {
        let pointer: Pointer = ["components", "parameters", name].iter().map(|s| s.to_string()).collect();
        let node = view.get(&pointer).unwrap();
        view.deref(pointer, node).map(|(p, _)| p)
    }

    #[test]
    fn test_sniff() {
        assert_eq!(DocumentFormat::sniff(&json!({ "swagger": "2.0" })).unwrap(), DocumentFormat::Swagger2);
        assert_eq!(DocumentFormat::sniff(&json!({ "openapi": "3.1.0" })).unwrap(), DocumentFormat::OpenApi3);
        assert!(DocumentFormat::sniff(&json!({ "openapi": "4.0.0" })).is_err());
        assert!(DocumentFormat::sniff(&json!({ "info": {} })).is_err());
    }

    #[test]
    fn test_deref_follows_chains() {
        let root = doc();
        let address = CanonicalAddress::parse("https://example.com/api.yaml").unwrap();
        let view = DocumentView::new(&address, &root).unwrap();
        assert_eq!(param(view, "A").unwrap(), vec!["components", "parameters", "B"]);
    }

    #[test]
    fn test_deref_failures() {
        let root = doc();
        let address = CanonicalAddress::parse("https://example.com/api.yaml").unwrap();
        let view = DocumentView::new(&address, &root).unwrap();
        assert!(matches!(param(view, "Loop").unwrap_err(), AppError::Reference(_)));
        assert!(matches!(param(view, "Remote").unwrap_err(), AppError::UnsupportedConstruct(_)));
        match param(view, "Gone").unwrap_err() {
            AppError::Reference(message) => assert!(message.contains("/components/parameters/Nope")),
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_same_document_absolute_reference_is_local() {
        let root = json!({
            "openapi": "3.0.0",
            "a": { "$ref": "https://example.com/api.yaml#/b" },
            "b": { "ok": true }
        });
        let address = CanonicalAddress::parse("https://example.com/api.yaml").unwrap();
        let view = DocumentView::new(&address, &root).unwrap();
        let (pointer, node) = view.deref(vec!["a".to_string()], &root["a"]).unwrap();
        assert_eq!(pointer, vec!["b"]);
        assert_eq!(node["ok"], true);
    }
}
