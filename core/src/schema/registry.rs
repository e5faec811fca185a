#![deny(missing_docs)]

//! # Schema Registry
//!
//! Walks schema nodes starting from a given address, following sub-schemas
//! and references, and records one `SchemaEntry` per distinct address.
//!
//! - A node already registered is never read again, so reference cycles end.
//! - Documents named by references but not yet known are fetched through the
//!   `DocumentLoader`, all missing documents of one round concurrently.
//! - `$id` and `$anchor` keywords are indexed when a document is registered,
//!   so references may target them before the walk reaches them.

use super::dialect::{document_marker, DialectTable, SchemaDialect};
use super::loader::DocumentLoader;
use super::reader::read_node;
use super::{SchemaArena, SchemaContent, SchemaEntry};
use crate::address::{resolve_pointer, CanonicalAddress};
use crate::error::{AppError, AppResult};
use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use url::Url;

/// Keywords whose values are data, not schemas.
const DATA_KEYWORDS: [&str; 5] = ["const", "default", "enum", "example", "examples"];

/// Keywords whose values are maps keyed by user-chosen names.
const NAME_KEYED: [&str; 12] = [
    "properties",
    "patternProperties",
    "$defs",
    "definitions",
    "dependentSchemas",
    "dependencies",
    "schemas",
    "responses",
    "parameters",
    "headers",
    "requestBodies",
    "content",
];

/// Position of a map key while descending a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyPosition {
    /// The key is a keyword of the enclosing object.
    Keyword,
    /// The key is a name inside a name-keyed map.
    Name,
}

impl KeyPosition {
    /// Position of the keys one level below `key`, or `None` when the value
    /// under `key` is data.
    fn descend(self, key: &str) -> Option<KeyPosition> {
        match self {
            Self::Name => Some(Self::Keyword),
            Self::Keyword if DATA_KEYWORDS.contains(&key) => None,
            Self::Keyword if NAME_KEYED.contains(&key) => Some(Self::Name),
            Self::Keyword => Some(Self::Keyword),
        }
    }
}

struct RegisteredDocument {
    root: Arc<Value>,
    marker: Option<String>,
}

struct Pending {
    address: CanonicalAddress,
    inherited: Option<SchemaDialect>,
    antecedent: Option<CanonicalAddress>,
}

/// Accumulates schema entries across one or more `load` calls.
#[derive(Default)]
pub struct SchemaRegistry {
    dialects: DialectTable,
    loader: DocumentLoader,
    documents: HashMap<CanonicalAddress, RegisteredDocument>,
    ids: HashMap<String, CanonicalAddress>,
    anchors: HashMap<String, CanonicalAddress>,
    entries: IndexMap<CanonicalAddress, SchemaEntry>,
}

impl SchemaRegistry {
    /// A registry with the built-in dialect markers.
    pub fn new(loader: DocumentLoader) -> Self {
        Self {
            dialects: DialectTable::with_defaults(),
            loader,
            ..Default::default()
        }
    }

    /// Maps a `$schema` marker to a dialect. Later registrations win.
    pub fn register_dialect(&mut self, marker: &str, dialect: SchemaDialect) {
        if let Some(previous) = self.dialects.register(marker, dialect) {
            tracing::debug!(
                "Dialect marker {} re-registered: {:?} -> {:?}",
                marker,
                previous,
                dialect
            );
        }
    }

    /// The marker table.
    pub fn dialects(&self) -> &DialectTable {
        &self.dialects
    }

    /// Walks and registers every schema reachable from `retrieval`.
    ///
    /// - `given` is the location the document claims for itself; references
    ///   to it resolve into the retrieved document.
    /// - `antecedent` names the referring node, for error messages.
    /// - `document_root` is the parsed document containing `retrieval`.
    /// - `fallback_marker` applies when neither the node, an enclosing schema
    ///   nor the document declares a dialect.
    pub async fn load(
        &mut self,
        retrieval: &CanonicalAddress,
        given: &CanonicalAddress,
        antecedent: Option<&CanonicalAddress>,
        document_root: &Value,
        fallback_marker: Option<&str>,
    ) -> AppResult<()> {
        let document = retrieval.document();
        if !self.documents.contains_key(&document) {
            let marker = document_root
                .get("$schema")
                .and_then(Value::as_str)
                .map(str::to_string);
            self.register_document(document.clone(), Arc::new(document_root.clone()), marker);
        }
        if given.document() != document {
            self.ids
                .insert(given.document_url().to_string(), document.clone());
        }
        let fallback = fallback_marker
            .map(|marker| self.dialects.resolve(marker))
            .transpose()?;

        let mut queue = VecDeque::from([Pending {
            address: retrieval.clone(),
            inherited: None,
            antecedent: antecedent.cloned(),
        }]);
        loop {
            let mut deferred = Vec::new();
            while let Some(pending) = queue.pop_front() {
                if self.entries.contains_key(&pending.address) {
                    continue;
                }
                if !self.documents.contains_key(&pending.address.document()) {
                    deferred.push(pending);
                    continue;
                }
                self.register_node(pending, fallback, &mut queue)?;
            }
            if deferred.is_empty() {
                break;
            }
            self.fetch_missing(&deferred).await?;
            queue.extend(deferred);
        }
        Ok(())
    }

    /// `(stable id, content)` pairs in discovery order.
    pub fn entries(&self) -> Vec<(&str, &SchemaContent)> {
        self.entries
            .values()
            .map(|entry| (entry.stable_id(), &entry.content))
            .collect()
    }

    /// Entry registered for `address`.
    pub fn get(&self, address: &CanonicalAddress) -> Option<&SchemaEntry> {
        self.entries.get(address)
    }

    /// Number of registered schema nodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Freezes the registry.
    pub fn finish(self) -> SchemaArena {
        SchemaArena::new(self.entries)
    }

    fn register_node(
        &mut self,
        pending: Pending,
        fallback: Option<SchemaDialect>,
        queue: &mut VecDeque<Pending>,
    ) -> AppResult<()> {
        let address = pending.address;
        let document = address.document();
        let root = match self.documents.get(&document) {
            Some(registered) => Arc::clone(&registered.root),
            None => {
                return Err(AppError::Reference(format!(
                    "Unresolved reference '{}'",
                    address
                )))
            }
        };
        let segments = address.segments();
        let node = resolve_pointer(&root, &segments).ok_or_else(|| {
            let from = pending
                .antecedent
                .as_ref()
                .map(|a| format!(" (referenced from '{}')", a))
                .unwrap_or_default();
            AppError::Reference(format!("Unresolved reference '{}'{}", address, from))
        })?;

        let dialect = self.detect_dialect(&address, node, pending.inherited, fallback)?;
        let reading = read_node(dialect, &address, node)?;
        let base = scope_base(&root, &document, &segments, dialect);

        let mut content = reading.content;
        if let Some(reference) = &reading.reference {
            let target = self.resolve_reference(&base, reference, &address)?;
            let inherited = (target.document() == document).then_some(dialect);
            tracing::trace!("{} -> {}", address, target);
            content.reference = Some(target.clone());
            queue.push_back(Pending {
                address: target,
                inherited,
                antecedent: Some(address.clone()),
            });
        }
        for child in reading.children {
            queue.push_back(Pending {
                address: child,
                inherited: Some(dialect),
                antecedent: Some(address.clone()),
            });
        }

        let id = reading.declared_id.map(|_| base.to_string());
        self.entries.insert(
            address.clone(),
            SchemaEntry {
                address,
                id,
                dialect,
                content,
            },
        );
        Ok(())
    }

    fn detect_dialect(
        &self,
        address: &CanonicalAddress,
        node: &Value,
        inherited: Option<SchemaDialect>,
        fallback: Option<SchemaDialect>,
    ) -> AppResult<SchemaDialect> {
        if let Some(marker) = node.get("$schema").and_then(Value::as_str) {
            return self.dialects.resolve(marker);
        }
        if let Some(dialect) = inherited {
            return Ok(dialect);
        }
        let document_marker = self
            .documents
            .get(&address.document())
            .and_then(|d| d.marker.as_deref());
        if let Some(marker) = document_marker {
            return self.dialects.resolve(marker);
        }
        fallback.ok_or_else(|| {
            AppError::Dialect(format!(
                "No dialect marker for '{}' and no fallback configured",
                address
            ))
        })
    }

    fn resolve_reference(
        &self,
        base: &Url,
        reference: &str,
        from: &CanonicalAddress,
    ) -> AppResult<CanonicalAddress> {
        let url = base.join(reference).map_err(|e| {
            AppError::Address(format!(
                "Cannot resolve '{}' from '{}': {}",
                reference, from, e
            ))
        })?;
        let anchor = url
            .fragment()
            .filter(|f| !f.is_empty() && !f.starts_with('/'))
            .is_some();
        if anchor {
            return self.anchors.get(url.as_str()).cloned().ok_or_else(|| {
                AppError::Reference(format!(
                    "Unresolved anchor '{}' (referenced from '{}')",
                    url, from
                ))
            });
        }
        let mut document_url = url.clone();
        document_url.set_fragment(None);
        let target = CanonicalAddress::from_url(url)?;
        Ok(match self.ids.get(document_url.as_str()) {
            Some(node) => node.append(target.segments()),
            None => target,
        })
    }

    async fn fetch_missing(&mut self, deferred: &[Pending]) -> AppResult<()> {
        // One fetch per document; the first pending node names it in errors.
        let mut missing: Vec<(CanonicalAddress, &Pending)> = Vec::new();
        for pending in deferred {
            let document = pending.address.document();
            if !missing.iter().any(|(d, _)| *d == document) {
                missing.push((document, pending));
            }
        }
        tracing::debug!("Fetching {} referenced document(s)", missing.len());

        let loader = &self.loader;
        let fetched = try_join_all(missing.iter().map(|(document, pending)| async move {
            loader.load(document).await.map_err(|e| {
                AppError::Reference(format!(
                    "Unresolved reference '{}' (referenced from '{}'): {}",
                    pending.address,
                    pending.antecedent.as_ref().map(|a| a.as_str()).unwrap_or("-"),
                    e
                ))
            })
        }))
        .await?;

        for ((document, _), root) in missing.into_iter().zip(fetched) {
            let marker = document_marker(&root);
            self.register_document(document, root, marker);
        }
        Ok(())
    }

    fn register_document(
        &mut self,
        document: CanonicalAddress,
        root: Arc<Value>,
        marker: Option<String>,
    ) {
        let dialect = marker.as_deref().and_then(|m| self.dialects.lookup(m));
        let id_keyword = match dialect {
            Some(SchemaDialect::Draft04) => "id",
            _ => "$id",
        };
        let base = document.document_url();
        let mut index = Vec::new();
        collect_identifiers(&root, &document, base, id_keyword, KeyPosition::Keyword, &mut index);
        for (url, node) in index {
            let is_anchor = url.fragment().is_some_and(|f| !f.is_empty());
            let mut key = url;
            if is_anchor {
                self.anchors.insert(key.to_string(), node);
            } else {
                key.set_fragment(None);
                self.ids.insert(key.to_string(), node);
            }
        }
        tracing::debug!("Registered document {}", document);
        self.documents
            .insert(document, RegisteredDocument { root, marker });
    }
}

/// Collects `(absolute id or anchor URL, node address)` pairs below `node`.
///
/// `position` tells whether the keys of `node` are keywords or names; only
/// keyword maps may declare identifiers.
fn collect_identifiers(
    node: &Value,
    address: &CanonicalAddress,
    base: Url,
    id_keyword: &str,
    position: KeyPosition,
    out: &mut Vec<(Url, CanonicalAddress)>,
) {
    match node {
        Value::Object(map) => {
            let mut base = base;
            if position == KeyPosition::Keyword {
                if let Some(id) = map.get(id_keyword).and_then(Value::as_str) {
                    if let Ok(url) = base.join(id) {
                        out.push((url.clone(), address.clone()));
                        base = url;
                        base.set_fragment(None);
                    }
                }
                if let Some(anchor) = map.get("$anchor").and_then(Value::as_str) {
                    let mut url = base.clone();
                    url.set_fragment(Some(anchor));
                    out.push((url, address.clone()));
                }
            }
            for (key, value) in map {
                if !(value.is_object() || value.is_array()) {
                    continue;
                }
                let Some(below) = position.descend(key) else {
                    continue;
                };
                collect_identifiers(
                    value,
                    &address.append([key]),
                    base.clone(),
                    id_keyword,
                    below,
                    out,
                );
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_identifiers(
                    item,
                    &address.append([index.to_string()]),
                    base.clone(),
                    id_keyword,
                    KeyPosition::Keyword,
                    out,
                );
            }
        }
        _ => {}
    }
}

/// Base URL in effect at `segments`: the innermost enclosing identifier, else the document.
fn scope_base(
    root: &Value,
    document: &CanonicalAddress,
    segments: &[String],
    dialect: SchemaDialect,
) -> Url {
    let mut base = document.document_url();
    let Some(keyword) = dialect.id_keyword() else {
        return base;
    };
    let apply = |node: &Value, base: &mut Url| {
        if let Some(id) = node.get(keyword).and_then(Value::as_str) {
            if let Ok(mut url) = base.join(id) {
                if url.fragment().is_some_and(|f| f.is_empty()) {
                    url.set_fragment(None);
                }
                if url.fragment().is_none() {
                    *base = url;
                }
            }
        }
    };

    apply(root, &mut base);
    let mut node = root;
    let mut position = KeyPosition::Keyword;
    for key in segments {
        let Some(child) = resolve_pointer(node, std::slice::from_ref(key)) else {
            break;
        };
        // Within arrays every element sits in keyword position.
        let below = if node.is_array() {
            Some(KeyPosition::Keyword)
        } else {
            position.descend(key)
        };
        let Some(below) = below else { break };
        node = child;
        position = below;
        if position == KeyPosition::Keyword {
            apply(node, &mut base);
        }
    }
    base
}
