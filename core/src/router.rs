#![deny(missing_docs)]

//! # Route Table
//!
//! A prefix tree over path template tokens that matches concrete paths back to
//! route keys and builds paths from route keys.
//!
//! Templates are split into `/` tokens, literal runs and `{name}` placeholders.
//! At every node literal edges are tried before the placeholder edge, longer
//! literals first, so `/users/me` beats `/users/{id}` no matter which was
//! inserted first. Two templates with the same token shape resolve to the one
//! inserted first.
//!
//! The tree itself is the serialized form: `to_json` output can be embedded in
//! generated code and reloaded with `from_json` without recompiling.

use crate::error::{AppError, AppResult};
use indexmap::IndexMap;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Characters percent-encoded when a value is substituted into a path.
const PATH_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Placeholder values keyed by placeholder name, in template order.
pub type RouteParameters = IndexMap<String, String>;

/// One token of a path template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteToken {
    /// Literal text; either a single `/` or a run without `/`.
    Literal(String),
    /// A named placeholder.
    Parameter(String),
}

/// Result of a successful `match_path`.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch<'a, K> {
    /// Key of the matched route.
    pub key: &'a K,
    /// Decoded placeholder values.
    pub parameters: RouteParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Route<K> {
    key: K,
    template: Vec<RouteToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LiteralEdge {
    literal: String,
    node: RouteNode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct RouteNode {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    literals: Vec<LiteralEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parameter: Option<Box<RouteNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    route: Option<usize>,
}

/// Compiled bidirectional route matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTable<K = u32> {
    routes: Vec<Route<K>>,
    root: RouteNode,
}

impl<K> Default for RouteTable<K> {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            root: RouteNode::default(),
        }
    }
}

impl<K> RouteTable<K> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of inserted routes (shadowed ones included).
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True when nothing was inserted.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Inserts a template under `key`.
    ///
    /// A template whose token shape is already taken stays buildable but never
    /// matches; the earlier route keeps precedence.
    pub fn insert(&mut self, key: K, pattern: &str) -> AppResult<()> {
        let template = parse_template(pattern)?;
        let index = self.routes.len();

        let mut node = &mut self.root;
        for token in &template {
            node = match token {
                RouteToken::Literal(text) => node.literal_child(text),
                RouteToken::Parameter(_) => &mut **node.parameter.get_or_insert_with(Default::default),
            };
        }
        match node.route {
            Some(existing) => tracing::warn!(
                pattern,
                shadowed_by = %render_template(&self.routes[existing].template),
                "route pattern is shadowed by an earlier route with the same shape"
            ),
            None => node.route = Some(index),
        }

        self.routes.push(Route { key, template });
        Ok(())
    }

    /// Matches a concrete path.
    pub fn match_path(&self, path: &str) -> Option<RouteMatch<'_, K>> {
        let mut values = Vec::new();
        let index = match_node(&self.root, path, &mut values)?;
        let route = self.routes.get(index)?;
        let parameters = parameter_names(&route.template)
            .zip(values)
            .map(|(name, raw)| {
                (
                    name.to_string(),
                    percent_decode_str(raw).decode_utf8_lossy().into_owned(),
                )
            })
            .collect();
        Some(RouteMatch {
            key: &route.key,
            parameters,
        })
    }

    /// Iterates `(key, template)` pairs in insertion order.
    pub fn routes(&self) -> impl Iterator<Item = (&K, String)> {
        self.routes
            .iter()
            .map(|route| (&route.key, render_template(&route.template)))
    }
}

impl<K: PartialEq + std::fmt::Debug> RouteTable<K> {
    /// Builds a concrete path for `key`, encoding every placeholder value.
    pub fn build(&self, key: &K, parameters: &RouteParameters) -> AppResult<String> {
        let route = self
            .routes
            .iter()
            .find(|route| &route.key == key)
            .ok_or_else(|| AppError::Route(format!("No route registered for key {:?}", key)))?;

        let mut path = String::new();
        for token in &route.template {
            match token {
                RouteToken::Literal(text) => path.push_str(text),
                RouteToken::Parameter(name) => {
                    let value = parameters.get(name).ok_or_else(|| {
                        AppError::Route(format!(
                            "Missing value for placeholder '{}' of route {:?}",
                            name, key
                        ))
                    })?;
                    path.extend(utf8_percent_encode(value, PATH_VALUE));
                }
            }
        }
        Ok(path)
    }
}

impl<K: Serialize> RouteTable<K> {
    /// Portable JSON form of the compiled table.
    pub fn to_json(&self) -> AppResult<Value> {
        serde_json::to_value(self)
            .map_err(|e| AppError::Route(format!("Failed to serialize route table: {}", e)))
    }
}

impl<K: DeserializeOwned> RouteTable<K> {
    /// Reloads a table produced by `to_json`.
    pub fn from_json(value: Value) -> AppResult<Self> {
        let table: Self = serde_json::from_value(value)
            .map_err(|e| AppError::Route(format!("Failed to load route table: {}", e)))?;
        table.root.check_indices(table.routes.len())?;
        Ok(table)
    }
}

impl RouteNode {
    fn literal_child(&mut self, text: &str) -> &mut RouteNode {
        let position = match self.literals.iter().position(|e| e.literal == text) {
            Some(position) => position,
            None => {
                // Longer literals first; equal lengths keep insertion order.
                let position = self
                    .literals
                    .iter()
                    .position(|e| e.literal.len() < text.len())
                    .unwrap_or(self.literals.len());
                self.literals.insert(
                    position,
                    LiteralEdge {
                        literal: text.to_string(),
                        node: RouteNode::default(),
                    },
                );
                position
            }
        };
        &mut self.literals[position].node
    }

    fn check_indices(&self, len: usize) -> AppResult<()> {
        if let Some(index) = self.route {
            if index >= len {
                return Err(AppError::Route(format!(
                    "Route index {} out of range ({} routes)",
                    index, len
                )));
            }
        }
        for edge in &self.literals {
            edge.node.check_indices(len)?;
        }
        if let Some(child) = &self.parameter {
            child.check_indices(len)?;
        }
        Ok(())
    }

    fn only_slash_edges(&self) -> bool {
        self.parameter.is_none() && self.literals.iter().all(|e| e.literal.starts_with('/'))
    }
}

fn match_node<'p>(node: &RouteNode, path: &'p str, values: &mut Vec<&'p str>) -> Option<usize> {
    if path.is_empty() {
        if let Some(index) = node.route {
            return Some(index);
        }
    }

    for edge in &node.literals {
        if let Some(rest) = path.strip_prefix(edge.literal.as_str()) {
            if let Some(index) = match_node(&edge.node, rest, values) {
                return Some(index);
            }
        }
    }

    let child = node.parameter.as_deref()?;
    let limit = path.find('/').unwrap_or(path.len());
    if limit == 0 {
        return None;
    }
    // A placeholder followed only by `/` edges (or the end) must take the whole segment.
    let start = if child.only_slash_edges() { limit } else { 1 };
    for end in (start..=limit).filter(|end| path.is_char_boundary(*end)) {
        values.push(&path[..end]);
        if let Some(index) = match_node(child, &path[end..], values) {
            return Some(index);
        }
        values.pop();
    }
    None
}

fn parameter_names(template: &[RouteToken]) -> impl Iterator<Item = &str> {
    template.iter().filter_map(|token| match token {
        RouteToken::Parameter(name) => Some(name.as_str()),
        RouteToken::Literal(_) => None,
    })
}

fn render_template(template: &[RouteToken]) -> String {
    template
        .iter()
        .map(|token| match token {
            RouteToken::Literal(text) => text.clone(),
            RouteToken::Parameter(name) => format!("{{{}}}", name),
        })
        .collect()
}

/// Splits a path template into tokens.
pub fn parse_template(pattern: &str) -> AppResult<Vec<RouteToken>> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.chars();

    let flush = |literal: &mut String, tokens: &mut Vec<RouteToken>| {
        if !literal.is_empty() {
            tokens.push(RouteToken::Literal(std::mem::take(literal)));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '/' => {
                flush(&mut literal, &mut tokens);
                tokens.push(RouteToken::Literal("/".to_string()));
            }
            '{' => {
                flush(&mut literal, &mut tokens);
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | Some('/') | None => {
                            return Err(AppError::Route(format!(
                                "Unterminated placeholder in path template '{}'",
                                pattern
                            )))
                        }
                        Some(other) => name.push(other),
                    }
                }
                if name.is_empty() {
                    return Err(AppError::Route(format!(
                        "Empty placeholder in path template '{}'",
                        pattern
                    )));
                }
                tokens.push(RouteToken::Parameter(name));
            }
            '}' => {
                return Err(AppError::Route(format!(
                    "Unbalanced '}}' in path template '{}'",
                    pattern
                )))
            }
            other => literal.push(other),
        }
    }
    flush(&mut literal, &mut tokens);
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(pairs: &[(&str, &str)]) -> RouteParameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_template_tokens() {
        let tokens = parse_template("/files/{name}.json").unwrap();
        assert_eq!(
            tokens,
            vec![
                RouteToken::Literal("/".into()),
                RouteToken::Literal("files".into()),
                RouteToken::Literal("/".into()),
                RouteToken::Parameter("name".into()),
                RouteToken::Literal(".json".into()),
            ]
        );
        assert!(parse_template("/a/{b").is_err());
        assert!(parse_template("/a/{}").is_err());
        assert!(parse_template("/a/b}").is_err());
    }

    #[test]
    fn test_match_extracts_placeholders() {
        let mut table = RouteTable::new();
        table.insert(1, "/health").unwrap();
        table.insert(2, "/users/{id}").unwrap();
        table.insert(3, "/orgs/{org}/users/{id}").unwrap();

        let m = table.match_path("/orgs/acme/users/42").unwrap();
        assert_eq!(*m.key, 3);
        assert_eq!(m.parameters, params(&[("org", "acme"), ("id", "42")]));

        assert_eq!(*table.match_path("/health").unwrap().key, 1);
        assert!(table.match_path("/users").is_none());
        assert!(table.match_path("/users/").is_none());
        assert!(table.match_path("/users/1/2").is_none());
    }

    #[test]
    fn test_literal_beats_placeholder_regardless_of_order() {
        let mut table = RouteTable::new();
        table.insert("by-id", "/users/{id}").unwrap();
        table.insert("me", "/users/me").unwrap();
        assert_eq!(*table.match_path("/users/me").unwrap().key, "me");
        assert_eq!(*table.match_path("/users/you").unwrap().key, "by-id");

        let mut reversed = RouteTable::new();
        reversed.insert("me", "/users/me").unwrap();
        reversed.insert("by-id", "/users/{id}").unwrap();
        assert_eq!(*reversed.match_path("/users/me").unwrap().key, "me");
    }

    #[test]
    fn test_same_shape_first_inserted_wins() {
        let mut table = RouteTable::new();
        table.insert(1, "/items/{a}").unwrap();
        table.insert(2, "/items/{b}").unwrap();
        let m = table.match_path("/items/x").unwrap();
        assert_eq!(*m.key, 1);
        assert_eq!(m.parameters, params(&[("a", "x")]));
        assert_eq!(table.build(&2, &params(&[("b", "y")])).unwrap(), "/items/y");
    }

    #[test]
    fn test_placeholder_inside_segment_backtracks() {
        let mut table = RouteTable::new();
        table.insert(1, "/files/{name}.json").unwrap();
        table.insert(2, "/files/{name}").unwrap();
        let m = table.match_path("/files/a.b.json").unwrap();
        assert_eq!(*m.key, 1);
        assert_eq!(m.parameters["name"], "a.b");
        let m = table.match_path("/files/a.b").unwrap();
        assert_eq!(*m.key, 2);
    }

    #[test]
    fn test_build_encodes_and_match_decodes() {
        let mut table = RouteTable::new();
        table.insert(7, "/docs/{path}").unwrap();
        let path = table.build(&7, &params(&[("path", "a b/c")])).unwrap();
        assert_eq!(path, "/docs/a%20b%2Fc");
        let m = table.match_path(&path).unwrap();
        assert_eq!(m.parameters["path"], "a b/c");
    }

    #[test]
    fn test_build_fails_on_missing_value_or_key() {
        let mut table = RouteTable::new();
        table.insert(1, "/users/{id}").unwrap();
        assert!(matches!(
            table.build(&1, &RouteParameters::new()),
            Err(AppError::Route(_))
        ));
        assert!(matches!(
            table.build(&9, &RouteParameters::new()),
            Err(AppError::Route(_))
        ));
    }

    #[test]
    fn test_json_round_trip_matches_identically() {
        let mut table = RouteTable::new();
        table.insert(1u32, "/health").unwrap();
        table.insert(2, "/users/{id}").unwrap();
        table.insert(3, "/orgs/{org}/users/{id}").unwrap();
        table.insert(4, "/users/me").unwrap();

        let reloaded = RouteTable::<u32>::from_json(table.to_json().unwrap()).unwrap();
        assert_eq!(reloaded, table);
        for path in ["/health", "/users/42", "/users/me", "/orgs/a/users/b", "/nope"] {
            assert_eq!(reloaded.match_path(path), table.match_path(path), "path {}", path);
        }
    }

    #[test]
    fn test_from_json_rejects_dangling_route_index() {
        let value = serde_json::json!({
            "routes": [],
            "root": { "route": 3 }
        });
        assert!(matches!(
            RouteTable::<u32>::from_json(value),
            Err(AppError::Route(_))
        ));
    }
}
