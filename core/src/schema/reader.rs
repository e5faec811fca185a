//! # Schema Node Reader
//!
//! Reads a single schema node of a known dialect into `SchemaContent`.
//! Sub-schemas are returned as child addresses; the registry walks them.

use super::dialect::SchemaDialect;
use super::{SchemaContent, SchemaType};
use crate::address::CanonicalAddress;
use crate::error::{AppError, AppResult};
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// Result of reading one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeReading {
    /// Structural content; `reference` is left unresolved.
    pub content: SchemaContent,
    /// Raw identifier keyword value (`$id` / `id`).
    pub declared_id: Option<String>,
    /// Raw `$ref` value.
    pub reference: Option<String>,
    /// Sub-schema addresses in keyword order.
    pub children: Vec<CanonicalAddress>,
}

/// Reads `node` (located at `address`) as a schema of `dialect`.
pub fn read_node(
    dialect: SchemaDialect,
    address: &CanonicalAddress,
    node: &Value,
) -> AppResult<NodeReading> {
    match node {
        Value::Bool(accepts) => {
            if !dialect.allows_boolean_schemas() {
                return Err(AppError::Dialect(format!(
                    "Boolean schema at '{}' is not valid in {:?}",
                    address, dialect
                )));
            }
            let kind = if *accepts { SchemaType::Any } else { SchemaType::Never };
            Ok(NodeReading {
                content: SchemaContent {
                    types: vec![kind],
                    ..Default::default()
                },
                ..Default::default()
            })
        }
        Value::Object(map) => NodeReader {
            dialect,
            address,
            map,
            children: Vec::new(),
        }
        .read(),
        _ => Err(AppError::Document(format!(
            "Schema at '{}' must be an object",
            address
        ))),
    }
}

struct NodeReader<'a> {
    dialect: SchemaDialect,
    address: &'a CanonicalAddress,
    map: &'a Map<String, Value>,
    children: Vec<CanonicalAddress>,
}

impl NodeReader<'_> {
    fn read(mut self) -> AppResult<NodeReading> {
        let declared_id = self
            .dialect
            .id_keyword()
            .and_then(|keyword| self.str_value(keyword));
        let reference = self.str_value("$ref");

        if reference.is_some() && self.dialect.ref_siblings_ignored() {
            return Ok(NodeReading {
                content: SchemaContent::default(),
                declared_id,
                reference,
                children: Vec::new(),
            });
        }

        let mut content = SchemaContent {
            types: self.types()?,
            ..Default::default()
        };
        self.applicators(&mut content);
        self.items(&mut content);
        self.properties(&mut content);
        self.numeric_bounds(&mut content)?;
        self.annotations(&mut content);

        if self.dialect.is_modern() || self.dialect == SchemaDialect::Draft04 {
            let key = if self.dialect == SchemaDialect::Draft04 {
                "definitions"
            } else {
                "$defs"
            };
            self.walk_map(key);
            if self.dialect == SchemaDialect::Draft202012 {
                self.walk_map("definitions");
            }
        }

        Ok(NodeReading {
            content,
            declared_id,
            reference,
            children: self.children,
        })
    }

    fn types(&self) -> AppResult<Vec<SchemaType>> {
        let names: Vec<&str> = match self.map.get("type") {
            None => Vec::new(),
            Some(Value::String(name)) => vec![name.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(other) => {
                return Err(AppError::Document(format!(
                    "Invalid 'type' {} at '{}'",
                    other, self.address
                )))
            }
        };
        let mut types = Vec::with_capacity(names.len() + 1);
        for name in names {
            let kind = match name {
                "null" => SchemaType::Null,
                "boolean" => SchemaType::Boolean,
                "integer" => SchemaType::Integer,
                "number" => SchemaType::Number,
                "string" => SchemaType::String,
                "array" => SchemaType::Array,
                "object" => SchemaType::Map,
                "file" if self.dialect == SchemaDialect::Swagger2 => SchemaType::String,
                _ => {
                    return Err(AppError::Document(format!(
                        "Unknown type '{}' at '{}'",
                        name, self.address
                    )))
                }
            };
            types.push(kind);
        }

        let nullable = match self.dialect {
            SchemaDialect::OpenApi3 => self.bool_value("nullable"),
            SchemaDialect::Swagger2 => self.bool_value("x-nullable"),
            _ => false,
        };
        if nullable && !types.is_empty() && !types.contains(&SchemaType::Null) {
            types.push(SchemaType::Null);
        }
        Ok(types)
    }

    fn applicators(&mut self, content: &mut SchemaContent) {
        content.all_of = self.sub_list("allOf");
        if !self.dialect.has_full_applicators() {
            return;
        }
        content.any_of = self.sub_list("anyOf");
        content.one_of = self.sub_list("oneOf");
        content.not = self.sub("not");

        if self.dialect.is_modern() {
            content.if_schema = self.sub("if");
            content.then_schema = self.sub("then");
            content.else_schema = self.sub("else");
            content.dependent_schemas = self.sub_map("dependentSchemas");
        } else if let Some(Value::Object(dependencies)) = self.map.get("dependencies") {
            // Array-valued draft-04 dependencies are property lists, not schemas.
            for (name, value) in dependencies {
                if value.is_object() {
                    let child = self.address.append(["dependencies", name.as_str()]);
                    self.children.push(child.clone());
                    content.dependent_schemas.insert(name.clone(), child);
                }
            }
        }
    }

    fn items(&mut self, content: &mut SchemaContent) {
        if self.dialect.is_modern() {
            content.tuple_items = self.sub_list("prefixItems");
        }
        match self.map.get("items") {
            Some(Value::Array(_)) => {
                content.tuple_items = self.sub_list("items");
                content.array_items = self.sub("additionalItems");
            }
            Some(_) => content.array_items = self.sub("items"),
            None => {}
        }
        if self.dialect.is_modern() {
            content.contains = self.sub("contains");
        }
        content.minimum_items = self.u64_value("minItems");
        content.maximum_items = self.u64_value("maxItems");
        content.unique_items = self.map.get("uniqueItems").and_then(Value::as_bool);
    }

    fn properties(&mut self, content: &mut SchemaContent) {
        content.object_properties = self.sub_map("properties");
        match self.map.get("additionalProperties") {
            Some(Value::Bool(allowed)) if !self.dialect.allows_boolean_schemas() => {
                content.additional_properties = Some(*allowed);
            }
            Some(_) => content.map_properties = self.sub("additionalProperties"),
            None => {}
        }
        if self.dialect.has_full_applicators() {
            content.pattern_properties = self.sub_map("patternProperties");
        }
        if self.dialect.is_modern() {
            content.property_names = self.sub("propertyNames");
        }
        if let Some(Value::Array(names)) = self.map.get("required") {
            content.required_properties = names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        content.minimum_properties = self.u64_value("minProperties");
        content.maximum_properties = self.u64_value("maxProperties");
    }

    fn numeric_bounds(&self, content: &mut SchemaContent) -> AppResult<()> {
        let minimum = self.map.get("minimum").and_then(Value::as_f64);
        let maximum = self.map.get("maximum").and_then(Value::as_f64);
        let (min_in, min_ex) =
            self.exclusive_bound(minimum, self.map.get("exclusiveMinimum"), "exclusiveMinimum")?;
        let (max_in, max_ex) =
            self.exclusive_bound(maximum, self.map.get("exclusiveMaximum"), "exclusiveMaximum")?;
        content.minimum_inclusive = min_in;
        content.minimum_exclusive = min_ex;
        content.maximum_inclusive = max_in;
        content.maximum_exclusive = max_ex;
        content.multiple_of = self.map.get("multipleOf").and_then(Value::as_f64);

        content.minimum_length = self.u64_value("minLength");
        content.maximum_length = self.u64_value("maxLength");
        content.value_pattern = self.str_value("pattern");
        content.value_format = self.str_value("format");
        if content.value_format.is_none()
            && self.dialect == SchemaDialect::Swagger2
            && self.map.get("type").and_then(Value::as_str) == Some("file")
        {
            content.value_format = Some("binary".to_string());
        }
        Ok(())
    }

    /// Returns `(inclusive, exclusive)` for one side.
    ///
    /// Draft-04 and Swagger 2 use a boolean flag on the plain bound; 2020-12
    /// uses a number. OpenAPI 3 documents are found in both spellings.
    fn exclusive_bound(
        &self,
        bound: Option<f64>,
        exclusive: Option<&Value>,
        keyword: &str,
    ) -> AppResult<(Option<f64>, Option<f64>)> {
        let boolean_ok = self.dialect != SchemaDialect::Draft202012;
        let numeric_ok = self.dialect.is_modern();
        match exclusive {
            None => Ok((bound, None)),
            Some(Value::Bool(flag)) if boolean_ok => Ok(if *flag { (None, bound) } else { (bound, None) }),
            Some(Value::Number(n)) if numeric_ok => Ok((bound, n.as_f64())),
            Some(other) => Err(AppError::Document(format!(
                "'{}' value {} at '{}' is not valid in {:?}",
                keyword, other, self.address, self.dialect
            ))),
        }
    }

    fn annotations(&self, content: &mut SchemaContent) {
        if let Some(Value::Array(values)) = self.map.get("enum") {
            content.options = values.clone();
        }
        if self.dialect.is_modern() {
            if let Some(value) = self.map.get("const") {
                content.options = vec![value.clone()];
            }
        }
        content.title = self.str_value("title");
        content.description = self.str_value("description");
        content.default_value = self.map.get("default").cloned();
        if let Some(Value::Array(values)) = self.map.get("examples") {
            content.examples = values.clone();
        } else if let Some(value) = self.map.get("example") {
            content.examples = vec![value.clone()];
        }
        content.deprecated = self.bool_value("deprecated");
        content.read_only = self.bool_value("readOnly");
        content.write_only = self.bool_value("writeOnly");
    }

    fn is_schema(&self, value: &Value) -> bool {
        value.is_object() || (value.is_boolean() && self.dialect.allows_boolean_schemas())
    }

    fn sub(&mut self, key: &str) -> Option<CanonicalAddress> {
        let value = self.map.get(key)?;
        if !self.is_schema(value) {
            return None;
        }
        let child = self.address.append([key]);
        self.children.push(child.clone());
        Some(child)
    }

    fn sub_list(&mut self, key: &str) -> Vec<CanonicalAddress> {
        let Some(Value::Array(items)) = self.map.get(key) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if self.is_schema(item) {
                let child = self.address.append([key.to_string(), index.to_string()]);
                self.children.push(child.clone());
                out.push(child);
            }
        }
        out
    }

    fn sub_map(&mut self, key: &str) -> IndexMap<String, CanonicalAddress> {
        let entries = self.map_entries(key);
        self.children
            .extend(entries.iter().map(|(_, child)| child.clone()));
        entries.into_iter().collect()
    }

    /// Walks a map of schemas that has no place in `SchemaContent`.
    fn walk_map(&mut self, key: &str) {
        let entries = self.map_entries(key);
        self.children.extend(entries.into_iter().map(|(_, child)| child));
    }

    /// Schema-valued members of the map under `key`, with their addresses.
    fn map_entries(&self, key: &str) -> Vec<(String, CanonicalAddress)> {
        let Some(Value::Object(entries)) = self.map.get(key) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter(|(_, value)| self.is_schema(value))
            .map(|(name, _)| (name.clone(), self.address.append([key, name.as_str()])))
            .collect()
    }

    fn str_value(&self, key: &str) -> Option<String> {
        self.map.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn bool_value(&self, key: &str) -> bool {
        self.map.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn u64_value(&self, key: &str) -> Option<u64> {
        self.map.get(key).and_then(Value::as_u64)
    }
}
