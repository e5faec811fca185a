#![deny(missing_docs)]

//! # API Model
//!
//! Read-only records describing one loaded API document.
//!
//! Records never copy schema content; they hold `SchemaRef`s into the shared
//! `SchemaArena`. An `ApiModel` is only produced by `ApiModelBuilder::finish`
//! and exposes no mutation afterwards.

use crate::address::CanonicalAddress;
use crate::error::{AppError, AppResult};
use crate::router::RouteTable;
use crate::schema::{SchemaArena, SchemaEntry};
use crate::status::StatusKind;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// HTTP methods an operation can be declared under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// `get`
    Get,
    /// `put`
    Put,
    /// `post`
    Post,
    /// `delete`
    Delete,
    /// `options`
    Options,
    /// `head`
    Head,
    /// `patch`
    Patch,
    /// `trace`
    Trace,
}

impl Method {
    /// Every method, in the order path items are scanned.
    pub const ALL: [Method; 8] = [
        Method::Get,
        Method::Put,
        Method::Post,
        Method::Delete,
        Method::Options,
        Method::Head,
        Method::Patch,
        Method::Trace,
    ];

    /// The path-item key for this method.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Put => "put",
            Method::Post => "post",
            Method::Delete => "delete",
            Method::Options => "options",
            Method::Head => "head",
            Method::Patch => "patch",
            Method::Trace => "trace",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

/// Where a parameter is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// Query string.
    Query,
    /// Request header.
    Header,
    /// Path placeholder.
    Path,
    /// Cookie.
    Cookie,
}

impl ParameterLocation {
    /// Parses an `in` value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "query" => Ok(Self::Query),
            "header" => Ok(Self::Header),
            "path" => Ok(Self::Path),
            "cookie" => Ok(Self::Cookie),
            other => Err(AppError::Document(format!(
                "Unknown parameter location '{}'",
                other
            ))),
        }
    }
}

/// Pointer into the schema arena.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SchemaRef {
    /// Address of the schema node.
    pub address: CanonicalAddress,
    /// Stable identifier of the schema entry.
    pub id: String,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterModel {
    /// Declaration site.
    pub address: CanonicalAddress,
    /// Declared name.
    pub name: String,
    /// Defaults to false when undeclared.
    pub required: bool,
    /// Value schema, if declared.
    pub schema: Option<SchemaRef>,
}

/// One request or response content type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyModel {
    /// Declaration site.
    pub address: CanonicalAddress,
    /// Media type, e.g. `application/json`.
    pub content_type: String,
    /// Payload schema, if declared.
    pub schema: Option<SchemaRef>,
}

/// One declared response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResultModel {
    /// Declaration site.
    pub address: CanonicalAddress,
    /// The status key as written in the document (`5xx` stays `5xx`).
    pub status_key: String,
    /// Parsed form of `status_key`.
    pub status_kind: StatusKind,
    /// Codes this key claims after partitioning; may be empty.
    pub status_codes: BTreeSet<u16>,
    /// Free text.
    pub description: Option<String>,
    /// Response headers.
    pub header_parameters: Vec<ParameterModel>,
    /// Response payloads.
    pub bodies: Vec<BodyModel>,
}

/// One named scheme with its required scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticationScope {
    /// Security scheme name.
    pub name: String,
    /// Required scopes (may be empty).
    pub scopes: Vec<String>,
}

/// Schemes that must all be satisfied together.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct AuthenticationRequirement {
    /// Every entry is required (AND).
    pub schemes: Vec<AuthenticationScope>,
}

/// A declared security scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticationModel {
    /// Scheme name.
    pub name: String,
}

/// One operation of a path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationModel {
    /// Declaration site.
    pub address: CanonicalAddress,
    /// HTTP method.
    pub method: Method,
    /// `operationId`, or empty when absent.
    pub name: String,
    /// Deprecation flag.
    pub deprecated: bool,
    /// Short summary.
    pub summary: Option<String>,
    /// Long description.
    pub description: Option<String>,
    /// Query parameters in declaration order.
    pub query_parameters: Vec<ParameterModel>,
    /// Header parameters in declaration order.
    pub header_parameters: Vec<ParameterModel>,
    /// Path parameters in declaration order.
    pub path_parameters: Vec<ParameterModel>,
    /// Cookie parameters in declaration order.
    pub cookie_parameters: Vec<ParameterModel>,
    /// Alternatives (OR) of requirements; empty means none.
    pub authentication_requirements: Vec<AuthenticationRequirement>,
    /// Request payloads, one per content type.
    pub bodies: Vec<BodyModel>,
    /// Responses in partitioning order.
    pub operation_results: Vec<OperationResultModel>,
}

impl OperationModel {
    /// Every parameter: query, header, path, then cookie.
    pub fn parameters(&self) -> impl Iterator<Item = &ParameterModel> {
        self.query_parameters
            .iter()
            .chain(&self.header_parameters)
            .chain(&self.path_parameters)
            .chain(&self.cookie_parameters)
    }

    /// The response claiming `code`.
    pub fn result_for(&self, code: u16) -> Option<&OperationResultModel> {
        self.operation_results
            .iter()
            .find(|result| result.status_codes.contains(&code))
    }
}

/// One declared path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathModel {
    /// Ordinal, starting at 1, in declaration order.
    pub index: u32,
    /// Declaration site.
    pub address: CanonicalAddress,
    /// Path pattern with `{name}` placeholders.
    pub pattern: String,
    /// Operations in method order.
    pub operations: Vec<OperationModel>,
}

/// The finished model of one document.
#[derive(Debug, Clone, Serialize)]
pub struct ApiModel {
    pub(crate) address: CanonicalAddress,
    pub(crate) paths: Vec<PathModel>,
    pub(crate) authentication: Vec<AuthenticationModel>,
    pub(crate) router: RouteTable<u32>,
    pub(crate) schemas: Arc<SchemaArena>,
}

impl ApiModel {
    /// Base address of the document.
    pub fn address(&self) -> &CanonicalAddress {
        &self.address
    }

    /// Paths in declaration order.
    pub fn paths(&self) -> &[PathModel] {
        &self.paths
    }

    /// Path with the given ordinal.
    pub fn path(&self, index: u32) -> Option<&PathModel> {
        self.paths.iter().find(|path| path.index == index)
    }

    /// Declared security schemes.
    pub fn authentication(&self) -> &[AuthenticationModel] {
        &self.authentication
    }

    /// Route table keyed by path ordinal.
    pub fn router(&self) -> &RouteTable<u32> {
        &self.router
    }

    /// The shared schema arena.
    pub fn schemas(&self) -> &Arc<SchemaArena> {
        &self.schemas
    }

    /// Every operation with its path.
    pub fn operations(&self) -> impl Iterator<Item = (&PathModel, &OperationModel)> {
        self.paths
            .iter()
            .flat_map(|path| path.operations.iter().map(move |op| (path, op)))
    }

    /// Operation by `operationId`.
    pub fn find_operation(&self, name: &str) -> Option<&OperationModel> {
        self.operations()
            .map(|(_, op)| op)
            .find(|op| !op.name.is_empty() && op.name == name)
    }

    /// Schema entry a reference points at.
    pub fn schema(&self, reference: &SchemaRef) -> Option<&SchemaEntry> {
        self.schemas.get(&reference.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_order_and_display() {
        let keys: Vec<&str> = Method::ALL.iter().map(|m| m.as_str()).collect();
        assert_eq!(
            keys,
            vec!["get", "put", "post", "delete", "options", "head", "patch", "trace"]
        );
        assert_eq!(Method::Patch.to_string(), "PATCH");
    }

    #[test]
    fn test_parameter_location_parse() {
        assert_eq!(ParameterLocation::parse("cookie").unwrap(), ParameterLocation::Cookie);
        let err = ParameterLocation::parse("body").unwrap_err();
        assert!(matches!(err, AppError::Document(_)));
    }

    #[test]
    fn test_authentication_requirement_serializes_as_list() {
        let requirement = AuthenticationRequirement {
            schemes: vec![AuthenticationScope {
                name: "oauth".into(),
                scopes: vec!["read".into()],
            }],
        };
        assert_eq!(
            serde_json::to_value(&requirement).unwrap(),
            serde_json::json!([{ "name": "oauth", "scopes": ["read"] }])
        );
    }
}
