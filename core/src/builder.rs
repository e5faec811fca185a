//! # API Model Builder
//!
//! Assembly step shared by the document adapters. Adapters feed paths in
//! declaration order; `finish` compiles the route table and checks that every
//! schema reference in the model has an entry in the arena.

use crate::address::CanonicalAddress;
use crate::error::{AppError, AppResult};
use crate::model::{
    ApiModel, AuthenticationModel, AuthenticationRequirement, AuthenticationScope, BodyModel,
    Method, OperationModel, OperationResultModel, ParameterLocation, ParameterModel, PathModel,
    SchemaRef,
};
use crate::router::RouteTable;
use crate::schema::SchemaArena;
use crate::status::partition_status_codes;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// First path ordinal.
pub const FIRST_PATH_INDEX: u32 = 1;

/// An operation as read by an adapter, before grouping and partitioning.
#[derive(Debug, Clone)]
pub struct OperationDraft {
    /// Declaration site.
    pub address: CanonicalAddress,
    /// HTTP method.
    pub method: Method,
    /// `operationId` or empty.
    pub name: String,
    /// Deprecation flag.
    pub deprecated: bool,
    /// Short summary.
    pub summary: Option<String>,
    /// Long description.
    pub description: Option<String>,
    /// Path-item parameters first, then operation parameters.
    pub parameters: Vec<(ParameterLocation, ParameterModel)>,
    /// Effective security.
    pub authentication_requirements: Vec<AuthenticationRequirement>,
    /// Request payloads.
    pub bodies: Vec<BodyModel>,
    /// Responses in declaration order.
    pub responses: Vec<ResponseDraft>,
}

/// A response as read by an adapter.
#[derive(Debug, Clone)]
pub struct ResponseDraft {
    /// Status key as declared.
    pub key: String,
    /// Declaration site.
    pub address: CanonicalAddress,
    /// Free text.
    pub description: Option<String>,
    /// Response headers.
    pub header_parameters: Vec<ParameterModel>,
    /// Response payloads.
    pub bodies: Vec<BodyModel>,
}

/// Accumulates model records for one document.
pub struct ApiModelBuilder {
    address: CanonicalAddress,
    schemas: Arc<SchemaArena>,
    paths: Vec<PathModel>,
    authentication: Vec<AuthenticationModel>,
}

impl ApiModelBuilder {
    /// Builder for the document at `address` over a finished arena.
    pub fn new(address: CanonicalAddress, schemas: SchemaArena) -> Self {
        Self {
            address,
            schemas: Arc::new(schemas),
            paths: Vec::new(),
            authentication: Vec::new(),
        }
    }

    /// Reference to the schema node at `address`.
    ///
    /// Unknown addresses still produce a reference; `finish` rejects them.
    pub fn schema_ref(&self, address: &CanonicalAddress) -> SchemaRef {
        let id = self
            .schemas
            .stable_id(address)
            .map(str::to_string)
            .unwrap_or_else(|| address.to_string());
        SchemaRef {
            address: address.clone(),
            id,
        }
    }

    /// Adds a path; returns its ordinal.
    pub fn push_path(
        &mut self,
        address: CanonicalAddress,
        pattern: &str,
        operations: Vec<OperationDraft>,
    ) -> AppResult<u32> {
        let index = FIRST_PATH_INDEX + self.paths.len() as u32;
        let operations = operations
            .into_iter()
            .map(build_operation)
            .collect::<AppResult<Vec<_>>>()?;
        self.paths.push(PathModel {
            index,
            address,
            pattern: pattern.to_string(),
            operations,
        });
        Ok(index)
    }

    /// Adds a declared security scheme.
    pub fn push_authentication(&mut self, name: &str) {
        self.authentication.push(AuthenticationModel {
            name: name.to_string(),
        });
    }

    /// Compiles the route table and verifies schema references.
    pub fn finish(self) -> AppResult<ApiModel> {
        let mut router = RouteTable::new();
        for path in &self.paths {
            router.insert(path.index, &path.pattern)?;
        }

        for path in &self.paths {
            for operation in &path.operations {
                for reference in schema_refs(operation) {
                    if !self.schemas.contains(&reference.address) {
                        return Err(AppError::Reference(format!(
                            "Dangling schema reference '{}' in {} {}",
                            reference.address, operation.method, path.pattern
                        )));
                    }
                }
            }
        }

        tracing::debug!(
            "Built model for {}: {} path(s), {} schema(s)",
            self.address,
            self.paths.len(),
            self.schemas.len()
        );
        Ok(ApiModel {
            address: self.address,
            paths: self.paths,
            authentication: self.authentication,
            router,
            schemas: self.schemas,
        })
    }
}

fn build_operation(draft: OperationDraft) -> AppResult<OperationModel> {
    let mut query = Vec::new();
    let mut header = Vec::new();
    let mut path = Vec::new();
    let mut cookie = Vec::new();
    for (location, parameter) in draft.parameters {
        match location {
            ParameterLocation::Query => query.push(parameter),
            ParameterLocation::Header => header.push(parameter),
            ParameterLocation::Path => path.push(parameter),
            ParameterLocation::Cookie => cookie.push(parameter),
        }
    }

    Ok(OperationModel {
        address: draft.address,
        method: draft.method,
        name: draft.name,
        deprecated: draft.deprecated,
        summary: draft.summary,
        description: draft.description,
        query_parameters: query,
        header_parameters: header,
        path_parameters: path,
        cookie_parameters: cookie,
        authentication_requirements: draft.authentication_requirements,
        bodies: draft.bodies,
        operation_results: build_results(draft.responses)?,
    })
}

/// Partitions status keys and orders results the way they were processed.
fn build_results(responses: Vec<ResponseDraft>) -> AppResult<Vec<OperationResultModel>> {
    let keys: Vec<String> = responses.iter().map(|r| r.key.clone()).collect();
    let mut drafts: IndexMap<String, ResponseDraft> =
        responses.into_iter().map(|r| (r.key.clone(), r)).collect();

    let mut results = Vec::with_capacity(drafts.len());
    for (key, kind, codes) in partition_status_codes(&keys)? {
        let Some(draft) = drafts.shift_remove(&key) else {
            continue;
        };
        if codes.is_empty() {
            tracing::warn!("Response '{}' at {} claims no status codes", key, draft.address);
        }
        results.push(OperationResultModel {
            address: draft.address,
            status_key: key,
            status_kind: kind,
            status_codes: codes,
            description: draft.description,
            header_parameters: draft.header_parameters,
            bodies: draft.bodies,
        });
    }
    Ok(results)
}

fn schema_refs(operation: &OperationModel) -> impl Iterator<Item = &SchemaRef> {
    let parameters = operation.parameters().filter_map(|p| p.schema.as_ref());
    let bodies = operation.bodies.iter().filter_map(|b| b.schema.as_ref());
    let results = operation.operation_results.iter().flat_map(|result| {
        result
            .header_parameters
            .iter()
            .filter_map(|p| p.schema.as_ref())
            .chain(result.bodies.iter().filter_map(|b| b.schema.as_ref()))
    });
    parameters.chain(bodies).chain(results)
}

/// Reads a `security` list: alternatives of scheme -> scopes maps.
pub fn parse_security(value: &Value, at: &CanonicalAddress) -> AppResult<Vec<AuthenticationRequirement>> {
    let Value::Array(alternatives) = value else {
        return Err(AppError::Document(format!("'security' at '{}' must be a list", at)));
    };
    alternatives
        .iter()
        .map(|alternative| {
            let Value::Object(schemes) = alternative else {
                return Err(AppError::Document(format!(
                    "Security requirement at '{}' must be a map",
                    at
                )));
            };
            let schemes = schemes
                .iter()
                .map(|(name, scopes)| AuthenticationScope {
                    name: name.clone(),
                    scopes: scopes
                        .as_array()
                        .map(|list| {
                            list.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                })
                .collect();
            Ok(AuthenticationRequirement { schemes })
        })
        .collect()
}

/// Operation-level `security` if declared, else the document default, else none.
pub fn effective_security(
    operation: Option<&Value>,
    document: Option<&Value>,
    at: &CanonicalAddress,
) -> AppResult<Vec<AuthenticationRequirement>> {
    match operation.or(document) {
        Some(value) => parse_security(value, at),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn addr(pointer: &str) -> CanonicalAddress {
        CanonicalAddress::parse(&format!("https://example.com/api.json#{}", pointer)).unwrap()
    }

    fn param(name: &str) -> ParameterModel {
        ParameterModel {
            address: addr(&format!("/p/{}", name)),
            name: name.to_string(),
            required: false,
            schema: None,
        }
    }

    fn response(key: &str) -> ResponseDraft {
        ResponseDraft {
            key: key.to_string(),
            address: addr(&format!("/r/{}", key)),
            description: None,
            header_parameters: Vec::new(),
            bodies: Vec::new(),
        }
    }

    fn draft() -> OperationDraft {
        OperationDraft {
            address: addr("/paths/~1a/get"),
            method: Method::Get,
            name: String::new(),
            deprecated: false,
            summary: None,
            description: None,
            parameters: Vec::new(),
            authentication_requirements: Vec::new(),
            bodies: Vec::new(),
            responses: Vec::new(),
        }
    }

    #[test]
    fn test_parameters_are_grouped_stably() {
        let mut op = draft();
        op.parameters = vec![
            (ParameterLocation::Query, param("shared")),
            (ParameterLocation::Header, param("trace")),
            (ParameterLocation::Query, param("page")),
            (ParameterLocation::Query, param("size")),
        ];
        let model = build_operation(op).unwrap();
        let names: Vec<&str> = model.query_parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["shared", "page", "size"]);
        assert_eq!(model.header_parameters.len(), 1);
    }

    #[test]
    fn test_results_follow_partition_order() {
        let mut op = draft();
        op.responses = vec![response("default"), response("4XX"), response("200")];
        let model = build_operation(op).unwrap();
        let kinds: Vec<StatusKind> = model.operation_results.iter().map(|r| r.status_kind).collect();
        assert_eq!(
            kinds,
            vec![StatusKind::Code(200), StatusKind::Class(4), StatusKind::Default]
        );
        assert_eq!(model.result_for(404).unwrap().status_kind, StatusKind::Class(4));
        assert_eq!(model.result_for(302).unwrap().status_kind, StatusKind::Default);
    }

    #[test]
    fn test_results_keep_declared_key_spelling() {
        let mut op = draft();
        op.responses = vec![response("5xx"), response("201")];
        let model = build_operation(op).unwrap();
        let keys: Vec<&str> = model
            .operation_results
            .iter()
            .map(|r| r.status_key.as_str())
            .collect();
        assert_eq!(keys, vec!["201", "5xx"]);
        assert_eq!(model.operation_results[1].status_kind, StatusKind::Class(5));

        let value = serde_json::to_value(&model.operation_results[1]).unwrap();
        assert_eq!(value["statusKey"], json!("5xx"));
        assert_eq!(value["statusKind"], json!("5XX"));
    }

    #[test]
    fn test_indices_start_at_one() {
        let mut builder = ApiModelBuilder::new(addr(""), SchemaArena::default());
        assert_eq!(builder.push_path(addr("/paths/~1a"), "/a", vec![]).unwrap(), 1);
        assert_eq!(builder.push_path(addr("/paths/~1b"), "/b", vec![]).unwrap(), 2);
        let model = builder.finish().unwrap();
        assert_eq!(model.router().match_path("/b").map(|m| *m.key), Some(2));
    }

    #[test]
    fn test_dangling_schema_reference_fails() {
        let mut builder = ApiModelBuilder::new(addr(""), SchemaArena::default());
        let mut op = draft();
        let mut p = param("id");
        p.schema = Some(builder.schema_ref(&addr("/components/schemas/Missing")));
        op.parameters = vec![(ParameterLocation::Path, p)];
        builder.push_path(addr("/paths/~1a"), "/a", vec![op]).unwrap();
        let err = builder.finish().unwrap_err();
        match err {
            AppError::Reference(message) => {
                assert!(message.contains("/components/schemas/Missing"), "{}", message)
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[test]
    fn test_effective_security_precedence() {
        let at = addr("");
        let global = json!([{ "apiKey": [] }]);
        let local = json!([{ "oauth": ["read", "write"] }, {}]);
        let none = json!([]);

        let inherited = effective_security(None, Some(&global), &at).unwrap();
        assert_eq!(inherited[0].schemes[0].name, "apiKey");

        let own = effective_security(Some(&local), Some(&global), &at).unwrap();
        assert_eq!(own.len(), 2);
        assert_eq!(own[0].schemes[0].scopes, vec!["read", "write"]);
        assert!(own[1].schemes.is_empty());

        assert!(effective_security(Some(&none), Some(&global), &at).unwrap().is_empty());
        assert!(effective_security(None, None, &at).unwrap().is_empty());
    }
}
