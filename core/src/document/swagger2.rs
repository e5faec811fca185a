//! # Swagger 2.0 Adapter
//!
//! Non-body parameters and response headers are schema-like nodes themselves.
//! `in: body` parameters and response schemas fan out into one body per
//! effective `consumes` / `produces` media type.

use super::{
    bool_field, child, is_extension, items, key_of, members, str_field, DocumentAdapter,
    DocumentView, Pointer, SchemaIter, Selected,
};
use crate::builder::{effective_security, ApiModelBuilder, OperationDraft, ResponseDraft};
use crate::error::{AppError, AppResult};
use crate::model::{ApiModel, BodyModel, Method, ParameterLocation, ParameterModel};
use crate::schema::SchemaArena;
use serde_json::Value;
use std::iter;

const DEFAULT_MEDIA_TYPE: &str = "application/json";
const URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

/// Adapter for `swagger: "2.0"` documents.
#[derive(Debug, Clone, Copy)]
pub struct Swagger2Adapter<'a> {
    view: DocumentView<'a>,
}

/// A parameter after `$ref` resolution.
struct Parameter<'a> {
    declared: Pointer,
    resolved: Pointer,
    node: &'a Value,
    location: String,
}

impl<'a> Swagger2Adapter<'a> {
    /// Adapter over a sniffed Swagger 2.0 document.
    pub fn new(view: DocumentView<'a>) -> Self {
        Self { view }
    }

    fn paths(self) -> impl Iterator<Item = Selected<'a>> + 'a {
        members(vec!["paths".to_string()], self.view.root().get("paths"))
            .filter(|(pointer, _)| !is_extension(pointer))
    }

    fn parameter_schema(self, pointer: Pointer, node: &'a Value) -> Option<Selected<'a>> {
        let (pointer, node) = self.view.deref(pointer, node).ok()?;
        match node.get("in").and_then(Value::as_str) {
            Some("body") => node.get("schema").map(|schema| (child(&pointer, "schema"), schema)),
            Some("formData") => None,
            _ => Some((pointer, node)),
        }
    }

    fn response_schemas(self, pointer: Pointer, node: &'a Value) -> SchemaIter<'a> {
        let Ok((pointer, node)) = self.view.deref(pointer, node) else {
            return Box::new(iter::empty());
        };
        let headers = members(child(&pointer, "headers"), node.get("headers"));
        let schema = node.get("schema").map(|schema| (child(&pointer, "schema"), schema));
        Box::new(headers.chain(schema))
    }

    fn operation_schemas(self, pointer: Pointer, operation: &'a Value) -> impl Iterator<Item = Selected<'a>> + 'a {
        let parameters = items(child(&pointer, "parameters"), operation.get("parameters"))
            .filter_map(move |(p, node)| self.parameter_schema(p, node));
        let responses = members(child(&pointer, "responses"), operation.get("responses"))
            .filter(|(p, _)| !is_extension(p))
            .flat_map(move |(p, node)| self.response_schemas(p, node));
        parameters.chain(responses)
    }

    fn resolve_parameters(self, pointer: &[String], owner: &'a Value) -> AppResult<Vec<Parameter<'a>>> {
        items(child(pointer, "parameters"), owner.get("parameters"))
            .map(|(declared, node)| {
                let (resolved, node) = self.view.deref(declared.clone(), node)?;
                let location = str_field(node, "in").ok_or_else(|| {
                    AppError::Document(format!(
                        "Parameter at '{}' has no location",
                        self.view.at(&declared)
                    ))
                })?;
                Ok(Parameter {
                    declared,
                    resolved,
                    node,
                    location,
                })
            })
            .collect()
    }

    /// `consumes` / `produces` of the operation, else of the document, else JSON.
    fn media_types(self, operation: &Value, key: &str) -> Vec<String> {
        let declared = operation
            .get(key)
            .or_else(|| self.view.root().get(key))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        if declared.is_empty() {
            vec![DEFAULT_MEDIA_TYPE.to_string()]
        } else {
            declared
        }
    }

    fn responses(
        self,
        builder: &ApiModelBuilder,
        pointer: &[String],
        operation: &'a Value,
        produces: &[String],
    ) -> AppResult<Vec<ResponseDraft>> {
        members(child(pointer, "responses"), operation.get("responses"))
            .filter(|(p, _)| !is_extension(p))
            .map(|(declared, node)| {
                let key = key_of(&declared).to_string();
                let address = self.view.at(&declared);
                let (resolved, node) = self.view.deref(declared, node)?;
                let header_parameters = members(child(&resolved, "headers"), node.get("headers"))
                    .map(|(header_pointer, _)| {
                        let header_address = self.view.at(&header_pointer);
                        ParameterModel {
                            name: key_of(&header_pointer).to_string(),
                            required: false,
                            schema: Some(builder.schema_ref(&header_address)),
                            address: header_address,
                        }
                    })
                    .collect();
                let bodies = match node.get("schema") {
                    Some(_) => {
                        let schema = builder.schema_ref(&self.view.at(&child(&resolved, "schema")));
                        produces
                            .iter()
                            .map(|content_type| BodyModel {
                                address: self.view.at(&resolved),
                                content_type: content_type.clone(),
                                schema: Some(schema.clone()),
                            })
                            .collect()
                    }
                    None => Vec::new(),
                };
                Ok(ResponseDraft {
                    key,
                    address,
                    description: str_field(node, "description"),
                    header_parameters,
                    bodies,
                })
            })
            .collect()
    }

    fn operation(
        self,
        builder: &ApiModelBuilder,
        method: Method,
        pointer: Pointer,
        operation: &'a Value,
        shared: &[Parameter<'a>],
    ) -> AppResult<OperationDraft> {
        let address = self.view.at(&pointer);
        if operation.get("$ref").is_some() {
            return Err(AppError::UnsupportedConstruct(format!(
                "Operation at '{}' is a reference",
                address
            )));
        }
        if !operation.is_object() {
            return Err(AppError::Document(format!("Operation at '{}' must be a map", address)));
        }

        let own = self.resolve_parameters(&pointer, operation)?;
        let consumes = self.media_types(operation, "consumes");
        let produces = self.media_types(operation, "produces");

        let mut parameters = Vec::new();
        let mut bodies = Vec::new();
        let mut form_fields = Vec::new();
        for parameter in shared.iter().chain(&own) {
            let declared_at = self.view.at(&parameter.declared);
            match parameter.location.as_str() {
                "body" => {
                    let schema = parameter
                        .node
                        .get("schema")
                        .map(|_| builder.schema_ref(&self.view.at(&child(&parameter.resolved, "schema"))));
                    bodies.extend(consumes.iter().map(|content_type| BodyModel {
                        address: declared_at.clone(),
                        content_type: content_type.clone(),
                        schema: schema.clone(),
                    }));
                }
                "formData" => form_fields.push((declared_at, parameter.node)),
                location => {
                    let location = ParameterLocation::parse(location)?;
                    let name = str_field(parameter.node, "name").ok_or_else(|| {
                        AppError::Document(format!("Parameter at '{}' has no name", declared_at))
                    })?;
                    parameters.push((
                        location,
                        ParameterModel {
                            name,
                            required: bool_field(parameter.node, "required"),
                            schema: Some(builder.schema_ref(&self.view.at(&parameter.resolved))),
                            address: declared_at,
                        },
                    ));
                }
            }
        }
        if let Some((first_field, _)) = form_fields.first() {
            let has_file = form_fields
                .iter()
                .any(|(_, node)| node.get("type").and_then(Value::as_str) == Some("file"));
            let mut form_types: Vec<String> = consumes
                .iter()
                .filter(|t| t.as_str() == URLENCODED || t.as_str() == MULTIPART)
                .cloned()
                .collect();
            if form_types.is_empty() {
                form_types.push(if has_file { MULTIPART } else { URLENCODED }.to_string());
            }
            bodies.extend(form_types.into_iter().map(|content_type| BodyModel {
                address: first_field.clone(),
                content_type,
                schema: None,
            }));
        }

        Ok(OperationDraft {
            method,
            name: str_field(operation, "operationId").unwrap_or_default(),
            deprecated: bool_field(operation, "deprecated"),
            summary: str_field(operation, "summary"),
            description: str_field(operation, "description"),
            parameters,
            authentication_requirements: effective_security(
                operation.get("security"),
                self.view.root().get("security"),
                &address,
            )?,
            bodies,
            responses: self.responses(builder, &pointer, operation, &produces)?,
            address,
        })
    }
}

impl DocumentAdapter for Swagger2Adapter<'_> {
    fn select_schemas<'s>(&'s self) -> SchemaIter<'s> {
        let adapter: Swagger2Adapter<'s> = *self;
        let view = adapter.view;
        let definitions = members(vec!["definitions".to_string()], view.get(&["definitions"]));
        let paths = adapter.paths().flat_map(move |(pointer, item)| {
            let Ok((pointer, item)) = view.deref(pointer, item) else {
                return Box::new(iter::empty()) as SchemaIter<'s>;
            };
            let shared = items(child(&pointer, "parameters"), item.get("parameters"))
                .filter_map(move |(p, node)| adapter.parameter_schema(p, node));
            let operations = Method::ALL.into_iter().filter_map(move |method| {
                item.get(method.as_str())
                    .filter(|op| op.get("$ref").is_none())
                    .map(|op| (child(&pointer, method.as_str()), op))
            });
            let operations = operations.flat_map(move |(p, op)| adapter.operation_schemas(p, op));
            Box::new(shared.chain(operations))
        });
        Box::new(definitions.chain(paths))
    }

    fn build_api_model(&self, schemas: SchemaArena) -> AppResult<ApiModel> {
        let view = self.view;
        let mut builder = ApiModelBuilder::new(view.address().clone(), schemas);

        for (pointer, _) in members(vec!["securityDefinitions".to_string()], view.get(&["securityDefinitions"])) {
            builder.push_authentication(key_of(&pointer));
        }

        for (declared, item) in self.paths() {
            let pattern = key_of(&declared).to_string();
            let address = view.at(&declared);
            let (pointer, item) = view.deref(declared, item)?;
            let shared = self.resolve_parameters(&pointer, item)?;
            let mut operations = Vec::new();
            for method in Method::ALL {
                let Some(operation) = item.get(method.as_str()) else {
                    continue;
                };
                operations.push(self.operation(
                    &builder,
                    method,
                    child(&pointer, method.as_str()),
                    operation,
                    &shared,
                )?);
            }
            builder.push_path(address, &pattern, operations)?;
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::load_api_model_from_str;
    use crate::schema::{SchemaDialect, SchemaType};
    use pretty_assertions::assert_eq;

    const STORE: &str = r#"
swagger: "2.0"
info:
  title: Store
  version: "1"
consumes:
  - application/json
  - application/xml
produces:
  - application/json
securityDefinitions:
  basic:
    type: basic
parameters:
  Limit:
    name: limit
    in: query
    type: integer
paths:
  /orders:
    post:
      operationId: createOrder
      security:
        - basic: []
      parameters:
        - $ref: '#/parameters/Limit'
        - name: order
          in: body
          required: true
          schema:
            $ref: '#/definitions/Order'
      responses:
        '201':
          description: created
          headers:
            Location:
              type: string
          schema:
            $ref: '#/definitions/Order'
        4XX:
          description: client error
  /uploads:
    post:
      consumes:
        - multipart/form-data
      parameters:
        - name: file
          in: formData
          type: file
      responses:
        default:
          description: done
definitions:
  Order:
    type: object
    properties:
      id:
        type: integer
        x-nullable: true
"#;

    #[tokio::test]
    async fn test_build_model() {
        let model = load_api_model_from_str(
            "https://example.com/store.yaml",
            STORE,
            Default::default(),
            &Default::default(),
        )
        .await
        .unwrap();

        assert_eq!(model.authentication()[0].name, "basic");
        let create = model.find_operation("createOrder").unwrap();
        assert_eq!(create.query_parameters[0].name, "limit");
        assert_eq!(
            create.query_parameters[0].address.pointer(),
            "/paths/~1orders/post/parameters/0"
        );
        let limit = model.schema(create.query_parameters[0].schema.as_ref().unwrap()).unwrap();
        assert_eq!(limit.address.pointer(), "/parameters/Limit");
        assert_eq!(limit.dialect, SchemaDialect::Swagger2);
        assert_eq!(limit.content.types, vec![SchemaType::Integer]);

        let types: Vec<&str> = create.bodies.iter().map(|b| b.content_type.as_str()).collect();
        assert_eq!(types, vec!["application/json", "application/xml"]);

        let created = &create.operation_results[0];
        assert_eq!(created.header_parameters[0].name, "Location");
        assert_eq!(created.bodies.len(), 1);
        assert_eq!(create.operation_results[1].status_codes.len(), 100);

        let upload = &model.path(2).unwrap().operations[0];
        assert_eq!(upload.bodies.len(), 1);
        assert_eq!(upload.bodies[0].content_type, "multipart/form-data");
        assert!(upload.bodies[0].schema.is_none());
        assert!(upload.authentication_requirements.is_empty());

        let order = model
            .schemas()
            .iter()
            .find(|e| e.address.pointer() == "/definitions/Order/properties/id")
            .unwrap();
        assert_eq!(order.content.types, vec![SchemaType::Integer, SchemaType::Null]);
    }

    #[tokio::test]
    async fn test_unknown_parameter_location_fails() {
        let text = r#"
swagger: "2.0"
info: { title: t, version: "1" }
paths:
  /a:
    get:
      parameters:
        - name: x
          in: matrix
          type: string
      responses:
        '200': { description: ok }
"#;
        let err = load_api_model_from_str(
            "https://example.com/a.yaml",
            text,
            Default::default(),
            &Default::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Document(_)));
    }
}
