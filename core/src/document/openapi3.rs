//! # OpenAPI 3 Adapter
//!
//! Covers 3.0 and 3.1 documents. Parameters, request bodies, responses,
//! headers, path items and security schemes may be local `$ref`s to
//! `components`; they are followed before modeling.

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

/// Adapter for `openapi: 3.x` documents.
#[derive(Debug, Clone, Copy)]
pub struct OpenApi3Adapter<'a> {
    view: DocumentView<'a>,
}

impl<'a> OpenApi3Adapter<'a> {
    /// Adapter over a sniffed OpenAPI 3 document.
    pub fn new(view: DocumentView<'a>) -> Self {
        Self { view }
    }

    fn paths(self) -> impl Iterator<Item = Selected<'a>> + 'a {
        members(vec!["paths".to_string()], self.view.root().get("paths"))
            .filter(|(pointer, _)| !is_extension(pointer))
    }

    /// Schema positions below one parameter or header (`schema`, or `content.*.schema`).
    fn value_schemas(self, pointer: Pointer, node: &'a Value) -> SchemaIter<'a> {
        let Ok((pointer, node)) = self.view.deref(pointer, node) else {
            return Box::new(iter::empty());
        };
        match node.get("schema") {
            Some(schema) => Box::new(iter::once((child(&pointer, "schema"), schema))),
            None => Box::new(content_schemas(child(&pointer, "content"), node.get("content"))),
        }
    }

    /// Schema positions below a request body or response.
    fn payload_schemas(self, pointer: Pointer, node: &'a Value) -> SchemaIter<'a> {
        let Ok((pointer, node)) = self.view.deref(pointer, node) else {
            return Box::new(iter::empty());
        };
        let headers = members(child(&pointer, "headers"), node.get("headers"))
            .flat_map(move |(p, header)| self.value_schemas(p, header));
        Box::new(headers.chain(content_schemas(child(&pointer, "content"), node.get("content"))))
    }

    fn operation_schemas(self, pointer: Pointer, operation: &'a Value) -> impl Iterator<Item = Selected<'a>> + 'a {
        let parameters = items(child(&pointer, "parameters"), operation.get("parameters"))
            .flat_map(move |(p, node)| self.value_schemas(p, node));
        let body = operation
            .get("requestBody")
            .map(|node| (child(&pointer, "requestBody"), node))
            .into_iter()
            .flat_map(move |(p, node)| self.payload_schemas(p, node));
        let responses = members(child(&pointer, "responses"), operation.get("responses"))
            .filter(|(p, _)| !is_extension(p))
            .flat_map(move |(p, node)| self.payload_schemas(p, node));
        parameters.chain(body).chain(responses)
    }

    fn parameters(
        self,
        builder: &ApiModelBuilder,
        pointer: &[String],
        owner: &'a Value,
    ) -> AppResult<Vec<(ParameterLocation, ParameterModel)>> {
        items(child(pointer, "parameters"), owner.get("parameters"))
            .map(|(declared, node)| {
                let address = self.view.at(&declared);
                let (resolved, node) = self.view.deref(declared, node)?;
                let name = str_field(node, "name").ok_or_else(|| {
                    AppError::Document(format!("Parameter at '{}' has no name", address))
                })?;
                let location = str_field(node, "in").ok_or_else(|| {
                    AppError::Document(format!("Parameter at '{}' has no location", address))
                })?;
                let location = ParameterLocation::parse(&location)?;
                let schema = self
                    .value_schema_pointer(&resolved, node)
                    .map(|p| builder.schema_ref(&self.view.at(&p)));
                Ok((
                    location,
                    ParameterModel {
                        address,
                        name,
                        required: bool_field(node, "required"),
                        schema,
                    },
                ))
            })
            .collect()
    }

    fn value_schema_pointer(self, pointer: &[String], node: &Value) -> Option<Pointer> {
        if node.get("schema").is_some() {
            return Some(child(pointer, "schema"));
        }
        let content = child(pointer, "content");
        let (first, media) = members(content, node.get("content")).next()?;
        media.get("schema").map(|_| child(&first, "schema"))
    }

    fn bodies(self, builder: &ApiModelBuilder, pointer: &[String], node: &'a Value) -> Vec<BodyModel> {
        members(child(pointer, "content"), node.get("content"))
            .map(|(media_pointer, media)| BodyModel {
                address: self.view.at(&media_pointer),
                content_type: key_of(&media_pointer).to_string(),
                schema: media
                    .get("schema")
                    .map(|_| builder.schema_ref(&self.view.at(&child(&media_pointer, "schema")))),
            })
            .collect()
    }

    fn responses(
        self,
        builder: &ApiModelBuilder,
        pointer: &[String],
        operation: &'a Value,
    ) -> AppResult<Vec<ResponseDraft>> {
        members(child(pointer, "responses"), operation.get("responses"))
            .filter(|(p, _)| !is_extension(p))
            .map(|(declared, node)| {
                let key = key_of(&declared).to_string();
                let address = self.view.at(&declared);
                let (resolved, node) = self.view.deref(declared, node)?;
                let header_parameters = members(child(&resolved, "headers"), node.get("headers"))
                    .map(|(header_pointer, header)| {
                        let header_address = self.view.at(&header_pointer);
                        let name = key_of(&header_pointer).to_string();
                        let (header_resolved, header) = self.view.deref(header_pointer, header)?;
                        Ok(ParameterModel {
                            address: header_address,
                            name,
                            required: bool_field(header, "required"),
                            schema: self
                                .value_schema_pointer(&header_resolved, header)
                                .map(|p| builder.schema_ref(&self.view.at(&p))),
                        })
                    })
                    .collect::<AppResult<Vec<_>>>()?;
                Ok(ResponseDraft {
                    key,
                    address,
                    description: str_field(node, "description"),
                    header_parameters,
                    bodies: self.bodies(builder, &resolved, node),
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
        inherited: &[(ParameterLocation, ParameterModel)],
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

        let mut parameters = inherited.to_vec();
        parameters.extend(self.parameters(builder, &pointer, operation)?);

        let bodies = match operation.get("requestBody") {
            Some(body) => {
                let (resolved, body) = self.view.deref(child(&pointer, "requestBody"), body)?;
                self.bodies(builder, &resolved, body)
            }
            None => Vec::new(),
        };

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
            responses: self.responses(builder, &pointer, operation)?,
            address,
        })
    }
}

/// `content.*.schema` positions.
fn content_schemas<'a>(pointer: Pointer, content: Option<&'a Value>) -> impl Iterator<Item = Selected<'a>> + 'a {
    members(pointer, content).filter_map(|(media_pointer, media)| {
        media
            .get("schema")
            .map(|schema| (child(&media_pointer, "schema"), schema))
    })
}

impl DocumentAdapter for OpenApi3Adapter<'_> {
    fn select_schemas<'s>(&'s self) -> SchemaIter<'s> {
        let adapter: OpenApi3Adapter<'s> = *self;
        let view = adapter.view;
        let components = members(
            vec!["components".to_string(), "schemas".to_string()],
            view.get(&["components", "schemas"]),
        );
        let paths = adapter.paths().flat_map(move |(pointer, item)| {
            let Ok((pointer, item)) = view.deref(pointer, item) else {
                return Box::new(iter::empty()) as SchemaIter<'s>;
            };
            let shared = items(child(&pointer, "parameters"), item.get("parameters"))
                .flat_map(move |(p, node)| adapter.value_schemas(p, node));
            let operations = Method::ALL.into_iter().filter_map(move |method| {
                item.get(method.as_str())
                    .filter(|op| op.get("$ref").is_none())
                    .map(|op| (child(&pointer, method.as_str()), op))
            });
            let operations = operations.flat_map(move |(p, op)| adapter.operation_schemas(p, op));
            Box::new(shared.chain(operations))
        });
        Box::new(components.chain(paths))
    }

    fn build_api_model(&self, schemas: SchemaArena) -> AppResult<ApiModel> {
        let view = self.view;
        let mut builder = ApiModelBuilder::new(view.address().clone(), schemas);

        let schemes = members(
            vec!["components".to_string(), "securitySchemes".to_string()],
            view.get(&["components", "securitySchemes"]),
        );
        for (pointer, node) in schemes {
            let name = key_of(&pointer).to_string();
            view.deref(pointer, node)?;
            builder.push_authentication(&name);
        }

        for (declared, item) in self.paths() {
            let pattern = key_of(&declared).to_string();
            let address = view.at(&declared);
            let (pointer, item) = view.deref(declared, item)?;
            let shared = self.parameters(&builder, &pointer, item)?;
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
    use crate::address::CanonicalAddress;
    use crate::schema::loader::parse_document_str;
    use pretty_assertions::assert_eq;

    const PETSTORE: &str = r#"
openapi: 3.0.3
info:
  title: Pets
  version: "1"
security:
  - apiKey: []
paths:
  /pets/{petId}:
    parameters:
      - name: petId
        in: path
        required: true
        schema:
          type: string
      - $ref: '#/components/parameters/Trace'
    get:
      operationId: getPet
      parameters:
        - name: verbose
          in: query
          schema:
            type: boolean
        - name: petId
          in: header
          schema:
            type: string
      responses:
        '200':
          description: ok
          headers:
            x-rate-limit:
              schema:
                type: integer
          content:
            application/json:
              schema:
                $ref: '#/components/schemas/Pet'
        default:
          $ref: '#/components/responses/Error'
    put:
      security: []
      requestBody:
        $ref: '#/components/requestBodies/PetBody'
      responses:
        '204':
          description: updated
  x-internal:
    get:
      responses: {}
components:
  parameters:
    Trace:
      name: X-Trace
      in: header
      schema:
        type: string
  requestBodies:
    PetBody:
      content:
        application/json:
          schema:
            $ref: '#/components/schemas/Pet'
        text/plain:
          schema:
            type: string
  responses:
    Error:
      description: failure
      content:
        application/json:
          schema:
            type: object
            properties:
              message:
                type: string
  securitySchemes:
    apiKey:
      type: apiKey
      in: header
      name: X-Key
  schemas:
    Pet:
      type: object
      required: [name]
      properties:
        name:
          type: string
"#;

    fn address() -> CanonicalAddress {
        CanonicalAddress::parse("https://example.com/pets.yaml").unwrap()
    }

    #[test]
    fn test_select_schemas_covers_all_positions() {
        let address = address();
        let root = parse_document_str(&address, PETSTORE).unwrap();
        let adapter = OpenApi3Adapter::new(DocumentView::new(&address, &root).unwrap());
        let selected: Vec<String> = adapter
            .select_schemas()
            .map(|(pointer, _)| address.append(&pointer).pointer().to_string())
            .collect();
        assert_eq!(
            selected,
            vec![
                "/components/schemas/Pet",
                "/paths/~1pets~1%7BpetId%7D/parameters/0/schema",
                "/components/parameters/Trace/schema",
                "/paths/~1pets~1%7BpetId%7D/get/parameters/0/schema",
                "/paths/~1pets~1%7BpetId%7D/get/parameters/1/schema",
                "/paths/~1pets~1%7BpetId%7D/get/responses/200/headers/x-rate-limit/schema",
                "/paths/~1pets~1%7BpetId%7D/get/responses/200/content/application~1json/schema",
                "/components/responses/Error/content/application~1json/schema",
                "/components/requestBodies/PetBody/content/application~1json/schema",
                "/components/requestBodies/PetBody/content/text~1plain/schema",
            ]
        );
    }

    #[tokio::test]
    async fn test_build_model() {
        let address = address();
        let root = parse_document_str(&address, PETSTORE).unwrap();
        let model = crate::document::load_api_model(
            &address,
            &root,
            Default::default(),
            &Default::default(),
        )
        .await
        .unwrap();

        assert_eq!(model.paths().len(), 1);
        assert_eq!(model.authentication()[0].name, "apiKey");
        let path = model.path(1).unwrap();
        assert_eq!(path.pattern, "/pets/{petId}");
        assert_eq!(path.operations.len(), 2);

        let get = model.find_operation("getPet").unwrap();
        let headers: Vec<&str> = get.header_parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(headers, vec!["X-Trace", "petId"]);
        assert_eq!(get.path_parameters[0].name, "petId");
        assert!(get.path_parameters[0].required);
        assert_eq!(get.authentication_requirements[0].schemes[0].name, "apiKey");
        assert_eq!(get.operation_results.len(), 2);
        let ok = &get.operation_results[0];
        assert_eq!(ok.status_codes.iter().copied().collect::<Vec<_>>(), vec![200]);
        assert_eq!(ok.header_parameters[0].name, "x-rate-limit");
        let pet = model.schema(ok.bodies[0].schema.as_ref().unwrap()).unwrap();
        assert_eq!(
            pet.content.reference.as_ref().map(|a| a.pointer()),
            Some("/components/schemas/Pet")
        );
        assert_eq!(get.operation_results[1].description.as_deref(), Some("failure"));

        let put = &path.operations[1];
        assert_eq!(put.method, Method::Put);
        assert_eq!(put.name, "");
        assert!(put.authentication_requirements.is_empty());
        let types: Vec<&str> = put.bodies.iter().map(|b| b.content_type.as_str()).collect();
        assert_eq!(types, vec!["application/json", "text/plain"]);

        let matched = model.router().match_path("/pets/42").unwrap();
        assert_eq!(*matched.key, 1);
        assert_eq!(matched.parameters["petId"], "42");
    }

    #[tokio::test]
    async fn test_operation_reference_is_unsupported() {
        let text = r#"
openapi: 3.1.0
info: { title: t, version: "1" }
paths:
  /a:
    get:
      $ref: '#/components/x'
"#;
        let err = crate::document::load_api_model_from_str(
            "https://example.com/a.yaml",
            text,
            Default::default(),
            &Default::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedConstruct(_)));
    }

    #[tokio::test]
    async fn test_invalid_status_key_is_document_error() {
        let text = r#"
openapi: 3.0.0
info: { title: t, version: "1" }
paths:
  /a:
    get:
      responses:
        '2X0':
          description: nope
"#;
        let err = crate::document::load_api_model_from_str(
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
