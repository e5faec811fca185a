#![deny(missing_docs)]

//! # API Model Core
//!
//! Loads OpenAPI 3 and Swagger 2.0 documents, resolves every embedded schema
//! (whatever its dialect) into one addressable registry, and builds a
//! read-only `ApiModel` for code emitters.

/// Shared error types.
pub mod error;

/// Canonical node addresses.
pub mod address;

/// Load options.
pub mod config;

/// Schema dialects, registry and document loading.
pub mod schema;

/// API model records.
pub mod model;

/// Model assembly.
pub mod builder;

/// Description-format adapters.
pub mod document;

/// Path-pattern route table.
pub mod router;

/// Response status partitioning.
pub mod status;

pub use address::CanonicalAddress;
pub use config::{ModelOptions, NamingOptions};
pub use document::{load_api_model, load_api_model_from_str, DocumentAdapter, DocumentFormat};
pub use error::{AppError, AppResult};
pub use model::{
    ApiModel, AuthenticationModel, AuthenticationRequirement, AuthenticationScope, BodyModel,
    Method, OperationModel, OperationResultModel, ParameterLocation, ParameterModel, PathModel,
    SchemaRef,
};
pub use router::{RouteMatch, RouteParameters, RouteTable};
pub use schema::{
    DialectTable, DocumentFetcher, DocumentLoader, FileFetcher, IntermediateSchemaConsumer,
    MemoryFetcher, NoFetcher, SchemaArena, SchemaContent, SchemaDialect, SchemaEntry,
    SchemaRegistry, SchemaType,
};
pub use status::{partition_status_codes, sort_status_keys, status_kind_comparer, StatusKind};
