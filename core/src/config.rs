//! # Model Options
//!
//! Tunables for one model load, readable from YAML or JSON.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Options accepted by `load_api_model`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelOptions {
    /// Name given to a type when nothing better can be derived.
    pub default_type_name: String,
    /// Upper bound on name-disambiguation rounds.
    pub name_maximum_iterations: usize,
    /// Upper bound on schema transformation rounds.
    pub transform_maximum_iterations: usize,
    /// Dialect marker used when a schema node and its document declare none.
    /// Overrides the marker implied by the document format.
    pub fallback_dialect: Option<String>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            default_type_name: "schema-document".to_string(),
            name_maximum_iterations: 5,
            transform_maximum_iterations: 100,
            fallback_dialect: None,
        }
    }
}

impl ModelOptions {
    /// Reads options from a YAML (or JSON) string. Missing keys take defaults.
    pub fn from_yaml_str(text: &str) -> AppResult<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| AppError::Document(format!("Invalid model options: {}", e)))
    }

    /// The subset handed to an intermediate schema consumer.
    pub fn naming(&self) -> NamingOptions {
        NamingOptions {
            default_type_name: self.default_type_name.clone(),
            name_maximum_iterations: self.name_maximum_iterations,
            transform_maximum_iterations: self.transform_maximum_iterations,
        }
    }
}

/// Naming policy for `IntermediateSchemaConsumer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamingOptions {
    /// Fallback type name.
    pub default_type_name: String,
    /// Name convergence cap.
    pub name_maximum_iterations: usize,
    /// Transform convergence cap.
    pub transform_maximum_iterations: usize,
}

impl Default for NamingOptions {
    fn default() -> Self {
        ModelOptions::default().naming()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ModelOptions::default();
        assert_eq!(options.default_type_name, "schema-document");
        assert_eq!(options.name_maximum_iterations, 5);
        assert_eq!(options.transform_maximum_iterations, 100);
        assert!(options.fallback_dialect.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let options = ModelOptions::from_yaml_str(
            "defaultTypeName: root\nfallbackDialect: https://json-schema.org/draft/2020-12/schema\n",
        )
        .unwrap();
        assert_eq!(options.default_type_name, "root");
        assert_eq!(options.name_maximum_iterations, 5);
        assert_eq!(
            options.fallback_dialect.as_deref(),
            Some("https://json-schema.org/draft/2020-12/schema")
        );
    }

    #[test]
    fn test_invalid_options_are_document_errors() {
        let err = ModelOptions::from_yaml_str("nameMaximumIterations: many").unwrap_err();
        assert!(matches!(err, AppError::Document(_)));
    }
}
