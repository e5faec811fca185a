//! # Error Handling
//!
//! Provides the unified `AppError` enum used across the crate.
//!
//! Every variant is fatal for the enclosing load or build call: a document
//! either resolves completely or the operation fails as a whole.

use derive_more::{Display, From};

/// The Global Error Enum.
///
/// We use `derive_more` for boilerplate.
/// Only `std::io::Error` converts implicitly; every other variant is created
/// explicitly so the error kind always matches the failing stage.
#[derive(Debug, Display, From)]
pub enum AppError {
    /// Wrapper for standard IO errors (raised by the file fetcher).
    #[display("IO Error: {_0}")]
    Io(std::io::Error),

    /// A malformed base location or JSON pointer.
    #[from(ignore)]
    #[display("Address Error: {_0}")]
    Address(String),

    /// No usable dialect marker for a schema node.
    #[from(ignore)]
    #[display("Dialect Error: {_0}")]
    Dialect(String),

    /// A reference that cannot be resolved to a known address.
    #[from(ignore)]
    #[display("Reference Error: {_0}")]
    Reference(String),

    /// A reference-valued entry where only a direct value is supported.
    #[from(ignore)]
    #[display("Unsupported Construct: {_0}")]
    UnsupportedConstruct(String),

    /// A document whose structure does not match its declared format.
    #[from(ignore)]
    #[display("Document Error: {_0}")]
    Document(String),

    /// Route table compilation, lookup or reload failures.
    #[from(ignore)]
    #[display("Route Error: {_0}")]
    Route(String),
}

/// Manual implementation of the standard Error trait.
impl std::error::Error for AppError {}

/// Helper type alias for Result using AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_conversion() {
        let io_err = Error::new(ErrorKind::Other, "test");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
    }

    #[test]
    fn test_reference_display_names_address() {
        let app_err = AppError::Reference("unresolved 'file:///a.yaml#/x'".into());
        assert_eq!(
            format!("{}", app_err),
            "Reference Error: unresolved 'file:///a.yaml#/x'"
        );
    }

    #[test]
    fn test_unsupported_construct_display() {
        let app_err = AppError::UnsupportedConstruct("operation $ref".into());
        assert_eq!(format!("{}", app_err), "Unsupported Construct: operation $ref");
    }
}
