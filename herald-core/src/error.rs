//! Error types for Herald

use std::fmt;

use thiserror::Error;

/// Result type alias for Herald operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Herald operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Submitted form data was rejected
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// A request or record could not be found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persistent store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Chat platform failure
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// A single rejected form field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Form field name (e.g. `link`, `reviewers`)
    pub field: &'static str,
    /// Human-readable message shown next to the field
    pub message: String,
}

/// Field-level validation failures, one per offending field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// Create an empty error set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error for a field; later errors for the same field are dropped
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        if self.0.iter().any(|e| e.field == field) {
            return;
        }
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Check if no errors were recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the recorded errors in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Get the error for a specific field
    pub fn get(&self, field: &str) -> Option<&FieldError> {
        self.0.iter().find(|e| e.field == field)
    }

    /// Convert into `Err` when any error was recorded
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}
