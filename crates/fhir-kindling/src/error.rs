use std::collections::BTreeSet;

use thiserror::Error;

/// Error types for querying and generating FHIR resources
#[derive(Debug, Error)]
pub enum KindlingError {
    #[error("Unknown FHIR resource type: {0}")]
    UnknownResourceType(String),

    #[error("Required fields of {resource_type} not generated: {}", join_fields(.missing))]
    MissingRequiredFields {
        resource_type: String,
        missing: BTreeSet<String>,
    },

    #[error("Field '{field}' is already assigned by another field value or generator")]
    DuplicateFieldAssignment { field: String },

    #[error(
        "Field value list length does not match resource count for '{field}': \
         items in list: {actual}, resource count: {expected}"
    )]
    FieldValueCountMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Values for field '{field}' exhausted after {consumed} resources")]
    GeneratorExhausted { field: String, consumed: usize },

    #[error("Invalid {resource_type} resource: {message}")]
    SchemaValidation {
        resource_type: String,
        message: String,
    },

    #[error("HTTP {status} for {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid FHIR ID: {0}")]
    InvalidId(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

fn join_fields(fields: &BTreeSet<String>) -> String {
    fields.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

impl KindlingError {
    pub fn unknown_resource_type(resource_type: impl Into<String>) -> Self {
        Self::UnknownResourceType(resource_type.into())
    }

    pub fn missing_required_fields(
        resource_type: impl Into<String>,
        missing: impl IntoIterator<Item = String>,
    ) -> Self {
        Self::MissingRequiredFields {
            resource_type: resource_type.into(),
            missing: missing.into_iter().collect(),
        }
    }

    pub fn duplicate_field(field: impl Into<String>) -> Self {
        Self::DuplicateFieldAssignment {
            field: field.into(),
        }
    }

    pub fn schema_validation(resource_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            resource_type: resource_type.into(),
            message: message.into(),
        }
    }

    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Status code of a failed HTTP response, if this error came from one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownResourceType(_) | Self::InvalidId(_) | Self::SchemaValidation { .. } => {
                ErrorCategory::Validation
            }
            Self::MissingRequiredFields { .. }
            | Self::DuplicateFieldAssignment { .. }
            | Self::FieldValueCountMismatch { .. }
            | Self::GeneratorExhausted { .. } => ErrorCategory::Generation,
            Self::Http { .. } | Self::Transport(_) => ErrorCategory::Http,
            Self::Json(_) => ErrorCategory::Serialization,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for logging and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Generation,
    Http,
    Serialization,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Generation => write!(f, "generation"),
            Self::Http => write!(f, "http"),
            Self::Serialization => write!(f, "serialization"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for kindling operations
pub type Result<T> = std::result::Result<T, KindlingError>;
