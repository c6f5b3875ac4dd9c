//! Custom error types for history-trail
//!
//! This module defines the error hierarchy for the audit engine using thiserror
//! for ergonomic error definitions.

use thiserror::Error;

/// The main error type for history-trail operations
#[derive(Error, Debug)]
pub enum TrailError {
    /// No actor could be resolved for an audited change
    #[error(
        "Strict auditing violation: cannot log change for \"{entity_key}\": no actor_id found \
         in the ambient context, the sealed snapshot or the manual override"
    )]
    MissingActor { entity_key: String },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Invalid input from a caller
    #[error("Validation error: {0}")]
    Validation(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    /// Errors raised by the host persistence engine
    #[error("Storage error: {0}")]
    Storage(String),
}

impl TrailError {
    /// Create a "not found" error for an entity type the host does not know
    pub fn unknown_entity(entity_type: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Entity type".into(),
            identifier: entity_type.into(),
        }
    }

    /// Create a "not found" error for an audit record
    pub fn record_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Audit record".into(),
            identifier: identifier.into(),
        }
    }

    /// Check if this is a strict auditing violation
    pub fn is_missing_actor(&self) -> bool {
        matches!(self, Self::MissingActor { .. })
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for TrailError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TrailError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for history-trail operations
pub type TrailResult<T> = Result<T, TrailError>;
