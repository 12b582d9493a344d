//! Error types for the database layer.

use thiserror::Error;

/// Database operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors.
///
/// Variants fall into four groups: configuration (`UnknownDatatype`,
/// `InvalidIdentifier`, `Config`), validation (`Validation`), not-found
/// (`NotFound`) and infrastructure (`Sqlx`, `Io`, `Serialization`).
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON conversion error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found, or an update/close/delete that affected zero rows
    #[error("Not found: {0}")]
    NotFound(String),

    /// A value failed its column's check, or a required column is missing
    #[error("Invalid value for column '{column}': {message}")]
    Validation { column: String, message: String },

    /// Category or column name that is unsafe to interpolate into SQL
    #[error("Invalid identifier: {0:?} (only ASCII letters, digits and '_' are allowed)")]
    InvalidIdentifier(String),

    /// Datatype id or name missing from the registry
    #[error("Unknown datatype: {0}")]
    UnknownDatatype(String),

    /// Malformed seed, template or category definition
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pending pointer not of the form "<category>:<id>"
    #[error("Invalid pending pointer: {0:?}")]
    InvalidPointer(String),
}

impl DbError {
    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error for a column.
    pub fn validation(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// True for errors caused by definitions rather than input or infrastructure.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::UnknownDatatype(_) | Self::InvalidIdentifier(_) | Self::Config(_)
        )
    }
}
