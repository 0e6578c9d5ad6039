//! Error types for notememo-core

use thiserror::Error;

/// Result type alias using notememo-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in notememo-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The permanent fallback category cannot be renamed or deleted
    #[error("Category '{0}' is protected and cannot be changed")]
    ProtectedCategory(String),

    /// A category with the same (case-insensitive) name already exists
    #[error("Category already exists: {0}")]
    DuplicateCategory(String),
}
