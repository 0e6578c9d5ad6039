use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] notememo_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] notememo_core::ConfigError),
    #[error("No note content provided")]
    EmptyContent,
    #[error("Edited note content cannot be empty")]
    EmptyEditedContent,
    #[error("Note ID cannot be empty")]
    EmptyNoteId,
    #[error("Search query cannot be empty")]
    EmptySearchQuery,
    #[error("Note not found for id/prefix: {0}")]
    NoteNotFound(String),
    #[error("{0}")]
    AmbiguousNoteId(String),
    #[error("Category not found: {0}")]
    CategoryNotFound(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Sync failed: {0}")]
    SyncFailed(String),
    #[error(
        "Sync is not configured. Set NOTEMEMO_SYNC_ENABLED=true, NOTEMEMO_API_URL and NOTEMEMO_ACCESS_CODE to enable `notememo sync`."
    )]
    SyncNotConfigured,
}
