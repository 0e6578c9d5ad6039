//! notememo-core - Core library for NoteMemo
//!
//! This crate contains the note and category models, the local `SQLite`
//! store, and the offline-first sync engine shared by the API server and
//! the CLI.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod merge;
pub mod models;
pub mod sync;
pub mod util;

pub use config::{ConfigError, SyncConfig};
pub use error::{Error, Result};
pub use models::{Note, NoteCategory, RecordId, Timestamp};
pub use sync::{SyncService, SyncState, SyncStatus};
