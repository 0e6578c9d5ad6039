//! Local persistence for NoteMemo

mod category_repository;
mod connection;
mod migrations;
mod note_repository;
mod settings_repository;
mod store;

pub use category_repository::{note_counts, CategoryRepository, SqliteCategoryRepository};
pub use connection::Database;
pub use note_repository::{NoteRepository, SqliteNoteRepository};
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository, LWW_STRATEGY};
pub use store::{ConflictLog, LocalStore, WatermarkStore};
