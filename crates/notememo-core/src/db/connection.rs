//! Database connection management

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;

use super::migrations;
use crate::error::{Error, Result};

const SEEDED_KEY: &str = "seeded";

/// On-device `SQLite` store.
///
/// A `Database` may be *unavailable* (the file could not be opened). In that
/// state repositories serve the built-in seed data and silently drop writes,
/// so the app stays usable when persistence is broken.
pub struct Database {
    conn: Option<Mutex<Connection>>,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations and seeds a fresh store automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::initialize(conn)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    /// Open the database, degrading to an unavailable store on failure
    pub fn open_or_unavailable(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(db) => db,
            Err(error) => {
                tracing::warn!(
                    "Local storage at {} is unavailable, serving built-in data: {}",
                    path.display(),
                    error
                );
                Self::unavailable()
            }
        }
    }

    /// A store with no backing file
    #[must_use]
    pub const fn unavailable() -> Self {
        Self { conn: None }
    }

    /// Whether writes are persisted
    pub const fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    /// Run `f` against the connection, or return `None` when unavailable
    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Option<Result<T>> {
        let conn = self.conn.as_ref()?;
        let mut guard = match conn.lock() {
            Ok(guard) => guard,
            Err(_) => {
                return Some(Err(Error::Database(
                    "local database lock poisoned".to_string(),
                )))
            }
        };
        Some(f(&mut guard))
    }

    fn initialize(mut conn: Connection) -> Result<Self> {
        configure(&conn)?;
        migrations::run(&mut conn)?;
        seed_if_new(&mut conn)?;
        Ok(Self {
            conn: Some(Mutex::new(conn)),
        })
    }
}

/// Configure `SQLite` for a single-writer local store
fn configure(conn: &Connection) -> Result<()> {
    // In-memory databases reject WAL; that's fine
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

/// Write the sample notes and default categories into a brand new store
fn seed_if_new(conn: &mut Connection) -> Result<()> {
    let seeded: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM settings WHERE key = ?1)",
        [SEEDED_KEY],
        |row| row.get(0),
    )?;
    if seeded {
        return Ok(());
    }

    let tx = conn.transaction()?;
    super::category_repository::replace_all(&tx, &crate::models::default_categories())?;
    super::note_repository::upsert_all(&tx, &crate::models::sample_notes())?;
    tx.execute(
        "INSERT INTO settings (key, value) VALUES (?1, 'true')",
        [SEEDED_KEY],
    )?;
    tx.commit()?;

    tracing::debug!("Seeded new local store with sample data");
    Ok(())
}
