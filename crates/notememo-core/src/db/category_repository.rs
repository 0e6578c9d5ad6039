//! Category repository implementation

use rusqlite::{params, Connection};

use super::note_repository::reassign_category;
use super::store::LocalStore;
use super::Database;
use crate::error::{Error, Result};
use crate::merge::remove_duplicate_categories;
use crate::models::{default_categories, NoteCategory, RecordId, SyncRecord, OTHER_CATEGORY};
use crate::util::{from_millis, now};

/// Trait for category storage operations
pub trait CategoryRepository {
    /// All categories in display order
    fn list(&self) -> Result<Vec<NoteCategory>>;

    /// Create a category; names must be unique case-insensitively
    fn create(&self, name: &str, description: Option<String>) -> Result<NoteCategory>;

    /// Rename a category and move its notes along with it
    fn rename(&self, id: &RecordId, name: &str, description: Option<String>)
        -> Result<NoteCategory>;

    /// Delete a category, moving its notes to the fallback category
    fn delete(&self, id: &RecordId) -> Result<NoteCategory>;

    /// Replace the whole set with its deduplicated form
    fn replace_categories(&self, categories: Vec<NoteCategory>) -> Result<Vec<NoteCategory>>;
}

/// `SQLite` implementation of `CategoryRepository`
pub struct SqliteCategoryRepository<'a> {
    db: &'a Database,
}

impl<'a> SqliteCategoryRepository<'a> {
    /// Create a new repository over the given database
    pub const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn find(&self, id: &RecordId) -> Result<NoteCategory> {
        self.list()?
            .into_iter()
            .find(|category| &category.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn ensure_unique_name(&self, name: &str, except: Option<&RecordId>) -> Result<()> {
        let key = name.trim().to_lowercase();
        let taken = self
            .list()?
            .iter()
            .any(|category| category.name_key() == key && Some(&category.id) != except);
        if taken {
            return Err(Error::DuplicateCategory(name.trim().to_string()));
        }
        Ok(())
    }
}

impl CategoryRepository for SqliteCategoryRepository<'_> {
    fn list(&self) -> Result<Vec<NoteCategory>> {
        self.db
            .with_connection(|conn| read(conn))
            .unwrap_or_else(|| Ok(default_categories()))
    }

    fn create(&self, name: &str, description: Option<String>) -> Result<NoteCategory> {
        let category = NoteCategory::new(name, description);
        category.validate()?;
        self.ensure_unique_name(&category.name, None)?;

        self.db
            .with_connection(|conn| {
                let tx = conn.transaction()?;
                upsert_all(&tx, std::slice::from_ref(&category))?;
                tx.commit()?;
                Ok(())
            })
            .unwrap_or(Ok(()))?;

        tracing::debug!("Created category {}", category.name);
        Ok(category)
    }

    fn rename(
        &self,
        id: &RecordId,
        name: &str,
        description: Option<String>,
    ) -> Result<NoteCategory> {
        let mut category = self.find(id)?;
        if category.is_other() {
            return Err(Error::ProtectedCategory(category.name));
        }
        self.ensure_unique_name(name, Some(id))?;

        let previous = category.name.clone();
        category.rename(name, description);
        category.validate()?;
        if category.is_other() {
            return Err(Error::DuplicateCategory(OTHER_CATEGORY.to_string()));
        }

        self.db
            .with_connection(|conn| {
                let tx = conn.transaction()?;
                upsert_all(&tx, std::slice::from_ref(&category))?;
                if previous != category.name {
                    let moved = reassign_category(&tx, &previous, &category.name, now())?;
                    tracing::debug!("Moved {moved} notes from {previous} to {}", category.name);
                }
                tx.commit()?;
                Ok(())
            })
            .unwrap_or(Ok(()))?;

        Ok(category)
    }

    fn delete(&self, id: &RecordId) -> Result<NoteCategory> {
        let category = self.find(id)?;
        if category.is_other() {
            return Err(Error::ProtectedCategory(category.name));
        }

        self.db
            .with_connection(|conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM categories WHERE id = ?1",
                    params![category.id.as_str()],
                )?;
                let moved = reassign_category(&tx, &category.name, OTHER_CATEGORY, now())?;
                tracing::debug!("Moved {moved} notes from {} to {OTHER_CATEGORY}", category.name);
                // Deleting the last categories must not lose the fallback
                let remaining = read(&tx)?;
                if !remaining.iter().any(NoteCategory::is_other) {
                    replace_all(&tx, &remove_duplicate_categories(remaining))?;
                }
                tx.commit()?;
                Ok(())
            })
            .unwrap_or(Ok(()))?;

        Ok(category)
    }

    fn replace_categories(&self, categories: Vec<NoteCategory>) -> Result<Vec<NoteCategory>> {
        let resolved = remove_duplicate_categories(categories);
        for category in &resolved {
            category.validate()?;
        }

        self.db
            .with_connection(|conn| {
                let tx = conn.transaction()?;
                replace_all(&tx, &resolved)?;
                tx.commit()?;
                Ok(())
            })
            .unwrap_or(Ok(()))?;

        Ok(resolved)
    }
}

impl LocalStore<NoteCategory> for Database {
    fn read_all(&self) -> Result<Vec<NoteCategory>> {
        SqliteCategoryRepository::new(self).list()
    }

    fn is_available(&self) -> bool {
        Self::is_available(self)
    }

    // Categories are never tombstoned
    fn read_all_including_tombstones(&self) -> Result<Vec<NoteCategory>> {
        SqliteCategoryRepository::new(self).list()
    }

    fn get(&self, id: &RecordId) -> Result<Option<NoteCategory>> {
        Ok(SqliteCategoryRepository::new(self)
            .list()?
            .into_iter()
            .find(|category| &category.id == id))
    }

    fn upsert_many(&self, records: &[NoteCategory]) -> Result<usize> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let changed = upsert_all(&tx, records)?;
            tx.commit()?;
            Ok(changed)
        })
        .unwrap_or(Ok(0))
    }

    fn persist_resolved(&self, records: &[NoteCategory]) -> Result<()> {
        SqliteCategoryRepository::new(self)
            .replace_categories(records.to_vec())
            .map(|_| ())
    }
}

/// Swap the stored set for `categories`, keeping their order
pub(crate) fn replace_all(conn: &Connection, categories: &[NoteCategory]) -> Result<()> {
    conn.execute("DELETE FROM categories", [])?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO categories (id, name, description, updated_at, position)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (position, category) in (0_i64..).zip(categories) {
        stmt.execute(params![
            category.id.as_str(),
            category.name,
            category.description,
            category.updated_at.map(|at| at.timestamp_millis()),
            position,
        ])?;
    }
    Ok(())
}

/// Insert or replace categories unless the stored copy is strictly newer.
///
/// A missing `updated_at` orders before any present one.
fn upsert_all(conn: &Connection, categories: &[NoteCategory]) -> Result<usize> {
    let next_position: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position), -1) + 1 FROM categories",
        [],
        |row| row.get(0),
    )?;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO categories (id, name, description, updated_at, position)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            updated_at = excluded.updated_at
         WHERE categories.updated_at IS NULL
            OR (excluded.updated_at IS NOT NULL AND excluded.updated_at >= categories.updated_at)",
    )?;

    let mut changed = 0;
    for (position, category) in (next_position..).zip(categories) {
        category.validate()?;
        changed += stmt.execute(params![
            category.id.as_str(),
            category.name,
            category.description,
            category.updated_at.map(|at| at.timestamp_millis()),
            position,
        ])?;
    }
    Ok(changed)
}

fn read(conn: &Connection) -> Result<Vec<NoteCategory>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, updated_at FROM categories ORDER BY position, rowid",
    )?;
    let categories = stmt
        .query_map([], |row| {
            let updated_at: Option<i64> = row.get(3)?;
            Ok(NoteCategory {
                id: RecordId::from(row.get::<_, String>(0)?),
                name: row.get(1)?,
                description: row.get(2)?,
                updated_at: updated_at.and_then(from_millis),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(categories)
}

/// Count visible notes per category name
pub fn note_counts(db: &Database) -> Result<Vec<(String, usize)>> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM notes WHERE deleted = 0 GROUP BY category",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    })
    .unwrap_or_else(|| Ok(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NoteRepository, SqliteNoteRepository};
    use crate::models::NoteDraft;
    use crate::util::parse_iso;
    use pretty_assertions::assert_eq;

    fn names(categories: &[NoteCategory]) -> Vec<&str> {
        categories.iter().map(|c| c.name.as_str()).collect()
    }

    fn category(id: &str, name: &str, updated_at: Option<&str>) -> NoteCategory {
        NoteCategory {
            id: RecordId::from(id),
            name: name.to_string(),
            description: None,
            updated_at: updated_at.and_then(parse_iso),
        }
    }

    #[test]
    fn test_fresh_store_has_default_categories() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteCategoryRepository::new(&db);
        assert_eq!(
            names(&repo.list().unwrap()),
            vec!["命令行工具", "软件教程", "开发技巧", OTHER_CATEGORY]
        );
    }

    #[test]
    fn test_create_rejects_case_insensitive_duplicate() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteCategoryRepository::new(&db);

        repo.create("Rust", None).unwrap();
        let result = repo.create("  rust ", None);
        assert!(matches!(result, Err(Error::DuplicateCategory(_))));
    }

    #[test]
    fn test_other_category_is_protected() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteCategoryRepository::new(&db);
        let other = RecordId::from("4");

        assert!(matches!(
            repo.rename(&other, "Misc", None),
            Err(Error::ProtectedCategory(_))
        ));
        assert!(matches!(repo.delete(&other), Err(Error::ProtectedCategory(_))));
    }

    #[test]
    fn test_rename_moves_notes() {
        let db = Database::open_in_memory().unwrap();
        let categories = SqliteCategoryRepository::new(&db);
        let notes = SqliteNoteRepository::new(&db);

        let created = categories.create("Rust", None).unwrap();
        let note = notes
            .create(NoteDraft {
                title: "ownership".to_string(),
                category: Some("Rust".to_string()),
                ..Default::default()
            })
            .unwrap();

        categories.rename(&created.id, "Rust lang", None).unwrap();

        let moved = notes.get(&note.id).unwrap().unwrap();
        assert_eq!(moved.category, "Rust lang");
        assert!(moved.updated_at >= note.updated_at);
    }

    #[test]
    fn test_rename_to_existing_name_fails() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteCategoryRepository::new(&db);
        let result = repo.rename(&RecordId::from("1"), "开发技巧", None);
        assert!(matches!(result, Err(Error::DuplicateCategory(_))));
    }

    #[test]
    fn test_delete_moves_notes_to_other() {
        let db = Database::open_in_memory().unwrap();
        let categories = SqliteCategoryRepository::new(&db);
        let notes = SqliteNoteRepository::new(&db);

        let git_note = RecordId::from("3");
        assert_eq!(notes.get(&git_note).unwrap().unwrap().category, "命令行工具");

        categories.delete(&RecordId::from("1")).unwrap();

        assert_eq!(notes.get(&git_note).unwrap().unwrap().category, OTHER_CATEGORY);
        assert!(!names(&categories.list().unwrap()).contains(&"命令行工具"));
    }

    #[test]
    fn test_replace_categories_dedups_and_keeps_other() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteCategoryRepository::new(&db);

        let resolved = repo
            .replace_categories(vec![
                category("a", "Rust", None),
                category("b", "Go", None),
                category("c", "RUST", None),
            ])
            .unwrap();

        assert_eq!(names(&resolved), vec!["RUST", "Go", OTHER_CATEGORY]);
        assert_eq!(repo.list().unwrap(), resolved);
    }

    #[test]
    fn test_upsert_prefers_timestamped_copy() {
        let db = Database::open_in_memory().unwrap();
        let newer = category("1", "renamed", Some("2024-05-01T00:00:00Z"));
        let stale = category("1", "stale", Some("2024-01-01T00:00:00Z"));

        LocalStore::<NoteCategory>::upsert_many(&db, &[newer]).unwrap();
        let changed = LocalStore::<NoteCategory>::upsert_many(&db, &[stale]).unwrap();
        assert_eq!(changed, 0);

        let stored = LocalStore::<NoteCategory>::get(&db, &RecordId::from("1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "renamed");

        let untimed = category("1", "untimed", None);
        LocalStore::<NoteCategory>::upsert_many(&db, &[untimed]).unwrap();
        let stored = LocalStore::<NoteCategory>::get(&db, &RecordId::from("1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "renamed");
    }

    #[test]
    fn test_note_counts() {
        let db = Database::open_in_memory().unwrap();
        let counts = note_counts(&db).unwrap();
        let tutorials = counts.iter().find(|(name, _)| name == "软件教程").unwrap();
        assert_eq!(tutorials.1, 2);
    }

    #[test]
    fn test_unavailable_store_serves_defaults() {
        let db = Database::unavailable();
        let repo = SqliteCategoryRepository::new(&db);
        assert_eq!(repo.list().unwrap(), default_categories());
        let created = repo.create("Ephemeral", None).unwrap();
        assert!(!repo.list().unwrap().contains(&created));
    }
}
