//! Note repository implementation

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::store::LocalStore;
use super::Database;
use crate::error::{Error, Result};
use crate::models::{sample_notes, Note, NoteDraft, NotePatch, RecordId, SyncRecord};
use crate::util::from_millis;

/// Attempts at finding a free id before giving up on a create
const MAX_ID_ATTEMPTS: usize = 5;

const NOTE_COLUMNS: &str =
    "id, title, content, category, tags, created_at, updated_at, deleted, deleted_at";

/// Trait for note storage operations
pub trait NoteRepository {
    /// Create a new note
    fn create(&self, draft: NoteDraft) -> Result<Note>;

    /// Get a visible note by ID
    fn get(&self, id: &RecordId) -> Result<Option<Note>>;

    /// List visible notes, newest first
    fn list(&self) -> Result<Vec<Note>>;

    /// Patch a note and refresh its `updated_at`
    fn update(&self, id: &RecordId, patch: NotePatch) -> Result<Note>;

    /// Soft delete a note, leaving a tombstone for sync
    fn delete(&self, id: &RecordId) -> Result<Note>;

    /// Case-insensitive search over title, content, category and tags
    fn search(&self, query: &str) -> Result<Vec<Note>>;
}

/// `SQLite` implementation of `NoteRepository`
pub struct SqliteNoteRepository<'a> {
    db: &'a Database,
}

impl<'a> SqliteNoteRepository<'a> {
    /// Create a new repository over the given database
    pub const fn new(db: &'a Database) -> Self {
        Self { db }
    }

    fn seeded_visible() -> Vec<Note> {
        sample_notes().into_iter().filter(|note| !note.deleted).collect()
    }

    fn save(&self, note: &Note) -> Result<()> {
        self.db
            .with_connection(|conn| upsert_all(conn, std::slice::from_ref(note)).map(|_| ()))
            .unwrap_or(Ok(()))
    }
}

impl NoteRepository for SqliteNoteRepository<'_> {
    fn create(&self, draft: NoteDraft) -> Result<Note> {
        let mut note = Note::new(draft);
        note.validate()?;

        let Some(result) = self.db.with_connection(|conn| {
            for _ in 0..MAX_ID_ATTEMPTS {
                if insert_new(conn, &note)? {
                    return Ok(note.clone());
                }
                tracing::debug!("Note id {} already taken, regenerating", note.id);
                note.id = RecordId::generate();
            }
            Err(Error::Database("could not allocate a unique note id".into()))
        }) else {
            return Ok(note);
        };
        result
    }

    fn get(&self, id: &RecordId) -> Result<Option<Note>> {
        self.db
            .with_connection(|conn| {
                Ok(find(conn, id)?.filter(|note| !note.deleted))
            })
            .unwrap_or_else(|| {
                Ok(Self::seeded_visible()
                    .into_iter()
                    .find(|note| &note.id == id))
            })
    }

    fn list(&self) -> Result<Vec<Note>> {
        self.db
            .with_connection(|conn| read(conn, false))
            .unwrap_or_else(|| Ok(Self::seeded_visible()))
    }

    fn update(&self, id: &RecordId, patch: NotePatch) -> Result<Note> {
        let mut note = self
            .get(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        note.apply(patch);
        self.save(&note)?;
        Ok(note)
    }

    fn delete(&self, id: &RecordId) -> Result<Note> {
        let mut note = self
            .get(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        note.mark_deleted();
        self.save(&note)?;
        Ok(note)
    }

    fn search(&self, query: &str) -> Result<Vec<Note>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|note| note.matches(query))
            .collect())
    }
}

impl LocalStore<Note> for Database {
    fn read_all(&self) -> Result<Vec<Note>> {
        SqliteNoteRepository::new(self).list()
    }

    fn is_available(&self) -> bool {
        Self::is_available(self)
    }

    fn read_all_including_tombstones(&self) -> Result<Vec<Note>> {
        self.with_connection(|conn| read(conn, true))
            .unwrap_or_else(|| Ok(sample_notes()))
    }

    fn get(&self, id: &RecordId) -> Result<Option<Note>> {
        SqliteNoteRepository::new(self).get(id)
    }

    fn upsert_many(&self, records: &[Note]) -> Result<usize> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let changed = upsert_all(&tx, records)?;
            tx.commit()?;
            Ok(changed)
        })
        .unwrap_or(Ok(0))
    }
}

/// Insert or replace notes, keeping any stored copy that is strictly newer
pub(crate) fn upsert_all(conn: &Connection, notes: &[Note]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO notes (id, title, content, category, tags, created_at, updated_at, deleted, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            content = excluded.content,
            category = excluded.category,
            tags = excluded.tags,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            deleted = excluded.deleted,
            deleted_at = excluded.deleted_at
         WHERE excluded.updated_at >= notes.updated_at",
    )?;

    let mut changed = 0;
    for note in notes {
        note.validate()?;
        changed += stmt.execute(params![
            note.id.as_str(),
            note.title,
            note.content,
            note.category,
            serde_json::to_string(&note.tags)?,
            note.created_at.timestamp_millis(),
            note.updated_at.timestamp_millis(),
            i32::from(note.deleted),
            note.deleted_at.map(|at| at.timestamp_millis()),
        ])?;
    }
    Ok(changed)
}

/// Insert a note only if its id is free; `false` means the id was taken
fn insert_new(conn: &Connection, note: &Note) -> Result<bool> {
    let rows = conn.execute(
        "INSERT INTO notes (id, title, content, category, tags, created_at, updated_at, deleted, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, NULL)
         ON CONFLICT(id) DO NOTHING",
        params![
            note.id.as_str(),
            note.title,
            note.content,
            note.category,
            serde_json::to_string(&note.tags)?,
            note.created_at.timestamp_millis(),
            note.updated_at.timestamp_millis(),
        ],
    )?;
    Ok(rows == 1)
}

fn read(conn: &Connection, include_deleted: bool) -> Result<Vec<Note>> {
    let sql = if include_deleted {
        format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY updated_at DESC")
    } else {
        format!("SELECT {NOTE_COLUMNS} FROM notes WHERE deleted = 0 ORDER BY updated_at DESC")
    };
    let mut stmt = conn.prepare(&sql)?;
    let notes = stmt
        .query_map([], parse_note)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(notes)
}

fn find(conn: &Connection, id: &RecordId) -> Result<Option<Note>> {
    let note = conn
        .query_row(
            &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
            params![id.as_str()],
            parse_note,
        )
        .optional()?;
    Ok(note)
}

/// Rewrite the category of visible notes, refreshing their `updated_at`
pub(crate) fn reassign_category(
    conn: &Connection,
    from: &str,
    to: &str,
    at: crate::models::Timestamp,
) -> Result<usize> {
    let rows = conn.execute(
        "UPDATE notes SET category = ?1, updated_at = MAX(updated_at, ?2)
         WHERE category = ?3 AND deleted = 0",
        params![to, at.timestamp_millis(), from],
    )?;
    Ok(rows)
}

/// Parse a note from a database row
fn parse_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    let tags: String = row.get(4)?;
    let tags = serde_json::from_str(&tags)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let deleted_at: Option<i64> = row.get(8)?;

    Ok(Note {
        id: RecordId::from(row.get::<_, String>(0)?),
        title: row.get(1)?,
        content: row.get(2)?,
        category: row.get(3)?,
        tags,
        created_at: millis_column(row, 5)?,
        updated_at: millis_column(row, 6)?,
        deleted: row.get::<_, i32>(7)? != 0,
        deleted_at: deleted_at.and_then(from_millis),
    })
}

pub(crate) fn millis_column(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<crate::models::Timestamp> {
    let millis: i64 = row.get(idx)?;
    from_millis(millis).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OTHER_CATEGORY;
    use crate::util::parse_iso;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            conn.execute("DELETE FROM notes", [])?;
            Ok(())
        })
        .unwrap()
        .unwrap();
        db
    }

    fn draft(title: &str) -> NoteDraft {
        NoteDraft {
            title: title.to_string(),
            content: format!("# {title}"),
            category: None,
            tags: vec!["rust".to_string()],
        }
    }

    fn stored_note(id: &str, title: &str, updated_at: &str) -> Note {
        let at = parse_iso(updated_at).unwrap();
        let mut note = Note::new(draft(title));
        note.id = RecordId::from(id);
        note.created_at = at;
        note.updated_at = at;
        note
    }

    #[test]
    fn test_fresh_store_is_seeded() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteNoteRepository::new(&db);
        assert_eq!(repo.list().unwrap().len(), sample_notes().len());
    }

    #[test]
    fn test_create_and_get() {
        let db = setup();
        let repo = SqliteNoteRepository::new(&db);

        let note = repo.create(draft("Hello")).unwrap();
        assert_eq!(note.category, OTHER_CATEGORY);

        let fetched = repo.get(&note.id).unwrap().unwrap();
        assert_eq!(fetched, note);
    }

    #[test]
    fn test_list_newest_first() {
        let db = setup();
        LocalStore::<Note>::upsert_many(
            &db,
            &[
                stored_note("a", "older", "2024-01-01T00:00:00Z"),
                stored_note("b", "newer", "2024-02-01T00:00:00Z"),
            ],
        )
        .unwrap();

        let repo = SqliteNoteRepository::new(&db);
        let titles: Vec<String> = repo.list().unwrap().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["newer", "older"]);
    }

    #[test]
    fn test_update() {
        let db = setup();
        let repo = SqliteNoteRepository::new(&db);

        let note = repo.create(draft("Original")).unwrap();
        let updated = repo
            .update(
                &note.id,
                NotePatch {
                    content: Some("Updated".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.content, "Updated");
        assert!(updated.updated_at >= note.updated_at);
        assert_eq!(repo.get(&note.id).unwrap().unwrap().content, "Updated");
    }

    #[test]
    fn test_update_missing_note() {
        let db = setup();
        let repo = SqliteNoteRepository::new(&db);
        let result = repo.update(&RecordId::from("missing"), NotePatch::default());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_leaves_tombstone() {
        let db = setup();
        let repo = SqliteNoteRepository::new(&db);

        let note = repo.create(draft("To delete")).unwrap();
        let tombstone = repo.delete(&note.id).unwrap();
        assert!(tombstone.deleted);
        assert!(tombstone.deleted_at.is_some());

        assert!(repo.get(&note.id).unwrap().is_none());
        assert!(repo.list().unwrap().is_empty());

        let all = LocalStore::<Note>::read_all_including_tombstones(&db).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].deleted);
    }

    #[test]
    fn test_search() {
        let db = setup();
        let repo = SqliteNoteRepository::new(&db);

        repo.create(draft("Hello world")).unwrap();
        repo.create(draft("Goodbye world")).unwrap();
        repo.create(draft("Something else")).unwrap();

        assert_eq!(repo.search("WORLD").unwrap().len(), 2);
        assert_eq!(repo.search("rust").unwrap().len(), 3);
        assert_eq!(repo.search("").unwrap().len(), 3);
    }

    #[test]
    fn test_insert_new_refuses_taken_id() {
        let db = setup();
        let existing = stored_note("taken", "first", "2024-01-01T00:00:00Z");
        LocalStore::<Note>::upsert_many(&db, &[existing.clone()]).unwrap();

        let mut candidate = Note::new(draft("second"));
        candidate.id = existing.id.clone();
        let inserted = db
            .with_connection(|conn| insert_new(conn, &candidate))
            .unwrap()
            .unwrap();
        assert!(!inserted);

        let repo = SqliteNoteRepository::new(&db);
        assert_eq!(repo.get(&existing.id).unwrap().unwrap().title, "first");
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = setup();
        let note = stored_note("n1", "same", "2024-01-01T00:00:00Z");

        LocalStore::<Note>::upsert_many(&db, &[note.clone()]).unwrap();
        LocalStore::<Note>::upsert_many(&db, &[note.clone()]).unwrap();

        let all = LocalStore::<Note>::read_all_including_tombstones(&db).unwrap();
        assert_eq!(all, vec![note]);
    }

    #[test]
    fn test_upsert_keeps_newer_stored_copy() {
        let db = setup();
        let newer = stored_note("n1", "newer", "2024-03-01T00:00:00Z");
        let older = stored_note("n1", "older", "2024-01-01T00:00:00Z");

        LocalStore::<Note>::upsert_many(&db, &[newer]).unwrap();
        let changed = LocalStore::<Note>::upsert_many(&db, &[older]).unwrap();
        assert_eq!(changed, 0);

        let fetched = LocalStore::<Note>::get(&db, &RecordId::from("n1"))
            .unwrap()
            .unwrap();
        assert_eq!(fetched.title, "newer");
    }

    #[test]
    fn test_upsert_accepts_equal_timestamp() {
        let db = setup();
        let first = stored_note("n1", "first", "2024-01-01T00:00:00Z");
        let second = stored_note("n1", "second", "2024-01-01T00:00:00Z");

        LocalStore::<Note>::upsert_many(&db, &[first]).unwrap();
        LocalStore::<Note>::upsert_many(&db, &[second]).unwrap();

        let fetched = LocalStore::<Note>::get(&db, &RecordId::from("n1"))
            .unwrap()
            .unwrap();
        assert_eq!(fetched.title, "second");
    }

    #[test]
    fn test_unavailable_store_serves_seeds_and_drops_writes() {
        let db = Database::unavailable();
        let repo = SqliteNoteRepository::new(&db);

        assert_eq!(repo.list().unwrap().len(), sample_notes().len());

        let created = repo.create(draft("ephemeral")).unwrap();
        assert!(repo.get(&created.id).unwrap().is_none());

        let changed = LocalStore::<Note>::upsert_many(&db, &[created]).unwrap();
        assert_eq!(changed, 0);
    }
}
