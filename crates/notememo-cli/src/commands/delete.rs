use notememo_core::db::{NoteRepository, SqliteNoteRepository};

use crate::commands::common::{normalize_note_identifier, resolve_note, Session};
use crate::error::CliError;

pub async fn run_delete(id: &str, session: &Session) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let repo = SqliteNoteRepository::new(&session.db);
    let note = resolve_note(&normalized_id, &repo)?;

    session.warn_if_unavailable();
    repo.delete(&note.id)?;
    println!("{}", note.id);
    session.sync_after_change().await;
    Ok(())
}
