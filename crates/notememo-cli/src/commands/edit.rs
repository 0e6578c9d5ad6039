use notememo_core::db::{NoteRepository, SqliteNoteRepository};
use notememo_core::models::NotePatch;

use crate::commands::common::{
    capture_editor_input_with_initial, normalize_note_identifier, resolve_note, Session,
};
use crate::error::CliError;

pub async fn run_edit(id: &str, patch: NotePatch, session: &Session) -> Result<(), CliError> {
    let normalized_id = normalize_note_identifier(id)?;
    let repo = SqliteNoteRepository::new(&session.db);
    let note = resolve_note(&normalized_id, &repo)?;

    let patch = if patch.is_empty() {
        let Some(edited_content) = capture_editor_input_with_initial(&note.content)? else {
            return Err(CliError::EmptyEditedContent);
        };
        if edited_content == note.content {
            println!("{}", note.id);
            return Ok(());
        }
        NotePatch {
            content: Some(edited_content),
            ..NotePatch::default()
        }
    } else {
        patch
    };

    session.warn_if_unavailable();
    let updated = repo.update(&note.id, patch)?;
    println!("{}", updated.id);
    session.sync_after_change().await;
    Ok(())
}
