use notememo_core::db::{NoteRepository, SqliteNoteRepository};
use notememo_core::models::NoteDraft;

use crate::commands::common::{derive_title, normalize_content, resolve_note_content, Session};
use crate::error::CliError;

pub struct AddArgs<'a> {
    pub content: &'a [String],
    pub title: Option<&'a str>,
    pub category: Option<&'a str>,
    pub tags: &'a [String],
}

pub async fn run_add(args: AddArgs<'_>, session: &Session) -> Result<(), CliError> {
    let content = resolve_note_content(args.content)?;
    let title = args
        .title
        .and_then(normalize_content)
        .unwrap_or_else(|| derive_title(&content));

    session.warn_if_unavailable();
    let note = SqliteNoteRepository::new(&session.db).create(NoteDraft {
        title,
        content,
        category: args.category.map(str::to_string),
        tags: args.tags.to_vec(),
    })?;

    println!("{}", note.id);
    session.sync_after_change().await;
    Ok(())
}
