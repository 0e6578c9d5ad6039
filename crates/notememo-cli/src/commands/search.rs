use notememo_core::db::{NoteRepository, SqliteNoteRepository};

use crate::commands::common::{
    format_note_lines, normalize_search_query, note_to_list_item, NoteListItem, Session,
};
use crate::error::CliError;

pub fn run_search(
    query: &str,
    limit: usize,
    as_json: bool,
    session: &Session,
) -> Result<(), CliError> {
    let normalized_query = normalize_search_query(query)?;
    let notes = SqliteNoteRepository::new(&session.db)
        .search(&normalized_query)?
        .into_iter()
        .take(limit)
        .collect::<Vec<_>>();

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
