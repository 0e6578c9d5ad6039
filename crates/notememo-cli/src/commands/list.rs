use crate::commands::common::{
    filter_notes, format_note_lines, note_to_list_item, NoteListItem, Session,
};
use crate::error::CliError;

pub async fn run_list(
    limit: usize,
    category: Option<&str>,
    as_json: bool,
    session: &Session,
) -> Result<(), CliError> {
    let notes = filter_notes(session.sync.load_notes().await?, category, limit);

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
