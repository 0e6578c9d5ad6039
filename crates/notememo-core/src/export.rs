//! Note export for backups and sharing.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::{Note, Timestamp};
use crate::util::to_iso;

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "md" | "markdown" => Ok(Self::Markdown),
            other => Err(Error::InvalidInput(format!("Unknown export format: {other}"))),
        }
    }
}

/// Serializable note representation used in exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportNote {
    pub id: String,
    pub title: String,
    pub category: String,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub content: String,
}

/// Convert a note into an export record.
#[must_use]
pub fn note_to_export_item(note: &Note) -> ExportNote {
    ExportNote {
        id: note.id.to_string(),
        title: note.title.clone(),
        category: note.category.clone(),
        tags: note.tags.clone(),
        created_at: to_iso(&note.created_at),
        updated_at: to_iso(&note.updated_at),
        content: note.content.clone(),
    }
}

/// Visible notes only, newest first
fn exportable(notes: &[Note]) -> Vec<&Note> {
    let mut visible: Vec<&Note> = notes.iter().filter(|note| !note.deleted).collect();
    visible.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    visible
}

/// Render notes as pretty-printed JSON.
pub fn render_json_export(notes: &[Note]) -> serde_json::Result<String> {
    let items = exportable(notes)
        .into_iter()
        .map(note_to_export_item)
        .collect::<Vec<ExportNote>>();
    serde_json::to_string_pretty(&items)
}

/// Render notes as Markdown, one frontmatter block per note.
#[must_use]
pub fn render_markdown_export(notes: &[Note]) -> String {
    let mut output = String::new();

    for (index, note) in exportable(notes).into_iter().enumerate() {
        if index > 0 {
            output.push('\n');
        }

        let item = note_to_export_item(note);
        let _ = writeln!(output, "---");
        let _ = writeln!(output, "id: {}", item.id);
        let _ = writeln!(output, "category: {}", item.category);
        let _ = writeln!(output, "created_at: {}", item.created_at);
        let _ = writeln!(output, "updated_at: {}", item.updated_at);
        if !item.tags.is_empty() {
            let _ = writeln!(output, "tags:");
            for tag in &item.tags {
                let _ = writeln!(output, "  - {tag}");
            }
        }
        let _ = writeln!(output, "---");
        let _ = writeln!(output);
        if !item.title.is_empty() {
            let _ = writeln!(output, "# {}", item.title);
            let _ = writeln!(output);
        }
        output.push_str(&item.content);
        output.push('\n');
    }

    output
}

/// Render notes in the selected format.
pub fn render_notes_export(notes: &[Note], format: ExportFormat) -> serde_json::Result<String> {
    match format {
        ExportFormat::Json => render_json_export(notes),
        ExportFormat::Markdown => Ok(render_markdown_export(notes)),
    }
}

#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, at: Timestamp) -> String {
    format!(
        "notememo-export-{}.{}",
        at.timestamp_millis(),
        format.extension()
    )
}
