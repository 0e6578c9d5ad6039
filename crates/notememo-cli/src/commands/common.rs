use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use notememo_core::config::SyncConfig;
use notememo_core::db::{CategoryRepository, Database, NoteRepository};
use notememo_core::models::{NoteCategory, RecordId, SyncConflict, Timestamp};
use notememo_core::sync::{SkipReason, SyncOutcome, SyncService, SyncSummary};
use notememo_core::util::to_iso;
use notememo_core::Note;
use serde::Serialize;

use crate::error::CliError;

const TITLE_MAX_CHARS: usize = 60;

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub category: String,
    pub preview: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
    pub relative_time: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub kind: String,
    pub record_id: String,
    pub local_updated_at: Option<String>,
    pub incoming_updated_at: Option<String>,
    pub remote_won: bool,
    pub resolved_at: String,
    pub strategy: String,
}

#[derive(Debug, Serialize)]
pub struct CategoryItem {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub note_count: usize,
}

/// Local database plus the sync service wrapped around it
pub struct Session {
    pub db: Arc<Database>,
    pub sync: Arc<SyncService>,
}

impl Session {
    pub fn open(db_path: &Path, offline: bool) -> Result<Self, CliError> {
        let db = Arc::new(Database::open_or_unavailable(db_path));
        let config = if offline {
            SyncConfig::default()
        } else {
            sync_config_from_env()?
        };
        let sync = Arc::new(SyncService::from_config(config, db.clone())?);
        Ok(Self { db, sync })
    }

    /// Warn when writes will not survive this process
    pub fn warn_if_unavailable(&self) {
        if !self.db.is_available() {
            eprintln!("Warning: local storage is unavailable; changes will not be saved.");
        }
    }

    /// Best-effort push after a local change; failures only print a hint
    pub async fn sync_after_change(&self) {
        if !self.sync.is_sync_active() {
            return;
        }
        let summary = self.sync.sync_all().await;
        if !summary.is_completed() {
            eprintln!("Saved locally; sync will be retried later.");
        }
    }
}

pub fn sync_config_from_env() -> Result<SyncConfig, CliError> {
    Ok(SyncConfig::from_lookup(|name| env::var(name).ok())?)
}

pub fn filter_notes(notes: Vec<Note>, category: Option<&str>, limit: usize) -> Vec<Note> {
    let category = category.map(|name| name.trim().to_lowercase());
    notes
        .into_iter()
        .filter(|note| {
            category
                .as_deref()
                .map_or(true, |name| note.category.to_lowercase() == name)
        })
        .take(limit)
        .collect()
}

pub fn resolve_note(note_query: &str, repo: &impl NoteRepository) -> Result<Note, CliError> {
    if let Some(note) = repo.get(&RecordId::from(note_query))? {
        if !note.deleted {
            return Ok(note);
        }
    }

    let matching = repo
        .list()?
        .into_iter()
        .filter(|note| note.id.as_str().starts_with(note_query))
        .take(3)
        .collect::<Vec<_>>();

    match matching.len() {
        0 => Err(CliError::NoteNotFound(note_query.to_string())),
        1 => matching
            .into_iter()
            .next()
            .ok_or_else(|| CliError::NoteNotFound(note_query.to_string())),
        _ => {
            let options = matching
                .iter()
                .map(|note| short_id(note.id.as_str()))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousNoteId(format!(
                "ID prefix '{note_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn resolve_category(
    name: &str,
    repo: &impl CategoryRepository,
) -> Result<NoteCategory, CliError> {
    let key = name.trim().to_lowercase();
    repo.list()?
        .into_iter()
        .find(|category| category.name_key() == key)
        .ok_or_else(|| CliError::CategoryNotFound(name.trim().to_string()))
}

fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let short_id = short_id(note.id.as_str());
            let title = note_title(note, 40);
            let relative_time =
                format_relative_time(note.updated_at.timestamp_millis(), now_ms);
            let tags = render_tags(note);

            if tags.is_empty() {
                format!("{short_id:<13}  {title:<40}  [{}]  {relative_time}", note.category)
            } else {
                format!(
                    "{short_id:<13}  {title:<40}  [{}]  {relative_time:<10}  {tags}",
                    note.category
                )
            }
        })
        .collect()
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();

    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        category: note.category.clone(),
        preview: note_preview(note, 80),
        content: note.content.clone(),
        created_at: to_iso(&note.created_at),
        updated_at: to_iso(&note.updated_at),
        relative_time: format_relative_time(note.updated_at.timestamp_millis(), now_ms),
        tags: note.tags.clone(),
    }
}

fn note_title(note: &Note, max_chars: usize) -> String {
    if note.title.trim().is_empty() {
        note_preview(note, max_chars)
    } else {
        truncate_chars(note.title.trim(), max_chars)
    }
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let first_line = note.content.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars)
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = value.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(note: &Note) -> String {
    note.tags
        .iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

/// Title for a note captured without one: its first line, Markdown heading marks stripped
pub fn derive_title(content: &str) -> String {
    let first_line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    let stripped = first_line.trim_start_matches('#').trim();
    truncate_chars(stripped, TITLE_MAX_CHARS)
}

pub fn category_items(categories: &[NoteCategory], counts: &[(String, usize)]) -> Vec<CategoryItem> {
    categories
        .iter()
        .map(|category| CategoryItem {
            id: category.id.to_string(),
            name: category.name.clone(),
            description: category.description.clone(),
            note_count: counts
                .iter()
                .find(|(name, _)| *name == category.name)
                .map_or(0, |(_, count)| *count),
        })
        .collect()
}

pub fn format_category_lines(items: &[CategoryItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| match item.description.as_deref() {
            Some(description) => format!("{:<16}  {:>4}  {description}", item.name, item.note_count),
            None => format!("{:<16}  {:>4}", item.name, item.note_count),
        })
        .collect()
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        kind: conflict.kind.to_string(),
        record_id: conflict.record_id.to_string(),
        local_updated_at: conflict.local_updated_at.as_ref().map(to_iso),
        incoming_updated_at: conflict.incoming_updated_at.as_ref().map(to_iso),
        remote_won: conflict.remote_won,
        resolved_at: to_iso(&conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {}  {}={}  local={} incoming={}  winner={}",
                format_sync_timestamp(&conflict.resolved_at),
                conflict.strategy,
                conflict.kind,
                conflict.record_id,
                format_optional_timestamp(conflict.local_updated_at.as_ref()),
                format_optional_timestamp(conflict.incoming_updated_at.as_ref()),
                if conflict.remote_won { "remote" } else { "local" }
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp: &Timestamp) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_optional_timestamp(timestamp: Option<&Timestamp>) -> String {
    timestamp.map_or_else(|| "-".to_string(), format_sync_timestamp)
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn describe_outcome(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Completed(report) => format!(
            "pulled {}, pushed {}, conflicts {} ({:?})",
            report.pulled, report.pushed, report.conflicts, report.mode
        ),
        SyncOutcome::Skipped(SkipReason::Disabled) => "skipped: sync is disabled".to_string(),
        SyncOutcome::Skipped(SkipReason::Unauthorized) => {
            "skipped: access code rejected".to_string()
        }
        SyncOutcome::Skipped(SkipReason::NoIdentity) => "skipped: no user identity".to_string(),
        SyncOutcome::Skipped(SkipReason::LocalUnavailable) => {
            "skipped: local storage unavailable".to_string()
        }
        SyncOutcome::AlreadyRunning => "skipped: already running".to_string(),
        SyncOutcome::LocalOnly(error) => format!("kept local state: {error}"),
        SyncOutcome::Failed(error) => format!("failed: {error}"),
    }
}

pub fn summary_lines(summary: &SyncSummary) -> Vec<String> {
    vec![
        format!("categories: {}", describe_outcome(&summary.categories)),
        format!("notes: {}", describe_outcome(&summary.notes)),
    ]
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptySearchQuery)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("notememo-note-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("NOTEMEMO_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notememo")
        .join("notememo.db")
}
