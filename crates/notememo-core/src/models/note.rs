//! Note model

use serde::{Deserialize, Serialize};

use super::category::OTHER_CATEGORY;
use super::record::{RecordId, RecordKind, SyncRecord, Timestamp};
use super::timestamp::{iso, iso_option};
use crate::error::{Error, Result};
use crate::util::now;

/// A Markdown note.
///
/// `category` holds the category *name*, not its id, so notes stay readable
/// on devices that have not pulled the category yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Stable identifier, never reused
    pub id: RecordId,
    /// Display title
    pub title: String,
    /// Markdown body
    pub content: String,
    /// Category name
    pub category: String,
    /// Free-form tags in user order
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation time
    #[serde(with = "iso")]
    pub created_at: Timestamp,
    /// Last modification time, refreshed by every mutation
    #[serde(with = "iso")]
    pub updated_at: Timestamp,
    /// Soft delete flag for sync
    #[serde(default)]
    pub deleted: bool,
    /// When the note was soft-deleted
    #[serde(default, with = "iso_option")]
    pub deleted_at: Option<Timestamp>,
}

/// User-supplied fields for a new note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

/// Partial update for an existing note; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl NotePatch {
    /// Whether the patch would change nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.content.is_none()
            && self.category.is_none()
            && self.tags.is_none()
    }
}

impl Note {
    /// Create a new note from a draft with a fresh id
    #[must_use]
    pub fn new(draft: NoteDraft) -> Self {
        let timestamp = now();
        let category = draft
            .category
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| OTHER_CATEGORY.to_string());
        Self {
            id: RecordId::generate(),
            title: draft.title.trim().to_string(),
            content: draft.content,
            category,
            tags: normalize_tags(draft.tags),
            created_at: timestamp,
            updated_at: timestamp,
            deleted: false,
            deleted_at: None,
        }
    }

    /// Apply a patch and refresh `updated_at`
    pub fn apply(&mut self, patch: NotePatch) {
        if let Some(title) = patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(category) = patch.category {
            let category = category.trim();
            if !category.is_empty() {
                self.category = category.to_string();
            }
        }
        if let Some(tags) = patch.tags {
            self.tags = normalize_tags(tags);
        }
        self.touch();
    }

    /// Mark the note as a tombstone
    pub fn mark_deleted(&mut self) {
        self.touch();
        self.deleted = true;
        self.deleted_at = Some(self.updated_at);
    }

    /// Refresh `updated_at` without ever moving it backwards
    pub fn touch(&mut self) {
        self.updated_at = now().max(self.updated_at);
    }

    /// Case-insensitive substring match over title, content, category and tags
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&query)
            || self.content.to_lowercase().contains(&query)
            || self.category.to_lowercase().contains(&query)
            || self
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&query))
    }
}

impl SyncRecord for Note {
    const KIND: RecordKind = RecordKind::Notes;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn updated_at(&self) -> Option<Timestamp> {
        Some(self.updated_at)
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }

    fn validate(&self) -> Result<()> {
        if !self.id.is_valid() {
            return Err(Error::InvalidInput("Note id must not be empty".into()));
        }
        if self.updated_at < self.created_at {
            return Err(Error::InvalidInput(format!(
                "Note {} was updated before it was created",
                self.id
            )));
        }
        Ok(())
    }
}

/// Trim tags, drop empties and duplicates, keep first-seen order
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|existing| existing == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
