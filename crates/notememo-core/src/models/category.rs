//! Note category model

use serde::{Deserialize, Serialize};

use super::record::{RecordId, RecordKind, SyncRecord, Timestamp};
use super::timestamp::iso_option;
use crate::error::{Error, Result};
use crate::util::now;

/// Name of the fallback category that always exists.
pub const OTHER_CATEGORY: &str = "其他";

/// A named bucket for notes.
///
/// Names are unique case-insensitively within a user's set. Categories are
/// never tombstoned; the resolved set is replaced wholesale during sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteCategory {
    pub id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, with = "iso_option")]
    pub updated_at: Option<Timestamp>,
}

impl NoteCategory {
    /// Create a new category with a fresh id
    #[must_use]
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: RecordId::generate(),
            name: name.into().trim().to_string(),
            description: normalize_description(description),
            updated_at: Some(now()),
        }
    }

    /// Identity used for deduplication
    #[must_use]
    pub fn name_key(&self) -> String {
        self.name.trim().to_lowercase()
    }

    /// Whether this is the permanent fallback category
    #[must_use]
    pub fn is_other(&self) -> bool {
        self.name.trim() == OTHER_CATEGORY
    }

    /// Rename and/or re-describe, refreshing `updated_at`
    pub fn rename(&mut self, name: impl Into<String>, description: Option<String>) {
        self.name = name.into().trim().to_string();
        self.description = normalize_description(description);
        self.updated_at = Some(self.updated_at.map_or_else(now, |at| now().max(at)));
    }
}

impl SyncRecord for NoteCategory {
    const KIND: RecordKind = RecordKind::Categories;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn updated_at(&self) -> Option<Timestamp> {
        self.updated_at
    }

    fn validate(&self) -> Result<()> {
        if !self.id.is_valid() {
            return Err(Error::InvalidInput("Category id must not be empty".into()));
        }
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "Category {} has an empty name",
                self.id
            )));
        }
        Ok(())
    }
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
