//! Identity and timestamp primitives shared by every synced record

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// UTC timestamp with millisecond precision.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A stable, client-generated record identifier.
///
/// Freshly generated ids are UUID v7 strings, but any non-empty string is
/// accepted so records created by older clients (and the built-in seeds) keep
/// their identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generate a new unique id using UUID v7 (time-sortable)
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Borrow the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id carries any non-whitespace content
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("Record id must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The two collections that take part in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Notes,
    Categories,
}

impl RecordKind {
    /// Collection name used in storage keys and API paths
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Categories => "categories",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "notes" => Ok(Self::Notes),
            "categories" => Ok(Self::Categories),
            other => Err(Error::InvalidInput(format!("Unknown record kind: {other}"))),
        }
    }
}

/// A record that can be merged with last-writer-wins.
pub trait SyncRecord {
    /// Collection the record belongs to
    const KIND: RecordKind;

    /// Stable identifier
    fn id(&self) -> &RecordId;

    /// Last modification time; `None` sorts before any present value
    fn updated_at(&self) -> Option<Timestamp>;

    /// Whether the record is a tombstone
    fn is_deleted(&self) -> bool {
        false
    }

    /// Boundary check applied to records arriving from outside the process
    fn validate(&self) -> crate::Result<()>;
}
