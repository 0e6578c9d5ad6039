//! Sync bookkeeping models

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::record::{RecordId, RecordKind, Timestamp};
use super::timestamp::{iso, iso_option};

/// Opaque per-installation device identity, created once and never rotated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Generate a random device id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Boundary of the last successfully synchronized state for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWatermark {
    pub device_id: DeviceId,
    pub user_id: String,
    pub kind: RecordKind,
    #[serde(with = "iso")]
    pub last_sync_time: Timestamp,
}

/// Server-side view of one device's last push, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSyncInfo {
    pub device_id: String,
    #[serde(default, with = "iso_option")]
    pub last_sync_time: Option<Timestamp>,
}

/// Recorded sync conflict resolved by last-writer-wins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Collection the record belongs to
    pub kind: RecordKind,
    /// Record involved in the conflict
    pub record_id: RecordId,
    /// Local copy's timestamp when the conflict occurred
    pub local_updated_at: Option<Timestamp>,
    /// Remote copy's timestamp
    pub incoming_updated_at: Option<Timestamp>,
    /// Whether the remote copy replaced the local one
    pub remote_won: bool,
    /// Resolution time
    pub resolved_at: Timestamp,
    /// Resolution strategy name
    pub strategy: String,
}
