//! Remote store seam shared by the HTTP client and the server-side store

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{DeviceId, DeviceSyncInfo, RecordId, Timestamp};

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network or configuration trouble; the remote could not be reached
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
    #[error("Remote store rejected the access code: {0}")]
    Unauthorized(String),
    #[error("Malformed remote payload: {0}")]
    Malformed(String),
    #[error("Remote API error: {0}")]
    Api(String),
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Malformed(error.to_string())
        } else if error.is_timeout() {
            Self::Unavailable(format!("request timed out: {error}"))
        } else {
            Self::Unavailable(error.to_string())
        }
    }
}

impl From<crate::Error> for RemoteError {
    fn from(error: crate::Error) -> Self {
        match error {
            crate::Error::Serialization(error) => Self::Malformed(error.to_string()),
            crate::Error::InvalidInput(message) => Self::Malformed(message),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Server confirmation of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushReceipt {
    /// Server clock at the moment the push was applied
    pub sync_time: Timestamp,
}

/// Per-user canonical collection of one record kind.
#[async_trait]
pub trait RemoteStore<R>: Send + Sync {
    /// Every record including tombstones
    async fn read_all(&self, user_id: &str) -> RemoteResult<Vec<R>>;

    /// Records with `updated_at` strictly after `since`
    async fn read_updated_since(&self, user_id: &str, since: Timestamp) -> RemoteResult<Vec<R>>;

    /// Upsert by id, replacing mutable fields wholesale
    async fn upsert_many(
        &self,
        user_id: &str,
        device: &DeviceId,
        records: &[R],
    ) -> RemoteResult<PushReceipt>;

    /// Remove records whose ids are not in `keep`; returns how many went away
    async fn delete_not_present_in(&self, _user_id: &str, _keep: &[RecordId]) -> RemoteResult<usize> {
        Ok(0)
    }
}

/// Server view of the sync feature, from `GET /sync`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSyncStatus {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub sync_info: Vec<DeviceSyncInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Source of [`RemoteSyncStatus`] snapshots.
#[async_trait]
pub trait SyncStatusSource: Send + Sync {
    async fn sync_status(&self) -> RemoteResult<RemoteSyncStatus>;
}
