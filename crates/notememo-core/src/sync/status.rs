//! Shared sync status for display.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::models::{DeviceSyncInfo, Timestamp};

/// Sync state shown to the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Checking,
    Enabled,
    Disabled,
    Error,
    Syncing,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Checking => "checking",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Error => "error",
            Self::Syncing => "syncing",
        };
        f.write_str(label)
    }
}

/// Snapshot of the sync subsystem.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub user_id: Option<String>,
    pub last_sync_time: Option<Timestamp>,
    pub last_error: Option<String>,
    /// Devices known to the server, for diagnostics only
    pub devices: Vec<DeviceSyncInfo>,
}

/// Cheaply cloneable handle to the current [`SyncStatus`].
#[derive(Clone, Debug, Default)]
pub struct SyncStatusReporter {
    inner: Arc<RwLock<SyncStatus>>,
}

impl SyncStatusReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current status
    #[must_use]
    pub fn snapshot(&self) -> SyncStatus {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, apply: impl FnOnce(&mut SyncStatus)) {
        let mut status = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut status);
    }

    pub fn set_state(&self, state: SyncState) {
        self.update(|status| status.state = state);
    }

    /// Record a successful pass
    pub fn mark_synced(&self, at: Timestamp) {
        self.update(|status| {
            status.state = SyncState::Enabled;
            status.last_error = None;
            status.last_sync_time = Some(status.last_sync_time.map_or(at, |prev| prev.max(at)));
        });
    }

    pub fn mark_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|status| {
            status.state = SyncState::Error;
            status.last_error = Some(message);
        });
    }

    pub fn mark_disabled(&self, message: Option<String>) {
        self.update(|status| {
            status.state = SyncState::Disabled;
            status.last_error = message;
        });
    }
}
