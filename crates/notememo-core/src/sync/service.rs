//! Notes and categories sync behind one handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::coordinator::{SkipReason, SyncCoordinator, SyncOutcome};
use super::http::HttpRemoteStore;
use super::remote::{RemoteError, RemoteStore, SyncStatusSource};
use super::status::{SyncState, SyncStatus, SyncStatusReporter};
use crate::config::SyncConfig;
use crate::db::{Database, LocalStore, SettingsRepository, SqliteSettingsRepository, WatermarkStore};
use crate::error::Result;
use crate::models::{DeviceId, Note, NoteCategory, RecordKind};

/// Remote endpoints the service syncs against.
#[derive(Clone)]
pub struct RemoteEndpoints {
    pub notes: Arc<dyn RemoteStore<Note>>,
    pub categories: Arc<dyn RemoteStore<NoteCategory>>,
    pub status: Option<Arc<dyn SyncStatusSource>>,
}

impl RemoteEndpoints {
    /// All endpoints served by one HTTP client
    #[must_use]
    pub fn http(client: HttpRemoteStore) -> Self {
        let client = Arc::new(client);
        Self {
            notes: client.clone(),
            categories: client.clone(),
            status: Some(client),
        }
    }
}

/// Outcomes of one [`SyncService::sync_all`] round.
#[derive(Debug)]
pub struct SyncSummary {
    pub categories: SyncOutcome,
    pub notes: SyncOutcome,
}

impl SyncSummary {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            categories: SyncOutcome::Skipped(reason),
            notes: SyncOutcome::Skipped(reason),
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.categories.is_completed() && self.notes.is_completed()
    }
}

struct Coordinators {
    notes: SyncCoordinator<Note>,
    categories: SyncCoordinator<NoteCategory>,
    status: Option<Arc<dyn SyncStatusSource>>,
}

/// Entry point for clients: local reads plus best-effort sync.
pub struct SyncService {
    config: SyncConfig,
    db: Arc<Database>,
    device: DeviceId,
    coordinators: Option<Coordinators>,
    reporter: SyncStatusReporter,
    /// Set once the server rejects the access code; no remote calls after that
    unauthorized: AtomicBool,
}

impl SyncService {
    pub fn new(config: SyncConfig, db: Arc<Database>, remotes: Option<RemoteEndpoints>) -> Result<Self> {
        let device = SqliteSettingsRepository::new(&db).device_id()?;
        let remotes = remotes.filter(|_| config.sync_enabled);

        let coordinators = remotes.map(|remotes| {
            let local_notes: Arc<dyn LocalStore<Note>> = db.clone();
            let local_categories: Arc<dyn LocalStore<NoteCategory>> = db.clone();
            let watermarks: Arc<dyn WatermarkStore> = db.clone();
            Coordinators {
                notes: SyncCoordinator::new(
                    local_notes,
                    remotes.notes,
                    watermarks.clone(),
                    device.clone(),
                )
                .with_timeout(config.fetch_timeout)
                .with_conflict_log(db.clone()),
                categories: SyncCoordinator::new(
                    local_categories,
                    remotes.categories,
                    watermarks,
                    device.clone(),
                )
                .with_timeout(config.fetch_timeout)
                .with_conflict_log(db.clone()),
                status: remotes.status,
            }
        });

        let reporter = SyncStatusReporter::new();
        if coordinators.is_none() {
            reporter.mark_disabled(None);
        }

        Ok(Self {
            config,
            db,
            device,
            coordinators,
            reporter,
            unauthorized: AtomicBool::new(false),
        })
    }

    /// Build a service talking HTTP to the configured API
    pub fn from_config(config: SyncConfig, db: Arc<Database>) -> Result<Self> {
        let remotes = match HttpRemoteStore::from_config(&config) {
            Ok(client) => client.map(RemoteEndpoints::http),
            Err(error) => {
                tracing::warn!("Sync client could not be configured: {error}");
                None
            }
        };
        Self::new(config, db, remotes)
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub const fn device(&self) -> &DeviceId {
        &self.device
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Shared status handle
    pub fn reporter(&self) -> SyncStatusReporter {
        self.reporter.clone()
    }

    /// Current status snapshot
    pub fn status(&self) -> SyncStatus {
        self.reporter.snapshot()
    }

    /// Whether a remote round trip is possible this session
    pub fn is_sync_active(&self) -> bool {
        self.coordinators.is_some() && !self.unauthorized.load(Ordering::Acquire)
    }

    /// Cached local notes without touching the network
    pub fn cached_notes(&self) -> Result<Vec<Note>> {
        LocalStore::<Note>::read_all(self.db.as_ref())
    }

    /// Local notes, refreshed by a bounded sync pass when sync is on.
    ///
    /// Falls back to the cached state if the pass does not complete.
    pub async fn load_notes(&self) -> Result<Vec<Note>> {
        let cached = self.cached_notes()?;
        if !self.is_sync_active() {
            return Ok(cached);
        }
        let summary = self.sync_all().await;
        if summary.notes.is_completed() {
            self.cached_notes()
        } else {
            Ok(cached)
        }
    }

    /// Local categories, refreshed like [`Self::load_notes`]
    pub async fn load_categories(&self) -> Result<Vec<NoteCategory>> {
        let cached = LocalStore::<NoteCategory>::read_all(self.db.as_ref())?;
        if !self.is_sync_active() {
            return Ok(cached);
        }
        let summary = self.sync_all().await;
        if summary.categories.is_completed() {
            LocalStore::<NoteCategory>::read_all(self.db.as_ref())
        } else {
            Ok(cached)
        }
    }

    /// User identity for sync: configured value first, then the server-learned one
    pub fn user_identity(&self) -> Option<String> {
        if let Some(user) = self.config.user_identity.clone() {
            return Some(user);
        }
        match SqliteSettingsRepository::new(&self.db).user_id() {
            Ok(user) => user,
            Err(error) => {
                tracing::warn!("Failed to read stored user id: {error}");
                None
            }
        }
    }

    /// Ask the server whether sync is enabled and who we are
    pub async fn check_status(&self) -> SyncStatus {
        let Some(coordinators) = &self.coordinators else {
            self.reporter.mark_disabled(None);
            return self.status();
        };
        if self.unauthorized.load(Ordering::Acquire) {
            return self.status();
        }
        let Some(source) = &coordinators.status else {
            self.reporter.set_state(SyncState::Enabled);
            return self.status();
        };

        self.reporter.set_state(SyncState::Checking);
        let result = tokio::time::timeout(self.config.fetch_timeout, source.sync_status())
            .await
            .unwrap_or(Err(RemoteError::Timeout(self.config.fetch_timeout)));

        match result {
            Ok(remote) if remote.enabled => {
                if let Some(user_id) = remote.user_id.as_deref() {
                    if let Err(error) = SqliteSettingsRepository::new(&self.db).set_user_id(user_id) {
                        tracing::warn!("Failed to store user id: {error}");
                    }
                }
                self.reporter.update(|status| {
                    status.state = SyncState::Enabled;
                    status.user_id = remote.user_id.clone();
                    status.devices = remote.sync_info.clone();
                    status.last_error = None;
                });
            }
            Ok(remote) => {
                tracing::info!("Server reports sync disabled");
                self.reporter.mark_disabled(remote.message);
            }
            Err(error) => self.handle_remote_error(&error),
        }
        self.status()
    }

    /// Sync categories, then notes
    pub async fn sync_all(&self) -> SyncSummary {
        let Some(coordinators) = &self.coordinators else {
            self.reporter.mark_disabled(None);
            return SyncSummary::skipped(SkipReason::Disabled);
        };
        if self.unauthorized.load(Ordering::Acquire) {
            return SyncSummary::skipped(SkipReason::Unauthorized);
        }

        let mut identity = self.user_identity();
        if identity.is_none() {
            let status = self.check_status().await;
            if self.unauthorized.load(Ordering::Acquire) {
                return SyncSummary::skipped(SkipReason::Unauthorized);
            }
            if status.state == SyncState::Disabled {
                return SyncSummary::skipped(SkipReason::Disabled);
            }
            identity = self.user_identity();
        }
        let Some(user_id) = identity else {
            tracing::debug!("No user identity yet, sync skipped");
            return SyncSummary::skipped(SkipReason::NoIdentity);
        };

        self.reporter.update(|status| {
            status.state = SyncState::Syncing;
            status.user_id = Some(user_id.clone());
        });

        let categories = coordinators.categories.run(Some(&user_id)).await;
        let notes = if self.unauthorized_by(&categories) {
            SyncOutcome::Skipped(SkipReason::Unauthorized)
        } else {
            coordinators.notes.run(Some(&user_id)).await
        };

        self.report(&categories, &notes);
        SyncSummary { categories, notes }
    }

    /// Forget the watermarks and run a full pass
    pub async fn force_resync(&self) -> Result<SyncSummary> {
        WatermarkStore::clear(self.db.as_ref(), &self.device)?;
        tracing::info!(device = %self.device, "Cleared sync watermarks, forcing full resync");
        Ok(self.sync_all().await)
    }

    /// Run [`Self::sync_all`] every `config.sync_interval` until the handle is aborted
    pub fn spawn_periodic(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let period = service.config.sync_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !service.is_sync_active() {
                    tracing::debug!("Periodic sync inactive, stopping");
                    break;
                }
                let summary = service.sync_all().await;
                tracing::debug!(completed = summary.is_completed(), "Periodic sync finished");
            }
        })
    }

    fn unauthorized_by(&self, outcome: &SyncOutcome) -> bool {
        matches!(outcome, SyncOutcome::LocalOnly(RemoteError::Unauthorized(_)))
            || self.unauthorized.load(Ordering::Acquire)
    }

    /// Fold both outcomes into the reporter; the round only counts as synced
    /// when both kinds completed
    fn report(&self, categories: &SyncOutcome, notes: &SyncOutcome) {
        let outcomes = [(RecordKind::Categories, categories), (RecordKind::Notes, notes)];

        if let Some(error) = outcomes.iter().find_map(|(_, outcome)| match outcome {
            SyncOutcome::LocalOnly(error @ RemoteError::Unauthorized(_)) => Some(error),
            _ => None,
        }) {
            self.handle_remote_error(error);
            return;
        }

        let errors: Vec<String> = outcomes
            .iter()
            .filter_map(|(kind, outcome)| {
                failure_message(outcome).map(|message| format!("{kind}: {message}"))
            })
            .collect();
        if !errors.is_empty() {
            self.reporter.mark_error(errors.join("; "));
            return;
        }

        // Anything short of two completed passes means a concurrent round is
        // still running and reports for itself
        if let (SyncOutcome::Completed(first), SyncOutcome::Completed(second)) = (categories, notes) {
            self.reporter.mark_synced(first.sync_time.max(second.sync_time));
        }
    }

    fn handle_remote_error(&self, error: &RemoteError) {
        if let RemoteError::Unauthorized(message) = error {
            tracing::warn!("Access code rejected, disabling sync for this session: {message}");
            self.unauthorized.store(true, Ordering::Release);
            self.reporter.mark_disabled(Some(error.to_string()));
        } else {
            self.reporter.mark_error(error.to_string());
        }
    }
}

fn failure_message(outcome: &SyncOutcome) -> Option<String> {
    match outcome {
        SyncOutcome::LocalOnly(error) => Some(error.to_string()),
        SyncOutcome::Failed(error) => Some(error.to_string()),
        SyncOutcome::Skipped(SkipReason::LocalUnavailable) => {
            Some("local storage unavailable".to_string())
        }
        SyncOutcome::Skipped(_) | SyncOutcome::AlreadyRunning | SyncOutcome::Completed(_) => None,
    }
}
