//! One bidirectional sync pass for a single record kind.
//!
//! A pass walks: check identity, pick the mode from the watermark, fetch the
//! remote delta, merge, persist locally, push the local delta, then advance
//! the watermark to the server-reported sync time. Any failure ends the pass
//! early; local writes already made stay in place and the watermark is only
//! moved after the server has confirmed the push.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::entity::SyncEntity;
use super::remote::{RemoteError, RemoteResult, RemoteStore};
use crate::config::DEFAULT_FETCH_TIMEOUT;
use crate::db::{ConflictLog, LocalStore, WatermarkStore};
use crate::merge::merge_with_report;
use crate::models::{DeviceId, RecordId, Timestamp};

/// How much of the remote collection a pass fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Everything, because there was no watermark
    Full,
    /// Only records updated after the watermark
    Incremental(Timestamp),
}

/// Why a pass did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Sync is turned off in the configuration or by the server
    Disabled,
    /// The server rejected the access code earlier in this session
    Unauthorized,
    /// No user identity is known yet
    NoIdentity,
    /// Local storage is unavailable; nothing could be persisted
    LocalUnavailable,
}

/// Numbers from a completed pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Remote records that were new or newer locally
    pub pulled: usize,
    /// Records sent to the server
    pub pushed: usize,
    /// Ids seen on both sides with differing content
    pub conflicts: usize,
    /// Server time the watermark was advanced to
    pub sync_time: Timestamp,
}

/// Result of [`SyncCoordinator::run`].
#[derive(Debug)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    /// Another pass for this kind is in flight
    AlreadyRunning,
    /// The remote could not be used; local state is intact, watermark untouched
    LocalOnly(RemoteError),
    /// A local storage error aborted the pass
    Failed(crate::Error),
    Completed(SyncReport),
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Clears the in-progress flag when the pass ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives sync passes for one record kind.
pub struct SyncCoordinator<R: SyncEntity> {
    local: Arc<dyn LocalStore<R>>,
    remote: Arc<dyn RemoteStore<R>>,
    watermarks: Arc<dyn WatermarkStore>,
    conflict_log: Option<Arc<dyn ConflictLog>>,
    device: DeviceId,
    timeout: Duration,
    running: AtomicBool,
}

impl<R: SyncEntity> SyncCoordinator<R> {
    pub fn new(
        local: Arc<dyn LocalStore<R>>,
        remote: Arc<dyn RemoteStore<R>>,
        watermarks: Arc<dyn WatermarkStore>,
        device: DeviceId,
    ) -> Self {
        Self {
            local,
            remote,
            watermarks,
            conflict_log: None,
            device,
            timeout: DEFAULT_FETCH_TIMEOUT,
            running: AtomicBool::new(false),
        }
    }

    /// Bound every remote call by `timeout`
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Write merge conflicts to an audit log
    #[must_use]
    pub fn with_conflict_log(mut self, log: Arc<dyn ConflictLog>) -> Self {
        self.conflict_log = Some(log);
        self
    }

    pub const fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Whether a pass is currently in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one pass for `user_id`
    pub async fn run(&self, user_id: Option<&str>) -> SyncOutcome {
        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            tracing::debug!(kind = %R::KIND, "Sync already in progress, skipping");
            return SyncOutcome::AlreadyRunning;
        };

        let Some(user_id) = user_id.map(str::trim).filter(|id| !id.is_empty()) else {
            tracing::debug!(kind = %R::KIND, "No user identity, skipping sync");
            return SyncOutcome::Skipped(SkipReason::NoIdentity);
        };
        if !self.local.is_available() {
            tracing::warn!(kind = %R::KIND, "Local storage unavailable, skipping sync");
            return SyncOutcome::Skipped(SkipReason::LocalUnavailable);
        }

        match self.pass(user_id).await {
            Ok(report) => {
                tracing::info!(
                    kind = %R::KIND,
                    mode = ?report.mode,
                    pulled = report.pulled,
                    pushed = report.pushed,
                    conflicts = report.conflicts,
                    "Sync completed"
                );
                SyncOutcome::Completed(report)
            }
            Err(PassError::Remote(error)) => {
                tracing::warn!(kind = %R::KIND, "Sync fell back to local-only: {error}");
                SyncOutcome::LocalOnly(error)
            }
            Err(PassError::Local(error)) => {
                tracing::warn!(kind = %R::KIND, "Sync aborted by local storage error: {error}");
                SyncOutcome::Failed(error)
            }
        }
    }

    async fn pass(&self, user_id: &str) -> Result<SyncReport, PassError> {
        let watermark = self.watermarks.get(&self.device, user_id, R::KIND)?;
        let mode = watermark.map_or(SyncMode::Full, SyncMode::Incremental);
        tracing::debug!(kind = %R::KIND, ?mode, "Fetching remote delta");

        let fetched = match mode {
            SyncMode::Full => self.bounded(self.remote.read_all(user_id)).await?,
            SyncMode::Incremental(since) => {
                self.bounded(self.remote.read_updated_since(user_id, since))
                    .await?
            }
        };
        let fetched = self.accept_valid(fetched);

        let local = self.local.read_all_including_tombstones()?;
        let report = merge_with_report(local, fetched);
        let resolved = R::normalize(report.records);
        tracing::debug!(
            kind = %R::KIND,
            records = resolved.len(),
            conflicts = report.conflicts.len(),
            "Merged remote delta"
        );

        self.local.persist_resolved(&resolved)?;
        if let Some(log) = &self.conflict_log {
            if let Err(error) = log.record_conflicts(R::KIND, &report.conflicts) {
                tracing::warn!(kind = %R::KIND, "Failed to record sync conflicts: {error}");
            }
        }

        // Full-set kinds always push everything; the remote prunes to it
        let outgoing: Vec<R> = match watermark {
            Some(since) if !R::FULL_SET => resolved
                .iter()
                .filter(|record| record.updated_at().is_some_and(|at| at > since))
                .cloned()
                .collect(),
            _ => resolved.clone(),
        };
        tracing::debug!(kind = %R::KIND, count = outgoing.len(), "Pushing local delta");
        let receipt = self
            .bounded(self.remote.upsert_many(user_id, &self.device, &outgoing))
            .await?;

        if R::FULL_SET {
            let keep: Vec<RecordId> = resolved.iter().map(|record| record.id().clone()).collect();
            self.bounded(self.remote.delete_not_present_in(user_id, &keep))
                .await?;
        }

        self.watermarks
            .set(&self.device, user_id, R::KIND, receipt.sync_time)?;

        Ok(SyncReport {
            mode,
            pulled: report.pulled,
            pushed: outgoing.len(),
            conflicts: report.conflicts.len(),
            sync_time: receipt.sync_time,
        })
    }

    async fn bounded<T>(&self, call: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| RemoteError::Timeout(self.timeout))?
    }

    fn accept_valid(&self, records: Vec<R>) -> Vec<R> {
        records
            .into_iter()
            .filter(|record| match record.validate() {
                Ok(()) => true,
                Err(error) => {
                    tracing::warn!(kind = %R::KIND, device = %self.device, "Dropping invalid remote record: {error}");
                    false
                }
            })
            .collect()
    }
}

enum PassError {
    Remote(RemoteError),
    Local(crate::Error),
}

impl From<RemoteError> for PassError {
    fn from(error: RemoteError) -> Self {
        Self::Remote(error)
    }
}

impl From<crate::Error> for PassError {
    fn from(error: crate::Error) -> Self {
        Self::Local(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        CategoryRepository, Database, NoteRepository, SqliteCategoryRepository,
        SqliteNoteRepository,
    };
    use crate::models::{Note, NoteCategory, NoteDraft, NotePatch, RecordKind, OTHER_CATEGORY};
    use crate::sync::{DocumentStore, PushReceipt};
    use crate::util::parse_iso;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    const USER: &str = "user-1";

    fn at(value: &str) -> Timestamp {
        parse_iso(value).unwrap()
    }

    fn empty_db() -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            conn.execute_batch("DELETE FROM notes; DELETE FROM categories;")?;
            Ok(())
        })
        .unwrap()
        .unwrap();
        Arc::new(db)
    }

    fn note_coordinator(
        db: &Arc<Database>,
        server: &DocumentStore,
        device: &str,
    ) -> SyncCoordinator<Note> {
        SyncCoordinator::new(
            db.clone(),
            Arc::new(server.clone()),
            db.clone(),
            DeviceId::from(device),
        )
        .with_conflict_log(db.clone())
    }

    fn category_coordinator(
        db: &Arc<Database>,
        server: &DocumentStore,
        device: &str,
    ) -> SyncCoordinator<NoteCategory> {
        SyncCoordinator::new(
            db.clone(),
            Arc::new(server.clone()),
            db.clone(),
            DeviceId::from(device),
        )
    }

    fn completed(outcome: SyncOutcome) -> SyncReport {
        match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("expected a completed pass, got {other:?}"),
        }
    }

    fn stored_note(id: &str, title: &str, updated_at: &str) -> Note {
        let mut note = Note::new(NoteDraft {
            title: title.to_string(),
            ..Default::default()
        });
        note.id = RecordId::from(id);
        note.created_at = at(updated_at);
        note.updated_at = at(updated_at);
        note
    }

    /// Remote that never answers
    struct HangingRemote;

    #[async_trait]
    impl RemoteStore<Note> for HangingRemote {
        async fn read_all(&self, _user_id: &str) -> RemoteResult<Vec<Note>> {
            std::future::pending().await
        }

        async fn read_updated_since(
            &self,
            _user_id: &str,
            _since: Timestamp,
        ) -> RemoteResult<Vec<Note>> {
            std::future::pending().await
        }

        async fn upsert_many(
            &self,
            _user_id: &str,
            _device: &DeviceId,
            _records: &[Note],
        ) -> RemoteResult<PushReceipt> {
            std::future::pending().await
        }
    }

    /// Remote that answers reads but fails every push
    struct ReadOnlyRemote(DocumentStore);

    #[async_trait]
    impl RemoteStore<Note> for ReadOnlyRemote {
        async fn read_all(&self, user_id: &str) -> RemoteResult<Vec<Note>> {
            self.0.read_all(user_id).await
        }

        async fn read_updated_since(
            &self,
            user_id: &str,
            since: Timestamp,
        ) -> RemoteResult<Vec<Note>> {
            self.0.read_updated_since(user_id, since).await
        }

        async fn upsert_many(
            &self,
            _user_id: &str,
            _device: &DeviceId,
            _records: &[Note],
        ) -> RemoteResult<PushReceipt> {
            Err(RemoteError::Unavailable("connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn edit_propagates_between_devices_and_watermark_uses_server_time() {
        let server_time = at("2024-01-01T00:00:00Z");
        let server = DocumentStore::open_in_memory()
            .unwrap()
            .with_clock(move || server_time);
        let device_a = empty_db();
        let device_b = empty_db();
        let sync_a = note_coordinator(&device_a, &server, "device-a");
        let sync_b = note_coordinator(&device_b, &server, "device-b");

        let original = stored_note("n1", "first draft", "2023-12-01T00:00:00Z");
        LocalStore::<Note>::upsert_many(device_a.as_ref(), &[original.clone()]).unwrap();
        completed(sync_a.run(Some(USER)).await);
        completed(sync_b.run(Some(USER)).await);

        // Device A edits after both have synced once
        let repo_a = SqliteNoteRepository::new(&device_a);
        let edited = repo_a
            .update(
                &original.id,
                NotePatch {
                    title: Some("edited on A".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let report = completed(sync_a.run(Some(USER)).await);
        assert_eq!(report.mode, SyncMode::Incremental(server_time));
        assert_eq!(report.pushed, 1);
        assert_eq!(report.sync_time, server_time);

        let report = completed(sync_b.run(Some(USER)).await);
        assert_eq!(report.pulled, 1);

        let on_b = LocalStore::<Note>::get(device_b.as_ref(), &original.id)
            .unwrap()
            .unwrap();
        assert_eq!(on_b.title, "edited on A");
        assert_eq!(on_b.updated_at, edited.updated_at);

        let watermark = WatermarkStore::get(
            device_b.as_ref(),
            &DeviceId::from("device-b"),
            USER,
            RecordKind::Notes,
        )
        .unwrap();
        assert_eq!(watermark, Some(server_time));
    }

    #[tokio::test]
    async fn soft_delete_on_one_device_hides_note_on_the_other() {
        let server = DocumentStore::open_in_memory()
            .unwrap()
            .with_clock(|| at("2024-06-01T00:00:00Z"));
        let device_a = empty_db();
        let device_b = empty_db();
        let sync_a = note_coordinator(&device_a, &server, "device-a");
        let sync_b = note_coordinator(&device_b, &server, "device-b");

        let note = stored_note("n1", "shared", "2024-01-01T00:00:00Z");
        LocalStore::<Note>::upsert_many(device_a.as_ref(), &[note.clone()]).unwrap();
        completed(sync_a.run(Some(USER)).await);
        completed(sync_b.run(Some(USER)).await);
        assert!(LocalStore::<Note>::get(device_b.as_ref(), &note.id)
            .unwrap()
            .is_some());

        SqliteNoteRepository::new(&device_a).delete(&note.id).unwrap();
        completed(sync_a.run(Some(USER)).await);
        completed(sync_b.run(Some(USER)).await);

        assert!(LocalStore::<Note>::get(device_b.as_ref(), &note.id)
            .unwrap()
            .is_none());
        let all = LocalStore::<Note>::read_all_including_tombstones(device_b.as_ref()).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].deleted);
    }

    #[tokio::test]
    async fn concurrent_edits_resolve_to_the_newer_copy_everywhere() {
        let server = DocumentStore::open_in_memory().unwrap();
        let device_a = empty_db();
        let device_b = empty_db();
        let sync_a = note_coordinator(&device_a, &server, "device-a");
        let sync_b = note_coordinator(&device_b, &server, "device-b");

        LocalStore::<Note>::upsert_many(
            device_a.as_ref(),
            &[stored_note("n1", "from A", "2024-01-02T00:00:00Z")],
        )
        .unwrap();
        LocalStore::<Note>::upsert_many(
            device_b.as_ref(),
            &[stored_note("n1", "from B", "2024-01-01T00:00:00Z")],
        )
        .unwrap();

        completed(sync_a.run(Some(USER)).await);
        let report = completed(sync_b.run(Some(USER)).await);
        assert_eq!(report.conflicts, 1);

        let on_b = LocalStore::<Note>::get(device_b.as_ref(), &RecordId::from("n1"))
            .unwrap()
            .unwrap();
        assert_eq!(on_b.title, "from A");

        let server_copy: Vec<Note> = server.read_all(USER).await.unwrap();
        assert_eq!(server_copy.len(), 1);
        assert_eq!(server_copy[0].title, "from A");
    }

    #[tokio::test]
    async fn missing_identity_skips_without_remote_calls() {
        let db = empty_db();
        let coordinator = SyncCoordinator::<Note>::new(
            db.clone(),
            Arc::new(HangingRemote),
            db.clone(),
            DeviceId::from("d"),
        );
        let outcome = coordinator.run(None).await;
        assert!(matches!(outcome, SyncOutcome::Skipped(SkipReason::NoIdentity)));
        let outcome = coordinator.run(Some("  ")).await;
        assert!(matches!(outcome, SyncOutcome::Skipped(SkipReason::NoIdentity)));
    }

    #[tokio::test]
    async fn unavailable_local_store_skips_pass() {
        let db = Arc::new(Database::unavailable());
        let server = DocumentStore::open_in_memory().unwrap();
        let coordinator = note_coordinator(&db, &server, "d");
        let outcome = coordinator.run(Some(USER)).await;
        assert!(matches!(
            outcome,
            SyncOutcome::Skipped(SkipReason::LocalUnavailable)
        ));
    }

    #[tokio::test]
    async fn timeout_leaves_local_data_and_watermark_alone() {
        let db = empty_db();
        let note = stored_note("n1", "offline", "2024-01-01T00:00:00Z");
        LocalStore::<Note>::upsert_many(db.as_ref(), &[note.clone()]).unwrap();
        let coordinator = SyncCoordinator::<Note>::new(
            db.clone(),
            Arc::new(HangingRemote),
            db.clone(),
            DeviceId::from("d"),
        )
        .with_timeout(Duration::from_millis(20));

        let outcome = coordinator.run(Some(USER)).await;
        assert!(matches!(
            outcome,
            SyncOutcome::LocalOnly(RemoteError::Timeout(_))
        ));
        assert!(!coordinator.is_running());

        assert_eq!(
            LocalStore::<Note>::read_all(db.as_ref()).unwrap(),
            vec![note]
        );
        let watermark =
            WatermarkStore::get(db.as_ref(), &DeviceId::from("d"), USER, RecordKind::Notes)
                .unwrap();
        assert_eq!(watermark, None);
    }

    #[tokio::test]
    async fn failed_push_keeps_merged_state_but_not_watermark() {
        let server = DocumentStore::open_in_memory().unwrap();
        RemoteStore::<Note>::upsert_many(
            &server,
            USER,
            &DeviceId::from("other"),
            &[stored_note("remote", "from server", "2024-01-01T00:00:00Z")],
        )
        .await
        .unwrap();

        let db = empty_db();
        let coordinator = SyncCoordinator::<Note>::new(
            db.clone(),
            Arc::new(ReadOnlyRemote(server)),
            db.clone(),
            DeviceId::from("d"),
        );

        let outcome = coordinator.run(Some(USER)).await;
        assert!(matches!(
            outcome,
            SyncOutcome::LocalOnly(RemoteError::Unavailable(_))
        ));

        let pulled = LocalStore::<Note>::get(db.as_ref(), &RecordId::from("remote")).unwrap();
        assert!(pulled.is_some());
        let watermark =
            WatermarkStore::get(db.as_ref(), &DeviceId::from("d"), USER, RecordKind::Notes)
                .unwrap();
        assert_eq!(watermark, None);
    }

    #[tokio::test]
    async fn incremental_pass_only_pushes_newer_records() {
        let server = DocumentStore::open_in_memory()
            .unwrap()
            .with_clock(|| at("2024-06-01T00:00:00Z"));
        let db = empty_db();
        let coordinator = note_coordinator(&db, &server, "d");

        LocalStore::<Note>::upsert_many(
            db.as_ref(),
            &[
                stored_note("old-1", "old", "2020-01-01T00:00:00Z"),
                stored_note("old-2", "old", "2020-01-02T00:00:00Z"),
            ],
        )
        .unwrap();
        let first = completed(coordinator.run(Some(USER)).await);
        assert_eq!(first.mode, SyncMode::Full);
        assert_eq!(first.pushed, 2);

        SqliteNoteRepository::new(&db)
            .create(NoteDraft {
                title: "fresh".to_string(),
                ..Default::default()
            })
            .unwrap();
        let second = completed(coordinator.run(Some(USER)).await);
        assert!(matches!(second.mode, SyncMode::Incremental(_)));
        assert_eq!(second.pushed, 1);
    }

    #[tokio::test]
    async fn category_sync_dedups_and_prunes_server_set() {
        let server = DocumentStore::open_in_memory().unwrap();
        RemoteStore::<NoteCategory>::upsert_many(
            &server,
            USER,
            &DeviceId::from("other"),
            &[NoteCategory {
                id: RecordId::from("stale"),
                name: "RUST".to_string(),
                description: None,
                updated_at: Some(at("2024-01-01T00:00:00Z")),
            }],
        )
        .await
        .unwrap();

        let db = empty_db();
        LocalStore::<NoteCategory>::upsert_many(
            db.as_ref(),
            &[NoteCategory {
                id: RecordId::from("local"),
                name: "Rust".to_string(),
                description: None,
                updated_at: Some(at("2024-02-01T00:00:00Z")),
            }],
        )
        .unwrap();

        let coordinator = category_coordinator(&db, &server, "d");
        let report = completed(coordinator.run(Some(USER)).await);
        assert_eq!(report.mode, SyncMode::Full);

        let local = LocalStore::<NoteCategory>::read_all(db.as_ref()).unwrap();
        let names: Vec<&str> = local.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["RUST", OTHER_CATEGORY]);

        let remote: Vec<NoteCategory> = server.read_all(USER).await.unwrap();
        let remote_ids: Vec<&RecordId> = remote.iter().map(|c| &c.id).collect();
        let local_ids: Vec<&RecordId> = local.iter().map(|c| &c.id).collect();
        assert_eq!(remote_ids, local_ids);
        // The fallback category was created without a time; the server stamps it
        assert!(remote.iter().all(|c| c.updated_at.is_some()));
    }

    #[tokio::test]
    async fn deleted_category_stays_deleted_after_sync() {
        let server = DocumentStore::open_in_memory().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let coordinator = category_coordinator(&db, &server, "d");
        completed(coordinator.run(Some(USER)).await);

        let repo = SqliteCategoryRepository::new(&db);
        let doomed = repo
            .list()
            .unwrap()
            .into_iter()
            .find(|category| category.name == "命令行工具")
            .unwrap();
        repo.delete(&doomed.id).unwrap();

        let report = completed(coordinator.run(Some(USER)).await);
        assert!(matches!(report.mode, SyncMode::Incremental(_)));

        let local = LocalStore::<NoteCategory>::read_all(db.as_ref()).unwrap();
        assert!(local.iter().all(|category| category.id != doomed.id));
        let remote: Vec<NoteCategory> = server.read_all(USER).await.unwrap();
        assert!(remote.iter().all(|category| category.id != doomed.id));

        let local_names: Vec<&str> = local.iter().map(|c| c.name.as_str()).collect();
        let remote_names: Vec<&str> = remote.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(local_names, remote_names);
    }

    #[tokio::test]
    async fn seed_note_deleted_elsewhere_stays_deleted_on_new_device() {
        let server = DocumentStore::open_in_memory()
            .unwrap()
            .with_clock(|| at("2024-01-01T00:00:00Z"));
        let seed_id = RecordId::from("0");

        let device_a = Arc::new(Database::open_in_memory().unwrap());
        let sync_a = note_coordinator(&device_a, &server, "device-a");
        completed(sync_a.run(Some(USER)).await);
        SqliteNoteRepository::new(&device_a).delete(&seed_id).unwrap();
        completed(sync_a.run(Some(USER)).await);

        // Installed after the delete, with its own copy of the samples
        let device_b = Arc::new(Database::open_in_memory().unwrap());
        assert!(LocalStore::<Note>::get(device_b.as_ref(), &seed_id)
            .unwrap()
            .is_some());
        let sync_b = note_coordinator(&device_b, &server, "device-b");
        completed(sync_b.run(Some(USER)).await);

        assert!(LocalStore::<Note>::get(device_b.as_ref(), &seed_id)
            .unwrap()
            .is_none());
        let on_server: Vec<Note> = server.read_all(USER).await.unwrap();
        let seed = on_server.iter().find(|note| note.id == seed_id).unwrap();
        assert!(seed.deleted);
    }

    #[tokio::test]
    async fn reentrant_pass_is_rejected() {
        let db = empty_db();
        let coordinator = SyncCoordinator::<Note>::new(
            db.clone(),
            Arc::new(HangingRemote),
            db.clone(),
            DeviceId::from("d"),
        )
        .with_timeout(Duration::from_millis(200));

        let (first, second) = tokio::join!(coordinator.run(Some(USER)), async {
            tokio::task::yield_now().await;
            coordinator.run(Some(USER)).await
        });
        assert!(matches!(first, SyncOutcome::LocalOnly(_)));
        assert!(matches!(second, SyncOutcome::AlreadyRunning));
    }
}
