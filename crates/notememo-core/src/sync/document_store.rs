//! Server-side per-user document store.
//!
//! Records are kept as JSON documents keyed by `(user_id, kind, id)`, with
//! `updated_at` and `deleted` lifted into columns for incremental reads.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::entity::SyncEntity;
use super::remote::{PushReceipt, RemoteError, RemoteResult, RemoteStore};
use crate::error::Result;
use crate::models::{DeviceId, DeviceSyncInfo, RecordId, RecordKind, Timestamp};
use crate::util::{from_millis, now};

/// Source of "now" for sync times
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// Canonical store for every user's notes and categories.
#[derive(Clone)]
pub struct DocumentStore {
    conn: Arc<Mutex<Connection>>,
    clock: Clock,
}

impl DocumentStore {
    /// Open (or create) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        Self::initialize(conn)
    }

    /// Open an in-memory store (tests and throwaway servers)
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    /// Replace the clock used to stamp sync times
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> Timestamp + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                access_code TEXT PRIMARY KEY,
                user_id TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS remote_records (
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                updated_at INTEGER,
                deleted INTEGER NOT NULL DEFAULT 0,
                doc TEXT NOT NULL,
                PRIMARY KEY (user_id, kind, id)
            );
            CREATE INDEX IF NOT EXISTS idx_remote_records_updated
                ON remote_records(user_id, kind, updated_at);
            CREATE TABLE IF NOT EXISTS sync_info (
                user_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                last_sync_time INTEGER NOT NULL,
                PRIMARY KEY (user_id, device_id)
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: Arc::new(now),
        })
    }

    fn now(&self) -> Timestamp {
        (self.clock)()
    }

    /// Map an access code to its stable user id, creating the user on first use
    pub async fn resolve_user(&self, access_code: &str) -> Result<String> {
        let conn = self.conn.lock().await;
        let existing: Option<String> = conn
            .query_row(
                "SELECT user_id FROM users WHERE access_code = ?1",
                params![access_code],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(user_id) = existing {
            return Ok(user_id);
        }

        let user_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO users (access_code, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![access_code, user_id, self.now().timestamp_millis()],
        )?;
        tracing::info!(user_id = %user_id, "Created user for new access code");
        Ok(user_id)
    }

    /// Devices that have pushed for this user, most recent first
    pub async fn sync_info(&self, user_id: &str) -> Result<Vec<DeviceSyncInfo>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT device_id, last_sync_time FROM sync_info
             WHERE user_id = ?1
             ORDER BY last_sync_time DESC",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(DeviceSyncInfo {
                    device_id: row.get(0)?,
                    last_sync_time: from_millis(row.get(1)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Make `records` the user's complete set of a full-set kind.
    ///
    /// Pruning absent ids and upserting the rest share one transaction, so a
    /// failed write leaves the previous set in place.
    pub async fn replace_set<R: SyncEntity>(
        &self,
        user_id: &str,
        device: &DeviceId,
        records: &[R],
    ) -> RemoteResult<(PushReceipt, usize)> {
        validate_push(records)?;
        let keep: HashSet<&str> = records.iter().map(|record| record.id().as_str()).collect();
        let sync_time = self.now();
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(crate::Error::from)?;
        let removed = prune_docs::<R>(&tx, user_id, &keep)?;
        apply_push(&tx, user_id, device, records, sync_time)?;
        tx.commit().map_err(crate::Error::from)?;

        tracing::debug!(kind = %R::KIND, user_id, device = %device, count = records.len(), removed, "Replaced set");
        Ok((PushReceipt { sync_time }, removed))
    }
}

#[async_trait]
impl<R: SyncEntity> RemoteStore<R> for DocumentStore {
    async fn read_all(&self, user_id: &str) -> RemoteResult<Vec<R>> {
        let conn = self.conn.lock().await;
        Ok(read_docs(&conn, user_id, R::KIND, None)?)
    }

    async fn read_updated_since(&self, user_id: &str, since: Timestamp) -> RemoteResult<Vec<R>> {
        let conn = self.conn.lock().await;
        Ok(read_docs(&conn, user_id, R::KIND, Some(since))?)
    }

    async fn upsert_many(
        &self,
        user_id: &str,
        device: &DeviceId,
        records: &[R],
    ) -> RemoteResult<PushReceipt> {
        validate_push(records)?;
        let sync_time = self.now();
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(crate::Error::from)?;
        apply_push(&tx, user_id, device, records, sync_time)?;
        tx.commit().map_err(crate::Error::from)?;

        tracing::debug!(kind = %R::KIND, user_id, device = %device, count = records.len(), "Applied push");
        Ok(PushReceipt { sync_time })
    }

    async fn delete_not_present_in(&self, user_id: &str, keep: &[RecordId]) -> RemoteResult<usize> {
        let keep: HashSet<&str> = keep.iter().map(RecordId::as_str).collect();
        let sync_time = self.now();
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(crate::Error::from)?;
        let removed = prune_docs::<R>(&tx, user_id, &keep)?;
        if R::FULL_SET {
            normalize_set::<R>(&tx, user_id, sync_time)?;
        }
        tx.commit().map_err(crate::Error::from)?;

        if removed > 0 {
            tracing::debug!(kind = %R::KIND, user_id, removed, "Pruned records absent from push");
        }
        Ok(removed)
    }
}

fn validate_push<R: SyncEntity>(records: &[R]) -> RemoteResult<()> {
    for record in records {
        record
            .validate()
            .map_err(|error| RemoteError::Malformed(error.to_string()))?;
    }
    Ok(())
}

/// Upsert `records` and record the device's sync time, inside the caller's transaction
fn apply_push<R: SyncEntity>(
    conn: &Connection,
    user_id: &str,
    device: &DeviceId,
    records: &[R],
    sync_time: Timestamp,
) -> Result<()> {
    let stamped = stamp_missing(conn, user_id, records, sync_time)?;
    upsert_docs(conn, user_id, &stamped)?;
    if R::FULL_SET {
        normalize_set::<R>(conn, user_id, sync_time)?;
    }
    conn.execute(
        "INSERT INTO sync_info (user_id, device_id, last_sync_time) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id, device_id) DO UPDATE SET last_sync_time = excluded.last_sync_time",
        params![user_id, device.as_str(), sync_time.timestamp_millis()],
    )?;
    Ok(())
}

fn prune_docs<R: SyncEntity>(conn: &Connection, user_id: &str, keep: &HashSet<&str>) -> Result<usize> {
    let existing = record_ids(conn, user_id, R::KIND)?;
    let mut removed = 0;
    for id in existing.iter().filter(|id| !keep.contains(id.as_str())) {
        removed += conn.execute(
            "DELETE FROM remote_records WHERE user_id = ?1 AND kind = ?2 AND id = ?3",
            params![user_id, R::KIND.as_str(), id],
        )?;
    }
    Ok(removed)
}

/// Records without a modification time take the one already stored for
/// their id, or `at` when the id is new
fn stamp_missing<R: SyncEntity>(
    conn: &Connection,
    user_id: &str,
    records: &[R],
    at: Timestamp,
) -> Result<Vec<R>> {
    let mut stmt = conn.prepare_cached(
        "SELECT updated_at FROM remote_records WHERE user_id = ?1 AND kind = ?2 AND id = ?3",
    )?;
    let mut stamped = Vec::with_capacity(records.len());
    for record in records {
        let mut record = record.clone();
        if record.updated_at().is_none() {
            let stored: Option<i64> = stmt
                .query_row(
                    params![user_id, R::KIND.as_str(), record.id().as_str()],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();
            record.stamp_if_missing(stored.and_then(from_millis).unwrap_or(at));
        }
        stamped.push(record);
    }
    Ok(stamped)
}

fn read_docs<R: SyncEntity>(
    conn: &Connection,
    user_id: &str,
    kind: RecordKind,
    since: Option<Timestamp>,
) -> Result<Vec<R>> {
    let docs: Vec<String> = if let Some(since) = since {
        let mut stmt = conn.prepare_cached(
            "SELECT doc FROM remote_records
             WHERE user_id = ?1 AND kind = ?2 AND updated_at > ?3
             ORDER BY rowid",
        )?;
        let rows = stmt.query_map(
            params![user_id, kind.as_str(), since.timestamp_millis()],
            |row| row.get(0),
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    } else {
        let mut stmt = conn.prepare_cached(
            "SELECT doc FROM remote_records WHERE user_id = ?1 AND kind = ?2 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![user_id, kind.as_str()], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    docs.iter()
        .map(|doc| serde_json::from_str(doc).map_err(Into::into))
        .collect()
}

fn upsert_docs<R: SyncEntity>(conn: &Connection, user_id: &str, records: &[R]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO remote_records (user_id, kind, id, updated_at, deleted, doc)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(user_id, kind, id) DO UPDATE SET
            updated_at = excluded.updated_at,
            deleted = excluded.deleted,
            doc = excluded.doc",
    )?;
    for record in records {
        stmt.execute(params![
            user_id,
            R::KIND.as_str(),
            record.id().as_str(),
            record.updated_at().map(|at| at.timestamp_millis()),
            i32::from(record.is_deleted()),
            serde_json::to_string(record)?,
        ])?;
    }
    Ok(())
}

fn record_ids(conn: &Connection, user_id: &str, kind: RecordKind) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare_cached("SELECT id FROM remote_records WHERE user_id = ?1 AND kind = ?2")?;
    let ids = stmt
        .query_map(params![user_id, kind.as_str()], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Rewrite a full-set kind so its set-level invariants hold
fn normalize_set<R: SyncEntity>(conn: &Connection, user_id: &str, at: Timestamp) -> Result<()> {
    let stored: Vec<R> = read_docs(conn, user_id, R::KIND, None)?;
    let normalized = R::normalize(stored.clone());
    if normalized == stored {
        return Ok(());
    }
    let normalized = stamp_missing(conn, user_id, &normalized, at)?;

    conn.execute(
        "DELETE FROM remote_records WHERE user_id = ?1 AND kind = ?2",
        params![user_id, R::KIND.as_str()],
    )?;
    upsert_docs(conn, user_id, &normalized)?;
    tracing::debug!(kind = %R::KIND, user_id, "Normalized stored set");
    Ok(())
}
