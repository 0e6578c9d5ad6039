//! Settings, device identity and sync bookkeeping

use std::sync::OnceLock;

use rusqlite::{params, Connection, OptionalExtension};

use super::note_repository::millis_column;
use super::store::{ConflictLog, WatermarkStore};
use super::Database;
use crate::error::Result;
use crate::merge::MergeConflict;
use crate::models::{DeviceId, RecordKind, SyncConflict, Timestamp};
use crate::util::{from_millis, now};

const DEVICE_ID_KEY: &str = "device_id";
const USER_ID_KEY: &str = "user_id";

/// Strategy name recorded for every resolved conflict
pub const LWW_STRATEGY: &str = "last_write_wins";

/// Trait for settings storage operations
pub trait SettingsRepository {
    /// The installation's device id, created on first use
    fn device_id(&self) -> Result<DeviceId>;

    /// User id learned from the server, if any
    fn user_id(&self) -> Result<Option<String>>;

    /// Remember the server-side user id
    fn set_user_id(&self, user_id: &str) -> Result<()>;

    /// Append merge conflicts to the audit log
    fn record_conflicts(&self, kind: RecordKind, conflicts: &[MergeConflict]) -> Result<()>;

    /// Most recent conflicts first
    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// `SQLite` implementation of `SettingsRepository`
pub struct SqliteSettingsRepository<'a> {
    db: &'a Database,
}

impl<'a> SqliteSettingsRepository<'a> {
    /// Create a new repository over the given database
    pub const fn new(db: &'a Database) -> Self {
        Self { db }
    }
}

/// Device id for an unavailable store, stable for the process lifetime
fn ephemeral_device_id() -> DeviceId {
    static DEVICE: OnceLock<DeviceId> = OnceLock::new();
    DEVICE.get_or_init(DeviceId::generate).clone()
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn device_id(&self) -> Result<DeviceId> {
        self.db
            .with_connection(|conn| {
                if let Some(existing) = get_setting(conn, DEVICE_ID_KEY)? {
                    return Ok(DeviceId::from(existing));
                }
                let device = DeviceId::generate();
                set_setting(conn, DEVICE_ID_KEY, device.as_str())?;
                tracing::info!("Registered new device {device}");
                Ok(device)
            })
            .unwrap_or_else(|| Ok(ephemeral_device_id()))
    }

    fn user_id(&self) -> Result<Option<String>> {
        self.db
            .with_connection(|conn| get_setting(conn, USER_ID_KEY))
            .unwrap_or(Ok(None))
    }

    fn set_user_id(&self, user_id: &str) -> Result<()> {
        self.db
            .with_connection(|conn| set_setting(conn, USER_ID_KEY, user_id))
            .unwrap_or(Ok(()))
    }

    fn record_conflicts(&self, kind: RecordKind, conflicts: &[MergeConflict]) -> Result<()> {
        if conflicts.is_empty() {
            return Ok(());
        }
        self.db
            .with_connection(|conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO sync_conflicts
                            (kind, record_id, local_updated_at, incoming_updated_at, remote_won, resolved_at, strategy)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )?;
                    let resolved_at = now().timestamp_millis();
                    for conflict in conflicts {
                        stmt.execute(params![
                            kind.as_str(),
                            conflict.record_id.as_str(),
                            conflict.local_updated_at.map(|at| at.timestamp_millis()),
                            conflict.remote_updated_at.map(|at| at.timestamp_millis()),
                            i32::from(conflict.remote_won),
                            resolved_at,
                            LWW_STRATEGY,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .unwrap_or(Ok(()))
    }

    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, kind, record_id, local_updated_at, incoming_updated_at, remote_won, resolved_at, strategy
                     FROM sync_conflicts
                     ORDER BY resolved_at DESC, id DESC
                     LIMIT ?1",
                )?;
                let conflicts = stmt
                    .query_map(params![limit], |row| {
                        let kind: String = row.get(1)?;
                        let local: Option<i64> = row.get(3)?;
                        let incoming: Option<i64> = row.get(4)?;
                        Ok(SyncConflict {
                            id: row.get(0)?,
                            kind: kind.parse().unwrap_or(RecordKind::Notes),
                            record_id: row.get::<_, String>(2)?.into(),
                            local_updated_at: local.and_then(from_millis),
                            incoming_updated_at: incoming.and_then(from_millis),
                            remote_won: row.get::<_, i32>(5)? != 0,
                            resolved_at: millis_column(row, 6)?,
                            strategy: row.get(7)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(conflicts)
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

impl WatermarkStore for Database {
    fn get(&self, device: &DeviceId, user_id: &str, kind: RecordKind) -> Result<Option<Timestamp>> {
        self.with_connection(|conn| {
            let millis: Option<i64> = conn
                .query_row(
                    "SELECT last_sync_time FROM sync_watermarks
                     WHERE device_id = ?1 AND user_id = ?2 AND kind = ?3",
                    params![device.as_str(), user_id, kind.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(millis.and_then(from_millis))
        })
        .unwrap_or(Ok(None))
    }

    fn set(
        &self,
        device: &DeviceId,
        user_id: &str,
        kind: RecordKind,
        time: Timestamp,
    ) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO sync_watermarks (device_id, user_id, kind, last_sync_time)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(device_id, user_id, kind) DO UPDATE SET
                    last_sync_time = excluded.last_sync_time",
                params![device.as_str(), user_id, kind.as_str(), time.timestamp_millis()],
            )?;
            Ok(())
        })
        .unwrap_or(Ok(()))
    }

    fn clear(&self, device: &DeviceId) -> Result<()> {
        self.with_connection(|conn| {
            let removed = conn.execute(
                "DELETE FROM sync_watermarks WHERE device_id = ?1",
                params![device.as_str()],
            )?;
            tracing::debug!("Cleared {removed} sync watermarks for device {device}");
            Ok(())
        })
        .unwrap_or(Ok(()))
    }
}

impl ConflictLog for Database {
    fn record_conflicts(&self, kind: RecordKind, conflicts: &[MergeConflict]) -> Result<()> {
        SqliteSettingsRepository::new(self).record_conflicts(kind, conflicts)
    }
}

fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}
