//! Storage seams used by the sync coordinator

use crate::error::Result;
use crate::merge::MergeConflict;
use crate::models::{DeviceId, RecordId, RecordKind, SyncRecord, Timestamp};

/// On-device collection of one record kind.
///
/// Implementations keep tombstones internally and hide them from consumer
/// reads. When the backing storage is unavailable, reads fall back to the
/// built-in seed data and writes are silently dropped.
pub trait LocalStore<R: SyncRecord>: Send + Sync {
    /// All visible (non-deleted) records
    fn read_all(&self) -> Result<Vec<R>>;

    /// Every record, tombstones included
    fn read_all_including_tombstones(&self) -> Result<Vec<R>>;

    /// A visible record by id
    fn get(&self, id: &RecordId) -> Result<Option<R>>;

    /// Insert absent records and replace stored ones whose `updated_at` is not
    /// newer than the incoming copy. Returns how many rows changed.
    fn upsert_many(&self, records: &[R]) -> Result<usize>;

    /// Whether writes reach durable storage
    fn is_available(&self) -> bool {
        true
    }

    /// Persist the outcome of a merge pass
    fn persist_resolved(&self, records: &[R]) -> Result<()> {
        self.upsert_many(records).map(|_| ())
    }
}

/// Per-device record of the last successful sync, keyed by user and kind.
pub trait WatermarkStore: Send + Sync {
    /// Last confirmed sync time, if any
    fn get(&self, device: &DeviceId, user_id: &str, kind: RecordKind) -> Result<Option<Timestamp>>;

    /// Advance the watermark after a confirmed push
    fn set(
        &self,
        device: &DeviceId,
        user_id: &str,
        kind: RecordKind,
        time: Timestamp,
    ) -> Result<()>;

    /// Forget every watermark for this device, forcing the next pass to be full
    fn clear(&self, device: &DeviceId) -> Result<()>;
}

/// Audit log of conflicts resolved during merges.
pub trait ConflictLog: Send + Sync {
    fn record_conflicts(&self, kind: RecordKind, conflicts: &[MergeConflict]) -> Result<()>;
}
