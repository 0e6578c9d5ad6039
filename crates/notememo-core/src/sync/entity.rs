//! Per-kind sync policy

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::merge::remove_duplicate_categories;
use crate::models::{Note, NoteCategory, SyncRecord, Timestamp};

/// A record kind the coordinator knows how to sync.
pub trait SyncEntity:
    SyncRecord + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The kind is a small set that is always pushed whole, and the remote
    /// copy is pruned to the pushed ids. Such kinds carry no tombstones.
    const FULL_SET: bool = false;

    /// Enforce set-level invariants before every persist and push
    fn normalize(records: Vec<Self>) -> Vec<Self> {
        records
    }

    /// Give a record without a modification time the server's time, so
    /// incremental reads can find it
    fn stamp_if_missing(&mut self, _at: Timestamp) {}
}

impl SyncEntity for Note {}

impl SyncEntity for NoteCategory {
    const FULL_SET: bool = true;

    fn normalize(records: Vec<Self>) -> Vec<Self> {
        remove_duplicate_categories(records)
    }

    fn stamp_if_missing(&mut self, at: Timestamp) {
        self.updated_at.get_or_insert(at);
    }
}
