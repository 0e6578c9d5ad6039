//! Last-writer-wins merge over record sets keyed by stable id.
//!
//! The local side is seeded first, so on equal `updated_at` the local copy
//! survives: a device's own fresh edit is never clobbered by a stale echo of
//! itself coming back from the server. Tombstones take part in the merge like
//! any other record and are only filtered out by [`visible`].

use std::collections::HashMap;

use crate::models::{NoteCategory, RecordId, SyncRecord, Timestamp, OTHER_CATEGORY};

/// A record id seen on both sides with differing content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub record_id: RecordId,
    pub local_updated_at: Option<Timestamp>,
    pub remote_updated_at: Option<Timestamp>,
    pub remote_won: bool,
}

/// Merged records plus the conflicts resolved along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport<R> {
    pub records: Vec<R>,
    pub conflicts: Vec<MergeConflict>,
    /// Remote records that were new locally or replaced a local copy
    pub pulled: usize,
}

/// Merge `remote` into `local`, keeping the strictly newer copy per id.
///
/// Output holds every record (including tombstones): local order first, then
/// records that only exist remotely in remote order.
pub fn merge<R: SyncRecord + PartialEq>(local: Vec<R>, remote: Vec<R>) -> Vec<R> {
    merge_with_report(local, remote).records
}

/// Like [`merge`], but also reports conflicts and how many remote records won.
pub fn merge_with_report<R: SyncRecord + PartialEq>(local: Vec<R>, remote: Vec<R>) -> MergeReport<R> {
    let mut records: Vec<R> = Vec::with_capacity(local.len() + remote.len());
    let mut index: HashMap<RecordId, usize> = HashMap::with_capacity(local.len() + remote.len());

    for record in local {
        match index.get(record.id()) {
            // Duplicate ids on one side collapse with the same rule
            Some(&slot) => {
                if record.updated_at() > records[slot].updated_at() {
                    records[slot] = record;
                }
            }
            None => {
                index.insert(record.id().clone(), records.len());
                records.push(record);
            }
        }
    }

    let mut conflicts = Vec::new();
    let mut pulled = 0;
    for record in remote {
        let Some(&slot) = index.get(record.id()) else {
            index.insert(record.id().clone(), records.len());
            records.push(record);
            pulled += 1;
            continue;
        };

        let existing = &records[slot];
        if *existing == record {
            continue;
        }

        let remote_won = record.updated_at() > existing.updated_at();
        conflicts.push(MergeConflict {
            record_id: record.id().clone(),
            local_updated_at: existing.updated_at(),
            remote_updated_at: record.updated_at(),
            remote_won,
        });
        if remote_won {
            records[slot] = record;
            pulled += 1;
        }
    }

    MergeReport {
        records,
        conflicts,
        pulled,
    }
}

/// Drop tombstones for consumer-facing reads.
pub fn visible<R: SyncRecord>(records: Vec<R>) -> Vec<R> {
    records
        .into_iter()
        .filter(|record| !record.is_deleted())
        .collect()
}

/// Collapse categories that share a case-insensitive name.
///
/// The last entry in input order wins and takes the slot of the first
/// occurrence. The fallback category is appended when absent.
pub fn remove_duplicate_categories(categories: Vec<NoteCategory>) -> Vec<NoteCategory> {
    let mut out: Vec<NoteCategory> = Vec::with_capacity(categories.len() + 1);
    let mut slots: HashMap<String, usize> = HashMap::with_capacity(categories.len());

    for category in categories {
        let key = category.name_key();
        if let Some(&slot) = slots.get(&key) {
            out[slot] = category;
        } else {
            slots.insert(key, out.len());
            out.push(category);
        }
    }

    if !out.iter().any(NoteCategory::is_other) {
        let mut other = crate::models::default_categories()
            .into_iter()
            .find(NoteCategory::is_other)
            .unwrap_or_else(|| NoteCategory::new(OTHER_CATEGORY, None));
        if out.iter().any(|category| category.id == other.id) {
            other.id = RecordId::generate();
        }
        out.push(other);
    }

    out
}
