//! Data models for NoteMemo

mod category;
mod note;
mod record;
mod seed;
mod sync;
pub(crate) mod timestamp;

pub use category::{NoteCategory, OTHER_CATEGORY};
pub use note::{Note, NoteDraft, NotePatch};
pub use record::{RecordId, RecordKind, SyncRecord, Timestamp};
pub use seed::{default_categories, sample_notes, SEED_TIMESTAMP};
pub use sync::{DeviceId, DeviceSyncInfo, SyncConflict, SyncWatermark};
