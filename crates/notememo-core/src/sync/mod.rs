//! Offline-first synchronization.
//!
//! Each record kind is synced by a [`SyncCoordinator`] that merges the local
//! store with a [`RemoteStore`] using last-writer-wins. [`SyncService`] runs
//! the notes and categories coordinators together and feeds the shared
//! [`SyncStatusReporter`].

mod coordinator;
mod document_store;
mod entity;
mod http;
mod remote;
mod service;
mod status;

pub use coordinator::{SkipReason, SyncCoordinator, SyncMode, SyncOutcome, SyncReport};
pub use document_store::{Clock, DocumentStore};
pub use entity::SyncEntity;
pub use http::{HttpRemoteStore, ACCESS_CODE_HEADER, DEVICE_ID_HEADER};
pub use remote::{
    PushReceipt, RemoteError, RemoteResult, RemoteStore, RemoteSyncStatus, SyncStatusSource,
};
pub use service::{RemoteEndpoints, SyncService, SyncSummary};
pub use status::{SyncState, SyncStatus, SyncStatusReporter};
