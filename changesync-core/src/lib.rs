//! Keeps tracked changesets in step with the code hosts they live on.
//!
//! The crate decides *when* each changeset is synced and drives the sync
//! through a small set of ports:
//!
//! * [`ports::SyncStore`] for persistence,
//! * [`ports::SourceFactory`] / [`ports::ChangesetSource`] for code host APIs,
//! * [`ports::ChangesetEventDeriver`] for turning fetched metadata into events.
//!
//! A [`SyncRegistry`] is the entry point: build it from [`SyncerDeps`] and a
//! [`SyncerConfig`], call [`SyncRegistry::start`], and use
//! [`SyncRegistry::enqueue_changeset_syncs`] to ask for a sync ahead of
//! schedule.

pub mod clock;
pub mod config;
pub mod error;
pub mod ports;
pub mod syncer;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AutoSyncSwitch, BackoffConfig, SyncerConfig};
pub use error::{Result, SourceError, SyncError};
pub use syncer::{
    ChangesetSyncExecutor, CodeHostSyncerHandle, SyncExecutor, SyncRegistry,
    SyncerDeps,
};
