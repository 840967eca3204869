//! Scheduling and execution of changeset syncs.
//!
//! Every code host gets its own [`CodeHostSyncer`] task that keeps a
//! [`SyncQueue`] ordered by [`backoff`] and priority. The [`SyncRegistry`]
//! starts and stops those tasks as code hosts come and go and routes
//! priority requests to them.

pub mod backoff;
pub mod code_host;
pub mod executor;
pub mod metrics;
pub mod queue;
pub mod registry;

pub use backoff::{BackoffPolicy, MAX_SYNC_DELAY, MIN_SYNC_DELAY, next_sync};
pub use code_host::{CodeHostSyncer, CodeHostSyncerHandle, SyncerDeps};
pub use executor::{ChangesetSyncExecutor, SyncExecutor, sync_changeset};
pub use queue::{ScheduledSync, SyncPriority, SyncQueue};
pub use registry::SyncRegistry;
