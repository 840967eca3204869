//! Ports the syncer talks through. Production adapters (database, code host
//! clients) live outside this crate.

pub mod events;
pub mod source;
pub mod store;

pub use events::ChangesetEventDeriver;
pub use source::{AuthenticationStrategy, ChangesetSource, SourceFactory};
pub use store::{
    GetChangesetOpts, ListChangesetSyncDataOpts, ListChangesetsOpts,
    ListCodeHostsOpts, SyncStore, SyncTransaction, finish_transaction,
};
