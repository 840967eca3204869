//! Core data model definitions shared across the changeset sync crates.
#![allow(missing_docs)]

pub mod changeset;
pub mod changeset_event;
pub mod code_host;
pub mod error;
pub mod ids;
pub mod sync_data;

pub use changeset::{
    Changeset, ChangesetCheckState, ChangesetExternalState,
    ChangesetReviewState, PublicationState, ReconcilerState,
};
pub use changeset_event::{ChangesetEvent, ChangesetEventKind};
pub use code_host::{CodeHost, ExternalServiceKind, Repo};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{ChangesetID, CodeHostID, RepoID};
pub use sync_data::ChangesetSyncData;
