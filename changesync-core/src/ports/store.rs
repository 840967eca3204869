use std::sync::Arc;

use async_trait::async_trait;
use changesync_model::{
    Changeset, ChangesetEvent, ChangesetID, ChangesetSyncData, CodeHost,
    CodeHostID, PublicationState, ReconcilerState, Repo, RepoID,
};

use crate::clock::Clock;
use crate::error::Result;

#[derive(Clone, Debug, Default)]
pub struct ListCodeHostsOpts {
    /// Skip hosts that push webhooks, leaving only the ones that must be polled.
    pub only_without_webhooks: bool,
}

/// Filters for [`SyncStore::list_changeset_sync_data`]. Implementations only
/// return changesets that are published, fully reconciled, not externally
/// deleted and attached to at least one open batch change.
#[derive(Clone, Debug, Default)]
pub struct ListChangesetSyncDataOpts {
    /// Restrict to these changesets; empty means all.
    pub changeset_ids: Vec<ChangesetID>,
    /// Restrict to changesets whose repository lives on this code host.
    pub external_service_id: Option<CodeHostID>,
}

#[derive(Clone, Debug, Default)]
pub struct GetChangesetOpts {
    pub id: ChangesetID,
    pub reconciler_state: Option<ReconcilerState>,
    pub publication_state: Option<PublicationState>,
}

impl GetChangesetOpts {
    /// Lookup that only matches changesets the syncer is allowed to touch.
    pub fn syncable(id: ChangesetID) -> Self {
        Self {
            id,
            reconciler_state: Some(ReconcilerState::Completed),
            publication_state: Some(PublicationState::Published),
        }
    }

    pub fn matches(&self, changeset: &Changeset) -> bool {
        changeset.id == self.id
            && self
                .reconciler_state
                .is_none_or(|state| changeset.reconciler_state == state)
            && self
                .publication_state
                .is_none_or(|state| changeset.publication_state == state)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ListChangesetsOpts {
    pub repo_ids: Vec<RepoID>,
}

/// Data access the syncer needs. Implementations must be safe to share across
/// every code host task.
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn list_code_hosts(
        &self,
        opts: ListCodeHostsOpts,
    ) -> Result<Vec<CodeHost>>;

    async fn list_changeset_sync_data(
        &self,
        opts: ListChangesetSyncDataOpts,
    ) -> Result<Vec<ChangesetSyncData>>;

    /// `Ok(None)` when no changeset matches the id and state preconditions.
    async fn get_changeset(
        &self,
        opts: GetChangesetOpts,
    ) -> Result<Option<Changeset>>;

    async fn list_changesets(
        &self,
        opts: ListChangesetsOpts,
    ) -> Result<Vec<Changeset>>;

    async fn get_repo(&self, id: RepoID) -> Result<Option<Repo>>;

    async fn update_changeset_code_host_state(
        &self,
        changeset: &Changeset,
    ) -> Result<()>;

    async fn transact(&self) -> Result<Box<dyn SyncTransaction>>;

    fn clock(&self) -> Arc<dyn Clock>;
}

/// Writes that must land together. Dropping a transaction without calling
/// [`SyncTransaction::commit`] must discard its writes.
#[async_trait]
pub trait SyncTransaction: Send {
    async fn update_changeset_code_host_state(
        &mut self,
        changeset: &Changeset,
    ) -> Result<()>;

    async fn upsert_changeset_events(
        &mut self,
        events: &[ChangesetEvent],
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Commits when `outcome` is `Ok`, otherwise rolls back and hands the original
/// error back to the caller.
pub async fn finish_transaction(
    tx: Box<dyn SyncTransaction>,
    outcome: Result<()>,
) -> Result<()> {
    match outcome {
        Ok(()) => tx.commit().await,
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(
                    target: "changeset_syncer::store",
                    error = %rollback_err,
                    "transaction rollback failed"
                );
            }
            Err(err)
        }
    }
}
