use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use changesync_model::{Changeset, ChangesetID, Repo};

use crate::error::{Result, SourceError, SyncError};
use crate::ports::{
    AuthenticationStrategy, ChangesetEventDeriver, ChangesetSource,
    GetChangesetOpts, SourceFactory, SyncStore, finish_transaction,
};

/// Runs one sync of one changeset. Code host syncers call this from their
/// loop; it must not assume the changeset is still eligible.
#[async_trait]
pub trait SyncExecutor: Send + Sync {
    async fn sync_changeset(&self, id: ChangesetID) -> Result<()>;
}

/// Production executor: reload from the store, fetch from the code host,
/// derive events, persist.
#[derive(Clone)]
pub struct ChangesetSyncExecutor {
    store: Arc<dyn SyncStore>,
    sources: Arc<dyn SourceFactory>,
    deriver: Arc<dyn ChangesetEventDeriver>,
}

impl fmt::Debug for ChangesetSyncExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangesetSyncExecutor")
            .field("store", &type_name_of_val(self.store.as_ref()))
            .field("sources", &type_name_of_val(self.sources.as_ref()))
            .field("deriver", &type_name_of_val(self.deriver.as_ref()))
            .finish()
    }
}

impl ChangesetSyncExecutor {
    pub fn new(
        store: Arc<dyn SyncStore>,
        sources: Arc<dyn SourceFactory>,
        deriver: Arc<dyn ChangesetEventDeriver>,
    ) -> Self {
        Self {
            store,
            sources,
            deriver,
        }
    }
}

#[async_trait]
impl SyncExecutor for ChangesetSyncExecutor {
    async fn sync_changeset(&self, id: ChangesetID) -> Result<()> {
        // The scheduler's view can be stale: the changeset may have been
        // picked up by the reconciler or closed since it was queued.
        let Some(changeset) =
            self.store.get_changeset(GetChangesetOpts::syncable(id)).await?
        else {
            tracing::debug!(
                target: "changeset_syncer::executor",
                changeset = %id,
                "changeset not found or no longer syncable"
            );
            return Ok(());
        };

        let repo = self
            .store
            .get_repo(changeset.repo_id)
            .await?
            .ok_or_else(|| {
                SyncError::NotFound(format!(
                    "repo {} of changeset {}",
                    changeset.repo_id, id
                ))
            })?;

        let source = match self
            .sources
            .for_changeset(
                self.store.as_ref(),
                &changeset,
                AuthenticationStrategy::UserCredential,
            )
            .await
        {
            Ok(source) => source,
            Err(SourceError::DeletedNamespace) => {
                tracing::debug!(
                    target: "changeset_syncer::executor",
                    changeset = %id,
                    "skipping changeset: namespace deleted"
                );
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        sync_changeset(
            self.store.as_ref(),
            self.deriver.as_ref(),
            source.as_ref(),
            &repo,
            changeset,
        )
        .await
    }
}

/// Refreshes `changeset` from `source` and persists the new state together
/// with its derived events.
///
/// A changeset the code host no longer knows is marked deleted instead of
/// failing. Any other code host error is recorded on the changeset and
/// returned.
pub async fn sync_changeset(
    store: &dyn SyncStore,
    deriver: &dyn ChangesetEventDeriver,
    source: &dyn ChangesetSource,
    repo: &Repo,
    mut changeset: Changeset,
) -> Result<()> {
    if let Err(err) = source.load_changeset(repo, &mut changeset).await {
        if !err.is_not_found() {
            changeset.sync_error_message = Some(err.to_string());
            if let Err(store_err) =
                store.update_changeset_code_host_state(&changeset).await
            {
                tracing::warn!(
                    target: "changeset_syncer::executor",
                    changeset = %changeset.id,
                    error = %store_err,
                    "failed to record sync error"
                );
            }
            return Err(err.into());
        }

        if !changeset.is_deleted() {
            changeset.set_deleted(store.clock().now());
        }
    }

    let mut tx = store.transact().await?;
    let outcome: Result<()> = async {
        let events = deriver.events(&changeset)?;
        deriver
            .set_derived_state(repo, &mut changeset, &events)
            .await?;
        tx.upsert_changeset_events(&events).await?;

        changeset.sync_error_message = None;
        tx.update_changeset_code_host_state(&changeset).await
    }
    .await;

    finish_transaction(tx, outcome).await
}
