use async_trait::async_trait;
use changesync_model::{Changeset, Repo};

use crate::error::SourceError;
use crate::ports::store::SyncStore;

/// Which credential a source authenticates with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AuthenticationStrategy {
    /// The credential of the user who owns the changeset, falling back to the
    /// site credential for the code host.
    #[default]
    UserCredential,
}

/// Client for a single code host, scoped to one credential.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChangesetSource: Send + Sync {
    /// Refreshes `changeset` in place with the state reported by the code
    /// host. A changeset that no longer exists yields
    /// [`SourceError::ChangesetNotFound`].
    async fn load_changeset(
        &self,
        repo: &Repo,
        changeset: &mut Changeset,
    ) -> Result<(), SourceError>;
}

/// Builds sources for changesets, resolving credentials through the store.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    /// Fails with [`SourceError::DeletedNamespace`] when the user or
    /// organisation owning the changeset is gone.
    async fn for_changeset(
        &self,
        store: &dyn SyncStore,
        changeset: &Changeset,
        strategy: AuthenticationStrategy,
    ) -> Result<Box<dyn ChangesetSource>, SourceError>;
}
