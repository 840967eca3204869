use async_trait::async_trait;
use changesync_model::{Changeset, ChangesetEvent, Repo};

use crate::error::Result;

/// Turns freshly loaded code host metadata into timeline events and the
/// derived review/check state. The diffing itself lives with the code host
/// integrations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChangesetEventDeriver: Send + Sync {
    fn events(&self, changeset: &Changeset) -> Result<Vec<ChangesetEvent>>;

    async fn set_derived_state(
        &self,
        repo: &Repo,
        changeset: &mut Changeset,
        events: &[ChangesetEvent],
    ) -> Result<()>;
}
