use chrono::{DateTime, Utc};

use crate::ids::{ChangesetID, CodeHostID};

/// Timestamps the scheduler needs to decide when a changeset is due.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangesetSyncData {
    pub changeset_id: ChangesetID,
    /// Last time the changeset was written locally, i.e. the last sync.
    pub updated_at: DateTime<Utc>,
    /// Most recent `updated_at` across the changeset's events.
    pub latest_event: Option<DateTime<Utc>>,
    /// Last change reported by the code host itself.
    pub external_updated_at: Option<DateTime<Utc>>,
    /// Code host owning the changeset's repository.
    pub repo_external_service_id: CodeHostID,
}
