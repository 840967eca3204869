use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::code_host::ExternalServiceKind;
use crate::ids::{ChangesetID, RepoID};

/// State of the changeset on the code host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ChangesetExternalState {
    Draft,
    #[default]
    Open,
    Closed,
    Merged,
    ReadOnly,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ChangesetReviewState {
    Approved,
    ChangesRequested,
    #[default]
    Pending,
    Commented,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ChangesetCheckState {
    #[default]
    Unknown,
    Pending,
    Passed,
    Failed,
}

/// Progress of the reconciler that publishes changesets. Only changesets the
/// reconciler is done with are eligible for syncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ReconcilerState {
    Scheduled,
    #[default]
    Queued,
    Processing,
    Errored,
    Failed,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum PublicationState {
    #[default]
    Unpublished,
    Published,
}

/// Locally mirrored copy of a pull/merge request.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Changeset {
    pub id: ChangesetID,
    pub repo_id: RepoID,
    pub external_id: String,
    pub external_service_kind: Option<ExternalServiceKind>,
    pub external_branch: String,
    pub external_state: ChangesetExternalState,
    pub external_review_state: ChangesetReviewState,
    pub external_check_state: ChangesetCheckState,
    /// Raw payload last fetched from the code host.
    pub metadata: Value,
    pub external_updated_at: Option<DateTime<Utc>>,
    pub external_deleted_at: Option<DateTime<Utc>>,
    pub diff_stat_added: Option<i32>,
    pub diff_stat_deleted: Option<i32>,
    pub reconciler_state: ReconcilerState,
    pub publication_state: PublicationState,
    pub sync_error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last time the row was written, which is also the last sync.
    pub updated_at: DateTime<Utc>,
}

impl Changeset {
    pub fn is_deleted(&self) -> bool {
        self.external_deleted_at.is_some()
    }

    /// Marks the changeset as deleted on the code host.
    pub fn set_deleted(&mut self, now: DateTime<Utc>) {
        self.external_deleted_at = Some(now);
        self.external_state = ChangesetExternalState::Deleted;
    }
}
