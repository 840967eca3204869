use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::ids::ChangesetID;

/// Timeline entries derived from a changeset's code host payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ChangesetEventKind {
    Commented,
    Reviewed,
    ReviewRequested,
    ReviewDismissed,
    Merged,
    Closed,
    Reopened,
    Labeled,
    Unlabeled,
    ReadyForReview,
    ConvertedToDraft,
    CheckSuite,
    CheckRun,
    CommitPushed,
}

/// Uniquely identified by `(changeset_id, kind, key)`; upserting the same
/// triple replaces the stored row.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangesetEvent {
    pub changeset_id: ChangesetID,
    pub kind: ChangesetEventKind,
    /// Code host specific identifier of the event within its changeset.
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: Value,
}

impl ChangesetEvent {
    pub fn identity(&self) -> (ChangesetID, ChangesetEventKind, &str) {
        (self.changeset_id, self.kind, self.key.as_str())
    }
}
