use thiserror::Error;

/// Failures reported by a code host source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("changeset {external_id} not found on code host")]
    ChangesetNotFound { external_id: String },

    #[error("namespace owning the changeset was deleted")]
    DeletedNamespace,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl SourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::ChangesetNotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Code host error: {0}")]
    Source(#[from] SourceError),

    #[error("Event derivation error: {0}")]
    Derivation(String),

    #[error("priority sync queue is full (capacity {capacity})")]
    PriorityQueueFull { capacity: usize },

    #[error("sync registry is shut down")]
    Shutdown,

    #[error("sync registry already started")]
    AlreadyStarted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
