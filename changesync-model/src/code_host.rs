use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::ids::{CodeHostID, RepoID};

/// Kind of external service a code host runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(into = "String", try_from = "String")
)]
pub enum ExternalServiceKind {
    GitHub,
    GitLab,
    BitbucketServer,
    BitbucketCloud,
    AzureDevOps,
    Gerrit,
    Perforce,
    /// A kind this system knows about but cannot sync changesets for.
    Other(String),
}

impl ExternalServiceKind {
    /// Whether changesets on this kind of host can be synced at all.
    pub fn is_supported(&self) -> bool {
        !matches!(self, ExternalServiceKind::Other(_))
    }

    pub fn as_tag(&self) -> &str {
        match self {
            ExternalServiceKind::GitHub => "GITHUB",
            ExternalServiceKind::GitLab => "GITLAB",
            ExternalServiceKind::BitbucketServer => "BITBUCKETSERVER",
            ExternalServiceKind::BitbucketCloud => "BITBUCKETCLOUD",
            ExternalServiceKind::AzureDevOps => "AZUREDEVOPS",
            ExternalServiceKind::Gerrit => "GERRIT",
            ExternalServiceKind::Perforce => "PERFORCE",
            ExternalServiceKind::Other(tag) => tag,
        }
    }
}

impl fmt::Display for ExternalServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for ExternalServiceKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        if tag.is_empty() {
            return Err(ModelError::UnknownState {
                kind: "external service kind",
                value: s.to_string(),
            });
        }
        let kind = match tag.to_ascii_uppercase().as_str() {
            "GITHUB" => ExternalServiceKind::GitHub,
            "GITLAB" => ExternalServiceKind::GitLab,
            "BITBUCKETSERVER" => ExternalServiceKind::BitbucketServer,
            "BITBUCKETCLOUD" => ExternalServiceKind::BitbucketCloud,
            "AZUREDEVOPS" => ExternalServiceKind::AzureDevOps,
            "GERRIT" => ExternalServiceKind::Gerrit,
            "PERFORCE" => ExternalServiceKind::Perforce,
            other => ExternalServiceKind::Other(other.to_string()),
        };
        Ok(kind)
    }
}

impl From<ExternalServiceKind> for String {
    fn from(kind: ExternalServiceKind) -> Self {
        kind.as_tag().to_string()
    }
}

impl TryFrom<String> for ExternalServiceKind {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A code host instance with at least one mirrored repository.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CodeHost {
    pub kind: ExternalServiceKind,
    pub external_service_id: CodeHostID,
    pub requires_ssh: bool,
    pub has_webhooks: bool,
}

impl CodeHost {
    pub fn new(kind: ExternalServiceKind, external_service_id: CodeHostID) -> Self {
        Self {
            kind,
            external_service_id,
            requires_ssh: false,
            has_webhooks: false,
        }
    }
}

/// Repository a changeset was opened against.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Repo {
    pub id: RepoID,
    pub name: String,
    pub external_service_kind: ExternalServiceKind,
    pub external_service_id: CodeHostID,
}
