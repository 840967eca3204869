use url::Url;

use crate::error::ModelError;

/// Strongly typed ID for changesets tracked by the syncer
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ChangesetID(pub i64);

impl ChangesetID {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ChangesetID {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ChangesetID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed ID for repositories
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RepoID(pub i32);

impl RepoID {
    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl From<i32> for RepoID {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for RepoID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of a code host: the normalized external service URL.
///
/// Every repository records the external service it was mirrored from, so
/// this is also the key used to route a changeset to its code host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CodeHostID(String);

impl CodeHostID {
    /// Wraps an already-normalized identifier verbatim.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Normalizes a code host URL: lowercase scheme and host, no query or
    /// fragment, and always a trailing slash.
    pub fn from_url(raw: &str) -> Result<Self, ModelError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelError::InvalidCodeHost(
                "code host url cannot be empty".to_string(),
            ));
        }

        let mut url = Url::parse(trimmed).map_err(|err| {
            ModelError::InvalidCodeHost(format!("{trimmed}: {err}"))
        })?;
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(ModelError::InvalidCodeHost(format!(
                "{trimmed}: missing host"
            )));
        }

        url.set_query(None);
        url.set_fragment(None);
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        // `Url` already lowercases scheme and host.
        Ok(Self(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CodeHostID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CodeHostID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
