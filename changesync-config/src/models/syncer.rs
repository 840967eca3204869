use anyhow::{Context, anyhow};
use changesync_core::SyncerConfig;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

pub const CONFIG_PATH_ENV: &str = "CHANGESET_SYNCER_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "CHANGESET_SYNCER_CONFIG_JSON";

const DEFAULT_CANDIDATES: &[&str] = &[
    "changeset-syncer.toml",
    "changeset-syncer.json",
    "config/changeset-syncer.toml",
    "config/changeset-syncer.json",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncerConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Settings for a process running the changeset syncer.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Scheduling and channel tuning. Lower `schedule_interval_ms` picks up
    /// new changesets faster at the cost of more store reads per code host.
    pub syncer: SyncerConfig,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl ServiceConfig {
    /// Load configuration using environment variables.
    /// Evaluation order:
    /// 1) `$CHANGESET_SYNCER_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$CHANGESET_SYNCER_CONFIG_JSON` (inline JSON),
    /// 3) the first default file found in the working directory,
    /// 4) defaults.
    ///
    /// The result is validated before it is returned.
    pub fn load_from_env() -> anyhow::Result<(Self, SyncerConfigSource)> {
        let cwd = env::current_dir()
            .context("failed to resolve working directory")?;
        Self::load_with(|key| env::var(key).ok(), &cwd)
    }

    /// [`ServiceConfig::load_from_env`] with an explicit variable lookup and
    /// base directory for the default files.
    pub fn load_with<F>(
        lookup: F,
        base_dir: &Path,
    ) -> anyhow::Result<(Self, SyncerConfigSource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (config, source) = Self::resolve(lookup, base_dir)?;
        config.validate()?;
        Ok((config, source))
    }

    fn resolve<F>(
        lookup: F,
        base_dir: &Path,
    ) -> anyhow::Result<(Self, SyncerConfigSource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path_str) = lookup(CONFIG_PATH_ENV)
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str.trim());
            let config = Self::load_from_file(&path)?;
            return Ok((config, SyncerConfigSource::EnvPath(path)));
        }

        if let Some(raw) = lookup(CONFIG_JSON_ENV)
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_ENV}"))?;
            return Ok((parsed, SyncerConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file(base_dir) {
            let config = Self::load_from_file(&path)?;
            return Ok((config, SyncerConfigSource::File(path)));
        }

        Ok((Self::default(), SyncerConfigSource::Default))
    }

    /// Reads a config file. `.json` and `.toml` files are parsed as such;
    /// any other name is tried as TOML, then as JSON.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("cannot read changeset syncer config {}", path.display())
        })?;
        let origin = path.display().to_string();

        match ConfigFormat::from_path(path) {
            Some(ConfigFormat::Json) => Self::parse_json(&contents)
                .with_context(|| format!("in {origin}")),
            Some(ConfigFormat::Toml) => Self::parse_toml(&contents)
                .with_context(|| format!("in {origin}")),
            None => Self::parse_from_str(&contents, &origin),
        }
    }

    /// Parses `contents` of unknown format. `origin` names the source in
    /// the error when neither format fits.
    pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Self> {
        let toml_err = match Self::parse_toml(contents) {
            Ok(config) => return Ok(config),
            Err(err) => err,
        };
        Self::parse_json(contents).map_err(|json_err| {
            anyhow!(
                "{origin} is neither a TOML nor a JSON changeset syncer config \
                 (toml: {toml_err:#}; json: {json_err:#})"
            )
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .context("changeset syncer config is not valid JSON")
    }

    fn parse_toml(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("changeset syncer config is not valid TOML")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.syncer
            .validate()
            .context("invalid changeset syncer configuration")
    }

    /// One-line rendering of the effective settings for the startup log.
    pub fn summary(&self) -> String {
        let syncer = &self.syncer;
        format!(
            "schedule every {}, reconcile every {}, backoff {}..{}, \
             priority mailbox {}, enqueue channel {}, auto sync {}",
            humantime::format_duration(syncer.schedule_interval()),
            humantime::format_duration(syncer.reconcile_interval()),
            humantime::format_duration(std::time::Duration::from_secs(
                syncer.backoff.min_sync_delay_secs
            )),
            humantime::format_duration(std::time::Duration::from_secs(
                syncer.backoff.max_sync_delay_secs
            )),
            syncer.priority_channel_capacity,
            syncer.enqueue_channel_capacity,
            if syncer.auto_sync_enabled { "on" } else { "off" },
        )
    }

    /// Logs where the configuration came from and what it resolved to.
    pub fn log_effective(&self, source: &SyncerConfigSource) {
        match source {
            SyncerConfigSource::Default => {
                tracing::info!("using default changeset syncer configuration")
            }
            SyncerConfigSource::EnvPath(path) | SyncerConfigSource::File(path) => {
                tracing::info!(path = %path.display(), "loaded changeset syncer configuration")
            }
            SyncerConfigSource::EnvInline => tracing::info!(
                "loaded changeset syncer configuration from {CONFIG_JSON_ENV}"
            ),
        }
        tracing::info!("changeset syncer: {}", self.summary());
    }

    fn find_default_file(base_dir: &Path) -> Option<PathBuf> {
        DEFAULT_CANDIDATES
            .iter()
            .map(|candidate| base_dir.join(candidate))
            .find(|path| path.exists())
    }
}

/// Loads `.env` (or `path` when given) into the process environment. A
/// missing file is not an error; returns whether a file was loaded.
pub fn load_dotenv(path: Option<&Path>) -> anyhow::Result<bool> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|_| true),
        None => dotenvy::dotenv().map(|_| true),
    };

    loaded
        .or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(err),
        })
        .context("failed to load .env file")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_renders_human_durations() {
        let summary = ServiceConfig::default().summary();
        assert!(summary.contains("schedule every 2m"), "{summary}");
        assert!(summary.contains("reconcile every 1m"), "{summary}");
        assert!(summary.contains("backoff 2m..8h"), "{summary}");
        assert!(summary.contains("auto sync on"), "{summary}");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ServiceConfig::parse_from_str(
            "[syncer]\nschedule_interval_ms = 30000\n",
            "inline",
        )
        .expect("parse");
        assert_eq!(config.syncer.schedule_interval_ms, 30_000);
        assert_eq!(config.syncer.reconcile_interval_ms, 60_000);
        assert_eq!(config.syncer.backoff.max_sync_delay_secs, 8 * 60 * 60);
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn garbage_reports_both_formats() {
        let err = ServiceConfig::parse_from_str("{ nope", "inline")
            .expect_err("invalid input");
        let message = err.to_string();
        assert!(message.starts_with("inline is neither"), "{message}");
        assert!(message.contains("toml:"), "{message}");
        assert!(message.contains("json:"), "{message}");
    }

    #[test]
    fn extension_picks_the_format() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/syncer.json")),
            Some(ConfigFormat::Json)
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("syncer.toml")),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(ConfigFormat::from_path(Path::new("syncer.conf")), None);
        assert_eq!(ConfigFormat::from_path(Path::new("syncer")), None);
    }
}
