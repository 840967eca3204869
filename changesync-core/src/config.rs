use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::syncer::backoff::BackoffPolicy;

/// Longest accepted schedule or reconcile interval (one week).
pub const MAX_INTERVAL_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

/// Longest accepted backoff bound (thirty days).
pub const MAX_BACKOFF_SECS: u64 = 30 * 24 * 60 * 60;

/// Knobs that tune the changeset syncer.
///
/// All fields carry defaults so deployments only spell out what they change.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncerConfig {
    /// How often each code host recomputes its full schedule (ms).
    pub schedule_interval_ms: u64,
    /// How often the registry reconciles syncers with the code host list (ms).
    pub reconcile_interval_ms: u64,
    /// Mailbox size of each code host syncer for priority hand-offs.
    pub priority_channel_capacity: usize,
    /// Size of the registry's inbound priority channel. Callers get a
    /// capacity error once it is full.
    pub enqueue_channel_capacity: usize,
    /// Floor and ceiling of the linear sync backoff.
    pub backoff: BackoffConfig,
    /// Initial value of the auto-sync switch. When off, schedules are not
    /// recomputed but explicitly prioritized syncs still run.
    pub auto_sync_enabled: bool,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            schedule_interval_ms: 2 * 60 * 1_000,
            reconcile_interval_ms: 60 * 1_000,
            priority_channel_capacity: 500,
            enqueue_channel_capacity: 500,
            backoff: BackoffConfig::default(),
            auto_sync_enabled: true,
        }
    }
}

impl SyncerConfig {
    pub fn schedule_interval(&self) -> Duration {
        Duration::from_millis(self.schedule_interval_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    /// Out of range bounds saturate at [`MAX_BACKOFF_SECS`]; `validate`
    /// rejects them up front.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        let ceiling = delay_from_secs(MAX_BACKOFF_SECS)
            .unwrap_or(crate::syncer::backoff::MAX_SYNC_DELAY);
        let bound = |secs: u64| {
            delay_from_secs(secs.min(MAX_BACKOFF_SECS)).unwrap_or(ceiling)
        };
        BackoffPolicy::new(
            bound(self.backoff.min_sync_delay_secs),
            bound(self.backoff.max_sync_delay_secs),
        )
    }

    pub fn validate(&self) -> Result<()> {
        check_interval("schedule_interval_ms", self.schedule_interval_ms)?;
        check_interval("reconcile_interval_ms", self.reconcile_interval_ms)?;
        if self.priority_channel_capacity == 0
            || self.enqueue_channel_capacity == 0
        {
            return Err(SyncError::InvalidConfig(
                "channel capacities must be greater than zero".into(),
            ));
        }
        check_backoff_bound(
            "min_sync_delay_secs",
            self.backoff.min_sync_delay_secs,
        )?;
        check_backoff_bound(
            "max_sync_delay_secs",
            self.backoff.max_sync_delay_secs,
        )?;
        if self.backoff.min_sync_delay_secs >= self.backoff.max_sync_delay_secs
        {
            return Err(SyncError::InvalidConfig(format!(
                "min_sync_delay_secs ({}) must be below max_sync_delay_secs ({})",
                self.backoff.min_sync_delay_secs,
                self.backoff.max_sync_delay_secs
            )));
        }
        Ok(())
    }
}

fn delay_from_secs(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
}

fn check_interval(field: &str, ms: u64) -> Result<()> {
    if ms == 0 || ms > MAX_INTERVAL_MS {
        return Err(SyncError::InvalidConfig(format!(
            "{field} must be between 1 and {MAX_INTERVAL_MS}, got {ms}"
        )));
    }
    Ok(())
}

fn check_backoff_bound(field: &str, secs: u64) -> Result<()> {
    if secs > MAX_BACKOFF_SECS || delay_from_secs(secs).is_none() {
        return Err(SyncError::InvalidConfig(format!(
            "{field} must be at most {MAX_BACKOFF_SECS}, got {secs}"
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub min_sync_delay_secs: u64,
    pub max_sync_delay_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_sync_delay_secs: 2 * 60,
            max_sync_delay_secs: 8 * 60 * 60,
        }
    }
}

/// Runtime switch for administratively pausing automatic syncs. Clones share
/// the same flag.
#[derive(Clone, Debug)]
pub struct AutoSyncSwitch(Arc<AtomicBool>);

impl AutoSyncSwitch {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.0.store(enabled, Ordering::Relaxed);
    }
}

impl Default for AutoSyncSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}
