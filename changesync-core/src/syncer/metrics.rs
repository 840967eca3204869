//! Metric names and recording helpers. Everything goes through the `metrics`
//! facade; the embedding service decides where it is exported.

use std::time::Duration;

use changesync_model::CodeHostID;

pub const SYNCS_TOTAL: &str = "changeset_syncer_syncs_total";
pub const SYNC_DURATION_SECONDS: &str = "changeset_syncer_sync_duration_seconds";
pub const SCHEDULE_DURATION_SECONDS: &str =
    "changeset_syncer_schedule_duration_seconds";
pub const SCHEDULED_SYNCS: &str = "changeset_syncer_scheduled_syncs";
pub const BEHIND_SCHEDULE: &str = "changeset_syncer_behind_schedule";
pub const PRIORITY_ENQUEUED_TOTAL: &str =
    "changeset_syncer_priority_enqueued_total";
pub const ACTIVE_CODE_HOSTS: &str = "changeset_syncer_active_code_hosts";

pub(crate) fn record_sync(code_host: &CodeHostID, success: bool, elapsed: Duration) {
    let host = code_host.to_string();
    let success = success.to_string();
    metrics::counter!(SYNCS_TOTAL, "code_host" => host.clone(), "success" => success.clone())
        .increment(1);
    metrics::histogram!(SYNC_DURATION_SECONDS, "code_host" => host, "success" => success)
        .record(elapsed.as_secs_f64());
}

pub(crate) fn record_schedule(
    code_host: &CodeHostID,
    success: bool,
    elapsed: Duration,
) {
    metrics::histogram!(
        SCHEDULE_DURATION_SECONDS,
        "code_host" => code_host.to_string(),
        "success" => success.to_string()
    )
    .record(elapsed.as_secs_f64());
}

pub(crate) fn record_queue_state(
    code_host: &CodeHostID,
    scheduled: usize,
    behind: usize,
) {
    let host = code_host.to_string();
    metrics::gauge!(SCHEDULED_SYNCS, "code_host" => host.clone()).set(scheduled as f64);
    metrics::gauge!(BEHIND_SCHEDULE, "code_host" => host).set(behind as f64);
}

pub(crate) fn record_priority_enqueue(code_host: &CodeHostID, count: usize) {
    metrics::counter!(PRIORITY_ENQUEUED_TOTAL, "code_host" => code_host.to_string())
        .increment(count as u64);
}

pub(crate) fn record_active_code_hosts(count: usize) {
    metrics::gauge!(ACTIVE_CODE_HOSTS).set(count as f64);
}
