use chrono::{DateTime, Duration, Utc};

/// Lower bound between two syncs of the same changeset. Events observed within
/// this window of a sync are attributed to the sync itself.
pub const MIN_SYNC_DELAY: Duration = Duration::minutes(2);

/// Upper bound between two syncs of the same changeset.
pub const MAX_SYNC_DELAY: Duration = Duration::hours(8);

/// Linear backoff with a floor and a ceiling: the longer a changeset has been
/// quiet, the longer we wait before looking at it again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    min_sync_delay: Duration,
    max_sync_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min_sync_delay: MIN_SYNC_DELAY,
            max_sync_delay: MAX_SYNC_DELAY,
        }
    }
}

impl BackoffPolicy {
    /// Bounds are reordered if given inverted so the clamp stays well formed;
    /// config validation rejects that case before it gets here.
    pub fn new(min_sync_delay: Duration, max_sync_delay: Duration) -> Self {
        Self {
            min_sync_delay: min_sync_delay.min(max_sync_delay),
            max_sync_delay: max_sync_delay.max(min_sync_delay),
        }
    }

    pub fn min_sync_delay(&self) -> Duration {
        self.min_sync_delay
    }

    pub fn max_sync_delay(&self) -> Duration {
        self.max_sync_delay
    }

    /// Computes when a changeset should next be synced.
    ///
    /// * never synced: due `now`.
    /// * changed after the last sync (webhook, event): due one
    ///   `min_sync_delay` after that change, so bursts collapse into one sync.
    /// * otherwise: wait as long as the changeset has been quiet, clamped to
    ///   `[min_sync_delay, max_sync_delay]`.
    pub fn next_sync(
        &self,
        now: DateTime<Utc>,
        last_sync: Option<DateTime<Utc>>,
        last_external_update: Option<DateTime<Utc>>,
        last_event: Option<DateTime<Utc>>,
    ) -> DateTime<Utc> {
        let Some(last_sync) = last_sync else {
            return now;
        };

        let last_change = match last_event {
            Some(event) if (event - last_sync).abs() < self.min_sync_delay => {
                last_external_update
            }
            _ => last_external_update.max(last_event),
        };

        // Nothing ever changed: treat the changeset as quiet forever.
        let Some(last_change) = last_change else {
            return last_sync + self.max_sync_delay;
        };

        let diff = last_sync - last_change;
        if diff < Duration::zero() {
            return last_change + self.min_sync_delay;
        }

        last_sync + diff.clamp(self.min_sync_delay, self.max_sync_delay)
    }
}

/// [`BackoffPolicy::next_sync`] with the default bounds.
pub fn next_sync(
    now: DateTime<Utc>,
    last_sync: Option<DateTime<Utc>>,
    last_external_update: Option<DateTime<Utc>>,
    last_event: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    BackoffPolicy::default().next_sync(
        now,
        last_sync,
        last_external_update,
        last_event,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn never_synced_is_due_now() {
        let now = t0() + Duration::hours(3);
        assert_eq!(next_sync(now, None, Some(t0()), Some(t0())), now);
    }

    #[test]
    fn long_quiet_changeset_is_clamped_to_ceiling() {
        let next = next_sync(
            t0(),
            Some(t0()),
            Some(t0() - MAX_SYNC_DELAY * 2),
            None,
        );
        assert_eq!(next, t0() + MAX_SYNC_DELAY);
    }

    #[test]
    fn recent_change_is_clamped_to_floor() {
        let next = next_sync(
            t0(),
            Some(t0()),
            Some(t0() - MIN_SYNC_DELAY / 2),
            None,
        );
        assert_eq!(next, t0() + MIN_SYNC_DELAY);
    }

    #[test]
    fn backoff_grows_with_quiet_period() {
        let next = next_sync(
            t0(),
            Some(t0()),
            Some(t0() - Duration::hours(1)),
            None,
        );
        assert_eq!(next, t0() + Duration::hours(1));
    }

    #[test]
    fn event_after_sync_is_debounced() {
        let next = next_sync(
            t0(),
            Some(t0()),
            Some(t0() - MAX_SYNC_DELAY / 2),
            Some(t0() + Duration::minutes(10)),
        );
        assert_eq!(next, t0() + Duration::minutes(10) + MIN_SYNC_DELAY);
    }

    #[test]
    fn event_close_to_sync_is_ignored() {
        // The event was written by the sync itself, so only the external
        // update counts.
        let next = next_sync(
            t0(),
            Some(t0()),
            Some(t0() - Duration::hours(2)),
            Some(t0() + Duration::seconds(30)),
        );
        assert_eq!(next, t0() + Duration::hours(2));
    }

    #[test]
    fn later_of_update_and_event_wins() {
        let next = next_sync(
            t0(),
            Some(t0()),
            Some(t0() - Duration::hours(4)),
            Some(t0() - Duration::hours(1)),
        );
        assert_eq!(next, t0() + Duration::hours(1));
    }

    #[test]
    fn no_change_information_waits_for_ceiling() {
        let next = next_sync(t0(), Some(t0()), None, None);
        assert_eq!(next, t0() + MAX_SYNC_DELAY);
    }

    #[test]
    fn custom_policy_uses_its_bounds() {
        let policy =
            BackoffPolicy::new(Duration::minutes(5), Duration::minutes(30));
        let next = policy.next_sync(
            t0(),
            Some(t0()),
            Some(t0() - Duration::days(3)),
            None,
        );
        assert_eq!(next, t0() + Duration::minutes(30));
    }
}
