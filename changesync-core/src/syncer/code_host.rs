use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use changesync_model::{ChangesetID, CodeHost, CodeHostID};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{AutoSyncSwitch, SyncerConfig};
use crate::error::{Result, SyncError};
use crate::ports::{ListChangesetSyncDataOpts, SyncStore};
use crate::syncer::backoff::BackoffPolicy;
use crate::syncer::executor::SyncExecutor;
use crate::syncer::metrics;
use crate::syncer::queue::{ScheduledSync, SyncPriority, SyncQueue};

/// Collaborators shared by every code host syncer.
#[derive(Clone)]
pub struct SyncerDeps {
    pub store: Arc<dyn SyncStore>,
    pub executor: Arc<dyn SyncExecutor>,
    pub auto_sync: AutoSyncSwitch,
}

impl fmt::Debug for SyncerDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncerDeps")
            .field("store", &type_name_of_val(self.store.as_ref()))
            .field("executor", &type_name_of_val(self.executor.as_ref()))
            .field("auto_sync", &self.auto_sync.is_enabled())
            .finish()
    }
}

/// Owns the sync schedule of one code host and works through it.
///
/// The syncer runs as its own task. Its queue is never shared; everything
/// else talks to it through the [`CodeHostSyncerHandle`] returned by
/// [`CodeHostSyncer::spawn`].
pub struct CodeHostSyncer {
    code_host: CodeHost,
    deps: SyncerDeps,
    queue: SyncQueue,
    priority_rx: mpsc::Receiver<Vec<ChangesetID>>,
    schedule_interval: Duration,
    backoff: BackoffPolicy,
    cancel: CancellationToken,
}

impl fmt::Debug for CodeHostSyncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeHostSyncer")
            .field("code_host", &self.code_host.external_service_id)
            .field("queue", &self.queue)
            .field("schedule_interval", &self.schedule_interval)
            .field("backoff", &self.backoff)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl CodeHostSyncer {
    /// Starts a syncer for `code_host` on the current runtime. `cancel`
    /// should be a child of the owner's token so that shutting the owner
    /// down stops the syncer as well.
    pub fn spawn(
        code_host: CodeHost,
        deps: SyncerDeps,
        config: &SyncerConfig,
        cancel: CancellationToken,
    ) -> CodeHostSyncerHandle {
        let (priority_tx, priority_rx) =
            mpsc::channel(config.priority_channel_capacity);

        let syncer = CodeHostSyncer {
            code_host: code_host.clone(),
            deps,
            queue: SyncQueue::new(),
            priority_rx,
            schedule_interval: config.schedule_interval(),
            backoff: config.backoff_policy(),
            cancel: cancel.clone(),
        };

        let join = tokio::spawn(syncer.run());

        CodeHostSyncerHandle {
            code_host,
            priority_tx,
            cancel,
            join: Some(join),
        }
    }

    fn host(&self) -> &CodeHostID {
        &self.code_host.external_service_id
    }

    async fn run(mut self) {
        tracing::debug!(
            target: "changeset_syncer::host",
            code_host = %self.host(),
            "starting code host syncer"
        );

        self.recompute_schedule().await;

        let period = self.schedule_interval;
        let mut schedule = time::interval_at(time::Instant::now() + period, period);
        schedule.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let due_in = self.next_due_in();

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                msg = self.priority_rx.recv() => match msg {
                    Some(ids) => self.prioritize(ids),
                    None => {
                        tracing::debug!(
                            target: "changeset_syncer::host",
                            code_host = %self.host(),
                            "priority mailbox closed"
                        );
                        break;
                    }
                },

                _ = schedule.tick() => {
                    if self.deps.auto_sync.is_enabled() {
                        self.recompute_schedule().await;
                    } else {
                        tracing::trace!(
                            target: "changeset_syncer::host",
                            code_host = %self.host(),
                            "auto sync disabled, skipping schedule recomputation"
                        );
                    }
                }

                _ = sleep_or_pending(due_in) => self.sync_head().await,
            }
        }

        tracing::debug!(
            target: "changeset_syncer::host",
            code_host = %self.host(),
            pending = self.queue.len(),
            "code host syncer stopped"
        );
    }

    /// Time until the head of the queue is due. `None` when there is nothing
    /// to wait for.
    fn next_due_in(&self) -> Option<Duration> {
        let head = self.queue.peek()?;
        if head.priority == SyncPriority::High {
            return Some(Duration::ZERO);
        }
        let now = self.deps.store.clock().now();
        Some((head.next_sync - now).to_std().unwrap_or(Duration::ZERO))
    }

    async fn sync_head(&mut self) {
        let Some(id) = self.queue.peek().map(|item| item.changeset_id) else {
            return;
        };

        let started = Instant::now();
        let outcome = self.deps.executor.sync_changeset(id).await;
        let success = outcome.is_ok();
        metrics::record_sync(self.host(), success, started.elapsed());

        if let Err(err) = outcome {
            tracing::warn!(
                target: "changeset_syncer::host",
                code_host = %self.host(),
                changeset = %id,
                error = %err,
                "changeset sync failed"
            );
        }

        // Failed syncs are not retried here; the next recomputation puts the
        // changeset back on the schedule.
        self.queue.remove(id);
    }

    fn prioritize(&mut self, ids: Vec<ChangesetID>) {
        let items: Vec<ScheduledSync> = ids
            .into_iter()
            .map(|id| {
                let mut item = self
                    .queue
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| ScheduledSync::prioritized(id));
                item.priority = SyncPriority::High;
                item
            })
            .collect();

        tracing::debug!(
            target: "changeset_syncer::host",
            code_host = %self.host(),
            count = items.len(),
            "prioritizing changeset syncs"
        );
        self.queue.upsert(items);
    }

    async fn recompute_schedule(&mut self) {
        let started = Instant::now();
        let outcome = self.compute_schedule().await;
        metrics::record_schedule(self.host(), outcome.is_ok(), started.elapsed());

        match outcome {
            Ok(scheduled) => {
                let now = self.deps.store.clock().now();
                metrics::record_queue_state(
                    self.host(),
                    self.queue.len(),
                    self.queue.overdue(now),
                );
                tracing::debug!(
                    target: "changeset_syncer::host",
                    code_host = %self.host(),
                    scheduled,
                    queued = self.queue.len(),
                    "schedule recomputed"
                );
            }
            Err(err) => tracing::warn!(
                target: "changeset_syncer::host",
                code_host = %self.host(),
                error = %err,
                "failed to compute sync schedule"
            ),
        }
    }

    async fn compute_schedule(&mut self) -> Result<usize> {
        let data = self
            .deps
            .store
            .list_changeset_sync_data(ListChangesetSyncDataOpts {
                external_service_id: Some(self.host().clone()),
                ..Default::default()
            })
            .await?;

        let now = self.deps.store.clock().now();
        let backoff = self.backoff;
        let count = data.len();
        self.queue.upsert(data.into_iter().map(|d| {
            ScheduledSync::new(
                d.changeset_id,
                backoff.next_sync(
                    now,
                    Some(d.updated_at),
                    d.external_updated_at,
                    d.latest_event,
                ),
            )
        }));
        Ok(count)
    }
}

async fn sleep_or_pending(delay: Option<Duration>) {
    match delay {
        Some(delay) => time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

/// Handle to a running [`CodeHostSyncer`].
pub struct CodeHostSyncerHandle {
    code_host: CodeHost,
    priority_tx: mpsc::Sender<Vec<ChangesetID>>,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl fmt::Debug for CodeHostSyncerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeHostSyncerHandle")
            .field("code_host", &self.code_host.external_service_id)
            .field("mailbox_capacity", &self.priority_tx.capacity())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl CodeHostSyncerHandle {
    pub fn code_host(&self) -> &CodeHost {
        &self.code_host
    }

    /// Hands a batch of changesets to the syncer for priority sync without
    /// waiting for mailbox space.
    pub fn notify(&self, ids: Vec<ChangesetID>) -> Result<()> {
        self.priority_tx.try_send(ids).map_err(|err| match err {
            TrySendError::Full(_) => SyncError::PriorityQueueFull {
                capacity: self.priority_tx.max_capacity(),
            },
            TrySendError::Closed(_) => SyncError::Shutdown,
        })
    }

    /// Asks the syncer to stop. An in-flight sync finishes first.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Detaches the task handle so the caller can await the syncer's exit.
    pub fn take_join_handle(&mut self) -> Option<JoinHandle<()>> {
        self.join.take()
    }
}
