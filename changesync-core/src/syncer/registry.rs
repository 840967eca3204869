use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use changesync_model::{ChangesetID, CodeHost, CodeHostID, RepoID};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{AutoSyncSwitch, SyncerConfig};
use crate::error::{Result, SyncError};
use crate::ports::{ListChangesetSyncDataOpts, ListChangesetsOpts, ListCodeHostsOpts};
use crate::syncer::code_host::{CodeHostSyncer, CodeHostSyncerHandle, SyncerDeps};
use crate::syncer::metrics;

/// Upper bound for a single task to wind down during [`SyncRegistry::stop`].
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Keeps one [`CodeHostSyncer`] running per code host and routes priority
/// sync requests to the right one.
pub struct SyncRegistry {
    hosts: Arc<HostSet>,
    enqueue_tx: mpsc::Sender<Vec<ChangesetID>>,
    enqueue_rx: Mutex<Option<mpsc::Receiver<Vec<ChangesetID>>>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for SyncRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let started = self
            .enqueue_rx
            .try_lock()
            .map(|guard| guard.is_none())
            .unwrap_or(false);
        let active_code_hosts = self
            .hosts
            .syncers
            .try_lock()
            .map(|guard| guard.len())
            .unwrap_or_default();

        f.debug_struct("SyncRegistry")
            .field("config", &self.hosts.config)
            .field("deps", &self.hosts.deps)
            .field("started", &started)
            .field("active_code_hosts", &active_code_hosts)
            .field("shutdown_cancelled", &self.hosts.root.is_cancelled())
            .finish()
    }
}

impl SyncRegistry {
    /// The configured `auto_sync_enabled` value is applied to
    /// `deps.auto_sync`, so clones of that switch held elsewhere see it.
    pub fn new(deps: SyncerDeps, config: SyncerConfig) -> Result<Self> {
        config.validate()?;
        deps.auto_sync.set_enabled(config.auto_sync_enabled);

        let (enqueue_tx, enqueue_rx) =
            mpsc::channel(config.enqueue_channel_capacity);

        Ok(Self {
            hosts: Arc::new(HostSet {
                syncers: Mutex::new(HashMap::new()),
                retired: Mutex::new(Vec::new()),
                deps,
                config,
                root: CancellationToken::new(),
            }),
            enqueue_tx,
            enqueue_rx: Mutex::new(Some(enqueue_rx)),
            task_handles: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &SyncerConfig {
        &self.hosts.config
    }

    /// Switch that pauses schedule recomputation on every code host.
    pub fn auto_sync(&self) -> &AutoSyncSwitch {
        &self.hosts.deps.auto_sync
    }

    /// Spawns the priority fan-out and the code host reconciliation loops.
    /// Reconciliation runs once right away, then on every interval.
    pub async fn start(&self) -> Result<()> {
        if self.hosts.root.is_cancelled() {
            return Err(SyncError::Shutdown);
        }

        let Some(enqueue_rx) = self.enqueue_rx.lock().await.take() else {
            return Err(SyncError::AlreadyStarted);
        };

        let fan_out = tokio::spawn(fan_out_loop(
            Arc::clone(&self.hosts),
            enqueue_rx,
        ));
        let reconcile = tokio::spawn(reconcile_loop(Arc::clone(&self.hosts)));

        let mut handles = self.task_handles.lock().await;
        handles.push(fan_out);
        handles.push(reconcile);

        tracing::info!(
            target: "changeset_syncer::registry",
            reconcile_interval = ?self.hosts.config.reconcile_interval(),
            schedule_interval = ?self.hosts.config.schedule_interval(),
            "changeset sync registry started"
        );
        Ok(())
    }

    /// Cancels every syncer and loop, then waits for them to exit.
    pub async fn stop(&self) -> Result<()> {
        tracing::info!(
            target: "changeset_syncer::registry",
            "stopping changeset sync registry"
        );
        self.hosts.root.cancel();

        // Not started yet: drop the receiver so later enqueues see shutdown.
        self.enqueue_rx.lock().await.take();

        let mut handles = {
            let mut guard = self.task_handles.lock().await;
            std::mem::take(&mut *guard)
        };
        {
            let mut syncers = self.hosts.syncers.lock().await;
            handles.extend(
                syncers
                    .drain()
                    .filter_map(|(_, mut handle)| handle.take_join_handle()),
            );
        }
        {
            let mut retired = self.hosts.retired.lock().await;
            handles.append(&mut retired);
        }
        metrics::record_active_code_hosts(0);

        for handle in handles {
            match time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(
                    target: "changeset_syncer::registry",
                    error = %err,
                    "sync task failed"
                ),
                Err(_) => tracing::warn!(
                    target: "changeset_syncer::registry",
                    "sync task timed out during shutdown"
                ),
            }
        }

        tracing::info!(
            target: "changeset_syncer::registry",
            "changeset sync registry stopped"
        );
        Ok(())
    }

    /// Requests a priority sync for `ids`. Never waits: when the inbound
    /// channel is full the batch is rejected and the caller may retry.
    pub fn enqueue_changeset_syncs(&self, ids: Vec<ChangesetID>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        self.enqueue_tx.try_send(ids).map_err(|err| match err {
            TrySendError::Full(_) => SyncError::PriorityQueueFull {
                capacity: self.hosts.config.enqueue_channel_capacity,
            },
            TrySendError::Closed(_) => SyncError::Shutdown,
        })
    }

    /// Requests a priority sync for every changeset in the given repositories.
    pub async fn enqueue_changeset_syncs_for_repos(
        &self,
        repo_ids: Vec<RepoID>,
    ) -> Result<()> {
        if repo_ids.is_empty() {
            return Ok(());
        }

        let changesets = self
            .hosts
            .deps
            .store
            .list_changesets(ListChangesetsOpts { repo_ids })
            .await?;

        self.enqueue_changeset_syncs(
            changesets.into_iter().map(|cs| cs.id).collect(),
        )
    }

    /// Code hosts with a running syncer, in a stable order.
    pub async fn code_hosts(&self) -> Vec<CodeHostID> {
        let mut hosts: Vec<_> =
            self.hosts.syncers.lock().await.keys().cloned().collect();
        hosts.sort();
        hosts
    }

    /// Starts a syncer for `code_host` unless one already runs. Returns
    /// whether a syncer was started.
    pub async fn add_code_host(&self, code_host: CodeHost) -> bool {
        self.hosts.add(code_host).await
    }

    /// Cancels and forgets the syncer for `id`. Returns whether one existed.
    pub async fn remove_code_host(&self, id: &CodeHostID) -> bool {
        self.hosts.remove(id).await
    }

    /// Makes the set of running syncers match `code_hosts`: unsupported kinds
    /// are ignored, new hosts get a syncer, missing hosts lose theirs.
    pub async fn sync_code_hosts(&self, code_hosts: Vec<CodeHost>) {
        self.hosts.reconcile(code_hosts).await;
    }
}

/// State shared between the registry and its background loops.
struct HostSet {
    syncers: Mutex<HashMap<CodeHostID, CodeHostSyncerHandle>>,
    /// Join handles of removed syncers, awaited on stop.
    retired: Mutex<Vec<JoinHandle<()>>>,
    deps: SyncerDeps,
    config: SyncerConfig,
    root: CancellationToken,
}

impl HostSet {
    fn spawn_syncer(&self, code_host: CodeHost) -> CodeHostSyncerHandle {
        tracing::info!(
            target: "changeset_syncer::registry",
            code_host = %code_host.external_service_id,
            kind = %code_host.kind,
            "starting code host syncer"
        );
        CodeHostSyncer::spawn(
            code_host,
            self.deps.clone(),
            &self.config,
            self.root.child_token(),
        )
    }

    async fn add(&self, code_host: CodeHost) -> bool {
        if self.root.is_cancelled() {
            return false;
        }

        let mut syncers = self.syncers.lock().await;
        if syncers.contains_key(&code_host.external_service_id) {
            return false;
        }
        let id = code_host.external_service_id.clone();
        let handle = self.spawn_syncer(code_host);
        syncers.insert(id, handle);
        metrics::record_active_code_hosts(syncers.len());
        true
    }

    async fn remove(&self, id: &CodeHostID) -> bool {
        let removed = {
            let mut syncers = self.syncers.lock().await;
            let removed = syncers.remove(id);
            if let Some(handle) = &removed {
                stop_syncer(handle);
            }
            metrics::record_active_code_hosts(syncers.len());
            removed
        };

        match removed {
            Some(handle) => {
                self.retire(vec![handle]).await;
                true
            }
            None => false,
        }
    }

    async fn reconcile(&self, code_hosts: Vec<CodeHost>) {
        if self.root.is_cancelled() {
            return;
        }

        let wanted: HashMap<CodeHostID, CodeHost> = code_hosts
            .into_iter()
            .filter(|host| host.kind.is_supported())
            .map(|host| (host.external_service_id.clone(), host))
            .collect();

        let (removed, added) = {
            let mut syncers = self.syncers.lock().await;

            let stale: Vec<CodeHostID> = syncers
                .keys()
                .filter(|id| !wanted.contains_key(*id))
                .cloned()
                .collect();
            let removed: Vec<CodeHostSyncerHandle> = stale
                .iter()
                .filter_map(|id| syncers.remove(id))
                .inspect(stop_syncer)
                .collect();

            let mut added = 0;
            for (id, host) in wanted {
                if syncers.contains_key(&id) {
                    continue;
                }
                let handle = self.spawn_syncer(host);
                syncers.insert(id, handle);
                added += 1;
            }

            metrics::record_active_code_hosts(syncers.len());
            (removed, added)
        };

        if added > 0 || !removed.is_empty() {
            tracing::debug!(
                target: "changeset_syncer::registry",
                added,
                removed = removed.len(),
                "reconciled code host syncers"
            );
        }
        self.retire(removed).await;
    }

    /// Keeps the join handles of already cancelled syncers for shutdown.
    async fn retire(&self, handles: Vec<CodeHostSyncerHandle>) {
        if handles.is_empty() {
            return;
        }

        let mut retired = self.retired.lock().await;
        retired.retain(|join| !join.is_finished());
        retired.extend(
            handles
                .into_iter()
                .filter_map(|mut handle| handle.take_join_handle()),
        );
    }

    async fn reconcile_with_store(&self) {
        match self
            .deps
            .store
            .list_code_hosts(ListCodeHostsOpts::default())
            .await
        {
            Ok(code_hosts) => self.reconcile(code_hosts).await,
            Err(err) => tracing::warn!(
                target: "changeset_syncer::registry",
                error = %err,
                "failed to list code hosts"
            ),
        }
    }

    /// Splits a priority batch by code host and hands each part to its
    /// syncer. Parts for unknown hosts or full mailboxes are dropped.
    async fn dispatch(&self, ids: Vec<ChangesetID>) {
        let sync_data = match self
            .deps
            .store
            .list_changeset_sync_data(ListChangesetSyncDataOpts {
                changeset_ids: ids,
                ..Default::default()
            })
            .await
        {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(
                    target: "changeset_syncer::registry",
                    error = %err,
                    "failed to load sync data for priority batch"
                );
                return;
            }
        };

        let mut by_host: HashMap<CodeHostID, Vec<ChangesetID>> = HashMap::new();
        let mut seen = HashSet::new();
        for data in sync_data {
            if seen.insert(data.changeset_id) {
                by_host
                    .entry(data.repo_external_service_id)
                    .or_default()
                    .push(data.changeset_id);
            }
        }

        let syncers = self.syncers.lock().await;
        for (host, ids) in by_host {
            let Some(syncer) = syncers.get(&host) else {
                tracing::debug!(
                    target: "changeset_syncer::registry",
                    code_host = %host,
                    count = ids.len(),
                    "no syncer for code host, dropping priority batch"
                );
                continue;
            };

            let count = ids.len();
            match syncer.notify(ids) {
                Ok(()) => metrics::record_priority_enqueue(&host, count),
                Err(SyncError::PriorityQueueFull { capacity }) => tracing::warn!(
                    target: "changeset_syncer::registry",
                    code_host = %host,
                    count,
                    capacity,
                    "code host syncer mailbox full, dropping priority batch"
                ),
                Err(err) => tracing::debug!(
                    target: "changeset_syncer::registry",
                    code_host = %host,
                    error = %err,
                    "code host syncer unavailable, dropping priority batch"
                ),
            }
        }
    }
}

/// Must run while the `syncers` lock is held, so a concurrent add never sees
/// the host missing while its old syncer is still live.
fn stop_syncer(handle: &CodeHostSyncerHandle) {
    tracing::info!(
        target: "changeset_syncer::registry",
        code_host = %handle.code_host().external_service_id,
        "stopping code host syncer"
    );
    handle.cancel();
}

async fn fan_out_loop(
    hosts: Arc<HostSet>,
    mut enqueue_rx: mpsc::Receiver<Vec<ChangesetID>>,
) {
    loop {
        tokio::select! {
            biased;

            _ = hosts.root.cancelled() => break,

            batch = enqueue_rx.recv() => match batch {
                Some(ids) => hosts.dispatch(ids).await,
                None => break,
            },
        }
    }
}

async fn reconcile_loop(hosts: Arc<HostSet>) {
    let mut ticker = time::interval(hosts.config.reconcile_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = hosts.root.cancelled() => break,

            _ = ticker.tick() => hosts.reconcile_with_store().await,
        }
    }
}
