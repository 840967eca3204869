#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use changesync_core::clock::{Clock, FixedClock};
use changesync_core::error::{Result, SyncError};
use changesync_core::ports::{
    GetChangesetOpts, ListChangesetSyncDataOpts, ListChangesetsOpts,
    ListCodeHostsOpts, SyncStore, SyncTransaction,
};
use changesync_core::{AutoSyncSwitch, SyncExecutor, SyncerDeps};
use changesync_model::{
    Changeset, ChangesetEvent, ChangesetID, ChangesetSyncData, CodeHost,
    CodeHostID, ExternalServiceKind, PublicationState, ReconcilerState, Repo,
    RepoID,
};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Semaphore;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn github() -> CodeHost {
    CodeHost::new(
        ExternalServiceKind::GitHub,
        CodeHostID::new("https://github.com/"),
    )
}

pub fn gitlab() -> CodeHost {
    CodeHost::new(
        ExternalServiceKind::GitLab,
        CodeHostID::new("https://gitlab.example.com/"),
    )
}

/// Sync data for a changeset last synced at `last_sync` whose code host
/// reported its last change at `external_updated_at`.
pub fn sync_data(
    id: i64,
    host: &CodeHost,
    last_sync: DateTime<Utc>,
    external_updated_at: DateTime<Utc>,
) -> ChangesetSyncData {
    ChangesetSyncData {
        changeset_id: ChangesetID(id),
        updated_at: last_sync,
        latest_event: None,
        external_updated_at: Some(external_updated_at),
        repo_external_service_id: host.external_service_id.clone(),
    }
}

pub fn changeset(id: i64, repo: i32) -> Changeset {
    Changeset {
        id: ChangesetID(id),
        repo_id: RepoID(repo),
        external_id: id.to_string(),
        reconciler_state: ReconcilerState::Completed,
        publication_state: PublicationState::Published,
        ..Default::default()
    }
}

#[derive(Default)]
struct StoreState {
    code_hosts: Vec<CodeHost>,
    sync_data: Vec<ChangesetSyncData>,
    changesets: HashMap<ChangesetID, Changeset>,
    repos: HashMap<RepoID, Repo>,
    events: Vec<ChangesetEvent>,
}

/// In-memory [`SyncStore`] with a manually driven clock.
pub struct InMemorySyncStore {
    state: Arc<Mutex<StoreState>>,
    clock: Arc<FixedClock>,
}

impl InMemorySyncStore {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState::default())),
            clock: Arc::new(FixedClock::new(now)),
        }
    }

    pub fn fixed_clock(&self) -> Arc<FixedClock> {
        Arc::clone(&self.clock)
    }

    pub fn set_code_hosts(&self, hosts: Vec<CodeHost>) {
        self.state.lock().unwrap().code_hosts = hosts;
    }

    pub fn add_sync_data(&self, data: impl IntoIterator<Item = ChangesetSyncData>) {
        self.state.lock().unwrap().sync_data.extend(data);
    }

    pub fn insert_changeset(&self, changeset: Changeset) {
        self.state
            .lock()
            .unwrap()
            .changesets
            .insert(changeset.id, changeset);
    }

    pub fn insert_repo(&self, repo: Repo) {
        self.state.lock().unwrap().repos.insert(repo.id, repo);
    }

    pub fn changeset(&self, id: ChangesetID) -> Option<Changeset> {
        self.state.lock().unwrap().changesets.get(&id).cloned()
    }

    pub fn events(&self) -> Vec<ChangesetEvent> {
        self.state.lock().unwrap().events.clone()
    }
}

#[async_trait]
impl SyncStore for InMemorySyncStore {
    async fn list_code_hosts(
        &self,
        opts: ListCodeHostsOpts,
    ) -> Result<Vec<CodeHost>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .code_hosts
            .iter()
            .filter(|host| !opts.only_without_webhooks || !host.has_webhooks)
            .cloned()
            .collect())
    }

    async fn list_changeset_sync_data(
        &self,
        opts: ListChangesetSyncDataOpts,
    ) -> Result<Vec<ChangesetSyncData>> {
        let ids: HashSet<ChangesetID> = opts.changeset_ids.into_iter().collect();
        let state = self.state.lock().unwrap();
        Ok(state
            .sync_data
            .iter()
            .filter(|data| ids.is_empty() || ids.contains(&data.changeset_id))
            .filter(|data| {
                opts.external_service_id
                    .as_ref()
                    .is_none_or(|host| &data.repo_external_service_id == host)
            })
            .cloned()
            .collect())
    }

    async fn get_changeset(
        &self,
        opts: GetChangesetOpts,
    ) -> Result<Option<Changeset>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .changesets
            .get(&opts.id)
            .filter(|cs| opts.matches(cs))
            .cloned())
    }

    async fn list_changesets(
        &self,
        opts: ListChangesetsOpts,
    ) -> Result<Vec<Changeset>> {
        let state = self.state.lock().unwrap();
        let mut changesets: Vec<Changeset> = state
            .changesets
            .values()
            .filter(|cs| opts.repo_ids.is_empty() || opts.repo_ids.contains(&cs.repo_id))
            .cloned()
            .collect();
        changesets.sort_by_key(|cs| cs.id);
        Ok(changesets)
    }

    async fn get_repo(&self, id: RepoID) -> Result<Option<Repo>> {
        Ok(self.state.lock().unwrap().repos.get(&id).cloned())
    }

    async fn update_changeset_code_host_state(
        &self,
        changeset: &Changeset,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.changesets.get_mut(&changeset.id) {
            Some(existing) => {
                *existing = changeset.clone();
                Ok(())
            }
            None => Err(SyncError::NotFound(format!("changeset {}", changeset.id))),
        }
    }

    async fn transact(&self) -> Result<Box<dyn SyncTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            state: Arc::clone(&self.state),
            changesets: Vec::new(),
            events: Vec::new(),
        }))
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

/// Buffers writes until commit.
struct InMemoryTransaction {
    state: Arc<Mutex<StoreState>>,
    changesets: Vec<Changeset>,
    events: Vec<ChangesetEvent>,
}

#[async_trait]
impl SyncTransaction for InMemoryTransaction {
    async fn update_changeset_code_host_state(
        &mut self,
        changeset: &Changeset,
    ) -> Result<()> {
        self.changesets.push(changeset.clone());
        Ok(())
    }

    async fn upsert_changeset_events(
        &mut self,
        events: &[ChangesetEvent],
    ) -> Result<()> {
        self.events.extend_from_slice(events);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for changeset in self.changesets {
            state.changesets.insert(changeset.id, changeset);
        }
        for event in self.events {
            state.events.retain(|e| e.identity() != event.identity());
            state.events.push(event);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Executor that records which changesets it was asked to sync.
#[derive(Default)]
pub struct RecordingExecutor {
    synced: Mutex<Vec<ChangesetID>>,
    failing: Mutex<HashSet<ChangesetID>>,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sync first waits for a permit on `gate`.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn fail_on(&self, id: ChangesetID) {
        self.failing.lock().unwrap().insert(id);
    }

    pub fn synced(&self) -> Vec<ChangesetID> {
        self.synced.lock().unwrap().clone()
    }

    pub fn sync_count(&self, id: ChangesetID) -> usize {
        self.synced
            .lock()
            .unwrap()
            .iter()
            .filter(|synced| **synced == id)
            .count()
    }
}

#[async_trait]
impl SyncExecutor for RecordingExecutor {
    async fn sync_changeset(&self, id: ChangesetID) -> Result<()> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| SyncError::Internal("gate closed".into()))?;
            permit.forget();
        }

        self.synced.lock().unwrap().push(id);
        if self.failing.lock().unwrap().contains(&id) {
            return Err(SyncError::Store(format!("sync of {id} failed")));
        }
        Ok(())
    }
}

pub fn deps(
    store: Arc<InMemorySyncStore>,
    executor: Arc<RecordingExecutor>,
) -> SyncerDeps {
    SyncerDeps {
        store,
        executor,
        auto_sync: AutoSyncSwitch::default(),
    }
}

/// Lets spawned tasks run. Under a paused clock this also advances time by
/// `by`, firing any timers that fall inside it.
pub async fn settle(by: Duration) {
    tokio::time::sleep(by).await;
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
