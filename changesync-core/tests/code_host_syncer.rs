mod support;

use std::sync::Arc;
use std::time::Duration;

use changesync_core::SyncError;
use changesync_core::config::{AutoSyncSwitch, SyncerConfig};
use changesync_core::syncer::{CodeHostSyncer, SyncerDeps};
use changesync_model::ChangesetID;
use chrono::Duration as ChronoDuration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use support::{
    InMemorySyncStore, RecordingExecutor, deps, github, gitlab, settle, sync_data, t0,
};

fn seeded_store() -> Arc<InMemorySyncStore> {
    let now = t0();
    let store = Arc::new(InMemorySyncStore::new(now));
    store.add_sync_data([
        // Quiet for an hour before its last sync three hours ago: overdue.
        sync_data(
            1,
            &github(),
            now - ChronoDuration::hours(3),
            now - ChronoDuration::hours(4),
        ),
        // Overdue by half an hour.
        sync_data(
            2,
            &github(),
            now - ChronoDuration::hours(1),
            now - ChronoDuration::minutes(90),
        ),
        // Synced just now: due in an hour.
        sync_data(3, &github(), now, now - ChronoDuration::hours(1)),
        // Different code host.
        sync_data(
            4,
            &gitlab(),
            now - ChronoDuration::hours(3),
            now - ChronoDuration::hours(4),
        ),
    ]);
    store
}

fn ids(raw: &[i64]) -> Vec<ChangesetID> {
    raw.iter().copied().map(ChangesetID).collect()
}

#[tokio::test(start_paused = true)]
async fn initial_schedule_runs_overdue_changesets_of_its_own_host() {
    let store = seeded_store();
    let executor = Arc::new(RecordingExecutor::new());

    let handle = CodeHostSyncer::spawn(
        github(),
        deps(Arc::clone(&store), Arc::clone(&executor)),
        &SyncerConfig::default(),
        CancellationToken::new(),
    );

    settle(Duration::from_millis(10)).await;
    assert_eq!(executor.synced(), ids(&[1, 2]));

    handle.cancel();
}

#[tokio::test(start_paused = true)]
async fn priority_requests_jump_the_schedule() {
    let store = seeded_store();
    let executor = Arc::new(RecordingExecutor::new());

    let handle = CodeHostSyncer::spawn(
        github(),
        deps(Arc::clone(&store), Arc::clone(&executor)),
        &SyncerConfig::default(),
        CancellationToken::new(),
    );
    settle(Duration::from_millis(10)).await;

    // 3 is scheduled an hour out, 50 is not scheduled at all.
    handle.notify(ids(&[3, 50])).expect("mailbox has room");
    settle(Duration::from_millis(10)).await;

    assert_eq!(executor.synced(), ids(&[1, 2, 50, 3]));
    handle.cancel();
}

#[tokio::test(start_paused = true)]
async fn failed_sync_waits_for_the_next_recomputation() {
    let store = seeded_store();
    let executor = Arc::new(RecordingExecutor::new());
    executor.fail_on(ChangesetID(1));

    let handle = CodeHostSyncer::spawn(
        github(),
        deps(Arc::clone(&store), Arc::clone(&executor)),
        &SyncerConfig::default(),
        CancellationToken::new(),
    );

    settle(Duration::from_millis(10)).await;
    assert_eq!(executor.sync_count(ChangesetID(1)), 1);

    settle(Duration::from_secs(30)).await;
    assert_eq!(executor.sync_count(ChangesetID(1)), 1);

    // The two minute schedule tick brings it back.
    settle(Duration::from_secs(120)).await;
    assert_eq!(executor.sync_count(ChangesetID(1)), 2);

    handle.cancel();
}

#[tokio::test(start_paused = true)]
async fn disabled_auto_sync_skips_recomputation() {
    let store = Arc::new(InMemorySyncStore::new(t0()));
    let executor = Arc::new(RecordingExecutor::new());
    let auto_sync = AutoSyncSwitch::new(false);

    let handle = CodeHostSyncer::spawn(
        github(),
        SyncerDeps {
            auto_sync: auto_sync.clone(),
            ..deps(Arc::clone(&store), Arc::clone(&executor))
        },
        &SyncerConfig::default(),
        CancellationToken::new(),
    );
    settle(Duration::from_millis(10)).await;

    store.add_sync_data([sync_data(
        7,
        &github(),
        t0() - ChronoDuration::hours(3),
        t0() - ChronoDuration::hours(4),
    )]);
    settle(Duration::from_secs(121)).await;
    assert!(executor.synced().is_empty());

    // Priority requests are still served.
    handle.notify(ids(&[8])).expect("mailbox has room");
    settle(Duration::from_millis(10)).await;
    assert_eq!(executor.synced(), ids(&[8]));

    auto_sync.set_enabled(true);
    settle(Duration::from_secs(120)).await;
    assert_eq!(executor.synced(), ids(&[8, 7]));

    handle.cancel();
}

#[tokio::test(start_paused = true)]
async fn full_mailbox_rejects_without_blocking() {
    let store = seeded_store();
    let gate = Arc::new(Semaphore::new(0));
    let executor = Arc::new(RecordingExecutor::gated(Arc::clone(&gate)));

    let config = SyncerConfig {
        priority_channel_capacity: 1,
        ..Default::default()
    };
    let handle = CodeHostSyncer::spawn(
        github(),
        deps(Arc::clone(&store), Arc::clone(&executor)),
        &config,
        CancellationToken::new(),
    );

    // The syncer is stuck in the first sync, so nothing drains the mailbox.
    settle(Duration::from_millis(10)).await;
    handle.notify(ids(&[3])).expect("first batch fits");
    assert!(matches!(
        handle.notify(ids(&[60])),
        Err(SyncError::PriorityQueueFull { capacity: 1 })
    ));

    gate.add_permits(16);
    settle(Duration::from_millis(10)).await;
    assert_eq!(executor.synced(), ids(&[1, 3, 2]));

    handle.cancel();
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_loop() {
    let store = seeded_store();
    let executor = Arc::new(RecordingExecutor::new());
    let parent = CancellationToken::new();

    let mut handle = CodeHostSyncer::spawn(
        github(),
        deps(Arc::clone(&store), Arc::clone(&executor)),
        &SyncerConfig::default(),
        parent.child_token(),
    );
    settle(Duration::from_millis(10)).await;

    let join = handle.take_join_handle().expect("join handle");
    parent.cancel();
    tokio::time::timeout(Duration::from_secs(1), join)
        .await
        .expect("syncer exits after cancellation")
        .expect("syncer task does not panic");

    assert!(handle.is_cancelled());
    assert!(matches!(
        handle.notify(ids(&[3])),
        Err(SyncError::Shutdown)
    ));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_closes_the_mailbox() {
    let store = seeded_store();
    let executor = Arc::new(RecordingExecutor::new());

    let mut handle = CodeHostSyncer::spawn(
        github(),
        deps(Arc::clone(&store), Arc::clone(&executor)),
        &SyncerConfig::default(),
        CancellationToken::new(),
    );
    settle(Duration::from_millis(10)).await;

    let join = handle.take_join_handle().expect("join handle");
    drop(handle);
    tokio::time::timeout(Duration::from_secs(1), join)
        .await
        .expect("syncer exits once its mailbox closes")
        .expect("syncer task does not panic");
}
