//! Several stations sharing one database file.

use chrono::Utc;
use rollcall_db::SqliteStore;
use rollcall_protocol::{Day, Delegate, DelegateId, PermissionTable, ScanEvent, ScanKey};
use rollcall_station::{
    CacheFeed, Connectivity, MemoryStorage, OfflineQueue, OutcomeKind, Roster, ScanCache,
    ScanClassifier, ScanStore, SessionContext, SyncEngine, SyncOutcome,
};
use std::sync::Arc;
use std::time::Duration;

fn event(id: &str, day: Day, purpose: &str) -> ScanEvent {
    ScanEvent::new(DelegateId::normalize(id), day, purpose, Utc::now())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_inserts_commit_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.sqlite");
    let stores = vec![
        Arc::new(SqliteStore::open(&path).await.unwrap()),
        Arc::new(SqliteStore::open(&path).await.unwrap()),
        Arc::new(SqliteStore::open(&path).await.unwrap()),
    ];

    let mut tasks = Vec::new();
    for store in &stores {
        for _ in 0..4 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.insert_one(&event("EVT-001", Day::One, "Lunch")).await
            }));
        }
    }

    let mut committed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => committed += 1,
            Err(e) => assert!(e.is_conflict(), "unexpected error: {}", e),
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(stores[0].list_scans().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_change_feed_sees_other_process_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.sqlite");
    let ours = Arc::new(SqliteStore::open(&path).await.unwrap());
    let theirs = SqliteStore::open(&path).await.unwrap();

    let poller = ours.watch_changes(Duration::from_millis(20));
    let cache = ScanCache::new();
    let feed = CacheFeed::start(cache.clone(), ours.clone()).await.unwrap();

    let row = theirs.insert_one(&event("EVT-002", Day::Two, "Dinner")).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while cache.lookup(&row.key()).is_none() {
        assert!(tokio::time::Instant::now() < deadline, "remote row never arrived");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    feed.stop().await;
    poller.stop().await;
}

#[tokio::test]
async fn test_station_pipeline_on_sqlite() {
    let store = Arc::new(SqliteStore::open_memory().await.unwrap());
    store
        .import_delegates(&[
            Delegate::new("EVT-001", "Ada Lovelace"),
            Delegate::new("EVT-003", "Edsger Dijkstra"),
        ])
        .await
        .unwrap();

    let roster = Arc::new(Roster::load(store.as_ref()).await.unwrap());
    let cache = ScanCache::new();
    let queue = Arc::new(OfflineQueue::open(MemoryStorage::new()).unwrap());
    let connectivity = Connectivity::new(false);
    let classifier = ScanClassifier::new(
        roster,
        cache.clone(),
        store.clone(),
        queue.clone(),
        connectivity.clone(),
    );
    let ctx = SessionContext::new(Some("Food".to_string()), &PermissionTable::builtin())
        .select(Day::Three, "Lunch")
        .unwrap();

    // Offline: queued.
    let queued = classifier.classify("evt-003", &ctx).await.unwrap();
    assert_eq!(queued.kind(), OutcomeKind::Queued);

    // Meanwhile another station records the same key.
    store.insert_one(&event("EVT-003", Day::Three, "Lunch")).await.unwrap();

    connectivity.set_online(true);
    let engine = SyncEngine::new(queue.clone(), store.clone()).with_cache(cache.clone());
    assert!(matches!(
        engine.sync_now().await,
        SyncOutcome::Isolated {
            committed: 0,
            superseded: 1,
            ..
        }
    ));
    assert!(queue.is_empty());

    let accepted = classifier.classify("EVT-001", &ctx).await.unwrap();
    assert_eq!(accepted.kind(), OutcomeKind::Accepted);
    let duplicate = classifier.classify("EVT-001", &ctx).await.unwrap();
    assert_eq!(duplicate.kind(), OutcomeKind::DuplicateLocal);

    let invalid = classifier.classify("EVT-404", &ctx).await.unwrap();
    assert_eq!(invalid.kind(), OutcomeKind::Invalid);

    let scans = store.list_scans().await.unwrap();
    assert_eq!(scans.len(), 2);
    let key = ScanKey::new(DelegateId::normalize("EVT-003"), Day::Three, "Lunch");
    assert_eq!(scans.iter().filter(|s| s.matches(&key)).count(), 1);
}
