//! Classification scenarios against the in-memory record store.

use rollcall_protocol::{Day, Delegate, DelegateId, PermissionTable, ScanKey};
use rollcall_station::{
    CacheFeed, Connectivity, FeedbackBoard, MemoryRoster, MemoryScanStore, MemoryStorage,
    OfflineQueue, OutcomeKind, QueueReason, Roster, ScanCache, ScanClassifier, ScanContext,
    ScanOutcome, SessionContext, Tone,
};
use std::sync::Arc;
use std::time::Duration;

fn delegates() -> Vec<Delegate> {
    vec![
        Delegate::new("EVT-001", "Ada Lovelace").with_organization("Analytical Engines"),
        Delegate::new("EVT-002", "Grace Hopper"),
        Delegate::new("EVT-003", "Edsger Dijkstra"),
        Delegate::new("EVT-004", "Barbara Liskov"),
        Delegate::new("EVT-005", "Alan Turing"),
    ]
}

async fn roster() -> Arc<Roster> {
    Arc::new(Roster::load(&MemoryRoster::new(delegates())).await.unwrap())
}

fn context(day: Day, purpose: &str) -> ScanContext {
    SessionContext::new(Some("Volunteer".to_string()), &PermissionTable::builtin())
        .select(day, purpose)
        .unwrap()
}

struct Station {
    classifier: ScanClassifier,
    cache: ScanCache,
    queue: Arc<OfflineQueue>,
    connectivity: Connectivity,
}

async fn station(store: &Arc<MemoryScanStore>, online: bool) -> Station {
    let cache = ScanCache::new();
    let queue = Arc::new(OfflineQueue::open(MemoryStorage::new()).unwrap());
    let connectivity = Connectivity::new(online);
    let classifier = ScanClassifier::new(
        roster().await,
        cache.clone(),
        store.clone(),
        queue.clone(),
        connectivity.clone(),
    );
    Station {
        classifier,
        cache,
        queue,
        connectivity,
    }
}

fn key(id: &str, day: Day, purpose: &str) -> ScanKey {
    ScanKey::new(DelegateId::normalize(id), day, purpose)
}

#[tokio::test]
async fn test_online_scan_is_accepted_and_normalized() {
    let store = Arc::new(MemoryScanStore::new());
    let s = station(&store, true).await;
    let ctx = context(Day::Two, "Breakfast");

    let outcome = s.classifier.classify("  evt-001 ", &ctx).await.unwrap();
    match &outcome {
        ScanOutcome::Accepted { delegate, event } => {
            assert_eq!(delegate.name, "Ada Lovelace");
            assert_eq!(event.delegate_id.as_str(), "EVT-001");
            assert_eq!(event.day, Day::Two);
            assert_eq!(event.purpose, "Breakfast");
            assert!(event.is_committed());
        }
        other => panic!("expected accepted, got {:?}", other),
    }

    assert_eq!(store.count_for(&key("EVT-001", Day::Two, "Breakfast")), 1);
    assert!(s.cache.lookup(&key("EVT-001", Day::Two, "Breakfast")).is_some());
    assert!(s.queue.is_empty());
}

#[tokio::test]
async fn test_second_scan_is_local_duplicate_without_store_call() {
    let store = Arc::new(MemoryScanStore::new());
    let s = station(&store, true).await;
    let ctx = context(Day::Two, "Lunch");

    let first = s.classifier.classify("EVT-002", &ctx).await.unwrap();
    assert_eq!(first.kind(), OutcomeKind::Accepted);

    let second = s.classifier.classify("evt-002", &ctx).await.unwrap();
    match second {
        ScanOutcome::DuplicateLocal { pending, .. } => assert!(!pending),
        other => panic!("expected local duplicate, got {:?}", other),
    }
    assert_eq!(store.insert_calls(), 1);

    // Same delegate, other purpose, is a separate record.
    let other = s
        .classifier
        .classify("EVT-002", &context(Day::Two, "Dinner"))
        .await
        .unwrap();
    assert_eq!(other.kind(), OutcomeKind::Accepted);
    assert_eq!(store.committed().len(), 2);
}

#[tokio::test]
async fn test_unknown_or_blank_id_is_invalid_and_never_stored() {
    let store = Arc::new(MemoryScanStore::new());
    let s = station(&store, true).await;
    let ctx = context(Day::One, "Kit");

    for raw in ["NOPE-99", "   ", ""] {
        let outcome = s.classifier.classify(raw, &ctx).await.unwrap();
        assert_eq!(outcome.kind(), OutcomeKind::Invalid, "input {:?}", raw);
    }

    // Offline stations never queue unknown ids either.
    s.connectivity.set_online(false);
    let outcome = s.classifier.classify("nope-99", &ctx).await.unwrap();
    assert_eq!(outcome.feedback().detail.as_deref(), Some("NOPE-99 not found"));

    assert_eq!(store.insert_calls(), 0);
    assert!(s.queue.is_empty());
}

#[tokio::test]
async fn test_input_during_classification_is_ignored() {
    let store = Arc::new(MemoryScanStore::new());
    store.set_latency(Some(Duration::from_millis(100)));
    let s = station(&store, true).await;
    let ctx = context(Day::One, "Attendance");

    let (first, second) = tokio::join!(s.classifier.classify("EVT-001", &ctx), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(s.classifier.is_busy());
        s.classifier.classify("EVT-001", &ctx).await
    });

    assert_eq!(first.unwrap().kind(), OutcomeKind::Accepted);
    assert!(second.is_none());
    assert_eq!(store.insert_calls(), 1);
    assert!(s.queue.is_empty());
    assert!(!s.classifier.is_busy());

    // Once the first classification finished, the next input is handled.
    let third = s.classifier.classify("EVT-001", &ctx).await.unwrap();
    assert_eq!(third.kind(), OutcomeKind::DuplicateLocal);
}

#[tokio::test]
async fn test_offline_scan_is_queued_then_pending_duplicate() {
    let store = Arc::new(MemoryScanStore::new());
    let s = station(&store, false).await;
    let ctx = context(Day::Three, "Lunch");

    let outcome = s.classifier.classify("EVT-003", &ctx).await.unwrap();
    match &outcome {
        ScanOutcome::Queued {
            reason,
            queue_length,
            event,
            ..
        } => {
            assert_eq!(*reason, QueueReason::Offline);
            assert_eq!(*queue_length, 1);
            assert!(!event.is_committed());
        }
        other => panic!("expected queued, got {:?}", other),
    }
    assert_eq!(outcome.feedback().detail.as_deref(), Some("Will sync when online"));
    assert_eq!(store.insert_calls(), 0);

    let again = s.classifier.classify("EVT-003", &ctx).await.unwrap();
    match again {
        ScanOutcome::DuplicateLocal { pending, .. } => assert!(pending),
        other => panic!("expected pending duplicate, got {:?}", other),
    }
    assert_eq!(s.queue.len(), 1);
}

#[tokio::test]
async fn test_quarantined_scan_is_pending_duplicate() {
    let store = Arc::new(MemoryScanStore::new());
    let s = station(&store, false).await;
    let ctx = context(Day::Three, "Dinner");

    let queued = match s.classifier.classify("EVT-002", &ctx).await.unwrap() {
        ScanOutcome::Queued { event, .. } => event,
        other => panic!("expected queued, got {:?}", other),
    };
    s.queue.resolve(&[], &[queued.clone()]).unwrap();
    assert!(s.queue.is_empty());

    let again = s.classifier.classify("EVT-002", &ctx).await.unwrap();
    match again {
        ScanOutcome::DuplicateLocal {
            pending,
            recorded_at,
            ..
        } => {
            assert!(pending);
            assert_eq!(recorded_at, queued.timestamp);
        }
        other => panic!("expected pending duplicate, got {:?}", other),
    }
    assert!(s.queue.is_empty());
    assert_eq!(s.queue.quarantined().unwrap(), vec![queued]);
}

#[tokio::test]
async fn test_transport_failure_falls_back_to_queue() {
    let store = Arc::new(MemoryScanStore::new());
    store.set_reachable(false);
    let s = station(&store, true).await;
    let ctx = context(Day::Four, "Attendance");

    let outcome = s.classifier.classify("EVT-004", &ctx).await.unwrap();
    match &outcome {
        ScanOutcome::Queued { reason, .. } => assert_eq!(*reason, QueueReason::Transport),
        other => panic!("expected queued, got {:?}", other),
    }
    assert_eq!(
        outcome.feedback().detail.as_deref(),
        Some("Network error, queued.")
    );
    assert_eq!(s.queue.len(), 1);
    assert!(store.committed().is_empty());
}

#[tokio::test]
async fn test_rejected_insert_is_system_error_and_not_queued() {
    let store = Arc::new(MemoryScanStore::new());
    store.reject_delegate(&DelegateId::normalize("EVT-005"));
    let s = station(&store, true).await;

    let outcome = s
        .classifier
        .classify("EVT-005", &context(Day::One, "Kit"))
        .await
        .unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::SystemError);
    assert_eq!(outcome.feedback().tone, Tone::Error);
    assert!(s.queue.is_empty());
    assert!(s.cache.is_empty());
}

#[tokio::test]
async fn test_queue_write_failure_is_system_error() {
    let store = Arc::new(MemoryScanStore::new());
    let storage = MemoryStorage::new();
    storage.set_fail_writes(true);
    let queue = Arc::new(OfflineQueue::open(storage).unwrap());
    let classifier = ScanClassifier::new(
        roster().await,
        ScanCache::new(),
        store.clone(),
        queue.clone(),
        Connectivity::new(false),
    );

    let outcome = classifier
        .classify("EVT-001", &context(Day::One, "Kit"))
        .await
        .unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::SystemError);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_lost_race_reports_other_device() {
    let store = Arc::new(MemoryScanStore::new());
    let a = station(&store, true).await;
    let b = station(&store, true).await;
    let ctx = context(Day::Three, "Lunch");

    let winner = b.classifier.classify("EVT-003", &ctx).await.unwrap();
    assert_eq!(winner.kind(), OutcomeKind::Accepted);

    // Station A never saw the push, so its cache misses and the store decides.
    let loser = a.classifier.classify("EVT-003", &ctx).await.unwrap();
    assert_eq!(loser.kind(), OutcomeKind::DuplicateRemote);
    assert_eq!(
        loser.feedback().detail.as_deref(),
        Some("Recorded by another device.")
    );
    assert_eq!(store.count_for(&key("EVT-003", Day::Three, "Lunch")), 1);
}

#[tokio::test]
async fn test_push_feed_turns_remote_scan_into_local_duplicate() {
    let store = Arc::new(MemoryScanStore::new());
    let a = station(&store, true).await;
    let b = station(&store, true).await;
    let feed = CacheFeed::start(a.cache.clone(), store.clone()).await.unwrap();
    let ctx = context(Day::Two, "Dinner");

    b.classifier.classify("EVT-002", &ctx).await.unwrap();
    let k = key("EVT-002", Day::Two, "Dinner");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while a.cache.lookup(&k).is_none() {
        assert!(tokio::time::Instant::now() < deadline, "push never arrived");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let calls_before = store.insert_calls();
    let outcome = a.classifier.classify("EVT-002", &ctx).await.unwrap();
    assert_eq!(outcome.kind(), OutcomeKind::DuplicateLocal);
    assert_eq!(store.insert_calls(), calls_before);

    feed.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_stations_record_exactly_once() {
    let store = Arc::new(MemoryScanStore::new());
    let ctx = context(Day::One, "Lunch");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let s = station(&store, true).await;
        let ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            s.classifier.classify("EVT-001", &ctx).await
        }));
    }

    let mut accepted = 0;
    let mut remote = 0;
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        match outcome.kind() {
            OutcomeKind::Accepted => accepted += 1,
            OutcomeKind::DuplicateRemote => remote += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    // No station feeds its cache from the store, so every loser hears it from the store.
    assert_eq!(accepted, 1);
    assert_eq!(remote, 7);
    assert_eq!(store.count_for(&key("EVT-001", Day::One, "Lunch")), 1);
}

#[tokio::test(start_paused = true)]
async fn test_feedback_board_shows_outcome() {
    let store = Arc::new(MemoryScanStore::new());
    let board = FeedbackBoard::new(Duration::from_millis(1500));
    let classifier = ScanClassifier::new(
        roster().await,
        ScanCache::new(),
        store.clone(),
        Arc::new(OfflineQueue::open(MemoryStorage::new()).unwrap()),
        Connectivity::new(true),
    )
    .with_feedback(board.clone());

    classifier
        .classify("EVT-004", &context(Day::Four, "Breakfast"))
        .await
        .unwrap();
    let shown = board.current().unwrap();
    assert_eq!(shown.tone, Tone::Success);
    assert_eq!(shown.message, "Barbara Liskov");
    assert_eq!(shown.detail.as_deref(), Some("Recorded successfully"));

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert!(board.current().is_none());
}
