/// Integration tests for taskmesh.
///
/// These tests exercise the full coordination flow end to end: agents
/// posting work, dependents blocking on it, monitors summarizing it, and
/// the store surviving a restart.
use serde_json::json;
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;
use taskmesh::{
    ActionBoard, ActionEventKind, Assignment, DependencyWaiter, GateOutcome, MemoryStore,
    MeshError, Orchestrator, StatusAggregator, WaitOutcome, WatchFilter,
};

static TRACING: Once = Once::new();

fn setup() -> (ActionBoard, DependencyWaiter) {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .try_init();
    });

    let board = ActionBoard::new(Arc::new(MemoryStore::new()));
    let waiter = DependencyWaiter::new(board.clone()).with_poll_interval(Duration::from_millis(25));
    (board, waiter)
}

#[tokio::test]
async fn test_post_then_get_round_trips_payload_and_status() {
    let (board, _) = setup();

    let payload = json!({
        "type": "codegen",
        "status": "in_progress",
        "description": "generate the API client",
    });
    board.post("generator", "api-client", payload.clone()).await.unwrap();

    let record = board.get_status("generator", "api-client").await.unwrap();
    assert_eq!(record.payload(), &payload);
    assert_eq!(record.status.as_str(), "in_progress");
}

#[tokio::test]
async fn test_waiter_unblocks_when_producer_completes() {
    // Agent A posts a build in progress; agent B waits on it with a 5s
    // budget; A completes after ~100ms; B returns well under budget with
    // the completion result.
    let (board, waiter) = setup();

    board
        .post("A", "t1", json!({"type": "build", "status": "in_progress"}))
        .await
        .unwrap();

    let started = std::time::Instant::now();
    let dependent = tokio::spawn({
        let waiter = waiter.clone();
        async move { waiter.wait("A", "t1", Duration::from_secs(5)).await.unwrap() }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    board.complete("A", "t1", json!({"success": true})).await.unwrap();

    let outcome = dependent.await.unwrap();
    let record = outcome.into_record().expect("wait should complete");
    assert_eq!(record.payload()["success"], true);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_many_waiters_on_one_key_all_satisfied() {
    let (board, waiter) = setup();

    board
        .post("A", "shared", json!({"type": "build", "status": "in_progress"}))
        .await
        .unwrap();

    let mut dependents = vec![];
    for _ in 0..8 {
        let waiter = waiter.clone();
        dependents.push(tokio::spawn(async move {
            waiter.wait("A", "shared", Duration::from_secs(5)).await.unwrap()
        }));
    }

    tokio::time::sleep(Duration::from_millis(80)).await;
    board.complete("A", "shared", json!({"success": true})).await.unwrap();

    for dependent in dependents {
        let outcome = dependent.await.unwrap();
        assert_eq!(
            outcome.record().expect("every waiter sees it").payload()["success"],
            true
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_wait_timeout_is_bounded() {
    let (board, waiter) = setup();

    board
        .post("A", "stalled", json!({"type": "deploy"}))
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    let outcome = waiter
        .wait("A", "stalled", Duration::from_millis(300))
        .await
        .unwrap();

    assert!(outcome.is_timed_out());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed <= Duration::from_millis(300) + waiter.poll_interval());
}

#[tokio::test]
async fn test_completed_records_leave_the_active_view() {
    let (board, _) = setup();

    board.post("A", "a1", json!({"type": "build"})).await.unwrap();
    board.post("A", "a2", json!({"type": "test"})).await.unwrap();
    board.complete("A", "a1", json!(null)).await.unwrap();
    board.fail("A", "a2", json!({"error": "timeout"})).await.unwrap();
    board.post("A", "a3", json!({"type": "deploy"})).await.unwrap();

    let active = board.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].action_id(), "a3");
}

#[tokio::test]
async fn test_terminal_records_reject_further_updates() {
    let (board, _) = setup();

    board
        .post("A", "done", json!({"type": "build", "status": "in_progress"}))
        .await
        .unwrap();
    board.complete("A", "done", json!({"success": true})).await.unwrap();

    let before = board.get_status("A", "done").await.unwrap();
    let result = board
        .update("A", "done", json!({"type": "build", "status": "pending"}))
        .await;
    assert!(matches!(result, Err(MeshError::AlreadyCompleted { .. })));

    let after = board.get_status("A", "done").await.unwrap();
    assert_eq!(after.payload(), before.payload());
}

#[tokio::test]
async fn test_complete_on_unposted_key_creates_nothing() {
    let (board, _) = setup();

    let result = board.complete("A", "missing", json!({"success": true})).await;
    assert!(matches!(result, Err(MeshError::NotFound { .. })));

    let result = board.get_status("A", "missing").await;
    assert!(matches!(result, Err(MeshError::NotFound { .. })));
    assert!(board.list_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_summary_groups_activity_per_agent() {
    // Three posts from X (two active, one completed) and one from Y.
    let (board, _) = setup();
    let aggregator = StatusAggregator::new(board.clone());

    board.post("X", "x1", json!({"type": "build"})).await.unwrap();
    board.post("X", "x2", json!({"type": "test"})).await.unwrap();
    board.post("X", "x3", json!({"type": "review"})).await.unwrap();
    board.complete("X", "x3", json!(null)).await.unwrap();
    board.post("Y", "y1", json!({"type": "deploy"})).await.unwrap();

    let outcome = aggregator.summarize().await;
    let summary = outcome.summary().unwrap();

    assert_eq!(summary.total_active, 3);

    let x = summary.agent("X").unwrap();
    assert_eq!((x.active, x.completed), (2, 1));

    let y = summary.agent("Y").unwrap();
    assert_eq!((y.active, y.completed), (1, 0));
}

#[tokio::test]
async fn test_events_track_the_full_lifecycle() {
    let (board, _) = setup();
    let (_id, mut rx) = board.watch(WatchFilter::action("A", "job"));

    board.post("A", "job", json!({"type": "build"})).await.unwrap();
    board
        .update("A", "job", json!({"type": "build", "status": "in_progress"}))
        .await
        .unwrap();
    board.complete("A", "job", json!({"success": true})).await.unwrap();

    assert_eq!(rx.recv().await.unwrap().kind, ActionEventKind::Posted);
    assert_eq!(rx.recv().await.unwrap().kind, ActionEventKind::Updated);
    let done = rx.recv().await.unwrap();
    assert_eq!(done.kind, ActionEventKind::Completed);
    assert_eq!(done.payload.unwrap()["success"], true);
}

#[tokio::test]
async fn test_orchestrated_pipeline_end_to_end() {
    // An orchestrator assigns codegen and testing to two agents, gates the
    // deploy phase on both, and reports progress throughout.
    let (board, waiter) = setup();
    let orch = Orchestrator::new(board.clone()).with_waiter(waiter);

    let codegen = orch
        .assign(Assignment::new("generator", "codegen", "generate the service"))
        .await
        .unwrap();
    let testing = orch
        .assign(Assignment::new("tester", "testing", "run the suite"))
        .await
        .unwrap();

    assert_eq!(orch.log_progress().await.summary().unwrap().total_active, 2);

    // The agents do their work concurrently.
    let workers = vec![
        tokio::spawn({
            let board = board.clone();
            let action = codegen.action_id().to_string();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                board
                    .complete("generator", &action, json!({"files": 12}))
                    .await
                    .unwrap();
            }
        }),
        tokio::spawn({
            let board = board.clone();
            let action = testing.action_id().to_string();
            async move {
                tokio::time::sleep(Duration::from_millis(90)).await;
                board
                    .complete("tester", &action, json!({"passed": 42, "failed": 0}))
                    .await
                    .unwrap();
            }
        }),
    ];

    let outcome = orch
        .await_dependencies(
            &[
                ("generator", codegen.action_id()),
                ("tester", testing.action_id()),
            ],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    for worker in workers {
        worker.await.unwrap();
    }

    let GateOutcome::Ready(records) = outcome else {
        panic!("both dependencies should complete");
    };
    assert_eq!(records[0].payload()["files"], 12);
    assert_eq!(records[1].payload()["passed"], 42);

    let summary = orch.log_progress().await;
    let summary = summary.summary().unwrap();
    assert_eq!(summary.total_active, 0);
    assert_eq!(summary.agent("generator").unwrap().completed, 1);
    assert_eq!(summary.agent("tester").unwrap().completed, 1);
}

#[tokio::test]
async fn test_board_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("board.json");

    // First process: post work, complete some of it, save.
    let store = Arc::new(MemoryStore::new());
    let board = ActionBoard::new(Arc::clone(&store) as Arc<dyn taskmesh::RecordStore>);
    board
        .post("A", "carried", json!({"type": "build", "status": "in_progress"}))
        .await
        .unwrap();
    board.post("A", "finished", json!({"type": "test"})).await.unwrap();
    board.complete("A", "finished", json!({"success": true})).await.unwrap();
    taskmesh::persistence::save(&store, &path).await.unwrap();

    // Second process: load and keep going.
    let restored = Arc::new(taskmesh::persistence::load(&path).await.unwrap());
    let board = ActionBoard::new(Arc::clone(&restored) as Arc<dyn taskmesh::RecordStore>);
    let waiter = DependencyWaiter::new(board.clone()).with_poll_interval(Duration::from_millis(25));

    // A waiter on the already-completed record returns immediately.
    let outcome = waiter.wait("A", "finished", Duration::from_secs(1)).await.unwrap();
    assert!(matches!(outcome, WaitOutcome::Completed(_)));

    // The in-flight record is still active and still mutable.
    assert_eq!(board.list_active().await.unwrap().len(), 1);
    board.complete("A", "carried", json!(null)).await.unwrap();
    assert!(board.list_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_producers_do_not_interfere() {
    let (board, _) = setup();

    let mut producers = vec![];
    for agent in ["alpha", "beta", "gamma"] {
        for job in 0..5 {
            let board = board.clone();
            producers.push(tokio::spawn(async move {
                let action = format!("job-{}", job);
                board
                    .post(agent, &action, json!({"type": "build", "status": "in_progress"}))
                    .await
                    .unwrap();
                board.complete(agent, &action, json!({"job": job})).await.unwrap();
            }));
        }
    }

    for producer in producers {
        producer.await.unwrap();
    }

    assert!(board.list_active().await.unwrap().is_empty());
    let counts = board.completion_counts();
    assert_eq!(counts.get("alpha"), Some(&5));
    assert_eq!(counts.get("beta"), Some(&5));
    assert_eq!(counts.get("gamma"), Some(&5));
}
