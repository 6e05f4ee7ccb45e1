//! Polling behaviour against a mock service

use std::io::Write;
use std::time::{Duration, Instant};

use mockito::{Mock, Server, ServerOpts};
use npd_client::{
    CancellationToken, Error, MissingTaskPolicy, NpdClient, PollPolicy, TaskKind, TaskState,
};
use serde_json::json;

fn create_mock_client(mock_server: &Server) -> NpdClient {
    NpdClient::builder()
        .base_url(mock_server.url())
        .build()
        .expect("mock server URL should be valid")
}

fn fast_policy() -> PollPolicy {
    PollPolicy::builder()
        .interval(Duration::from_millis(10))
        .build()
}

fn task_body(state: &str, progress: f64) -> String {
    let started_at = (state != "queued").then_some(1700000001.0);
    json!({
        "task_id": "t-1",
        "type": "train",
        "state": state,
        "created_at": 1700000000.0,
        "started_at": started_at,
        "ended_at": null,
        "progress": progress,
        "message": format!("task is {}", state),
        "model_tag": "baseline_stub_v0",
        "dataset_id": "demo",
        "hyperparameters": {"lr": 0.0001, "batch_size": 16, "epochs": 5, "seed": 42},
        "metrics": {},
        "history": []
    })
    .to_string()
}

async fn mock_ping(server: &mut Server) -> Mock {
    server
        .mock("GET", "/ping")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok": true}"#)
        .create_async()
        .await
}

async fn mock_task(server: &mut Server, state: &str, progress: f64, hits: usize) -> Mock {
    server
        .mock("GET", "/training/t-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(task_body(state, progress))
        .expect(hits)
        .create_async()
        .await
}

async fn mock_task_forever(server: &mut Server, state: &str) -> Mock {
    server
        .mock("GET", "/training/t-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(task_body(state, 0.5))
        .expect_at_least(1)
        .create_async()
        .await
}

#[tokio::test]
async fn test_poll_until_succeeded() {
    let mut server = Server::new_async().await;

    let ping = mock_ping(&mut server).await;
    let queued = mock_task(&mut server, "queued", 0.0, 1).await;
    let running = mock_task(&mut server, "running", 0.5, 2).await;
    let succeeded = mock_task(&mut server, "succeeded", 1.0, 1).await;

    let client = create_mock_client(&server);
    let mut observed = Vec::new();
    let task = client
        .poller(fast_policy())
        .wait_with_progress(TaskKind::Train, "t-1", &CancellationToken::new(), |t| {
            observed.push(t.clone())
        })
        .await
        .expect("polling should finish");

    ping.assert_async().await;
    queued.assert_async().await;
    running.assert_async().await;
    succeeded.assert_async().await;

    let states: Vec<_> = observed.iter().map(|t| t.state).collect();
    assert_eq!(
        states,
        vec![
            TaskState::Queued,
            TaskState::Running,
            TaskState::Running,
            TaskState::Succeeded
        ]
    );
    assert!(states.windows(2).all(|w| w[0].rank() <= w[1].rank()));
    assert_eq!(Some(&task), observed.last());
    assert_eq!(task.progress, 1.0);
}

#[tokio::test]
async fn test_failed_is_terminal() {
    let mut server = Server::new_async().await;

    let _ping = mock_ping(&mut server).await;
    let running = mock_task(&mut server, "running", 0.2, 1).await;
    let failed = mock_task(&mut server, "failed", 0.2, 1).await;

    let client = create_mock_client(&server);
    let task = client
        .poller(fast_policy())
        .wait(TaskKind::Train, "t-1", &CancellationToken::new())
        .await
        .expect("a failed task is still a finished poll");

    running.assert_async().await;
    failed.assert_async().await;
    assert_eq!(task.state, TaskState::Failed);
    assert!(!task.succeeded());
}

#[tokio::test]
async fn test_cancel_interrupts_wait() {
    let mut server = Server::new_async().await;

    let _ping = mock_ping(&mut server).await;
    let _running = mock_task_forever(&mut server, "running").await;

    let client = create_mock_client(&server);
    let policy = PollPolicy::builder()
        .interval(Duration::from_secs(10))
        .build();

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = client
        .poller(policy)
        .wait(TaskKind::Train, "t-1", &token)
        .await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let mut server = Server::new_async().await;

    let ping = server
        .mock("GET", "/ping")
        .expect(0)
        .create_async()
        .await;
    let task = mock_task(&mut server, "running", 0.5, 0).await;

    let token = CancellationToken::new();
    token.cancel();

    let client = create_mock_client(&server);
    let result = client.poller(fast_policy()).wait(TaskKind::Train, "t-1", &token).await;

    ping.assert_async().await;
    task.assert_async().await;
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_deadline_stops_polling() {
    let mut server = Server::new_async().await;

    let _ping = mock_ping(&mut server).await;
    let _running = mock_task_forever(&mut server, "running").await;

    let client = create_mock_client(&server);
    let deadline = Duration::from_millis(150);
    let policy = PollPolicy::builder()
        .interval(Duration::from_millis(20))
        .deadline(deadline)
        .build();

    let result = client
        .poller(policy)
        .wait(TaskKind::Train, "t-1", &CancellationToken::new())
        .await;

    match result {
        Err(Error::PollTimeout {
            elapsed,
            last_state,
            ..
        }) => {
            assert!(elapsed >= deadline);
            assert_eq!(last_state, Some(TaskState::Running));
        }
        other => panic!("expected PollTimeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_deadline_bounds_a_slow_fetch() {
    let mut server = Server::new_with_opts_async(ServerOpts::default()).await;

    let body = task_body("running", 0.5);
    let _slow = server
        .mock("GET", "/training/t-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_chunked_body(move |w| {
            std::thread::sleep(Duration::from_millis(1500));
            w.write_all(body.as_bytes())
        })
        .create_async()
        .await;

    let client = create_mock_client(&server);
    let deadline = Duration::from_millis(100);
    let policy = PollPolicy::builder()
        .interval(Duration::from_millis(10))
        .deadline(deadline)
        .require_healthy(false)
        .build();

    let started = Instant::now();
    let result = client
        .poller(policy)
        .wait(TaskKind::Train, "t-1", &CancellationToken::new())
        .await;

    assert!(started.elapsed() < Duration::from_secs(1));
    match result {
        Err(Error::PollTimeout {
            elapsed,
            last_state,
            ..
        }) => {
            assert!(elapsed >= deadline);
            assert!(elapsed < Duration::from_secs(1));
            assert_eq!(last_state, None);
        }
        other => panic!("expected PollTimeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_deadline_bounds_a_slow_health_check() {
    let mut server = Server::new_with_opts_async(ServerOpts::default()).await;

    let _ping = server
        .mock("GET", "/ping")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_millis(1500));
            w.write_all(br#"{"ok": true}"#)
        })
        .create_async()
        .await;
    let task = mock_task(&mut server, "running", 0.5, 0).await;

    let client = create_mock_client(&server);
    let policy = PollPolicy::builder()
        .interval(Duration::from_millis(10))
        .deadline(Duration::from_millis(100))
        .build();

    let started = Instant::now();
    let result = client
        .poller(policy)
        .wait(TaskKind::Train, "t-1", &CancellationToken::new())
        .await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(
        result,
        Err(Error::PollTimeout {
            last_state: None,
            ..
        })
    ));
    task.assert_async().await;
}

#[tokio::test]
async fn test_max_attempts() {
    let mut server = Server::new_async().await;

    let _ping = mock_ping(&mut server).await;
    let queued = mock_task(&mut server, "queued", 0.0, 3).await;

    let client = create_mock_client(&server);
    let policy = PollPolicy::builder()
        .interval(Duration::from_millis(5))
        .max_attempts(3)
        .build();

    let result = client
        .poller(policy)
        .wait(TaskKind::Train, "t-1", &CancellationToken::new())
        .await;

    queued.assert_async().await;
    match result {
        Err(Error::PollExhausted {
            attempts,
            last_state,
            ..
        }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last_state, Some(TaskState::Queued));
        }
        other => panic!("expected PollExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_task_fails_by_default() {
    let mut server = Server::new_async().await;

    let _ping = mock_ping(&mut server).await;
    let missing = server
        .mock("GET", "/training/t-1")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let client = create_mock_client(&server);
    let result = client
        .poller(fast_policy())
        .wait(TaskKind::Train, "t-1", &CancellationToken::new())
        .await;

    missing.assert_async().await;
    assert!(matches!(result, Err(Error::NotFound(ref what)) if what.contains("t-1")));
}

#[tokio::test]
async fn test_missing_task_retried_when_asked() {
    let mut server = Server::new_async().await;

    let _ping = mock_ping(&mut server).await;
    let missing = server
        .mock("GET", "/training/t-1")
        .with_status(404)
        .expect(2)
        .create_async()
        .await;
    let succeeded = mock_task(&mut server, "succeeded", 1.0, 1).await;

    let client = create_mock_client(&server);
    let policy = PollPolicy::builder()
        .interval(Duration::from_millis(10))
        .on_missing(MissingTaskPolicy::Retry)
        .build();

    let task = client
        .poller(policy)
        .wait(TaskKind::Train, "t-1", &CancellationToken::new())
        .await
        .expect("task appears after two misses");

    missing.assert_async().await;
    succeeded.assert_async().await;
    assert!(task.succeeded());
}

#[tokio::test]
async fn test_server_error_is_not_treated_as_missing() {
    let mut server = Server::new_async().await;

    let _ping = mock_ping(&mut server).await;
    let broken = server
        .mock("GET", "/training/t-1")
        .with_status(503)
        .with_body("upstream down")
        .expect(1)
        .create_async()
        .await;

    let client = create_mock_client(&server);
    let policy = PollPolicy::builder()
        .interval(Duration::from_millis(10))
        .on_missing(MissingTaskPolicy::Retry)
        .build();

    let result = client
        .poller(policy)
        .wait(TaskKind::Train, "t-1", &CancellationToken::new())
        .await;

    broken.assert_async().await;
    assert_eq!(result.expect_err("503 should surface").status(), Some(503));
}

#[tokio::test]
async fn test_tolerated_transient_errors() {
    let mut server = Server::new_async().await;

    let _ping = mock_ping(&mut server).await;
    let broken = server
        .mock("GET", "/training/t-1")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;
    let succeeded = mock_task(&mut server, "succeeded", 1.0, 1).await;

    let client = create_mock_client(&server);
    let policy = PollPolicy::builder()
        .interval(Duration::from_millis(10))
        .tolerated_errors(1)
        .build();

    let task = client
        .poller(policy)
        .wait(TaskKind::Train, "t-1", &CancellationToken::new())
        .await
        .expect("one transient error is absorbed");

    broken.assert_async().await;
    succeeded.assert_async().await;
    assert!(task.succeeded());
}

#[tokio::test]
async fn test_unhealthy_service_blocks_polling() {
    let mut server = Server::new_async().await;

    let ping = server
        .mock("GET", "/ping")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok": false}"#)
        .create_async()
        .await;
    let task = mock_task(&mut server, "running", 0.5, 0).await;

    let client = create_mock_client(&server);
    let result = client
        .poller(fast_policy())
        .wait(TaskKind::Train, "t-1", &CancellationToken::new())
        .await;

    ping.assert_async().await;
    task.assert_async().await;
    assert!(matches!(result, Err(Error::ServiceUnavailable(_))));
}

#[tokio::test]
async fn test_unreachable_health_endpoint() {
    let mut server = Server::new_async().await;

    let ping = server
        .mock("GET", "/ping")
        .with_status(500)
        .create_async()
        .await;

    let client = create_mock_client(&server);
    let result = client
        .poller(fast_policy())
        .wait(TaskKind::Train, "t-1", &CancellationToken::new())
        .await;

    ping.assert_async().await;
    let error = result.expect_err("health gate should fail");
    assert!(matches!(error, Error::ServiceUnavailable(_)));
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_health_gate_can_be_skipped() {
    let mut server = Server::new_async().await;

    let ping = server
        .mock("GET", "/ping")
        .expect(0)
        .create_async()
        .await;
    let succeeded = mock_task(&mut server, "succeeded", 1.0, 1).await;

    let client = create_mock_client(&server);
    let policy = PollPolicy::builder()
        .interval(Duration::from_millis(10))
        .require_healthy(false)
        .build();

    let task = client
        .poller(policy)
        .wait(TaskKind::Train, "t-1", &CancellationToken::new())
        .await
        .unwrap();

    ping.assert_async().await;
    succeeded.assert_async().await;
    assert!(task.succeeded());
}

#[tokio::test]
async fn test_wait_for_task_with_defaults() {
    let mut server = Server::new_async().await;

    let ping = mock_ping(&mut server).await;
    let succeeded = mock_task(&mut server, "succeeded", 1.0, 1).await;

    let client = create_mock_client(&server);
    let task = client
        .wait_for_task(TaskKind::Train, "t-1", &CancellationToken::new())
        .await
        .unwrap();

    ping.assert_async().await;
    succeeded.assert_async().await;
    assert_eq!(task.task_id, "t-1");
}

#[tokio::test]
async fn test_wait_for_model_version() {
    let mut server = Server::new_async().await;

    let _ping = mock_ping(&mut server).await;
    let version = |state: &str| {
        json!({
            "id": 4,
            "model_fk": 1,
            "version_tag": "v1",
            "dataset_id": "demo",
            "state": state,
            "created_at": 2.0,
            "metrics": {},
            "message": ""
        })
        .to_string()
    };

    let running = server
        .mock("GET", "/models/npc/versions/4")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(version("running"))
        .expect(1)
        .create_async()
        .await;
    let succeeded = server
        .mock("GET", "/models/npc/versions/4")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(version("succeeded"))
        .expect(1)
        .create_async()
        .await;

    let client = create_mock_client(&server);
    let finished = client
        .poller(fast_policy())
        .wait_for_model_version("npc", 4, &CancellationToken::new())
        .await
        .unwrap();

    running.assert_async().await;
    succeeded.assert_async().await;
    assert!(finished.is_terminal());
    assert_eq!(finished.state, TaskState::Succeeded);
}
