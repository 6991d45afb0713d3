//! End-to-end runs against a local mock HTTP server.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use stagehand::loadtest::aggregate::aggregate;
use stagehand::loadtest::coordinator::LoadCoordinator;
use stagehand::loadtest::metrics::MetricsCollector;
use stagehand::loadtest::scenario::{HttpMethod, Scenario, Stage};
use stagehand::loadtest::transport::{RequestPlan, ReqwestTransport, Transport};

fn scenario(url: String, method: HttpMethod, stages: Vec<Stage>) -> Scenario {
    Scenario {
        test_name: Some("http-test".to_string()),
        target_url: url,
        method,
        timeout_ms: 2_000,
        stages,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_transport_sends_method_headers_and_payload() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/items")
        .match_header("content-type", "application/json")
        .match_header("x-run", "42")
        .match_body(r#"{"id":1}"#)
        .with_status(201)
        .create_async()
        .await;

    let mut scenario = scenario(
        format!("{}/items", server.url()),
        HttpMethod::Post,
        vec![Stage::new(Duration::from_secs(1), 1)],
    );
    scenario.payload = vec![r#"{"id":1}"#.to_string()];
    scenario.headers = BTreeMap::from([("X-Run".to_string(), "42".to_string())]);

    let transport = ReqwestTransport::new("http-test").unwrap();
    let status = transport
        .send(&RequestPlan::for_iteration(&scenario, 0))
        .await
        .unwrap();

    assert_eq!(status, 201);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_transport_reports_server_errors_as_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/")
        .with_status(503)
        .create_async()
        .await;

    let scenario = scenario(
        format!("{}/", server.url()),
        HttpMethod::Get,
        vec![Stage::new(Duration::from_secs(1), 1)],
    );
    let transport = ReqwestTransport::new("http-test").unwrap();
    let status = transport
        .send(&RequestPlan::for_iteration(&scenario, 0))
        .await
        .unwrap();
    assert_eq!(status, 503);
}

#[tokio::test]
async fn test_transport_connection_refused_is_error() {
    // Bind then drop a listener to get a port nothing is listening on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let scenario = scenario(
        format!("http://127.0.0.1:{port}/"),
        HttpMethod::Get,
        vec![Stage::new(Duration::from_secs(1), 1)],
    );
    let transport = ReqwestTransport::new("http-test").unwrap();
    let err = transport
        .send(&RequestPlan::for_iteration(&scenario, 0))
        .await
        .unwrap_err();
    assert_ne!(err.category(), "timeout");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_staged_run_against_server() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/health")
        .with_status(200)
        .with_body("ok")
        .expect_at_least(1)
        .create_async()
        .await;

    let scenario = scenario(
        format!("{}/health", server.url()),
        HttpMethod::Get,
        vec![
            Stage::new(Duration::from_secs(1), 3),
            Stage::new(Duration::from_millis(500), 0),
        ],
    );
    let collector = Arc::new(MetricsCollector::new());
    let transport = Arc::new(ReqwestTransport::new("http-test").unwrap());
    let coordinator = LoadCoordinator::new(transport, Arc::clone(&collector));

    let run = coordinator.run(&scenario, CancellationToken::new()).await;

    let targets: Vec<u32> = run.ticks.iter().map(|t| t.target).collect();
    assert_eq!(targets, vec![2, 3, 0]);
    assert_eq!(run.workers_spawned, 3);
    assert!(!run.cancelled);
    assert!(!run.shutdown_timed_out);

    let result = aggregate(&collector.snapshot());
    assert!(result.total_requests > 0);
    assert_eq!(result.error_count, 0);
    assert_eq!(result.status_counts.get(&200), Some(&result.total_requests));
    mock.assert_async().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_budget_against_server() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/")
        .with_status(200)
        .create_async()
        .await;

    let scenario = scenario(
        format!("{}/", server.url()),
        HttpMethod::Get,
        vec![
            Stage::new(Duration::from_millis(500), 1),
            Stage::new(Duration::from_secs(30), 1),
        ],
    );
    let collector = Arc::new(MetricsCollector::new());
    let transport = Arc::new(ReqwestTransport::new("http-test").unwrap());
    let coordinator =
        LoadCoordinator::new(transport, Arc::clone(&collector)).with_max_requests(20);

    let run = coordinator.run(&scenario, CancellationToken::new()).await;

    assert!(run.budget_exhausted);
    assert!(run.elapsed < Duration::from_secs(30));
    assert!(collector.len() <= 20);
}
