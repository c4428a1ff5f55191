mod utils;
use utils::*;

use mock_service::{MockConfig, Status};
use std::time::Duration;
use surge::prelude::*;
use surge::RunError;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn healthy_target_passes_every_check() {
    init();
    let mock = mock_service::spawn(MockConfig {
        latency: Duration::from_millis(20),
        ..Default::default()
    })
    .await
    .unwrap();

    let config = config(&mock.url("/search"))
        .stage(Duration::from_secs(1), 5)
        .stage(Duration::from_secs(1), 5)
        .stage(Duration::from_secs(1), 0);
    let report = RunController::new(config).unwrap().run().await.unwrap();

    println!("{report}");
    let m = &report.metrics;
    assert!(report.peak_vus <= 5);
    assert!(m.requests > 10, "requests: {}", m.requests);
    assert_eq!(m.network_errors, 0);
    assert_eq!(m.interrupted, 0);
    // Every virtual user request plus the preflight probe.
    assert_eq!(mock.hits(), m.requests + 1);

    assert_eq!(report.check("is status 200").unwrap().pass_rate, Some(1.));
    assert_eq!(report.check("is fast").unwrap().pass_rate, Some(1.));

    let l = &m.latency;
    assert_eq!(l.count, m.requests);
    assert!(l.p50_ms >= 20.);
    assert!(l.p50_ms <= l.p90_ms && l.p90_ms <= l.p95_ms && l.p95_ms <= l.p99_ms);
    assert!(l.p99_ms < 200.);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn server_errors_fail_only_the_status_check() {
    init();
    let mock = mock_service::spawn(MockConfig {
        status: Status::INTERNAL_SERVER_ERROR,
        latency: Duration::from_millis(5),
        ..Default::default()
    })
    .await
    .unwrap();

    let config = config(&mock.url("/search"))
        .stage(Duration::ZERO, 3)
        .stage(Duration::from_secs(1), 3);
    let report = RunController::new(config).unwrap().run().await.unwrap();

    assert!(report.metrics.requests > 0);
    assert_eq!(report.metrics.network_errors, 0);
    assert_eq!(report.check("is status 200").unwrap().pass_rate, Some(0.));
    assert_eq!(report.check("is fast").unwrap().pass_rate, Some(1.));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn slow_target_fails_only_the_latency_check() {
    init();
    let mock = mock_service::spawn(MockConfig {
        latency: Duration::from_millis(250),
        ..Default::default()
    })
    .await
    .unwrap();

    let config = config(&mock.url("/search"))
        .stage(Duration::ZERO, 2)
        .stage(Duration::from_secs(1), 2);
    let report = RunController::new(config).unwrap().run().await.unwrap();

    assert!(report.metrics.requests > 0);
    assert_eq!(report.check("is status 200").unwrap().pass_rate, Some(1.));
    assert_eq!(report.check("is fast").unwrap().pass_rate, Some(0.));
    assert!(report.metrics.latency.p50_ms >= 250.);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn unreachable_target_is_fatal() {
    init();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let config =
        config(&format!("http://127.0.0.1:{port}/search")).stage(Duration::from_secs(10), 50);
    let controller = RunController::new(config).unwrap();
    let metrics = controller.metrics();

    let err = controller.run().await.unwrap_err();
    assert!(matches!(err, RunError::Unreachable { .. }), "{err}");
    assert_eq!(metrics.snapshot().requests, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn zero_duration_stage_starts_all_users_at_once() {
    init();
    let mock = mock_service::spawn(MockConfig {
        latency: Duration::from_millis(300),
        ..Default::default()
    })
    .await
    .unwrap();

    let config = config(&mock.url("/search"))
        .stage(Duration::ZERO, 8)
        .stage(Duration::from_millis(200), 8);
    let report = RunController::new(config).unwrap().run().await.unwrap();

    assert_eq!(report.peak_vus, 8);
    // No ramp: all eight got their first request out before the stage ended.
    assert_eq!(report.metrics.requests, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn abort_ends_the_run_gracefully() {
    init();
    let mock = mock_service::spawn(MockConfig {
        latency: Duration::from_millis(10),
        ..Default::default()
    })
    .await
    .unwrap();

    let config = config(&mock.url("/search"))
        .stage(Duration::ZERO, 4)
        .stage(Duration::from_secs(600), 4);
    let controller = RunController::new(config).unwrap();
    let abort = controller.abort_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        abort.abort();
    });

    let report = controller.run().await.unwrap();
    assert!(report.aborted);
    assert!(report.elapsed < Duration::from_secs(5));
    assert_eq!(report.metrics.interrupted, 0);
    assert_eq!(mock.hits(), report.metrics.requests + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(30_000)]
async fn runs_from_a_json_description() {
    init();
    let mock = mock_service::spawn(MockConfig {
        latency: Duration::from_millis(5),
        ..Default::default()
    })
    .await
    .unwrap();

    let spec: RunSpec = serde_json::from_value(serde_json::json!({
        "name": "search",
        "targetURL": mock.url("/search"),
        "query": { "q": "tech" },
        "stages": [
            { "durationSeconds": 0.5, "target": 2 },
            { "durationSeconds": 0.5, "target": 0 }
        ],
        "sleepSeconds": 0.1,
        "tickMillis": 50,
        "checks": [
            { "name": "is status 200", "status": 200 },
            { "name": "echoes query", "bodyContains": "\"query\":\"tech\"" }
        ]
    }))
    .unwrap();

    let config = RunConfig::try_from(spec).unwrap();
    let report = RunController::new(config).unwrap().run().await.unwrap();

    assert_eq!(report.name, "search");
    assert!(report.metrics.requests > 0);
    assert_eq!(report.check("echoes query").unwrap().pass_rate, Some(1.));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["checks"][1]["name"], "echoes query");
    assert_eq!(json["networkErrors"], 0);
}
