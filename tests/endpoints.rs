//! Drives the full router (instrumentation included) in-process.

use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use demo_app::{create_router, HttpMetrics};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_app() -> Router {
    create_router(HttpMetrics::new().unwrap())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_str(&body).unwrap())
}

/// Value of the first sample of `name` whose labels contain all of `labels`.
fn sample(metrics: &str, name: &str, labels: &[&str]) -> Option<f64> {
    metrics
        .lines()
        .filter(|line| line.starts_with(&format!("{name}{{")))
        .find(|line| labels.iter().all(|label| line.contains(label)))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}

#[tokio::test]
async fn root_returns_greeting() {
    let app = test_app();
    let (status, body) = get_json(&app, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Hello SdNOG 🚀!" }));
}

#[tokio::test]
async fn random_number_is_between_1_and_100() {
    let app = test_app();
    for _ in 0..100 {
        let (status, body) = get_json(&app, "/random").await;

        assert_eq!(status, StatusCode::OK);
        let number = body["random_number"].as_i64().unwrap();
        assert!((1..=100).contains(&number));
    }
}

#[tokio::test]
async fn slow_takes_at_least_a_second() {
    let app = test_app();
    let start = Instant::now();
    let (status, body) = get_json(&app, "/slow").await;

    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "This endpoint was slow" }));
}

#[tokio::test]
async fn slow_requests_do_not_block_each_other() {
    let app = test_app();
    let start = Instant::now();

    let (first, second, root) = tokio::join!(
        get_json(&app, "/slow"),
        get_json(&app, "/slow"),
        get_json(&app, "/"),
    );

    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);
    assert_eq!(root.0, StatusCode::OK);
    assert!(start.elapsed() < Duration::from_millis(1900));
}

#[tokio::test]
async fn error_returns_500_with_body() {
    let app = test_app();
    let (status, body) = get_json(&app, "/error").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Simulated error" }));
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = test_app();
    let (status, _) = get(&app, "/does-not-exist").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_count_requests_per_route() {
    let app = test_app();
    get(&app, "/").await;
    get(&app, "/error").await;
    get(&app, "/error").await;

    let (status, metrics) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(!metrics.is_empty());

    let root = sample(
        &metrics,
        "http_requests_total",
        &[r#"handler="/""#, r#"method="GET""#, r#"status="2xx""#],
    );
    assert!(root.is_some_and(|count| count >= 1.0));

    let errors = sample(
        &metrics,
        "http_requests_total",
        &[r#"handler="/error""#, r#"status="5xx""#],
    );
    assert_eq!(errors, Some(2.0));
    assert!(!metrics.contains(r#"status="500""#));
}

#[tokio::test]
async fn metrics_counters_never_decrease() {
    let app = test_app();
    let labels = [r#"handler="/random""#, r#"status="2xx""#];

    get(&app, "/random").await;
    let (_, before) = get(&app, "/metrics").await;
    get(&app, "/random").await;
    let (_, after) = get(&app, "/metrics").await;

    let before = sample(&before, "http_requests_total", &labels).unwrap();
    let after = sample(&after, "http_requests_total", &labels).unwrap();
    assert_eq!(before, 1.0);
    assert_eq!(after, 2.0);
}

#[tokio::test]
async fn scrapes_are_not_counted() {
    let app = test_app();
    get(&app, "/metrics").await;
    let (_, metrics) = get(&app, "/metrics").await;

    assert!(sample(&metrics, "http_requests_total", &[r#"handler="/metrics""#]).is_none());
}

#[tokio::test]
async fn unmatched_requests_are_labelled_none() {
    let app = test_app();
    let (status, _) = get(&app, "/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, metrics) = get(&app, "/metrics").await;
    assert!(!metrics.contains(r#"handler="/does-not-exist""#));
    assert!(!metrics.contains(r#"handler="unmatched""#));
}

#[tokio::test]
async fn request_and_response_sizes_are_recorded() {
    let app = test_app();
    let (_, body) = get(&app, "/error").await;

    let (_, metrics) = get(&app, "/metrics").await;
    assert_eq!(
        sample(&metrics, "http_request_size_bytes_sum", &[r#"handler="/error""#]),
        Some(0.0)
    );
    assert_eq!(
        sample(&metrics, "http_response_size_bytes_sum", &[r#"handler="/error""#]),
        Some(body.len() as f64)
    );
    assert_eq!(
        sample(&metrics, "http_response_size_bytes_count", &[r#"handler="/error""#]),
        Some(1.0)
    );
    assert!(metrics
        .lines()
        .any(|line| line.starts_with("http_request_duration_highr_seconds_count ")
            && line.ends_with(" 1")));
}
