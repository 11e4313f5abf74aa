//! HTTP handlers of the demo API and the metrics scrape endpoint.

use std::time::Duration;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use rand::Rng;
use serde::Serialize;

use crate::http_metrics::HttpMetrics;

pub const GREETING: &str = "Hello SdNOG 🚀!";
pub const SLOW_MESSAGE: &str = "This endpoint was slow";
pub const SIMULATED_ERROR: &str = "Simulated error";

/// How long `/slow` takes to answer.
pub const SLOW_DELAY: Duration = Duration::from_secs(1);

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RandomResponse {
    pub random_number: u8,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}

/// The instrumented demo endpoints.
pub fn api_routes() -> Router {
    Router::new()
        .route("/", get(root))
        .route("/random", get(random))
        .route("/slow", get(slow))
        .route("/error", get(error))
}

/// Prometheus scrape endpoint for the given registry.
pub fn metrics_routes(metrics: HttpMetrics) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

async fn root() -> Json<MessageResponse> {
    tracing::info!("Root endpoint accessed");
    Json(MessageResponse { message: GREETING })
}

async fn random() -> Json<RandomResponse> {
    let value = rand::thread_rng().gen_range(1..=100);
    tracing::info!("Generated random number: {value}");
    Json(RandomResponse {
        random_number: value,
    })
}

async fn slow() -> Json<MessageResponse> {
    tracing::info!("Simulating slow endpoint");
    tokio::time::sleep(SLOW_DELAY).await;
    tracing::info!("Slow endpoint completed");
    Json(MessageResponse {
        message: SLOW_MESSAGE,
    })
}

async fn error() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: SIMULATED_ERROR,
        }),
    )
}

async fn render_metrics(State(metrics): State<HttpMetrics>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        metrics.render(),
    )
}
