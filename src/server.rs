use std::time::Duration;

use anyhow::Result;
use axum::{middleware, Router};
use tokio::net::TcpListener;

use crate::{
    config::Config,
    http_metrics::HttpMetrics,
    middleware::{track_requests, TraceLayer},
    routes,
};

const METRICS_UPKEEP_PERIOD: Duration = Duration::from_secs(5);

/// Builds the application router.
///
/// Every API route is traced and counted. `/metrics` is merged outside the
/// instrumentation so scrapes do not show up in traces or in the counters
/// they report.
pub fn create_router(metrics: HttpMetrics) -> Router {
    routes::api_routes()
        .layer(middleware::from_fn_with_state(
            metrics.clone(),
            track_requests,
        ))
        .layer(TraceLayer)
        .merge(routes::metrics_routes(metrics))
}

/// Serves the application until Ctrl+C or SIGTERM.
pub async fn run_server(config: &Config, metrics: HttpMetrics) -> Result<()> {
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening for connections");

    let upkeep = metrics.spawn_upkeep(METRICS_UPKEEP_PERIOD);
    let served = axum::serve(listener, create_router(metrics))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    upkeep.abort();

    served?;
    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
