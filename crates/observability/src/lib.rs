//! # tsrelay-observability
//!
//! Prometheus-Metriken, Health-Check und Logging-Setup fuer tsrelay. Beide
//! HTTP-Endpunkte laufen auf einem eigenen Port, getrennt vom `/ws`-Server.

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, RelayMetrics};

use std::net::SocketAddr;

use axum::Router;
use tokio::sync::watch;

/// `/metrics` und `/health` in einem Router
pub fn observability_router(metriken: RelayMetrics, health: HealthState) -> Router {
    metrics_router(metriken).merge(health_router(health))
}

/// Bedient den Observability-Router bis das Shutdown-Signal kommt
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    metriken: RelayMetrics,
    health: HealthState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Observability-Server gestartet");

    axum::serve(listener, observability_router(metriken, health))
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn beide_endpunkte_erreichbar() {
        let app = observability_router(RelayMetrics::neu().unwrap(), HealthState::neu());

        for pfad in ["/metrics", "/health"] {
            let antwort = app
                .clone()
                .oneshot(Request::get(pfad).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(antwort.status(), StatusCode::OK, "{pfad}");
        }
    }
}
