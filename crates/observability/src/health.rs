//! `GET /health`
//!
//! Gesamtstatus aus den beiden ServerQuery-Verbindungen: beide oben ist
//! `healthy`, eine unten `degraded`, beide unten `unhealthy` (503).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    fn http_status(self) -> StatusCode {
        match self {
            Self::Healthy | Self::Degraded => StatusCode::OK,
            Self::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub query_connected: bool,
    pub event_stream_connected: bool,
}

struct Verbindungen {
    query: AtomicBool,
    ereignisstrom: AtomicBool,
}

/// Von Poller und Ereignisstrom-Beobachter geteilter Zustand
///
/// Deaktivierte Funktionen lassen ihr Flag auf `true`.
#[derive(Clone)]
pub struct HealthState {
    gestartet: Instant,
    verbindungen: Arc<Verbindungen>,
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            gestartet: Instant::now(),
            verbindungen: Arc::new(Verbindungen {
                query: AtomicBool::new(true),
                ereignisstrom: AtomicBool::new(true),
            }),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.gestartet.elapsed().as_secs()
    }

    pub fn query_verbunden(&self) -> bool {
        self.verbindungen.query.load(Ordering::Relaxed)
    }

    pub fn query_status_setzen(&self, verbunden: bool) {
        self.verbindungen.query.store(verbunden, Ordering::Relaxed);
    }

    pub fn ereignisstrom_verbunden(&self) -> bool {
        self.verbindungen.ereignisstrom.load(Ordering::Relaxed)
    }

    pub fn ereignisstrom_status_setzen(&self, verbunden: bool) {
        self.verbindungen
            .ereignisstrom
            .store(verbunden, Ordering::Relaxed);
    }

    pub fn status(&self) -> HealthStatus {
        match (self.query_verbunden(), self.ereignisstrom_verbunden()) {
            (true, true) => HealthStatus::Healthy,
            (false, false) => HealthStatus::Unhealthy,
            _ => HealthStatus::Degraded,
        }
    }

    pub fn antwort(&self) -> HealthResponse {
        HealthResponse {
            status: self.status(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            query_connected: self.query_verbunden(),
            event_stream_connected: self.ereignisstrom_verbunden(),
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let antwort = state.antwort();
    (antwort.status.http_status(), Json(antwort))
}
