//! Prometheus-kompatible Metriken fuer tsrelay
//!
//! Registrierte Metriken:
//! - `tsrelay_subscribers_active` – Gauge: Aktuell registrierte Subscriber
//! - `tsrelay_envelopes_delivered_total` – Counter: Zugestellte Envelopes (header)
//! - `tsrelay_delivery_failures_total` – Counter: Fehlgeschlagene Zustellungen
//! - `tsrelay_broadcast_duration_seconds` – Histogram: Dauer einer Verteilung
//! - `tsrelay_chat_forwarded_total` – Counter: An den Server weitergeleitete Chat-Nachrichten
//! - `tsrelay_server_messages_total` – Counter: Empfangene Server-Chat-Nachrichten
//! - `tsrelay_event_stream_connects_total` – Counter: Verbindungsversuche des Ereignisstroms
//! - `tsrelay_roster_polls_total` – Counter: Abfragen der Client-Liste (result)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle tsrelay-Prometheus-Metriken
#[derive(Clone)]
pub struct RelayMetrics {
    pub registry: Arc<Registry>,

    // Hub
    pub subscribers_active: IntGauge,
    pub envelopes_delivered_total: IntCounterVec,
    pub delivery_failures_total: IntCounter,
    pub broadcast_duration_seconds: Histogram,

    // ServerQuery
    pub chat_forwarded_total: IntCounter,
    pub server_messages_total: IntCounter,
    pub event_stream_connects_total: IntCounter,
    pub roster_polls_total: IntCounterVec,
}

impl RelayMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Hub ---
        let subscribers_active = IntGauge::with_opts(Opts::new(
            "tsrelay_subscribers_active",
            "Anzahl aktuell registrierter Subscriber",
        ))?;
        registry.register(Box::new(subscribers_active.clone()))?;

        let envelopes_delivered_total = IntCounterVec::new(
            Opts::new(
                "tsrelay_envelopes_delivered_total",
                "Gesamtanzahl zugestellter Envelopes",
            ),
            &["header"],
        )?;
        registry.register(Box::new(envelopes_delivered_total.clone()))?;

        let delivery_failures_total = IntCounter::with_opts(Opts::new(
            "tsrelay_delivery_failures_total",
            "Fehlgeschlagene Zustellungen (Subscriber wurde entfernt)",
        ))?;
        registry.register(Box::new(delivery_failures_total.clone()))?;

        let broadcast_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "tsrelay_broadcast_duration_seconds",
                "Dauer einer Verteilung an alle Subscriber in Sekunden",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(broadcast_duration_seconds.clone()))?;

        // --- ServerQuery ---
        let chat_forwarded_total = IntCounter::with_opts(Opts::new(
            "tsrelay_chat_forwarded_total",
            "An den Server weitergeleitete Chat-Nachrichten",
        ))?;
        registry.register(Box::new(chat_forwarded_total.clone()))?;

        let server_messages_total = IntCounter::with_opts(Opts::new(
            "tsrelay_server_messages_total",
            "Aus dem Ereignisstrom empfangene Chat-Nachrichten",
        ))?;
        registry.register(Box::new(server_messages_total.clone()))?;

        let event_stream_connects_total = IntCounter::with_opts(Opts::new(
            "tsrelay_event_stream_connects_total",
            "Verbindungsversuche des Ereignisstroms",
        ))?;
        registry.register(Box::new(event_stream_connects_total.clone()))?;

        let roster_polls_total = IntCounterVec::new(
            Opts::new(
                "tsrelay_roster_polls_total",
                "Abfragen der Client-Liste nach Ergebnis",
            ),
            &["result"],
        )?;
        registry.register(Box::new(roster_polls_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            subscribers_active,
            envelopes_delivered_total,
            delivery_failures_total,
            broadcast_duration_seconds,
            chat_forwarded_total,
            server_messages_total,
            event_stream_connects_total,
            roster_polls_total,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RelayMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<RelayMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
