//! HTTP-Oberflaeche: `/ws`, JSON-API und statische Dateien

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tsrelay_core::Journal;
use tsrelay_hub::{ws_router, EndpointState};

use crate::clientzeit::ClientZeitQuelle;
use crate::motd::Motd;

/// Zustand der JSON-Endpunkte
#[derive(Clone)]
pub struct WebState {
    pub clientzeit: Arc<ClientZeitQuelle>,
    /// `None` wenn die MOTD deaktiviert ist
    pub motd: Option<Arc<Motd>>,
}

#[derive(Debug, Serialize)]
struct MotdAntwort<'a> {
    motd: &'a str,
}

/// Baut den vollstaendigen Router
///
/// Unbekannte Pfade gehen an das statische Verzeichnis, dessen `404.html`
/// fuer fehlende Dateien ausgeliefert wird. Jede Anfrage landet mit der
/// Absenderadresse im Verbindungs-Log.
pub fn router(
    endpoint: EndpointState,
    web: WebState,
    static_verzeichnis: &Path,
    verbindungs_log: Arc<Journal>,
) -> Router {
    let statisch = ServeDir::new(static_verzeichnis)
        .not_found_service(ServeFile::new(static_verzeichnis.join("404.html")));

    Router::new()
        .route("/api/clientzeiten", get(clientzeiten_handler))
        .route("/api/motd", get(motd_handler))
        .with_state(web)
        .merge(ws_router(endpoint))
        .fallback_service(statisch)
        .layer(middleware::from_fn_with_state(
            verbindungs_log,
            anfrage_protokollieren,
        ))
        .layer(TraceLayer::new_for_http())
}

async fn anfrage_protokollieren(
    State(journal): State<Arc<Journal>>,
    request: Request,
    next: Next,
) -> Response {
    let adresse = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unbekannt".into());

    if let Err(e) = journal.anfrage_protokollieren(&adresse).await {
        tracing::warn!(fehler = %e, pfad = %journal.pfad().display(), "Verbindungs-Log nicht beschreibbar");
    }

    next.run(request).await
}

async fn clientzeiten_handler(State(web): State<WebState>) -> Response {
    match web.clientzeit.abfragen().await {
        Ok(eintraege) => Json(eintraege).into_response(),
        Err(e) => {
            tracing::warn!(fehler = %e, "Clientzeiten nicht abrufbar");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn motd_handler(State(web): State<WebState>) -> Response {
    match &web.motd {
        Some(motd) => Json(MotdAntwort {
            motd: motd.zufaellig(),
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
