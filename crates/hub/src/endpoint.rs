//! WebSocket-Endpunkt `/ws`
//!
//! Jede Verbindung wird als Subscriber beim Hub registriert. Die Lesehaelfte
//! bleibt beim Endpunkt: eingehende `chatmessage`-Pakete gehen an den
//! Sprachserver (`gm`) und optional als Echo an alle Subscriber.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::StreamExt;
use tsrelay_core::{ClientChatMessage, ClientPackage, EingehendesPaket, SubscriberId};
use tsrelay_observability::RelayMetrics;
use tsrelay_query::ServerQuery;

use crate::hub::HubHandle;
use crate::sink::WsSink;

/// Geteilter Zustand aller WebSocket-Verbindungen
#[derive(Clone)]
pub struct EndpointState {
    pub hub: HubHandle,
    /// `None` wenn die Weiterleitung an den Sprachserver deaktiviert ist
    pub weiterleitung: Option<Arc<dyn ServerQuery>>,
    /// Lokale Chat-Nachrichten zusaetzlich an alle Subscriber verteilen
    pub chat_echo: bool,
    pub metriken: Option<RelayMetrics>,
}

/// Was mit einem Text-Frame passiert ist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaketErgebnis {
    /// Chat-Nachricht verarbeitet
    Weitergeleitet,
    /// Unbekannter Header
    Ignoriert,
    /// Payload nicht lesbar, Verbindung bleibt offen
    Uebersprungen,
    /// Aeussere Huelle nicht lesbar, Verbindung wird beendet
    Beenden,
}

/// Axum-Router fuer den `/ws`-Endpunkt
pub fn ws_router(state: EndpointState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<EndpointState>,
) -> Response {
    let peer = connect_info.map(|ConnectInfo(addr)| addr);
    ws.on_upgrade(move |socket| verbindung_behandeln(socket, peer, state))
}

async fn verbindung_behandeln(socket: WebSocket, peer: Option<SocketAddr>, state: EndpointState) {
    let id = SubscriberId::new();
    let peer = peer.map(|a| a.to_string()).unwrap_or_else(|| "unbekannt".into());
    let (sink, mut stream) = socket.split();

    if let Err(e) = state.hub.registrieren(id, Box::new(WsSink::neu(sink))).await {
        tracing::warn!(peer = %peer, fehler = %e, "Subscriber konnte nicht registriert werden");
        return;
    }
    tracing::info!(subscriber = %id, peer = %peer, "WebSocket verbunden");

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if paket_verarbeiten(&text, &state).await == PaketErgebnis::Beenden {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            // Binary, Ping, Pong
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(subscriber = %id, fehler = %e, "Lesefehler auf WebSocket");
                break;
            }
        }
    }

    if let Err(e) = state.hub.abmelden(id).await {
        tracing::debug!(subscriber = %id, fehler = %e, "Abmelden nach Hub-Ende");
    }
    tracing::info!(subscriber = %id, peer = %peer, "WebSocket getrennt");
}

/// Verarbeitet einen Text-Frame eines Subscribers
pub async fn paket_verarbeiten(text: &str, state: &EndpointState) -> PaketErgebnis {
    let paket = match ClientPackage::parsen(text) {
        Ok(paket) => paket,
        Err(e) => {
            tracing::warn!(fehler = %e, "Paket nicht lesbar, Verbindung wird beendet");
            return PaketErgebnis::Beenden;
        }
    };

    match paket.entschluesseln() {
        Ok(EingehendesPaket::ChatNachricht(nachricht)) => {
            chat_verarbeiten(nachricht, state).await;
            PaketErgebnis::Weitergeleitet
        }
        Ok(EingehendesPaket::Unbekannt(header)) => {
            tracing::debug!(header = %header, "Unbekannter Header ignoriert");
            PaketErgebnis::Ignoriert
        }
        Err(e) => {
            tracing::warn!(fehler = %e, "Payload nicht lesbar, uebersprungen");
            PaketErgebnis::Uebersprungen
        }
    }
}

async fn chat_verarbeiten(nachricht: ClientChatMessage, state: &EndpointState) {
    if let Some(query) = &state.weiterleitung {
        match query.globale_nachricht_senden(&nachricht.message).await {
            Ok(()) => {
                if let Some(m) = &state.metriken {
                    m.chat_forwarded_total.inc();
                }
            }
            Err(e) => {
                tracing::warn!(fehler = %e, "Chat-Nachricht konnte nicht weitergeleitet werden");
            }
        }
    }

    if state.chat_echo {
        if let Err(e) = state.hub.chat_senden(nachricht).await {
            tracing::debug!(fehler = %e, "Chat-Echo nach Hub-Ende verworfen");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::BroadcastHub;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tsrelay_query::{Channel, OnlineClient, QueryError, QueryResult};

    #[derive(Default)]
    struct AufzeichnendeQuery {
        gesendet: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ServerQuery for AufzeichnendeQuery {
        async fn client_liste(&self) -> QueryResult<Vec<OnlineClient>> {
            Ok(Vec::new())
        }

        async fn channel_liste(&self) -> QueryResult<Vec<Channel>> {
            Ok(Vec::new())
        }

        async fn globale_nachricht_senden(&self, text: &str) -> QueryResult<()> {
            self.gesendet.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    struct KaputteQuery;

    #[async_trait]
    impl ServerQuery for KaputteQuery {
        async fn client_liste(&self) -> QueryResult<Vec<OnlineClient>> {
            Err(QueryError::VerbindungGeschlossen)
        }

        async fn channel_liste(&self) -> QueryResult<Vec<Channel>> {
            Err(QueryError::VerbindungGeschlossen)
        }

        async fn globale_nachricht_senden(&self, _text: &str) -> QueryResult<()> {
            Err(QueryError::VerbindungGeschlossen)
        }
    }

    fn state(query: Option<Arc<dyn ServerQuery>>, chat_echo: bool) -> EndpointState {
        // Hub laeuft in diesen Tests nicht; nur die Handle-Seite wird gebraucht
        let (_hub, handle) = BroadcastHub::neu();
        EndpointState {
            hub: handle,
            weiterleitung: query,
            chat_echo,
            metriken: None,
        }
    }

    #[tokio::test]
    async fn chat_als_json_string() {
        let query = Arc::new(AufzeichnendeQuery::default());
        let state = state(Some(query.clone()), false);

        let text = r#"{"header":"chatmessage","payload":"{\"ip\":\"1.2.3.4\",\"message\":\"hallo welt\",\"time\":\"12:00\"}"}"#;
        assert_eq!(
            paket_verarbeiten(text, &state).await,
            PaketErgebnis::Weitergeleitet
        );
        assert_eq!(*query.gesendet.lock().unwrap(), vec!["hallo welt"]);
    }

    #[tokio::test]
    async fn chat_als_objekt() {
        let query = Arc::new(AufzeichnendeQuery::default());
        let state = state(Some(query.clone()), false);

        let text = r#"{"header":"chatmessage","payload":{"message":"gg"}}"#;
        assert_eq!(
            paket_verarbeiten(text, &state).await,
            PaketErgebnis::Weitergeleitet
        );
        assert_eq!(*query.gesendet.lock().unwrap(), vec!["gg"]);
    }

    #[tokio::test]
    async fn unbekannter_header_wird_ignoriert() {
        let query = Arc::new(AufzeichnendeQuery::default());
        let state = state(Some(query.clone()), false);

        assert_eq!(
            paket_verarbeiten(r#"{"header":"ping","payload":null}"#, &state).await,
            PaketErgebnis::Ignoriert
        );
        assert!(query.gesendet.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn kaputter_payload_wird_uebersprungen() {
        let query = Arc::new(AufzeichnendeQuery::default());
        let state = state(Some(query.clone()), false);

        assert_eq!(
            paket_verarbeiten(r#"{"header":"chatmessage","payload":"{kein json"}"#, &state).await,
            PaketErgebnis::Uebersprungen
        );
        assert!(query.gesendet.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn kaputte_huelle_beendet_verbindung() {
        let state = state(None, false);
        assert_eq!(
            paket_verarbeiten("kein json", &state).await,
            PaketErgebnis::Beenden
        );
    }

    #[tokio::test]
    async fn ohne_weiterleitung_wird_nichts_gesendet() {
        let state = state(None, false);
        let text = r#"{"header":"chatmessage","payload":{"message":"hi"}}"#;
        assert_eq!(
            paket_verarbeiten(text, &state).await,
            PaketErgebnis::Weitergeleitet
        );
    }

    #[tokio::test]
    async fn fehler_beim_weiterleiten_beendet_nichts() {
        let state = state(Some(Arc::new(KaputteQuery)), false);
        let text = r#"{"header":"chatmessage","payload":{"message":"hi"}}"#;
        assert_eq!(
            paket_verarbeiten(text, &state).await,
            PaketErgebnis::Weitergeleitet
        );
    }

    #[tokio::test]
    async fn chat_echo_geht_an_den_hub() {
        let (hub, handle) = BroadcastHub::neu();
        let metriken = RelayMetrics::neu().unwrap();
        let hub = hub.mit_metriken(metriken.clone());
        let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let state = EndpointState {
            hub: handle.clone(),
            weiterleitung: Some(Arc::new(AufzeichnendeQuery::default())),
            chat_echo: true,
            metriken: Some(metriken.clone()),
        };
        tokio::spawn(hub.laufen(shutdown_rx));

        let text = r#"{"header":"chatmessage","payload":{"message":"hi"}}"#;
        paket_verarbeiten(text, &state).await;
        assert_eq!(metriken.chat_forwarded_total.get(), 1);

        // Das Echo wird ohne Subscriber verteilt (0 Zustellungen)
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while metriken.broadcast_duration_seconds.get_sample_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
