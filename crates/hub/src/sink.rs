//! Schreibseite eines Subscribers

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;

use crate::error::{HubError, HubResult};

/// Ziel fuer serialisierte Envelopes
///
/// Gehoert nach der Registrierung dem Hub; nur die Dispatch-Schleife ruft
/// `senden` und `schliessen` auf.
#[async_trait]
pub trait SubscriberSink: Send {
    async fn senden(&mut self, text: String) -> HubResult<()>;

    /// Schliesst die Verbindung; Fehler werden ignoriert
    async fn schliessen(&mut self);
}

/// Sendehaelfte eines WebSockets
pub struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

impl WsSink {
    pub fn neu(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl SubscriberSink for WsSink {
    async fn senden(&mut self, text: String) -> HubResult<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| HubError::Senden(e.to_string()))
    }

    async fn schliessen(&mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::trace!(fehler = %e, "WebSocket bereits geschlossen");
        }
    }
}
