//! Ereignisstrom fuer Server-Chat-Nachrichten
//!
//! Eigene ServerQuery-Verbindung, die sich fuer `event=textserver`
//! registriert und jede Chat-Nachricht an den Hub weitergibt.
//!
//! ## Ablauf eines Verbindungsversuchs
//!
//! ```text
//! Disconnected -> Handshaking -> Registered -> Streaming
//!                     |               |            |
//!                     +---------------+------------+--> Failed --(Pause)--> Handshaking
//! ```
//!
//! Fehler der Stufe [`FehlerStufe::Versuch`] fuehren nach der
//! Wiederverbindungspause zu einem neuen Versuch. Fehler der Stufe
//! [`FehlerStufe::Prozess`] beenden [`EventStreamClient::laufen`] mit dem
//! Fehler.
//!
//! [`FehlerStufe::Versuch`]: crate::FehlerStufe::Versuch
//! [`FehlerStufe::Prozess`]: crate::FehlerStufe::Prozess

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tsrelay_core::Journal;
use tsrelay_observability::RelayMetrics;
use tsrelay_protocol::textnachricht_extrahieren;

use crate::client::{Zugangsdaten, VERBINDUNGS_TIMEOUT};
use crate::connection::QueryConnection;
use crate::error::{QueryError, QueryResult};

/// Registrierung fuer Server-Chat-Ereignisse
pub const NOTIFY_REGISTRIERUNG: &str = "servernotifyregister event=textserver";

/// Zustand der Ereignisstrom-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Handshaking,
    Registered,
    Streaming,
    Failed,
}

impl ConnectionState {
    pub fn ist_verbunden(&self) -> bool {
        matches!(self, Self::Registered | Self::Streaming)
    }
}

#[derive(Debug, Clone)]
pub struct EreignisstromKonfig {
    pub zugangsdaten: Zugangsdaten,
    /// Ohne eingehende Zeile fuer diese Dauer wird ein `\n` gesendet
    pub keepalive: Duration,
    /// Pause nach einem fehlgeschlagenen Versuch
    pub wiederverbindung: Duration,
    pub verbindungs_timeout: Duration,
}

impl EreignisstromKonfig {
    pub fn neu(zugangsdaten: Zugangsdaten) -> Self {
        Self {
            zugangsdaten,
            keepalive: Duration::from_secs(1),
            wiederverbindung: Duration::from_secs(1),
            verbindungs_timeout: VERBINDUNGS_TIMEOUT,
        }
    }
}

pub struct EventStreamClient {
    konfig: EreignisstromKonfig,
    ziel: mpsc::Sender<String>,
    journal: Option<Arc<Journal>>,
    metriken: Option<RelayMetrics>,
    zustand_tx: watch::Sender<ConnectionState>,
}

impl EventStreamClient {
    pub fn neu(konfig: EreignisstromKonfig, ziel: mpsc::Sender<String>) -> Self {
        let (zustand_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            konfig,
            ziel,
            journal: None,
            metriken: None,
            zustand_tx,
        }
    }

    /// Jede empfangene Nachricht wird zusaetzlich ins Chat-Log geschrieben
    pub fn mit_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn mit_metriken(mut self, metriken: RelayMetrics) -> Self {
        self.metriken = Some(metriken);
        self
    }

    pub fn zustand_abonnieren(&self) -> watch::Receiver<ConnectionState> {
        self.zustand_tx.subscribe()
    }

    fn zustand_setzen(&self, zustand: ConnectionState) {
        self.zustand_tx.send_replace(zustand);
    }

    /// Verbindet und verbindet neu bis zum Shutdown-Signal
    ///
    /// Gibt nur bei einem prozessfatalen Fehler `Err` zurueck. Ein
    /// geschlossener Hub-Eingang beendet die Schleife mit `Ok`.
    pub async fn laufen(self, mut shutdown_rx: watch::Receiver<bool>) -> QueryResult<()> {
        let ziel = self.konfig.zugangsdaten.ziel();
        tracing::info!(ziel = %ziel, "Ereignisstrom gestartet");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let ergebnis = tokio::select! {
                r = self.versuch() => r,
                _ = shutdown_rx.changed() => {
                    tracing::debug!("Ereignisstrom: Shutdown-Signal empfangen");
                    break;
                }
            };

            match ergebnis {
                Ok(()) => {
                    tracing::info!("Servernachrichten-Eingang des Hubs geschlossen, Ereignisstrom beendet");
                    break;
                }
                Err(e) if e.ist_prozessfatal() => {
                    self.zustand_setzen(ConnectionState::Failed);
                    tracing::error!(ziel = %ziel, fehler = %e, "Gegenstelle ist kein ServerQuery-Server");
                    return Err(e);
                }
                Err(e) => {
                    self.zustand_setzen(ConnectionState::Failed);
                    tracing::warn!(
                        ziel = %ziel,
                        fehler = %e,
                        pause_ms = self.konfig.wiederverbindung.as_millis() as u64,
                        "Ereignisstrom unterbrochen, verbinde neu"
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.konfig.wiederverbindung) => {}
                _ = shutdown_rx.changed() => break,
            }
        }

        self.zustand_setzen(ConnectionState::Disconnected);
        Ok(())
    }

    /// Ein Verbindungsversuch ueber TCP
    async fn versuch(&self) -> QueryResult<()> {
        self.zustand_setzen(ConnectionState::Handshaking);
        if let Some(m) = &self.metriken {
            m.event_stream_connects_total.inc();
        }

        let ziel = self.konfig.zugangsdaten.ziel();
        let stream = tokio::time::timeout(self.konfig.verbindungs_timeout, TcpStream::connect(&ziel))
            .await
            .map_err(|_| QueryError::Zeitlimit(format!("Verbindung zu {ziel}")))??;

        self.sitzung(stream).await
    }

    /// Handshake und Streaming ueber einen bestehenden Stream
    ///
    /// `Ok(())` nur wenn der Hub keine Nachrichten mehr annimmt.
    pub async fn sitzung<S>(&self, stream: S) -> QueryResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.zustand_setzen(ConnectionState::Handshaking);
        let mut verbindung = QueryConnection::neu(stream);
        verbindung.begruessung_lesen().await?;

        let zd = &self.konfig.zugangsdaten;
        for befehl in [zd.login_befehl(), zd.use_befehl(), NOTIFY_REGISTRIERUNG.to_string()] {
            let name = befehl.split(' ').next().unwrap_or_default().to_string();
            match verbindung.quittiert_senden(&befehl).await? {
                Some(status) if !status.ist_ok() => {
                    tracing::warn!(
                        befehl = %name,
                        id = status.id,
                        nachricht = %status.nachricht,
                        "Ereignisstrom: Befehl vom Server abgelehnt"
                    );
                }
                _ => {}
            }
        }

        self.zustand_setzen(ConnectionState::Registered);
        tracing::info!("Ereignisstrom registriert");

        self.streamen(&mut verbindung).await
    }

    async fn streamen<S>(&self, verbindung: &mut QueryConnection<S>) -> QueryResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.zustand_setzen(ConnectionState::Streaming);

        loop {
            let zeile = match tokio::time::timeout(self.konfig.keepalive, verbindung.zeile_lesen()).await {
                Err(_) => {
                    verbindung.zeile_schreiben("").await?;
                    continue;
                }
                Ok(Ok(Some(zeile))) => zeile,
                Ok(Ok(None)) => return Err(QueryError::VerbindungGeschlossen),
                Ok(Err(e)) => return Err(e),
            };

            let Some(nachricht) = textnachricht_extrahieren(&zeile) else {
                tracing::trace!(zeile = %zeile, "Ereigniszeile ignoriert");
                continue;
            };

            if !self.weitergeben(nachricht).await {
                return Ok(());
            }
        }
    }

    /// `false` wenn der Hub-Eingang geschlossen ist
    async fn weitergeben(&self, nachricht: String) -> bool {
        tracing::debug!(nachricht = %nachricht, "Servernachricht empfangen");
        if let Some(m) = &self.metriken {
            m.server_messages_total.inc();
        }

        if let Some(journal) = &self.journal {
            if let Err(e) = journal.nachricht_protokollieren(&nachricht).await {
                tracing::warn!(pfad = %journal.pfad().display(), fehler = %e, "Chat-Log nicht beschreibbar");
            }
        }

        self.ziel.send(nachricht).await.is_ok()
    }
}
