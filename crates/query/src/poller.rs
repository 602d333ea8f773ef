//! Periodische Abfrage der Channel-Belegung
//!
//! Baut in festem Takt den Roster und gibt ihn an den Hub weiter. Ein
//! Fehler bei einer Abfrage wird geloggt und uebersprungen; die naechste
//! Abfrage laeuft regulaer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tsrelay_core::ChannelClientPair;
use tsrelay_observability::{HealthState, RelayMetrics};

use crate::client::ServerQuery;
use crate::roster::roster_bauen;

/// Standard-Abfrageintervall
pub const DEFAULT_INTERVALL: Duration = Duration::from_secs(5);

pub struct RosterPoller {
    query: Arc<dyn ServerQuery>,
    ziel: mpsc::Sender<Vec<ChannelClientPair>>,
    intervall: Duration,
    ausgeblendet: Vec<u64>,
    metriken: Option<RelayMetrics>,
    health: Option<HealthState>,
}

impl RosterPoller {
    pub fn neu(query: Arc<dyn ServerQuery>, ziel: mpsc::Sender<Vec<ChannelClientPair>>) -> Self {
        Self {
            query,
            ziel,
            intervall: DEFAULT_INTERVALL,
            ausgeblendet: Vec::new(),
            metriken: None,
            health: None,
        }
    }

    pub fn mit_intervall(mut self, intervall: Duration) -> Self {
        self.intervall = intervall;
        self
    }

    /// Channel-IDs die nie im Roster erscheinen
    pub fn mit_ausgeblendet(mut self, ausgeblendet: Vec<u64>) -> Self {
        self.ausgeblendet = ausgeblendet;
        self
    }

    pub fn mit_metriken(mut self, metriken: RelayMetrics) -> Self {
        self.metriken = Some(metriken);
        self
    }

    /// Das Ergebnis jeder Abfrage setzt den Query-Status des Health-Checks
    pub fn mit_health(mut self, health: HealthState) -> Self {
        self.health = Some(health);
        self
    }

    /// Fragt bis zum Shutdown-Signal oder bis der Hub weg ist ab
    pub async fn laufen(self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(
            intervall_ms = self.intervall.as_millis() as u64,
            ausgeblendet = ?self.ausgeblendet,
            "Roster-Poller gestartet"
        );

        loop {
            if !self.einmal_abfragen().await {
                tracing::info!("Roster-Eingang des Hubs geschlossen, Poller beendet");
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.intervall) => {}
                _ = shutdown_rx.changed() => {
                    tracing::debug!("Roster-Poller: Shutdown-Signal empfangen");
                    return;
                }
            }
        }
    }

    /// Eine Abfrage; `false` wenn der Hub keine Snapshots mehr annimmt
    pub async fn einmal_abfragen(&self) -> bool {
        match roster_bauen(self.query.as_ref(), &self.ausgeblendet).await {
            Ok(roster) => {
                self.ergebnis_melden("ok", true);
                tracing::trace!(channels = roster.len(), "Roster abgefragt");
                self.ziel.send(roster).await.is_ok()
            }
            Err(e) => {
                self.ergebnis_melden("fehler", false);
                tracing::warn!(fehler = %e, "Roster-Abfrage fehlgeschlagen");
                !self.ziel.is_closed()
            }
        }
    }

    fn ergebnis_melden(&self, ergebnis: &str, verbunden: bool) {
        if let Some(m) = &self.metriken {
            m.roster_polls_total.with_label_values(&[ergebnis]).inc();
        }
        if let Some(h) = &self.health {
            h.query_status_setzen(verbunden);
        }
    }
}
