//! tsrelay-server – Bibliotheks-Root
//!
//! Verdrahtet Hub, ServerQuery-Verbindungen und HTTP-Oberflaeche und stellt
//! den oeffentlichen Einstiegspunkt fuer Integrationstests bereit.

pub mod clientzeit;
pub mod config;
pub mod motd;
pub mod web;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tsrelay_core::Journal;
use tsrelay_hub::{BroadcastHub, EndpointState};
use tsrelay_observability::{HealthState, RelayMetrics};
use tsrelay_query::{EventStreamClient, QueryClient, QueryResult, RosterPoller, ServerQuery};

use clientzeit::ClientZeitQuelle;
use config::ServerConfig;
use motd::Motd;
use web::WebState;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Metriken, Health, MOTD und Logdateien
    /// 2. Hub starten
    /// 3. Befehlsverbindung aufbauen, Keepalive und Client-Listen-Poller starten
    /// 4. Ereignisstrom starten
    /// 5. Observability- und Web-Server starten
    /// 6. Auf Ctrl-C oder einen fatalen Ereignisstrom-Fehler warten
    pub async fn starten(self) -> Result<()> {
        let config = self.config;
        config.pruefen()?;

        tracing::info!(
            web = %config.web_bind_adresse(),
            query = %config.zugangsdaten().ziel(),
            clientliste = config.clientliste.aktiviert,
            servernachrichten = config.servernachrichten.aktiviert,
            serververbindung = config.serververbindung.aktiviert,
            "Server startet"
        );

        let metriken = RelayMetrics::neu()?;
        let health = HealthState::neu();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let motd = if config.motd.aktiviert {
            Some(Arc::new(Motd::laden(&config.motd.datei).await?))
        } else {
            None
        };
        let verbindungs_log = Arc::new(
            Journal::oeffnen(&config.web.verbindungs_log)
                .await
                .with_context(|| {
                    format!("Verbindungs-Log '{}' nicht oeffenbar", config.web.verbindungs_log)
                })?,
        );

        // Hub
        let (hub, hub_handle) = BroadcastHub::neu();
        let hub = hub
            .mit_sende_timeout(Duration::from_millis(config.web.sende_timeout_ms))
            .mit_metriken(metriken.clone());
        let hub_task = tokio::spawn(hub.laufen(shutdown_rx.clone()));

        // Befehlsverbindung
        let query_client = if config.braucht_query_verbindung() {
            let zugangsdaten = config.zugangsdaten();
            let client = QueryClient::verbinden(&zugangsdaten)
                .await
                .with_context(|| {
                    format!("ServerQuery-Anmeldung an {} fehlgeschlagen", zugangsdaten.ziel())
                })?;
            Some(Arc::new(client))
        } else {
            None
        };

        if let (Some(client), Some(intervall)) = (&query_client, config.query_keepalive()) {
            let client = Arc::clone(client);
            let rx = shutdown_rx.clone();
            tokio::spawn(async move { client.keepalive_laufen(intervall, rx).await });
        }

        if config.clientliste.aktiviert {
            if let Some(client) = &query_client {
                let query: Arc<dyn ServerQuery> = client.clone();
                let poller = RosterPoller::neu(query, hub_handle.roster_sender())
                    .mit_intervall(Duration::from_secs(config.clientliste.intervall_sek))
                    .mit_ausgeblendet(config.clientliste.ausgeblendete_channels.clone())
                    .mit_metriken(metriken.clone())
                    .mit_health(health.clone());
                tokio::spawn(poller.laufen(shutdown_rx.clone()));
            }
        }

        // Ereignisstrom
        let ereignisstrom_task = if config.servernachrichten.aktiviert {
            Some(
                ereignisstrom_starten(
                    &config,
                    hub_handle.servernachricht_sender(),
                    metriken.clone(),
                    health.clone(),
                    shutdown_rx.clone(),
                )
                .await?,
            )
        } else {
            None
        };

        // Observability
        if config.observability.aktiviert {
            let addr: SocketAddr = config
                .observability_bind_adresse()
                .parse()
                .context("Ungueltige Observability-Adresse")?;
            let (m, h, rx) = (metriken.clone(), health.clone(), shutdown_rx.clone());
            tokio::spawn(async move {
                if let Err(e) = tsrelay_observability::observability_server_starten(addr, m, h, rx).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            });
        }

        // Web
        let weiterleitung: Option<Arc<dyn ServerQuery>> = if config.serververbindung.aktiviert {
            query_client.clone().map(|c| c as Arc<dyn ServerQuery>)
        } else {
            None
        };
        let endpoint = EndpointState {
            hub: hub_handle.clone(),
            weiterleitung,
            chat_echo: config.serververbindung.chat_echo,
            metriken: Some(metriken.clone()),
        };
        let web_state = WebState {
            clientzeit: Arc::new(ClientZeitQuelle::neu(config.clientzeit.clone())),
            motd,
        };
        let app = web::router(
            endpoint,
            web_state,
            Path::new(&config.web.static_verzeichnis),
            verbindungs_log,
        );

        let listener = tokio::net::TcpListener::bind(config.web_bind_adresse())
            .await
            .with_context(|| format!("Bind auf {} fehlgeschlagen", config.web_bind_adresse()))?;
        tracing::info!(adresse = %config.web_bind_adresse(), "Web-Server bereit");

        let web_shutdown = shutdown_rx.clone();
        let web_task = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown_abwarten(web_shutdown))
            .await
        });
        drop(hub_handle);

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        let ergebnis = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Ctrl-C-Handler nicht installierbar")?;
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                Ok(())
            }
            fehler = ereignisstrom_ueberwachen(ereignisstrom_task) => fehler,
        };

        let _ = shutdown_tx.send(true);

        match web_task.await {
            Ok(Err(e)) => tracing::warn!(fehler = %e, "Web-Server mit Fehler beendet"),
            Err(e) => tracing::warn!(fehler = %e, "Web-Server-Task abgebrochen"),
            Ok(Ok(())) => {}
        }
        if let Err(e) = hub_task.await {
            tracing::warn!(fehler = %e, "Hub-Task abgebrochen");
        }
        if let Some(client) = query_client {
            if let Err(e) = client.schliessen().await {
                tracing::debug!(fehler = %e, "quit auf der Befehlsverbindung fehlgeschlagen");
            }
        }

        ergebnis
    }
}

/// Startet den Ereignisstrom samt Health-Beobachter
async fn ereignisstrom_starten(
    config: &ServerConfig,
    ziel: tokio::sync::mpsc::Sender<String>,
    metriken: RelayMetrics,
    health: HealthState,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<JoinHandle<QueryResult<()>>> {
    let chat_log = Journal::oeffnen(&config.servernachrichten.chat_log)
        .await
        .with_context(|| {
            format!("Chat-Log '{}' nicht oeffenbar", config.servernachrichten.chat_log)
        })?;

    let strom = EventStreamClient::neu(config.ereignisstrom_konfig(), ziel)
        .mit_journal(Arc::new(chat_log))
        .mit_metriken(metriken);

    let mut zustand = strom.zustand_abonnieren();
    health.ereignisstrom_status_setzen(false);
    tokio::spawn(async move {
        while zustand.changed().await.is_ok() {
            let verbunden = zustand.borrow_and_update().ist_verbunden();
            health.ereignisstrom_status_setzen(verbunden);
        }
    });

    Ok(tokio::spawn(strom.laufen(shutdown_rx)))
}

/// Endet nur bei einem prozessfatalen Fehler des Ereignisstroms
async fn ereignisstrom_ueberwachen(task: Option<JoinHandle<QueryResult<()>>>) -> Result<()> {
    let Some(task) = task else {
        return std::future::pending().await;
    };

    match task.await {
        Ok(Ok(())) => std::future::pending().await,
        Ok(Err(e)) => {
            tracing::error!(fehler = %e, "Ereignisstrom fatal abgebrochen");
            Err(anyhow::Error::new(e).context("Ereignisstrom abgebrochen"))
        }
        Err(e) => Err(anyhow::Error::new(e).context("Ereignisstrom-Task abgebrochen")),
    }
}

async fn shutdown_abwarten(mut shutdown_rx: watch::Receiver<bool>) {
    while shutdown_rx.changed().await.is_ok() {
        if *shutdown_rx.borrow() {
            break;
        }
    }
}
