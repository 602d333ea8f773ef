//! Fan-out-Hub
//!
//! Eine einzelne Dispatch-Schleife besitzt die Subscriber-Menge. Sie
//! empfaengt Steuerbefehle (Registrieren, Abmelden, Anzahl) und Werte aus
//! drei Eingaengen:
//!
//! ```text
//! chat        -> {"header":"chatmessage","payload":{ip,message,time}}
//! roster      -> {"header":"clientlist","payload":[{ChannelName,Clients}]}
//! servermsg   -> {"header":"servermsg","payload":"<text>"}
//! ```
//!
//! Jeder Wert wird einmal serialisiert und an alle Subscriber geschrieben.
//! Ein Subscriber, der nicht innerhalb des Sende-Zeitlimits annimmt, wird
//! entfernt und geschlossen; die anderen erhalten das Ereignis trotzdem.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot, watch};
use tsrelay_core::{ChannelClientPair, ClientChatMessage, OutboundEnvelope, SubscriberId};
use tsrelay_observability::RelayMetrics;

use crate::error::{HubError, HubResult};
use crate::sink::SubscriberSink;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Standard-Zeitlimit fuer das Schreiben an einen Subscriber
pub const DEFAULT_SENDE_TIMEOUT: Duration = Duration::from_secs(5);

/// Groesse der Eingangs-Queues
const EINGANG_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// Steuerbefehle
// ---------------------------------------------------------------------------

enum Steuerbefehl {
    Registrieren {
        id: SubscriberId,
        sink: Box<dyn SubscriberSink>,
    },
    Abmelden(SubscriberId),
    Anzahl(oneshot::Sender<usize>),
}

// ---------------------------------------------------------------------------
// HubHandle
// ---------------------------------------------------------------------------

/// Zugang zum Hub fuer Produzenten und Endpunkt
///
/// Clone teilt die Queues. Sind alle Handles und herausgegebenen Sender
/// verworfen, endet die Dispatch-Schleife.
#[derive(Clone)]
pub struct HubHandle {
    steuer_tx: mpsc::Sender<Steuerbefehl>,
    chat_tx: mpsc::Sender<ClientChatMessage>,
    roster_tx: mpsc::Sender<Vec<ChannelClientPair>>,
    servernachricht_tx: mpsc::Sender<String>,
}

impl HubHandle {
    pub async fn registrieren(
        &self,
        id: SubscriberId,
        sink: Box<dyn SubscriberSink>,
    ) -> HubResult<()> {
        self.steuer_tx
            .send(Steuerbefehl::Registrieren { id, sink })
            .await
            .map_err(|_| HubError::HubBeendet)
    }

    /// Entfernt und schliesst den Subscriber; unbekannte IDs sind kein Fehler
    pub async fn abmelden(&self, id: SubscriberId) -> HubResult<()> {
        self.steuer_tx
            .send(Steuerbefehl::Abmelden(id))
            .await
            .map_err(|_| HubError::HubBeendet)
    }

    pub async fn subscriber_anzahl(&self) -> HubResult<usize> {
        let (tx, rx) = oneshot::channel();
        self.steuer_tx
            .send(Steuerbefehl::Anzahl(tx))
            .await
            .map_err(|_| HubError::HubBeendet)?;
        rx.await.map_err(|_| HubError::HubBeendet)
    }

    pub async fn chat_senden(&self, nachricht: ClientChatMessage) -> HubResult<()> {
        self.chat_tx
            .send(nachricht)
            .await
            .map_err(|_| HubError::HubBeendet)
    }

    pub async fn roster_senden(&self, roster: Vec<ChannelClientPair>) -> HubResult<()> {
        self.roster_tx
            .send(roster)
            .await
            .map_err(|_| HubError::HubBeendet)
    }

    pub async fn servernachricht_senden(&self, nachricht: String) -> HubResult<()> {
        self.servernachricht_tx
            .send(nachricht)
            .await
            .map_err(|_| HubError::HubBeendet)
    }

    /// Eingang fuer den Roster-Poller
    pub fn roster_sender(&self) -> mpsc::Sender<Vec<ChannelClientPair>> {
        self.roster_tx.clone()
    }

    /// Eingang fuer den Ereignisstrom
    pub fn servernachricht_sender(&self) -> mpsc::Sender<String> {
        self.servernachricht_tx.clone()
    }
}

// ---------------------------------------------------------------------------
// BroadcastHub
// ---------------------------------------------------------------------------

pub struct BroadcastHub {
    subscriber: HashMap<SubscriberId, Box<dyn SubscriberSink>>,
    steuer_rx: mpsc::Receiver<Steuerbefehl>,
    chat_rx: mpsc::Receiver<ClientChatMessage>,
    roster_rx: mpsc::Receiver<Vec<ChannelClientPair>>,
    servernachricht_rx: mpsc::Receiver<String>,
    sende_timeout: Duration,
    metriken: Option<RelayMetrics>,
}

impl BroadcastHub {
    /// Erstellt den Hub und das erste Handle
    pub fn neu() -> (Self, HubHandle) {
        let (steuer_tx, steuer_rx) = mpsc::channel(EINGANG_GROESSE);
        let (chat_tx, chat_rx) = mpsc::channel(EINGANG_GROESSE);
        let (roster_tx, roster_rx) = mpsc::channel(EINGANG_GROESSE);
        let (servernachricht_tx, servernachricht_rx) = mpsc::channel(EINGANG_GROESSE);

        let hub = Self {
            subscriber: HashMap::new(),
            steuer_rx,
            chat_rx,
            roster_rx,
            servernachricht_rx,
            sende_timeout: DEFAULT_SENDE_TIMEOUT,
            metriken: None,
        };
        let handle = HubHandle {
            steuer_tx,
            chat_tx,
            roster_tx,
            servernachricht_tx,
        };
        (hub, handle)
    }

    pub fn mit_sende_timeout(mut self, timeout: Duration) -> Self {
        self.sende_timeout = timeout;
        self
    }

    pub fn mit_metriken(mut self, metriken: RelayMetrics) -> Self {
        self.metriken = Some(metriken);
        self
    }

    /// Dispatch-Schleife
    ///
    /// Endet beim Shutdown-Signal oder wenn alle Eingaenge geschlossen sind.
    /// Verbleibende Subscriber werden danach geschlossen.
    pub async fn laufen(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(sende_timeout_ms = self.sende_timeout.as_millis() as u64, "Hub gestartet");

        let mut steuer_offen = true;
        let mut chat_offen = true;
        let mut roster_offen = true;
        let mut servernachricht_offen = true;

        while steuer_offen || chat_offen || roster_offen || servernachricht_offen {
            tokio::select! {
                befehl = self.steuer_rx.recv(), if steuer_offen => match befehl {
                    Some(befehl) => self.befehl_ausfuehren(befehl).await,
                    None => steuer_offen = false,
                },
                nachricht = self.chat_rx.recv(), if chat_offen => match nachricht {
                    Some(nachricht) => {
                        self.verteilen(&OutboundEnvelope::ChatMessage(nachricht)).await;
                    }
                    None => chat_offen = false,
                },
                roster = self.roster_rx.recv(), if roster_offen => match roster {
                    Some(roster) => {
                        self.verteilen(&OutboundEnvelope::ClientList(roster)).await;
                    }
                    None => roster_offen = false,
                },
                nachricht = self.servernachricht_rx.recv(), if servernachricht_offen => match nachricht {
                    Some(nachricht) => {
                        self.verteilen(&OutboundEnvelope::ServerMsg(nachricht)).await;
                    }
                    None => servernachricht_offen = false,
                },
                _ = shutdown_rx.changed() => {
                    tracing::debug!("Hub: Shutdown-Signal empfangen");
                    break;
                }
            }
        }

        let anzahl = self.subscriber.len();
        for (_, mut sink) in self.subscriber.drain() {
            sink.schliessen().await;
        }
        if let Some(m) = &self.metriken {
            m.subscribers_active.set(0);
        }
        tracing::info!(geschlossen = anzahl, "Hub beendet");
    }

    async fn befehl_ausfuehren(&mut self, befehl: Steuerbefehl) {
        match befehl {
            Steuerbefehl::Registrieren { id, sink } => {
                if let Some(mut alt) = self.subscriber.insert(id, sink) {
                    alt.schliessen().await;
                }
                tracing::debug!(subscriber = %id, anzahl = self.subscriber.len(), "Subscriber registriert");
                self.anzahl_melden();
            }
            Steuerbefehl::Abmelden(id) => {
                if self.entfernen(&id).await {
                    tracing::debug!(subscriber = %id, anzahl = self.subscriber.len(), "Subscriber abgemeldet");
                }
            }
            Steuerbefehl::Anzahl(antwort) => {
                let _ = antwort.send(self.subscriber.len());
            }
        }
    }

    /// Schreibt das Envelope an alle Subscriber
    ///
    /// Gibt die Anzahl der entfernten Subscriber zurueck.
    pub async fn verteilen(&mut self, envelope: &OutboundEnvelope) -> usize {
        let header = envelope.header();
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(header, fehler = %e, "Envelope nicht serialisierbar");
                return 0;
            }
        };

        let start = Instant::now();
        let timeout = self.sende_timeout;
        let ergebnisse = join_all(self.subscriber.iter_mut().map(|(id, sink)| {
            let text = text.clone();
            async move {
                let ergebnis = match tokio::time::timeout(timeout, sink.senden(text)).await {
                    Ok(r) => r,
                    Err(_) => Err(HubError::Zeitlimit),
                };
                (*id, ergebnis)
            }
        }))
        .await;

        let mut fehlgeschlagen = Vec::new();
        for (id, ergebnis) in ergebnisse {
            if let Err(e) = ergebnis {
                tracing::warn!(subscriber = %id, header, fehler = %e, "Zustellung fehlgeschlagen, Subscriber wird entfernt");
                fehlgeschlagen.push(id);
            }
        }

        let zugestellt = self.subscriber.len() - fehlgeschlagen.len();
        for id in &fehlgeschlagen {
            self.entfernen(id).await;
        }

        if let Some(m) = &self.metriken {
            m.envelopes_delivered_total
                .with_label_values(&[header])
                .inc_by(zugestellt as u64);
            m.delivery_failures_total.inc_by(fehlgeschlagen.len() as u64);
            m.broadcast_duration_seconds
                .observe(start.elapsed().as_secs_f64());
        }
        tracing::trace!(header, zugestellt, entfernt = fehlgeschlagen.len(), "Envelope verteilt");

        fehlgeschlagen.len()
    }

    async fn entfernen(&mut self, id: &SubscriberId) -> bool {
        let Some(mut sink) = self.subscriber.remove(id) else {
            return false;
        };
        sink.schliessen().await;
        self.anzahl_melden();
        true
    }

    fn anzahl_melden(&self) {
        if let Some(m) = &self.metriken {
            m.subscribers_active.set(self.subscriber.len() as i64);
        }
    }

    pub fn subscriber_anzahl(&self) -> usize {
        self.subscriber.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Zeichnet alle empfangenen Texte auf; kann auf Fehler oder Haengen
    /// gestellt werden
    #[derive(Clone, Default)]
    struct TestSink {
        empfangen: Arc<Mutex<Vec<String>>>,
        geschlossen: Arc<Mutex<bool>>,
        verhalten: Verhalten,
    }

    #[derive(Clone, Copy, Default, PartialEq)]
    enum Verhalten {
        #[default]
        Ok,
        Fehler,
        Haengt,
    }

    impl TestSink {
        fn mit(verhalten: Verhalten) -> Self {
            Self {
                verhalten,
                ..Self::default()
            }
        }

        fn texte(&self) -> Vec<String> {
            self.empfangen.lock().unwrap().clone()
        }

        fn ist_geschlossen(&self) -> bool {
            *self.geschlossen.lock().unwrap()
        }
    }

    #[async_trait]
    impl SubscriberSink for TestSink {
        async fn senden(&mut self, text: String) -> HubResult<()> {
            match self.verhalten {
                Verhalten::Ok => {
                    self.empfangen.lock().unwrap().push(text);
                    Ok(())
                }
                Verhalten::Fehler => Err(HubError::Senden("broken pipe".into())),
                Verhalten::Haengt => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
            }
        }

        async fn schliessen(&mut self) {
            *self.geschlossen.lock().unwrap() = true;
        }
    }

    fn hub_mit(sinks: &[TestSink]) -> BroadcastHub {
        let (mut hub, _handle) = BroadcastHub::neu();
        for sink in sinks {
            hub.subscriber
                .insert(SubscriberId::new(), Box::new(sink.clone()));
        }
        hub
    }

    #[tokio::test]
    async fn servernachricht_an_alle() {
        let a = TestSink::default();
        let b = TestSink::default();
        let mut hub = hub_mit(&[a.clone(), b.clone()]);

        let entfernt = hub
            .verteilen(&OutboundEnvelope::ServerMsg("hello world ".into()))
            .await;

        assert_eq!(entfernt, 0);
        let erwartet = r#"{"header":"servermsg","payload":"hello world "}"#;
        assert_eq!(a.texte(), vec![erwartet]);
        assert_eq!(b.texte(), vec![erwartet]);
    }

    #[tokio::test]
    async fn fehlerhafter_subscriber_wird_entfernt() {
        let gut = TestSink::default();
        let kaputt = TestSink::mit(Verhalten::Fehler);
        let mut hub = hub_mit(&[gut.clone(), kaputt.clone()]);

        let roster = vec![ChannelClientPair::neu("Lobby", vec!["Anna".into()])];
        let entfernt = hub.verteilen(&OutboundEnvelope::ClientList(roster)).await;

        assert_eq!(entfernt, 1);
        assert_eq!(hub.subscriber_anzahl(), 1);
        assert!(kaputt.ist_geschlossen());
        assert!(!gut.ist_geschlossen());
        assert_eq!(gut.texte().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn haengender_subscriber_laeuft_in_zeitlimit() {
        let gut = TestSink::default();
        let haengt = TestSink::mit(Verhalten::Haengt);
        let mut hub = hub_mit(&[gut.clone(), haengt.clone()]);

        let entfernt = hub
            .verteilen(&OutboundEnvelope::ServerMsg("x".into()))
            .await;

        assert_eq!(entfernt, 1);
        assert!(haengt.ist_geschlossen());
        assert_eq!(gut.texte().len(), 1);
    }

    #[tokio::test]
    async fn menge_schrumpft_genau_um_die_fehlgeschlagenen() {
        let mut sinks = Vec::new();
        for i in 0..10 {
            let verhalten = if i % 3 == 0 {
                Verhalten::Fehler
            } else {
                Verhalten::Ok
            };
            sinks.push(TestSink::mit(verhalten));
        }
        let mut hub = hub_mit(&sinks);
        let vorher = hub.subscriber_anzahl();

        let entfernt = hub
            .verteilen(&OutboundEnvelope::ServerMsg("x".into()))
            .await;

        assert_eq!(entfernt, 4);
        assert_eq!(hub.subscriber_anzahl(), vorher - entfernt);
        for sink in &sinks {
            let soll_geschlossen = sink.verhalten == Verhalten::Fehler;
            assert_eq!(sink.ist_geschlossen(), soll_geschlossen);
        }
    }

    #[tokio::test]
    async fn leerer_hub_verteilt_ohne_fehler() {
        let mut hub = hub_mit(&[]);
        assert_eq!(
            hub.verteilen(&OutboundEnvelope::ServerMsg("x".into())).await,
            0
        );
    }

    #[tokio::test]
    async fn metriken_werden_gezaehlt() {
        let metriken = RelayMetrics::neu().unwrap();
        let gut = TestSink::default();
        let kaputt = TestSink::mit(Verhalten::Fehler);
        let mut hub = hub_mit(&[gut, kaputt]).mit_metriken(metriken.clone());

        hub.verteilen(&OutboundEnvelope::ServerMsg("x".into())).await;

        assert_eq!(
            metriken
                .envelopes_delivered_total
                .with_label_values(&["servermsg"])
                .get(),
            1
        );
        assert_eq!(metriken.delivery_failures_total.get(), 1);
        assert_eq!(metriken.subscribers_active.get(), 1);
    }

    #[tokio::test]
    async fn laufen_ueber_handle() {
        let (hub, handle) = BroadcastHub::neu();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let lauf = tokio::spawn(hub.laufen(shutdown_rx));

        let a = TestSink::default();
        let id = SubscriberId::new();
        handle.registrieren(id, Box::new(a.clone())).await.unwrap();
        assert_eq!(handle.subscriber_anzahl().await.unwrap(), 1);

        handle
            .chat_senden(ClientChatMessage {
                ip: "10.0.0.1".into(),
                message: "hi".into(),
                time: "12:00".into(),
            })
            .await
            .unwrap();
        handle.servernachricht_senden("gg ".into()).await.unwrap();

        // Die Eingaenge sind getrennte Queues; auf beide Zustellungen warten
        tokio::time::timeout(Duration::from_secs(1), async {
            while a.texte().len() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        let texte = a.texte();
        assert!(texte.iter().any(|t| t.starts_with(r#"{"header":"chatmessage""#)));
        assert!(texte.iter().any(|t| t.starts_with(r#"{"header":"servermsg""#)));

        handle.abmelden(id).await.unwrap();
        assert_eq!(handle.subscriber_anzahl().await.unwrap(), 0);
        assert!(a.ist_geschlossen());

        shutdown_tx.send(true).unwrap();
        lauf.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_schliesst_alle_subscriber() {
        let (hub, handle) = BroadcastHub::neu();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let lauf = tokio::spawn(hub.laufen(shutdown_rx));

        let sinks = [TestSink::default(), TestSink::default()];
        for sink in &sinks {
            handle
                .registrieren(SubscriberId::new(), Box::new(sink.clone()))
                .await
                .unwrap();
        }
        assert_eq!(handle.subscriber_anzahl().await.unwrap(), 2);

        shutdown_tx.send(true).unwrap();
        lauf.await.unwrap();
        assert!(sinks.iter().all(TestSink::ist_geschlossen));
        assert!(matches!(
            handle.subscriber_anzahl().await,
            Err(HubError::HubBeendet)
        ));
    }

    #[tokio::test]
    async fn endet_ohne_produzenten() {
        let (hub, handle) = BroadcastHub::neu();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(handle);

        tokio::time::timeout(Duration::from_secs(1), hub.laufen(shutdown_rx))
            .await
            .expect("Hub muss ohne Produzenten enden");
    }
}
