//! Geteilte Befehlsverbindung zum ServerQuery-Port
//!
//! Roster-Poller und Subscription-Endpunkt teilen sich eine Verbindung.
//! Befehle werden ueber einen async Mutex serialisiert, damit sich Befehl
//! und Antwort zweier Aufrufer nicht ueberlappen.
//!
//! Bricht ein Befehl mitten in der Antwort ab (Zeitlimit, IO-Fehler,
//! geschlossene Verbindung), wird die Verbindung verworfen. Der naechste
//! Befehl baut sie mit frischem Handshake neu auf.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tsrelay_protocol::{encode_value, nachricht_escapen, Datensatz};

use crate::connection::QueryConnection;
use crate::error::{QueryError, QueryResult};
use crate::roster::{Channel, OnlineClient};

/// Standard-Zeitlimit fuer den TCP-Verbindungsaufbau
pub const VERBINDUNGS_TIMEOUT: Duration = Duration::from_secs(10);

/// Befehl ohne Seiteneffekt, haelt die Sitzung offen
pub const KEEPALIVE_BEFEHL: &str = "whoami";

/// Anmeldedaten und Adresse des ServerQuery-Ports
#[derive(Clone, PartialEq, Eq)]
pub struct Zugangsdaten {
    pub benutzer: String,
    pub passwort: String,
    pub adresse: String,
    pub port: u16,
    /// Virtueller Server fuer `use`
    pub server_id: u32,
}

impl fmt::Debug for Zugangsdaten {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zugangsdaten")
            .field("benutzer", &self.benutzer)
            .field("passwort", &"***")
            .field("adresse", &self.adresse)
            .field("port", &self.port)
            .field("server_id", &self.server_id)
            .finish()
    }
}

impl Zugangsdaten {
    /// `host:port` fuer den Verbindungsaufbau
    pub fn ziel(&self) -> String {
        format!("{}:{}", self.adresse, self.port)
    }

    pub fn login_befehl(&self) -> String {
        format!(
            "login {} {}",
            encode_value(&self.benutzer),
            encode_value(&self.passwort)
        )
    }

    pub fn use_befehl(&self) -> String {
        format!("use {}", self.server_id)
    }
}

/// Operationen auf der ServerQuery-Verbindung
///
/// Trait-Objekt damit Poller und Endpunkt gegen eine Test-Implementierung
/// laufen koennen.
#[async_trait]
pub trait ServerQuery: Send + Sync {
    /// `clientlist`
    async fn client_liste(&self) -> QueryResult<Vec<OnlineClient>>;

    /// `channellist`
    async fn channel_liste(&self) -> QueryResult<Vec<Channel>>;

    /// `gm msg=<text>`; ein Text ohne Woerter sendet nichts
    async fn globale_nachricht_senden(&self, text: &str) -> QueryResult<()>;
}

/// Oeffnet Streams fuer den ersten Aufbau und jeden Neuaufbau
#[async_trait]
pub trait StreamQuelle: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn oeffnen(&self) -> QueryResult<Self::Stream>;

    /// Fuer Logausgaben
    fn beschreibung(&self) -> String;
}

/// TCP-Verbindung mit Zeitlimit
pub struct TcpQuelle {
    ziel: String,
    timeout: Duration,
}

impl TcpQuelle {
    pub fn neu(ziel: impl Into<String>) -> Self {
        Self {
            ziel: ziel.into(),
            timeout: VERBINDUNGS_TIMEOUT,
        }
    }
}

#[async_trait]
impl StreamQuelle for TcpQuelle {
    type Stream = TcpStream;

    async fn oeffnen(&self) -> QueryResult<TcpStream> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.ziel))
            .await
            .map_err(|_| QueryError::Zeitlimit(format!("Verbindung zu {}", self.ziel)))??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn beschreibung(&self) -> String {
        self.ziel.clone()
    }
}

pub struct QueryClient<Q: StreamQuelle = TcpQuelle> {
    quelle: Q,
    zugangsdaten: Zugangsdaten,
    /// `None` nach einem Abbruch, bis der naechste Befehl neu verbindet
    verbindung: Mutex<Option<QueryConnection<Q::Stream>>>,
}

impl QueryClient<TcpQuelle> {
    /// Verbindet, meldet an und waehlt den virtuellen Server
    pub async fn verbinden(zugangsdaten: &Zugangsdaten) -> QueryResult<Self> {
        let client = Self::mit_quelle(TcpQuelle::neu(zugangsdaten.ziel()), zugangsdaten.clone()).await?;
        tracing::info!(ziel = %zugangsdaten.ziel(), benutzer = %zugangsdaten.benutzer, "ServerQuery-Verbindung hergestellt");
        Ok(client)
    }
}

impl<Q: StreamQuelle> QueryClient<Q> {
    /// Baut die erste Verbindung sofort auf; ein Fehler hier geht an den Aufrufer
    pub async fn mit_quelle(quelle: Q, zugangsdaten: Zugangsdaten) -> QueryResult<Self> {
        let verbindung = Self::anmelden(&quelle, &zugangsdaten).await?;
        Ok(Self {
            quelle,
            zugangsdaten,
            verbindung: Mutex::new(Some(verbindung)),
        })
    }

    /// Begruessung, `login` und `use` auf einem frischen Stream
    async fn anmelden(quelle: &Q, zugangsdaten: &Zugangsdaten) -> QueryResult<QueryConnection<Q::Stream>> {
        let mut verbindung = QueryConnection::neu(quelle.oeffnen().await?);
        verbindung.begruessung_lesen().await?;
        verbindung.befehl(&zugangsdaten.login_befehl()).await?;
        verbindung.befehl(&zugangsdaten.use_befehl()).await?;
        Ok(verbindung)
    }

    /// Fuehrt einen Befehl aus und verbindet bei Bedarf vorher neu
    ///
    /// Die Verbindung wird fuer die Dauer des Befehls aus dem Slot genommen.
    /// Wird der Aufruf abgebrochen, bleibt der Slot leer und die halb
    /// gelesene Verbindung ist weg.
    async fn ausfuehren(&self, befehl: &str) -> QueryResult<Vec<Datensatz>> {
        let mut slot = self.verbindung.lock().await;

        let mut verbindung = match slot.take() {
            Some(verbindung) => verbindung,
            None => {
                tracing::info!(ziel = %self.quelle.beschreibung(), "ServerQuery-Befehlsverbindung wird neu aufgebaut");
                Self::anmelden(&self.quelle, &self.zugangsdaten).await?
            }
        };

        let ergebnis = verbindung.befehl(befehl).await;
        match &ergebnis {
            Err(e) if e.verbindung_verwerfen() => {
                tracing::warn!(
                    ziel = %self.quelle.beschreibung(),
                    fehler = %e,
                    "ServerQuery-Befehlsverbindung verworfen"
                );
            }
            _ => *slot = Some(verbindung),
        }
        ergebnis
    }

    /// Ein Keepalive-Befehl; baut eine verworfene Verbindung wieder auf
    pub async fn lebenszeichen(&self) -> QueryResult<()> {
        self.ausfuehren(KEEPALIVE_BEFEHL).await.map(|_| ())
    }

    /// Sendet im Abstand `intervall` ein Lebenszeichen bis zum Shutdown-Signal
    pub async fn keepalive_laufen(&self, intervall: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(intervall) => {}
                _ = shutdown_rx.changed() => return,
            }

            if let Err(e) = self.lebenszeichen().await {
                tracing::warn!(fehler = %e, "ServerQuery-Keepalive fehlgeschlagen");
            }
        }
    }

    /// Sendet `quit`; die Verbindung ist danach nicht mehr nutzbar
    pub async fn schliessen(&self) -> QueryResult<()> {
        match self.verbindung.lock().await.take() {
            Some(mut verbindung) => verbindung.zeile_schreiben("quit").await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<Q: StreamQuelle> ServerQuery for QueryClient<Q> {
    async fn client_liste(&self) -> QueryResult<Vec<OnlineClient>> {
        let saetze = self.ausfuehren("clientlist").await?;
        saetze.iter().map(OnlineClient::aus_datensatz).collect()
    }

    async fn channel_liste(&self) -> QueryResult<Vec<Channel>> {
        let saetze = self.ausfuehren("channellist").await?;
        saetze.iter().map(Channel::aus_datensatz).collect()
    }

    async fn globale_nachricht_senden(&self, text: &str) -> QueryResult<()> {
        let Some(escaped) = nachricht_escapen(text) else {
            tracing::debug!("Leere Nachricht, nichts gesendet");
            return Ok(());
        };

        self.ausfuehren(&format!("gm msg={escaped}")).await?;
        Ok(())
    }
}
