//! Eine einzelne ServerQuery-Verbindung
//!
//! Kapselt einen `Framed<S, LineCodec>` und kennt die drei Grundoperationen
//! des Protokolls: Begruessung lesen, Befehl mit Antwort, Befehl mit
//! einzelner Quittungszeile.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tsrelay_protocol::{datensaetze_parsen, status_parsen, Datensatz, LineCodec, QueryStatus};

use crate::error::{QueryError, QueryResult};

/// Erwartete erste Zeile jeder ServerQuery-Verbindung
pub const BANNER: &str = "TS3";

/// Standard-Zeitlimit fuer die Antwort auf einen Befehl
pub const DEFAULT_ANTWORT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct QueryConnection<S> {
    framed: Framed<S, LineCodec>,
    antwort_timeout: Duration,
}

impl<S> QueryConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn neu(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, LineCodec::new()),
            antwort_timeout: DEFAULT_ANTWORT_TIMEOUT,
        }
    }

    pub fn mit_antwort_timeout(mut self, timeout: Duration) -> Self {
        self.antwort_timeout = timeout;
        self
    }

    /// Liest die naechste Zeile; `None` am Stream-Ende
    ///
    /// Abbruchsicher: kann in `select!`/`timeout` verwendet werden.
    pub async fn zeile_lesen(&mut self) -> QueryResult<Option<String>> {
        match self.framed.next().await {
            Some(Ok(zeile)) => Ok(Some(zeile)),
            Some(Err(e)) => Err(QueryError::Io(e)),
            None => Ok(None),
        }
    }

    /// Schreibt eine Zeile (der Codec haengt `\n` an) und flusht
    pub async fn zeile_schreiben(&mut self, zeile: &str) -> QueryResult<()> {
        self.framed.send(zeile).await?;
        Ok(())
    }

    /// Liest Banner und Begruessung
    ///
    /// Fehlt eine der beiden Zeilen oder ist das Banner nicht `TS3`, ist die
    /// Gegenstelle kein ServerQuery-Server.
    pub async fn begruessung_lesen(&mut self) -> QueryResult<()> {
        let banner = self.zeile_lesen().await?.ok_or(QueryError::BannerFehlt)?;
        if banner.trim() != BANNER {
            return Err(QueryError::BannerUngueltig(banner));
        }

        let begruessung = self
            .zeile_lesen()
            .await?
            .ok_or(QueryError::BegruessungFehlt)?;
        tracing::debug!(begruessung = %begruessung.trim(), "ServerQuery-Begruessung empfangen");
        Ok(())
    }

    /// Sendet einen Befehl und liest die Antwort bis zur Statuszeile
    ///
    /// Notify-Zeilen, die zwischen Befehl und Antwort eintreffen, werden
    /// uebersprungen. Eine Statuszeile mit `id != 0` ergibt
    /// [`QueryError::Server`].
    pub async fn befehl(&mut self, befehl: &str) -> QueryResult<Vec<Datensatz>> {
        self.zeile_schreiben(befehl).await?;

        let name = befehl.split(' ').next().unwrap_or(befehl).to_string();
        match tokio::time::timeout(self.antwort_timeout, self.antwort_lesen()).await {
            Ok(ergebnis) => ergebnis,
            Err(_) => Err(QueryError::Zeitlimit(format!("Antwort auf '{name}'"))),
        }
    }

    /// Sendet einen Befehl und liest genau eine Quittungszeile
    ///
    /// Gibt den Status zurueck falls die Zeile eine Statuszeile ist. Ein
    /// Status `id != 0` ist hier kein Fehler; der Aufrufer entscheidet.
    pub async fn quittiert_senden(&mut self, befehl: &str) -> QueryResult<Option<QueryStatus>> {
        self.zeile_schreiben(befehl).await?;
        let quittung = self
            .zeile_lesen()
            .await?
            .ok_or(QueryError::VerbindungGeschlossen)?;
        Ok(status_parsen(&quittung))
    }

    async fn antwort_lesen(&mut self) -> QueryResult<Vec<Datensatz>> {
        let mut saetze = Vec::new();
        loop {
            let zeile = self
                .zeile_lesen()
                .await?
                .ok_or(QueryError::VerbindungGeschlossen)?;

            if let Some(status) = status_parsen(&zeile) {
                if status.ist_ok() {
                    return Ok(saetze);
                }
                return Err(QueryError::Server {
                    id: status.id,
                    nachricht: status.nachricht,
                });
            }

            let zeile = zeile.trim();
            if zeile.is_empty() || zeile.starts_with("notify") {
                continue;
            }
            saetze.extend(datensaetze_parsen(zeile));
        }
    }
}
