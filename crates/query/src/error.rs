//! Fehlertypen fuer tsrelay-query
//!
//! Jeder Fehler hat eine [`FehlerStufe`]: ob er nur den aktuellen
//! Verbindungsversuch beendet oder den ganzen Prozess.

use thiserror::Error;

/// Result-Alias fuer tsrelay-query
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Reichweite eines Fehlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FehlerStufe {
    /// Verbindung verwerfen, nach einer Pause neu verbinden
    Versuch,
    /// Gegenstelle ist kein ServerQuery-Server, Prozess beenden
    Prozess,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Verbindung vom Server geschlossen")]
    VerbindungGeschlossen,

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    #[error("Keine Banner-Zeile empfangen")]
    BannerFehlt,

    #[error("Unerwartetes Banner: '{0}' (erwartet 'TS3')")]
    BannerUngueltig(String),

    #[error("Keine Begruessungszeile empfangen")]
    BegruessungFehlt,

    /// Statuszeile mit `id != 0`
    #[error("Server-Fehler {id}: {nachricht}")]
    Server { id: u32, nachricht: String },

    #[error("Protokollfehler: {0}")]
    Protokoll(String),
}

impl QueryError {
    pub fn stufe(&self) -> FehlerStufe {
        match self {
            Self::BannerFehlt | Self::BannerUngueltig(_) | Self::BegruessungFehlt => {
                FehlerStufe::Prozess
            }
            _ => FehlerStufe::Versuch,
        }
    }

    pub fn ist_prozessfatal(&self) -> bool {
        self.stufe() == FehlerStufe::Prozess
    }

    /// `true` wenn der Lesepuffer nicht mehr zur naechsten Antwort passt
    ///
    /// Nur eine vollstaendig gelesene Fehler-Statuszeile laesst die
    /// Verbindung synchron; nach allem anderen wird sie verworfen.
    pub fn verbindung_verwerfen(&self) -> bool {
        !matches!(self, Self::Server { .. })
    }
}
