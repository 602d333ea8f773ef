//! Fehlertypen fuer tsrelay-core
//!
//! Die anderen Crates definieren eigene Fehler und konvertieren bei Bedarf
//! via `#[from]`.

use thiserror::Error;

/// Result-Alias fuer tsrelay-core
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Fehler beim Dekodieren von Paketen und beim Schreiben der Protokolldateien
#[derive(Debug, Error)]
pub enum CoreError {
    /// Aeusseres Paket `{header, payload}` nicht lesbar
    #[error("Ungueltiges Paket: {0}")]
    UngueltigesPaket(#[source] serde_json::Error),

    /// Payload eines bekannten Headers nicht lesbar
    #[error("Ungueltiger Payload fuer '{header}': {quelle}")]
    UngueltigerPayload {
        header: String,
        #[source]
        quelle: serde_json::Error,
    },

    /// Serialisierung eines ausgehenden Envelopes fehlgeschlagen
    #[error("Serialisierung fehlgeschlagen: {0}")]
    Serialisierung(#[source] serde_json::Error),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Gibt true zurueck wenn nur der Payload defekt ist und die Verbindung
    /// weiterlaufen darf
    pub fn ist_payload_fehler(&self) -> bool {
        matches!(self, Self::UngueltigerPayload { .. })
    }
}
