//! Fehlertypen fuer tsrelay-hub

use thiserror::Error;

/// Result-Alias fuer tsrelay-hub
pub type HubResult<T> = std::result::Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    /// Schreiben an einen Subscriber fehlgeschlagen
    #[error("Senden an Subscriber fehlgeschlagen: {0}")]
    Senden(String),

    /// Subscriber hat das Sende-Zeitlimit ueberschritten
    #[error("Sende-Zeitlimit ueberschritten")]
    Zeitlimit,

    /// Dispatch-Schleife laeuft nicht mehr
    #[error("Hub beendet")]
    HubBeendet,
}
