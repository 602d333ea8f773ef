//! Gemeinsame Datentypen fuer tsrelay
//!
//! Die Feldnamen der serialisierten Typen sind Teil des Push-Kanal-Formats,
//! das die Browser-Clients auswerten (`ChannelName`, `Clients`, `ip`, ...).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige ID eines verbundenen Browser-Subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    /// Erstellt eine neue zufaellige SubscriberId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscriber:{}", self.0)
    }
}

/// Ein Channel mit den Anzeigenamen seiner Mitglieder
///
/// Wird pro Roster-Abfrage neu erzeugt und danach nicht mehr veraendert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelClientPair {
    #[serde(rename = "ChannelName")]
    pub channel_name: String,
    #[serde(rename = "Clients")]
    pub clients: Vec<String>,
}

impl ChannelClientPair {
    pub fn neu(channel_name: impl Into<String>, clients: Vec<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            clients,
        }
    }
}

/// Chat-Nachricht wie sie der Browser sendet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientChatMessage {
    #[serde(default)]
    pub ip: String,
    pub message: String,
    #[serde(default)]
    pub time: String,
}
