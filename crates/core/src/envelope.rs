//! Push-Kanal-Format zwischen Server und Browser
//!
//! Jede Nachricht ist ein JSON-Objekt `{"header": ..., "payload": ...}`.
//!
//! | Header        | Richtung  | Payload                               |
//! |---------------|-----------|---------------------------------------|
//! | `clientlist`  | ausgehend | `[{ChannelName, Clients}]`            |
//! | `servermsg`   | ausgehend | String                                |
//! | `chatmessage` | beide     | `{ip, message, time}` (eingehend als  |
//! |               |           | JSON-String oder Objekt)              |

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{ChannelClientPair, ClientChatMessage};

pub const HEADER_CHAT: &str = "chatmessage";
pub const HEADER_CLIENTLISTE: &str = "clientlist";
pub const HEADER_SERVERNACHRICHT: &str = "servermsg";

/// Ausgehende Nachricht an alle Subscriber
///
/// Der Header bestimmt die Form des Payloads vollstaendig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "header", content = "payload")]
pub enum OutboundEnvelope {
    #[serde(rename = "chatmessage")]
    ChatMessage(ClientChatMessage),
    #[serde(rename = "clientlist")]
    ClientList(Vec<ChannelClientPair>),
    #[serde(rename = "servermsg")]
    ServerMsg(String),
}

impl OutboundEnvelope {
    /// Header-String dieses Envelopes (auch als Metrik-Label genutzt)
    pub fn header(&self) -> &'static str {
        match self {
            Self::ChatMessage(_) => HEADER_CHAT,
            Self::ClientList(_) => HEADER_CLIENTLISTE,
            Self::ServerMsg(_) => HEADER_SERVERNACHRICHT,
        }
    }

    /// Serialisiert den Envelope als JSON-Text
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(CoreError::Serialisierung)
    }
}

/// Eingehendes Paket vom Browser (aeussere Huelle)
#[derive(Debug, Clone, Deserialize)]
pub struct ClientPackage {
    pub header: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Dekodierter Inhalt eines eingehenden Pakets
#[derive(Debug, Clone, PartialEq)]
pub enum EingehendesPaket {
    ChatNachricht(ClientChatMessage),
    /// Unbekannter Header – wird vom Endpunkt ignoriert
    Unbekannt(String),
}

impl ClientPackage {
    /// Parst die aeussere Huelle aus einem Text-Frame
    pub fn parsen(text: &str) -> CoreResult<Self> {
        serde_json::from_str(text).map_err(CoreError::UngueltigesPaket)
    }

    /// Dekodiert den Payload anhand des Headers
    ///
    /// Der Browser schickt den Chat-Payload als serialisierten JSON-String;
    /// ein direkt eingebettetes Objekt wird ebenfalls akzeptiert.
    pub fn entschluesseln(&self) -> CoreResult<EingehendesPaket> {
        match self.header.as_str() {
            HEADER_CHAT => {
                let ergebnis = match &self.payload {
                    serde_json::Value::String(s) => serde_json::from_str(s),
                    wert => serde_json::from_value(wert.clone()),
                };
                ergebnis
                    .map(EingehendesPaket::ChatNachricht)
                    .map_err(|quelle| CoreError::UngueltigerPayload {
                        header: self.header.clone(),
                        quelle,
                    })
            }
            andere => Ok(EingehendesPaket::Unbekannt(andere.to_string())),
        }
    }
}
