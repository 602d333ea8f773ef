//! tsrelay-core – Gemeinsame Typen, Envelopes und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die zwischen Query-Client,
//! Broadcast-Hub und Server geteilt werden:
//! - Roster- und Chat-Typen (`types`)
//! - Das Push-Kanal-Format `{header, payload}` (`envelope`)
//! - Append-only Protokolldateien fuer Chat und Verbindungen (`journal`)

pub mod envelope;
pub mod error;
pub mod journal;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use envelope::{ClientPackage, EingehendesPaket, OutboundEnvelope};
pub use error::{CoreError, CoreResult};
pub use journal::Journal;
pub use types::{ChannelClientPair, ClientChatMessage, SubscriberId};
