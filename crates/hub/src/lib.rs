//! # tsrelay-hub
//!
//! Verteilt Ereignisse an alle verbundenen Browser-Subscriber.
//!
//! Der [`BroadcastHub`] besitzt die Subscriber-Menge allein; alle anderen
//! Komponenten sprechen ueber einen [`HubHandle`] mit ihm. Der
//! WebSocket-Endpunkt (`/ws`) registriert neue Subscriber und leitet deren
//! Chat-Nachrichten an den Sprachserver weiter.

pub mod endpoint;
pub mod error;
pub mod hub;
pub mod sink;

pub use endpoint::{paket_verarbeiten, ws_router, EndpointState, PaketErgebnis};
pub use error::{HubError, HubResult};
pub use hub::{BroadcastHub, HubHandle, DEFAULT_SENDE_TIMEOUT};
pub use sink::{SubscriberSink, WsSink};
