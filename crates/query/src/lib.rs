//! # tsrelay-query
//!
//! Client fuer die ServerQuery-Schnittstelle des Sprachservers.
//!
//! - [`QueryClient`]: geteilte Befehlsverbindung (Client-Liste, Channel-Liste,
//!   globale Nachrichten), baut sich nach Abbruechen neu auf
//! - [`RosterPoller`]: fragt periodisch die Belegung der Channels ab
//! - [`EventStreamClient`]: eigene Verbindung fuer Text-Ereignisse mit
//!   Keepalive und automatischem Wiederverbinden

pub mod client;
pub mod connection;
pub mod error;
pub mod event_stream;
pub mod poller;
pub mod roster;

pub use client::{QueryClient, ServerQuery, StreamQuelle, TcpQuelle, Zugangsdaten, KEEPALIVE_BEFEHL};
pub use connection::QueryConnection;
pub use error::{FehlerStufe, QueryError, QueryResult};
pub use event_stream::{ConnectionState, EreignisstromKonfig, EventStreamClient};
pub use poller::RosterPoller;
pub use roster::{roster_bauen, roster_zusammenfuehren, Channel, OnlineClient, QUERY_CLIENT_TYP};
