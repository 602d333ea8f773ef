//! tsrelay-protocol – Zeilenprotokoll der ServerQuery-Schnittstelle
//!
//! Der Voice-Server spricht ein textbasiertes Befehl/Antwort-Protokoll:
//!
//! ```text
//! -> login serveradmin geheim\n
//! <- error id=0 msg=ok\n\r
//! -> clientlist\n
//! <- clid=1 cid=1 client_nickname=serveradmin client_type=1|clid=5 ...\n\r
//! <- error id=0 msg=ok\n\r
//! ```
//!
//! Eingehende Zeilen enden mit `\n\r` (nicht `\r\n`), ausgehende mit `\n`.
//! Leerzeichen und Sonderzeichen in Werten werden mit Backslash escaped.

pub mod antwort;
pub mod ereignis;
pub mod escape;
pub mod line;

pub use antwort::{datensaetze_parsen, status_parsen, Datensatz, QueryStatus};
pub use ereignis::textnachricht_extrahieren;
pub use escape::{decode_value, encode_value, nachricht_escapen};
pub use line::{zeile_teilen, LineCodec, Teilung};
