//! Dekodierung von Text-Ereignissen aus dem Notify-Stream
//!
//! Nach `servernotifyregister event=textserver` schickt der Server Zeilen wie
//!
//! ```text
//! notifytextmessage targetmode=3 msg=hello\sworld invokerid=5 invokername=Max ...
//! ```
//!
//! Ereignisse mit `invokerid=0` stammen von der Query-Identitaet selbst und
//! werden nicht weitergegeben.

use crate::escape::LEERZEICHEN_ESCAPE;

/// Markiert Ereignisse der eigenen Query-Identitaet
pub const EIGENE_IDENTITAET: &str = "invokerid=0";

/// Beginn des Nachrichtentexts
pub const NACHRICHT_START: &str = "msg=";

/// Erster Parameter nach dem Nachrichtentext
pub const AUSLOESER_MARKE: &str = "invokerid=";

/// Extrahiert den lesbaren Nachrichtentext aus einer Ereigniszeile
///
/// Der Text zwischen `msg=` und dem folgenden `invokerid=` wird an `\s`
/// getrennt; jedes Teilstueck bekommt ein Leerzeichen angehaengt
/// (`hello\sworld` ergibt `"hello world "`). Zeilen ohne beide Marken oder
/// von der eigenen Identitaet ergeben `None`.
pub fn textnachricht_extrahieren(zeile: &str) -> Option<String> {
    if zeile.contains(EIGENE_IDENTITAET) {
        return None;
    }

    let start = zeile.find(NACHRICHT_START)? + NACHRICHT_START.len();
    let ende = start + zeile[start..].find(AUSLOESER_MARKE)?;

    // Das Leerzeichen vor `invokerid=` trennt nur Parameter
    let roh = zeile[start..ende].trim_end();

    let mut nachricht = String::with_capacity(roh.len() + 1);
    for wort in roh.split(LEERZEICHEN_ESCAPE) {
        nachricht.push_str(wort);
        nachricht.push(' ');
    }
    Some(nachricht)
}
