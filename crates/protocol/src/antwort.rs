//! Parser fuer Antworten der ServerQuery-Schnittstelle
//!
//! Jede Antwort endet mit einer Statuszeile `error id=<n> msg=<text>`.
//! Davor koennen Datenzeilen stehen: Datensaetze getrennt durch `|`,
//! Parameter innerhalb eines Datensatzes getrennt durch Leerzeichen.

use std::collections::HashMap;

use crate::escape::decode_value;

/// Ein Datensatz (`key=value`-Paare, Werte bereits dekodiert)
pub type Datensatz = HashMap<String, String>;

/// Statuszeile einer Antwort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStatus {
    pub id: u32,
    pub nachricht: String,
}

impl QueryStatus {
    pub fn ist_ok(&self) -> bool {
        self.id == 0
    }
}

/// Parst eine Statuszeile; `None` wenn die Zeile keine Statuszeile ist
pub fn status_parsen(zeile: &str) -> Option<QueryStatus> {
    let rest = zeile.trim_end().strip_prefix("error ")?;
    let params = parameter_parsen(rest);
    let id = params.get("id")?.parse().ok()?;
    Some(QueryStatus {
        id,
        nachricht: params.get("msg").cloned().unwrap_or_default(),
    })
}

/// Parst eine Datenzeile in ihre Datensaetze
pub fn datensaetze_parsen(zeile: &str) -> Vec<Datensatz> {
    zeile
        .trim_end()
        .split('|')
        .filter(|teil| !teil.trim().is_empty())
        .map(parameter_parsen)
        .collect()
}

/// Parst `key1=value1 key2 key3=value3` (Token ohne `=` ergeben leere Werte)
pub fn parameter_parsen(teil: &str) -> Datensatz {
    teil.split(' ')
        .filter(|token| !token.is_empty())
        .map(|token| match token.split_once('=') {
            Some((key, value)) => (key.to_string(), decode_value(value)),
            None => (token.to_string(), String::new()),
        })
        .collect()
}
