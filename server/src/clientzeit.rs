//! Client-Onlinezeiten aus einem externen Auswerteprogramm
//!
//! Das Programm schreibt pro Zeile `<sekunden>\t<nickname>` auf stdout,
//! sortiert nach Onlinezeit. Es werden hoechstens `max_eintraege` Zeilen
//! betrachtet (leere Zeilen zaehlen mit).

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::process::Command;

use crate::config::ClientzeitEinstellungen;

/// Zeitlimit fuer einen Programmlauf
const PROGRAMM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientZeit {
    #[serde(rename = "TotalTime")]
    pub gesamtzeit: u64,
    #[serde(rename = "ClientName")]
    pub name: String,
}

/// Parst die Programmausgabe
///
/// Zeilen ohne Tabulator oder mit nicht-numerischer Zeit werden mit einer
/// Warnung uebersprungen.
pub fn eintraege_parsen(ausgabe: &str, max_eintraege: usize) -> Vec<ClientZeit> {
    let mut eintraege = Vec::new();

    for zeile in ausgabe.split('\n').take(max_eintraege) {
        if zeile.is_empty() {
            continue;
        }

        let Some((zeit, name)) = zeile.split_once('\t') else {
            tracing::warn!(zeile = %zeile, "Clientzeit-Zeile ohne Tabulator");
            continue;
        };

        match zeit.trim().parse::<u64>() {
            Ok(gesamtzeit) => eintraege.push(ClientZeit {
                gesamtzeit,
                name: name.trim_end_matches('\r').to_string(),
            }),
            Err(e) => {
                tracing::warn!(zeile = %zeile, fehler = %e, "Clientzeit nicht numerisch");
            }
        }
    }

    eintraege
}

/// Startet das konfigurierte Programm bei jeder Abfrage
pub struct ClientZeitQuelle {
    einstellungen: ClientzeitEinstellungen,
}

impl ClientZeitQuelle {
    pub fn neu(einstellungen: ClientzeitEinstellungen) -> Self {
        Self { einstellungen }
    }

    /// Liefert die aktuellen Eintraege; deaktiviert ergibt eine leere Liste
    pub async fn abfragen(&self) -> Result<Vec<ClientZeit>> {
        if !self.einstellungen.aktiviert {
            return Ok(Vec::new());
        }

        let programm = &self.einstellungen.programm;
        let ausgabe = tokio::time::timeout(
            PROGRAMM_TIMEOUT,
            Command::new(programm)
                .args(&self.einstellungen.argumente)
                .stdin(Stdio::null())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .with_context(|| format!("'{programm}' hat das Zeitlimit ueberschritten"))?
        .with_context(|| format!("'{programm}' konnte nicht gestartet werden"))?;

        if !ausgabe.status.success() {
            tracing::warn!(programm = %programm, status = %ausgabe.status, "Clientzeit-Programm mit Fehlerstatus beendet");
        }

        let stdout = String::from_utf8_lossy(&ausgabe.stdout);
        Ok(eintraege_parsen(&stdout, self.einstellungen.max_eintraege))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ausgabe_parsen() {
        let ausgabe = "7200\tAnna\n3600\tBen Muster\n";
        assert_eq!(
            eintraege_parsen(ausgabe, 13),
            vec![
                ClientZeit {
                    gesamtzeit: 7200,
                    name: "Anna".into()
                },
                ClientZeit {
                    gesamtzeit: 3600,
                    name: "Ben Muster".into()
                },
            ]
        );
    }

    #[test]
    fn leere_zeilen_zaehlen_zum_limit() {
        let ausgabe = "1\ta\n\n2\tb\n3\tc\n";
        let eintraege = eintraege_parsen(ausgabe, 3);
        let namen: Vec<&str> = eintraege.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(namen, vec!["a", "b"]);
    }

    #[test]
    fn kaputte_zeilen_werden_uebersprungen() {
        let ausgabe = "abc\tAnna\nohne-tab\n42\tBen\n";
        let eintraege = eintraege_parsen(ausgabe, 13);
        assert_eq!(eintraege.len(), 1);
        assert_eq!(eintraege[0].name, "Ben");
    }

    #[test]
    fn json_format() {
        let json = serde_json::to_string(&ClientZeit {
            gesamtzeit: 5,
            name: "Anna".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"TotalTime":5,"ClientName":"Anna"}"#);
    }

    #[tokio::test]
    async fn deaktiviert_ergibt_leere_liste() {
        let quelle = ClientZeitQuelle::neu(ClientzeitEinstellungen::default());
        assert!(quelle.abfragen().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn programm_ausgabe_wird_gelesen() {
        let quelle = ClientZeitQuelle::neu(ClientzeitEinstellungen {
            aktiviert: true,
            programm: "printf".into(),
            argumente: vec!["120\\tAnna\\n60\\tBen\\n".into()],
            max_eintraege: 13,
        });

        let eintraege = quelle.abfragen().await.unwrap();
        assert_eq!(eintraege.len(), 2);
        assert_eq!(eintraege[0].gesamtzeit, 120);
        assert_eq!(eintraege[1].name, "Ben");
    }

    #[tokio::test]
    async fn fehlendes_programm_ist_fehler() {
        let quelle = ClientZeitQuelle::neu(ClientzeitEinstellungen {
            aktiviert: true,
            programm: "/nicht/vorhanden/ltc".into(),
            argumente: vec![],
            max_eintraege: 13,
        });
        assert!(quelle.abfragen().await.is_err());
    }
}
