//! Spruch des Tages

use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::seq::SliceRandom;

pub struct Motd {
    zeilen: Vec<String>,
}

impl Motd {
    /// Liest die Datei einmalig; fehlende Datei oder keine Zeilen ist ein Fehler
    pub async fn laden(pfad: impl AsRef<Path>) -> Result<Self> {
        let pfad = pfad.as_ref();
        let inhalt = tokio::fs::read_to_string(pfad)
            .await
            .with_context(|| format!("MOTD-Datei '{}' nicht lesbar", pfad.display()))?;

        let Some(motd) = Self::aus_text(&inhalt) else {
            bail!("MOTD-Datei '{}' enthaelt keine Zeilen", pfad.display());
        };
        tracing::info!(pfad = %pfad.display(), zeilen = motd.anzahl(), "MOTD geladen");
        Ok(motd)
    }

    /// `None` wenn der Text keine nicht-leere Zeile hat
    pub fn aus_text(text: &str) -> Option<Self> {
        let zeilen: Vec<String> = text
            .lines()
            .filter(|zeile| !zeile.trim().is_empty())
            .map(str::to_string)
            .collect();

        if zeilen.is_empty() {
            return None;
        }
        Some(Self { zeilen })
    }

    pub fn zufaellig(&self) -> &str {
        self.zeilen
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn anzahl(&self) -> usize {
        self.zeilen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leere_zeilen_werden_verworfen() {
        let motd = Motd::aus_text("Eins\n\n  \nZwei\n").unwrap();
        assert_eq!(motd.anzahl(), 2);
        for _ in 0..20 {
            assert!(["Eins", "Zwei"].contains(&motd.zufaellig()));
        }
    }

    #[test]
    fn ohne_zeilen_kein_motd() {
        assert!(Motd::aus_text("").is_none());
        assert!(Motd::aus_text("\n \n").is_none());
    }

    #[tokio::test]
    async fn laden_aus_datei() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("sprueche.txt");
        tokio::fs::write(&pfad, "Nur einer\n").await.unwrap();

        let motd = Motd::laden(&pfad).await.unwrap();
        assert_eq!(motd.zufaellig(), "Nur einer");
    }

    #[tokio::test]
    async fn fehlende_oder_leere_datei_ist_fehler() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Motd::laden(dir.path().join("fehlt.txt")).await.is_err());

        let leer = dir.path().join("leer.txt");
        tokio::fs::write(&leer, "\n\n").await.unwrap();
        assert!(Motd::laden(&leer).await.is_err());
    }
}
