//! Append-only Protokolldateien
//!
//! Zwei Dateien werden so gefuehrt:
//! - Chat-Log: `<zeitstempel>\t<nachricht>` pro Servernachricht
//! - Verbindungs-Log: `Request: <remote-adresse>` pro HTTP-Anfrage
//!
//! Geschrieben wird immer am Dateiende. Parallele Schreiber werden ueber
//! einen async Mutex serialisiert, damit Zeilen nicht ineinanderlaufen.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::CoreResult;

/// Zeitstempel-Format im Stil von `date` (z.B. `Mon Jan  2 15:04:05 +01:00 2006`)
pub const ZEITSTEMPEL_FORMAT: &str = "%a %b %e %H:%M:%S %Z %Y";

/// Formatiert einen Zeitstempel fuer das Chat-Log
pub fn zeitstempel_formatieren(zeit: &DateTime<Local>) -> String {
    zeit.format(ZEITSTEMPEL_FORMAT).to_string()
}

/// Append-only Logdatei
#[derive(Debug)]
pub struct Journal {
    pfad: PathBuf,
    datei: Mutex<File>,
}

impl Journal {
    /// Oeffnet (oder erstellt) die Datei im Append-Modus
    pub async fn oeffnen(pfad: impl Into<PathBuf>) -> CoreResult<Self> {
        let pfad = pfad.into();

        // Elternverzeichnis anlegen falls noetig
        if let Some(parent) = pfad.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let datei = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&pfad)
            .await?;

        tracing::debug!(pfad = %pfad.display(), "Journal geoeffnet");
        Ok(Self {
            pfad,
            datei: Mutex::new(datei),
        })
    }

    /// Pfad der Logdatei
    pub fn pfad(&self) -> &Path {
        &self.pfad
    }

    /// Haengt eine Zeile an (Zeilenumbruch wird ergaenzt)
    pub async fn zeile_anhaengen(&self, zeile: &str) -> CoreResult<()> {
        let mut puffer = String::with_capacity(zeile.len() + 1);
        puffer.push_str(zeile);
        puffer.push('\n');

        let mut datei = self.datei.lock().await;
        datei.write_all(puffer.as_bytes()).await?;
        datei.flush().await?;
        Ok(())
    }

    /// Protokolliert eine Servernachricht mit aktuellem Zeitstempel
    pub async fn nachricht_protokollieren(&self, nachricht: &str) -> CoreResult<()> {
        let zeile = format!("{}\t{}", zeitstempel_formatieren(&Local::now()), nachricht);
        self.zeile_anhaengen(&zeile).await
    }

    /// Protokolliert eine eingehende HTTP-Anfrage
    pub async fn anfrage_protokollieren(&self, remote_adresse: &str) -> CoreResult<()> {
        self.zeile_anhaengen(&format!("Request: {remote_adresse}")).await
    }
}
