//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist (Zugangsdaten muessen fuer einen echten Sprachserver
//! trotzdem gesetzt werden).

use std::fmt;
use std::time::Duration;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use tsrelay_observability::logging;
use tsrelay_query::{EreignisstromKonfig, Zugangsdaten};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP, WebSocket und statische Dateien
    pub web: WebEinstellungen,
    pub logging: LoggingEinstellungen,
    /// Anmeldedaten fuer den ServerQuery-Port
    pub zugangsdaten: ZugangsdatenEinstellungen,
    /// Periodischer Push der Channel-Belegung
    pub clientliste: ClientlisteEinstellungen,
    /// Server-Chat ueber den Ereignisstrom
    pub servernachrichten: ServernachrichtenEinstellungen,
    /// Weiterleitung von Browser-Chat an den Sprachserver
    pub serververbindung: SerververbindungEinstellungen,
    /// Externes Programm fuer Client-Onlinezeiten
    pub clientzeit: ClientzeitEinstellungen,
    pub motd: MotdEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebEinstellungen {
    pub bind_adresse: String,
    pub port: u16,
    /// Verzeichnis mit `index.html`, `404.html` und Assets
    pub static_verzeichnis: String,
    /// Append-Log mit einer Zeile pro HTTP-Anfrage
    pub verbindungs_log: String,
    /// Zeitlimit pro Subscriber beim Verteilen
    pub sende_timeout_ms: u64,
}

impl Default for WebEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 8081,
            static_verzeichnis: "./static".into(),
            verbindungs_log: "connections.txt".into(),
            sende_timeout_ms: 5000,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZugangsdatenEinstellungen {
    pub benutzer: String,
    pub passwort: String,
    pub adresse: String,
    pub port: u16,
    pub server_id: u32,
    /// Abstand der Lebenszeichen auf der Befehlsverbindung, 0 schaltet ab
    pub keepalive_sek: u64,
}

impl fmt::Debug for ZugangsdatenEinstellungen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZugangsdatenEinstellungen")
            .field("benutzer", &self.benutzer)
            .field("passwort", &"***")
            .field("adresse", &self.adresse)
            .field("port", &self.port)
            .field("server_id", &self.server_id)
            .field("keepalive_sek", &self.keepalive_sek)
            .finish()
    }
}

impl Default for ZugangsdatenEinstellungen {
    fn default() -> Self {
        Self {
            benutzer: "serveradmin".into(),
            passwort: String::new(),
            adresse: "127.0.0.1".into(),
            port: 10011,
            server_id: 1,
            keepalive_sek: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientlisteEinstellungen {
    pub aktiviert: bool,
    pub intervall_sek: u64,
    /// Channel-IDs die nie angezeigt werden
    pub ausgeblendete_channels: Vec<u64>,
}

impl Default for ClientlisteEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            intervall_sek: 5,
            ausgeblendete_channels: vec![98],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServernachrichtenEinstellungen {
    pub aktiviert: bool,
    /// Append-Log `<zeitstempel>\t<nachricht>`
    pub chat_log: String,
    pub keepalive_ms: u64,
    pub wiederverbindung_ms: u64,
}

impl Default for ServernachrichtenEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            chat_log: "chathistory.txt".into(),
            keepalive_ms: 1000,
            wiederverbindung_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerververbindungEinstellungen {
    pub aktiviert: bool,
    /// Browser-Chat auch an alle anderen Subscriber verteilen
    pub chat_echo: bool,
}

impl Default for SerververbindungEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            chat_echo: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientzeitEinstellungen {
    pub aktiviert: bool,
    /// Programm, das `<sekunden>\t<name>` pro Zeile ausgibt
    pub programm: String,
    pub argumente: Vec<String>,
    pub max_eintraege: usize,
}

impl Default for ClientzeitEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: false,
            programm: "./ltc".into(),
            argumente: vec!["./logs".into()],
            max_eintraege: 13,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotdEinstellungen {
    pub aktiviert: bool,
    /// Textdatei mit einem Spruch pro Zeile
    pub datei: String,
}

impl Default for MotdEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            datei: "./static/teamspeaksayings.txt".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    pub bind_adresse: String,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            bind_adresse: "127.0.0.1".into(),
            port: 9300,
        }
    }
}

/// Woher die geladene Konfiguration stammt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigQuelle {
    Datei,
    /// Datei fehlt; der Aufrufer meldet das nach dem Logging-Setup
    Standardwerte,
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<(Self, ConfigQuelle)> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok((config, ConfigQuelle::Datei))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok((Self::default(), ConfigQuelle::Standardwerte))
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Werte, die sich nicht ueber Typen ausdruecken lassen
    pub fn pruefen(&self) -> anyhow::Result<()> {
        if !logging::log_level_gueltig(&self.logging.level) {
            bail!("Unbekanntes Log-Level '{}'", self.logging.level);
        }
        if !logging::log_format_gueltig(&self.logging.format) {
            bail!("Unbekanntes Log-Format '{}'", self.logging.format);
        }
        if self.clientliste.aktiviert && self.clientliste.intervall_sek == 0 {
            bail!("clientliste.intervall_sek muss groesser als 0 sein");
        }
        if self.servernachrichten.aktiviert && self.servernachrichten.keepalive_ms == 0 {
            bail!("servernachrichten.keepalive_ms muss groesser als 0 sein");
        }
        if self.web.sende_timeout_ms == 0 {
            bail!("web.sende_timeout_ms muss groesser als 0 sein");
        }
        if self.clientzeit.aktiviert && self.clientzeit.programm.trim().is_empty() {
            bail!("clientzeit.programm darf nicht leer sein");
        }
        if self.braucht_query_verbindung() && self.zugangsdaten.adresse.trim().is_empty() {
            bail!("zugangsdaten.adresse darf nicht leer sein");
        }
        Ok(())
    }

    /// Roster und Chat-Weiterleitung teilen sich eine Befehlsverbindung
    pub fn braucht_query_verbindung(&self) -> bool {
        self.clientliste.aktiviert || self.serververbindung.aktiviert
    }

    pub fn zugangsdaten(&self) -> Zugangsdaten {
        Zugangsdaten {
            benutzer: self.zugangsdaten.benutzer.clone(),
            passwort: self.zugangsdaten.passwort.clone(),
            adresse: self.zugangsdaten.adresse.clone(),
            port: self.zugangsdaten.port,
            server_id: self.zugangsdaten.server_id,
        }
    }

    /// `None` wenn das Lebenszeichen abgeschaltet ist
    pub fn query_keepalive(&self) -> Option<Duration> {
        (self.zugangsdaten.keepalive_sek > 0)
            .then(|| Duration::from_secs(self.zugangsdaten.keepalive_sek))
    }

    pub fn ereignisstrom_konfig(&self) -> EreignisstromKonfig {
        let mut konfig = EreignisstromKonfig::neu(self.zugangsdaten());
        konfig.keepalive = Duration::from_millis(self.servernachrichten.keepalive_ms);
        konfig.wiederverbindung = Duration::from_millis(self.servernachrichten.wiederverbindung_ms);
        konfig
    }

    /// Gibt die Bind-Adresse fuer HTTP und WebSocket zurueck
    pub fn web_bind_adresse(&self) -> String {
        format!("{}:{}", self.web.bind_adresse, self.web.port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!(
            "{}:{}",
            self.observability.bind_adresse, self.observability.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert!(cfg.pruefen().is_ok());
        assert_eq!(cfg.web.port, 8081);
        assert_eq!(cfg.zugangsdaten.port, 10011);
        assert_eq!(cfg.clientliste.ausgeblendete_channels, vec![98]);
        assert!(!cfg.serververbindung.chat_echo);
        assert!(!cfg.clientzeit.aktiviert);
        assert_eq!(cfg.clientzeit.max_eintraege, 13);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.web_bind_adresse(), "0.0.0.0:8081");
        assert_eq!(cfg.observability_bind_adresse(), "127.0.0.1:9300");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [zugangsdaten]
            benutzer = "relay"
            passwort = "geheim"
            adresse = "ts.example.org"

            [clientliste]
            intervall_sek = 10

            [servernachrichten]
            aktiviert = false
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.zugangsdaten.benutzer, "relay");
        assert_eq!(cfg.clientliste.intervall_sek, 10);
        assert!(!cfg.servernachrichten.aktiviert);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.zugangsdaten.port, 10011);
        assert_eq!(cfg.clientliste.ausgeblendete_channels, vec![98]);

        let zd = cfg.zugangsdaten();
        assert_eq!(zd.ziel(), "ts.example.org:10011");
        assert_eq!(zd.server_id, 1);
    }

    #[test]
    fn ereignisstrom_zeiten_aus_config() {
        let mut cfg = ServerConfig::default();
        cfg.servernachrichten.keepalive_ms = 250;
        cfg.servernachrichten.wiederverbindung_ms = 3000;

        let konfig = cfg.ereignisstrom_konfig();
        assert_eq!(konfig.keepalive, Duration::from_millis(250));
        assert_eq!(konfig.wiederverbindung, Duration::from_secs(3));
    }

    #[test]
    fn null_intervall_wird_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.clientliste.intervall_sek = 0;
        assert!(cfg.pruefen().is_err());

        // Abgeschaltet ist der Wert egal
        cfg.clientliste.aktiviert = false;
        assert!(cfg.pruefen().is_ok());
    }

    #[test]
    fn unbekanntes_log_format_wird_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.pruefen().is_err());
    }

    #[test]
    fn query_verbindung_nur_wenn_gebraucht() {
        let mut cfg = ServerConfig::default();
        assert!(cfg.braucht_query_verbindung());
        cfg.clientliste.aktiviert = false;
        cfg.serververbindung.aktiviert = false;
        assert!(!cfg.braucht_query_verbindung());
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let (cfg, quelle) = ServerConfig::laden("/nicht/vorhanden/config.toml").unwrap();
        assert_eq!(quelle, ConfigQuelle::Standardwerte);
        assert_eq!(cfg.web.port, 8081);
    }

    #[test]
    fn vorhandene_datei_wird_gelesen() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("config.toml");
        std::fs::write(&pfad, "[web]\nport = 9000\n").unwrap();

        let (cfg, quelle) = ServerConfig::laden(pfad.to_str().unwrap()).unwrap();
        assert_eq!(quelle, ConfigQuelle::Datei);
        assert_eq!(cfg.web.port, 9000);
    }

    #[test]
    fn debug_verbirgt_passwort() {
        let mut cfg = ServerConfig::default();
        cfg.zugangsdaten.passwort = "streng-geheim".into();

        let ausgabe = format!("{cfg:?}");
        assert!(!ausgabe.contains("streng-geheim"), "{ausgabe}");
        assert!(ausgabe.contains("serveradmin"));
        assert!(!format!("{:?}", cfg.ereignisstrom_konfig()).contains("streng-geheim"));
    }

    #[test]
    fn query_keepalive_abschaltbar() {
        let mut cfg = ServerConfig::default();
        assert_eq!(cfg.query_keepalive(), Some(Duration::from_secs(60)));
        cfg.zugangsdaten.keepalive_sek = 0;
        assert_eq!(cfg.query_keepalive(), None);
    }

    #[test]
    fn kaputte_datei_ist_fehler() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("config.toml");
        std::fs::write(&pfad, "[web\nport = ").unwrap();
        assert!(ServerConfig::laden(pfad.to_str().unwrap()).is_err());
    }
}
