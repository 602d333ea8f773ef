//! Structured Logging via tracing-subscriber
//!
//! Umgebungsvariablen haben Vorrang vor der Config-Datei:
//! - `TSRELAY_LOG_LEVEL`: Level oder vollstaendige Filter-Direktive
//! - `TSRELAY_LOG_FORMAT`: `text` oder `json`

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "TSRELAY_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "TSRELAY_LOG_FORMAT";

/// hyper und tungstenite loggen jeden Frame auf debug
const LEISE_ABHAENGIGKEITEN: &[&str] = &["hyper=warn", "tungstenite=warn", "tokio_tungstenite=warn"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parsen(format: &str) -> Option<Self> {
        match format {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Baut den Filter: zuerst die Umgebung, dann das konfigurierte Level
pub fn filter_bauen(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_env(ENV_LOG_LEVEL) {
        return filter;
    }

    let mut filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    for direktive in LEISE_ABHAENGIGKEITEN {
        if let Ok(d) = direktive.parse() {
            filter = filter.add_directive(d);
        }
    }
    filter
}

/// Initialisiert das Logging-System. Nur einmal pro Prozess aufrufen.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = filter_bauen(level);
    let format = std::env::var(ENV_LOG_FORMAT)
        .ok()
        .and_then(|f| LogFormat::parsen(&f))
        .or_else(|| LogFormat::parsen(format))
        .unwrap_or(LogFormat::Text);

    match format {
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_current_span(true)
                .init();
        }
        LogFormat::Text => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

pub fn log_format_gueltig(format: &str) -> bool {
    LogFormat::parsen(format).is_some()
}
