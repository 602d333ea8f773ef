//! Zeilen-Codec fuer ServerQuery-Verbindungen
//!
//! Der Server terminiert jede Zeile mit `\n\r`. Ein Standard-Zeilenleser
//! (`\n`) wuerde das `\r` an den Anfang der naechsten Zeile haengen, deshalb
//! wird hier eigens getrennt.
//!
//! ## Trennregel
//!
//! ```text
//! kein \n\r, Stream offen        -> mehr Daten noetig
//! kein \n\r, Stream am Ende      -> Rest als letztes Token
//! \n\r an Position i             -> Token data[..i], Vorschub i + 2
//! ```
//!
//! Das Token enthaelt den Trenner nie; das Token am Stream-Ende enthaelt
//! alles was noch im Puffer liegt.

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Zeilentrenner der eingehenden Richtung
pub const ZEILENTRENNER: &[u8; 2] = b"\n\r";

/// Standard-maximale Zeilenlaenge (10 MB)
pub const DEFAULT_MAX_ZEILENLAENGE: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Trennfunktion
// ---------------------------------------------------------------------------

/// Ergebnis eines Trennversuchs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teilung<'a> {
    /// Noch kein vollstaendiges Token (oder leerer Puffer am Stream-Ende)
    MehrDaten,
    /// Token gefunden; `vorschub` Bytes aus dem Puffer verbrauchen
    Token { vorschub: usize, token: &'a [u8] },
}

/// Sucht das naechste Token in `data`
pub fn zeile_teilen(data: &[u8], am_ende: bool) -> Teilung<'_> {
    if am_ende && data.is_empty() {
        return Teilung::MehrDaten;
    }

    if let Some(i) = data.windows(2).position(|w| w == ZEILENTRENNER) {
        return Teilung::Token {
            vorschub: i + 2,
            token: &data[..i],
        };
    }

    if am_ende {
        return Teilung::Token {
            vorschub: data.len(),
            token: data,
        };
    }

    Teilung::MehrDaten
}

// ---------------------------------------------------------------------------
// LineCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer ServerQuery-Verbindungen
///
/// Dekodiert `\n\r`-terminierte Zeilen als `String` (ungueltiges UTF-8 wird
/// ersetzt) und kodiert ausgehende Befehle mit `\n`.
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use tsrelay_protocol::LineCodec;
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, LineCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_zeilenlaenge: usize,
}

impl LineCodec {
    /// Erstellt einen neuen `LineCodec` mit Standard-Limit
    pub fn new() -> Self {
        Self {
            max_zeilenlaenge: DEFAULT_MAX_ZEILENLAENGE,
        }
    }

    /// Erstellt einen `LineCodec` mit benutzerdefinierter maximaler Zeilenlaenge
    pub fn with_max_length(max_zeilenlaenge: usize) -> Self {
        Self { max_zeilenlaenge }
    }

    pub fn max_zeilenlaenge(&self) -> usize {
        self.max_zeilenlaenge
    }

    fn token_entnehmen(&self, src: &mut BytesMut, am_ende: bool) -> io::Result<Option<String>> {
        match zeile_teilen(&src[..], am_ende) {
            Teilung::Token { vorschub, token } => {
                let zeile = String::from_utf8_lossy(token).into_owned();
                src.advance(vorschub);
                Ok(Some(zeile))
            }
            Teilung::MehrDaten if src.len() > self.max_zeilenlaenge => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Zeile zu lang: {} Bytes ohne Trenner (Maximum: {} Bytes)",
                    src.len(),
                    self.max_zeilenlaenge
                ),
            )),
            Teilung::MehrDaten => Ok(None),
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.token_entnehmen(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.token_entnehmen(src, true)
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = io::Error;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let zeile = item.as_ref();

        // Ein Zeilenumbruch im Befehl wuerde einen zweiten Befehl einschleusen
        if zeile.contains(|c| c == '\n' || c == '\r') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Befehl enthaelt Zeilenumbruch",
            ));
        }

        dst.reserve(zeile.len() + 1);
        dst.put_slice(zeile.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
