//! Escaping von Werten im ServerQuery-Format
//!
//! Leerzeichen trennen Parameter, `|` trennt Datensaetze. Beides muss in
//! Werten escaped werden:
//!   `\s` = Leerzeichen, `\p` = Pipe, `\/` = Slash, `\\` = Backslash,
//!   `\n` `\r` `\t` `\v` `\f` `\a` `\b` = Steuerzeichen

/// Escape-Token fuer ein Leerzeichen
pub const LEERZEICHEN_ESCAPE: &str = "\\s";

/// Kodiert einen Wert fuer die Ausgabe (Escape-Sequenzen einfuegen)
pub fn encode_value(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '/' => result.push_str("\\/"),
            ' ' => result.push_str(LEERZEICHEN_ESCAPE),
            '|' => result.push_str("\\p"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\x0b' => result.push_str("\\v"),
            '\x0c' => result.push_str("\\f"),
            '\x07' => result.push_str("\\a"),
            '\x08' => result.push_str("\\b"),
            other => result.push(other),
        }
    }
    result
}

/// Dekodiert Escape-Sequenzen in einem Wert-String
pub fn decode_value(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => result.push(' '),
            Some('p') => result.push('|'),
            Some('/') => result.push('/'),
            Some('\\') => result.push('\\'),
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some('v') => result.push('\x0b'),
            Some('f') => result.push('\x0c'),
            Some('a') => result.push('\x07'),
            Some('b') => result.push('\x08'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }

    result
}

/// Bereitet eine Chat-Nachricht fuer `gm msg=...` vor
///
/// Trennt an Leerraum, verwirft leere Woerter, escaped jedes Wort und fuegt
/// sie mit `\s` zusammen. Bleibt nichts uebrig, gibt es `None` und es wird
/// nichts gesendet.
pub fn nachricht_escapen(text: &str) -> Option<String> {
    let woerter: Vec<String> = text.split_whitespace().map(encode_value).collect();
    if woerter.is_empty() {
        return None;
    }
    Some(woerter.join(LEERZEICHEN_ESCAPE))
}
