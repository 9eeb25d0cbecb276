//! Format sniffing: text encoding and field delimiter.
//!
//! Census releases are delimited text in a single-byte legacy encoding, but
//! the delimiter has flipped between semicolon and comma across years. The
//! sniffer inspects a small prefix of the raw bytes and guesses; a wrong
//! guess degrades downstream results (typically to all-empty aggregates), it
//! never crashes the pipeline.

use std::borrow::Cow;

use encoding_rs::{Encoding, WINDOWS_1252};

/// How many raw bytes the sniffer looks at.
pub const SAMPLE_LEN: usize = 4096;

/// Sniffed input conventions for one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SniffResult {
    pub encoding: &'static Encoding,
    pub delimiter: u8,
}

impl SniffResult {
    pub fn delimiter_char(&self) -> char {
        self.delimiter as char
    }
}

/// Guess `(encoding, delimiter)` from a raw byte sample. Pure function.
///
/// Delimiter policy: prefer `;` over `,` when the sample contains at least one
/// semicolon, otherwise `,`. The encoding is the fixed Latin-1 family
/// convention of the census exports (decoded through the WINDOWS-1252
/// superset), not auto-detected from byte patterns.
pub fn sniff(sample: &[u8]) -> SniffResult {
    let delimiter = if sample.contains(&b';') { b';' } else { b',' };
    SniffResult {
        encoding: WINDOWS_1252,
        delimiter,
    }
}

/// Decode a raw byte slice with the sniffed encoding.
///
/// Undecodable bytes are substituted with the replacement character so a
/// malformed fragment never aborts ingestion.
pub fn decode<'a>(encoding: &'static Encoding, raw: &'a [u8]) -> Cow<'a, str> {
    let (text, _, _) = encoding.decode(raw);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semicolon_anywhere_in_sample_wins() {
        let sample = b"NU_ANO_CENSO;NO_REGIAO;QT_MAT_ESP\n2021;Norte;5\n";
        assert_eq!(sniff(sample).delimiter, b';');

        // Even a single stray semicolon flips the guess.
        let sample = b"a,b,c\n1,2,x;y\n";
        assert_eq!(sniff(sample).delimiter, b';');
    }

    #[test]
    fn comma_is_the_fallback() {
        let sample = b"NU_ANO_CENSO,NO_REGIAO,QT_MAT_ESP\n2021,Norte,5\n";
        assert_eq!(sniff(sample).delimiter, b',');
        assert_eq!(sniff(b"").delimiter, b',');
    }

    #[test]
    fn latin1_bytes_decode_without_error() {
        // "REGIÃO" in Latin-1: 0xC3 is a valid WINDOWS-1252 byte.
        let raw = b"REGI\xC3O";
        let text = decode(WINDOWS_1252, raw);
        assert_eq!(text, "REGIÃO");
    }

    #[test]
    fn any_byte_sequence_decodes_without_aborting() {
        // Every single-byte value must come back as some character; malformed
        // fragments degrade, they never abort ingestion.
        let raw: Vec<u8> = (0u8..=255).collect();
        let text = decode(WINDOWS_1252, &raw);
        assert_eq!(text.chars().count(), 256);
    }
}
