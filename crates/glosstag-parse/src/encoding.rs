//! Character-encoding detection for corpus files.
//!
//! Release tarballs of the corpus mix UTF-8 and UTF-16 files, some without a
//! BOM. Detection reads a bounded prefix of raw bytes: a BOM wins outright,
//! otherwise a null-byte parity scan catches BOM-less 16-bit text (ASCII-heavy
//! XML keeps one byte of every pair at zero). Anything inconclusive is treated
//! as UTF-8. Decoding never fails: malformed sequences are replaced.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use tracing::debug;

use crate::ParseError;

/// Bytes inspected when sniffing a file.
const SNIFF_LEN: usize = 10 * 1024;

/// Minimum prefix for the parity heuristic to have any signal.
const PARITY_MIN_LEN: usize = 32;

/// Canonical label of a detected encoding. Both byte orders of the 16-bit
/// form collapse into [`TextEncoding::Utf16`]; the decoder resolves
/// endianness.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextEncoding {
    Utf8,
    Utf16,
}

impl TextEncoding {
    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Utf16 => "UTF-16",
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn sniff(bytes: &[u8]) -> (TextEncoding, &'static Encoding) {
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return (TextEncoding::Utf16, UTF_16LE);
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return (TextEncoding::Utf16, UTF_16BE);
    }
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return (TextEncoding::Utf8, UTF_8);
    }
    if bytes.len() >= PARITY_MIN_LEN {
        let even_nulls = bytes.iter().step_by(2).filter(|&&b| b == 0).count();
        let odd_nulls = bytes.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
        let even_total = bytes.len() - bytes.len() / 2;
        let odd_total = bytes.len() / 2;
        if odd_nulls * 2 > odd_total && even_nulls * 10 < even_total {
            return (TextEncoding::Utf16, UTF_16LE);
        }
        if even_nulls * 2 > even_total && odd_nulls * 10 < odd_total {
            return (TextEncoding::Utf16, UTF_16BE);
        }
    }
    (TextEncoding::Utf8, UTF_8)
}

/// Best-guess encoding of a file, from a bounded prefix.
///
/// An unreadable or empty file reports UTF-8.
pub fn detect_encoding(path: &Path) -> TextEncoding {
    let mut buf = [0u8; SNIFF_LEN];
    let n = File::open(path)
        .and_then(|mut f| f.read(&mut buf))
        .unwrap_or(0);
    sniff(&buf[..n]).0
}

/// Read a whole file and decode it with the detected encoding.
///
/// Malformed sequences are replaced rather than raised; only the initial
/// read can fail.
pub fn read_text(path: &Path) -> Result<(String, TextEncoding), ParseError> {
    let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let prefix = &bytes[..bytes.len().min(SNIFF_LEN)];
    let (label, encoding) = sniff(prefix);
    let (text, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        debug!(
            "{}: replaced malformed {} sequences while decoding",
            path.display(),
            label
        );
    }
    Ok((text.into_owned(), label))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn utf16le(text: &str, bom: bool) -> Vec<u8> {
        let mut out = Vec::new();
        if bom {
            out.extend_from_slice(&[0xFF, 0xFE]);
        }
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    fn utf16be(text: &str, bom: bool) -> Vec<u8> {
        let mut out = Vec::new();
        if bom {
            out.extend_from_slice(&[0xFE, 0xFF]);
        }
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_be_bytes());
        }
        out
    }

    #[test]
    fn boms_win() {
        assert_eq!(sniff(&[0xFF, 0xFE, b'a', 0]).0, TextEncoding::Utf16);
        assert_eq!(sniff(&[0xFE, 0xFF, 0, b'a']).0, TextEncoding::Utf16);
        assert_eq!(sniff(&[0xEF, 0xBB, 0xBF, b'a']).0, TextEncoding::Utf8);
    }

    #[test]
    fn parity_detects_bomless_utf16() {
        let xml = "<?xml version=\"1.0\"?><synset id=\"n00001740\"/>";
        assert_eq!(sniff(&utf16le(xml, false)).0, TextEncoding::Utf16);
        assert_eq!(sniff(&utf16be(xml, false)).0, TextEncoding::Utf16);
    }

    #[test]
    fn defaults_to_utf8() {
        assert_eq!(sniff(b"").0, TextEncoding::Utf8);
        assert_eq!(sniff(b"<a/>").0, TextEncoding::Utf8);
        let long = "plain ascii text that is long enough for the parity scan";
        assert_eq!(sniff(long.as_bytes()).0, TextEncoding::Utf8);
    }

    #[test]
    fn detect_encoding_reads_prefix() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&utf16le("<doc>entity</doc>", true)).unwrap();
        assert_eq!(detect_encoding(file.path()), TextEncoding::Utf16);
        assert_eq!(detect_encoding(Path::new("/no/such/file")), TextEncoding::Utf8);
    }

    #[test]
    fn read_text_decodes_utf16_variants() {
        for bytes in [
            utf16le("<doc>entity</doc>", true),
            utf16le("<doc>entity</doc>", false),
            utf16be("<doc>entity</doc>", true),
        ] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(&bytes).unwrap();
            let (text, label) = read_text(file.path()).unwrap();
            assert_eq!(text, "<doc>entity</doc>");
            assert_eq!(label, TextEncoding::Utf16);
        }
    }

    #[test]
    fn read_text_passes_utf8_through() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all("<doc>caf\u{e9}</doc>".as_bytes()).unwrap();
        let (text, label) = read_text(file.path()).unwrap();
        assert_eq!(text, "<doc>caf\u{e9}</doc>");
        assert_eq!(label, TextEncoding::Utf8);
    }
}
