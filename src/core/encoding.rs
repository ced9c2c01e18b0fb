//! Text encoding detection for authentication files.
//!
//! Files written by PowerShell or some Windows editors are UTF-16, with or
//! without a byte-order mark. Everything is transcoded to UTF-8 before it
//! reaches the YAML parser.

use tracing::trace;

use crate::error::{ConfigError, Result};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Detected input encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
}

/// Detect the encoding of `bytes`.
///
/// Returns the encoding and the number of BOM bytes to skip. Without a
/// BOM, the first code unit decides: `XX 00` is little-endian UTF-16,
/// `00 XX` is big-endian, anything else is UTF-8.
pub fn detect(bytes: &[u8]) -> (Encoding, usize) {
    if bytes.starts_with(UTF8_BOM) {
        return (Encoding::Utf8, UTF8_BOM.len());
    }
    if bytes.starts_with(UTF16_LE_BOM) {
        return (Encoding::Utf16Le, UTF16_LE_BOM.len());
    }
    if bytes.starts_with(UTF16_BE_BOM) {
        return (Encoding::Utf16Be, UTF16_BE_BOM.len());
    }

    match bytes {
        [a, 0, ..] if *a != 0 && bytes.len() % 2 == 0 => (Encoding::Utf16Le, 0),
        [0, b, ..] if *b != 0 && bytes.len() % 2 == 0 => (Encoding::Utf16Be, 0),
        _ => (Encoding::Utf8, 0),
    }
}

/// Decode authentication file bytes into UTF-8 text.
///
/// # Errors
///
/// Returns `ConfigError::Decode` for truncated or malformed UTF-16 and for
/// invalid UTF-8.
pub fn decode(bytes: &[u8]) -> Result<String> {
    let (encoding, skip) = detect(bytes);
    let body = &bytes[skip..];
    trace!(?encoding, len = body.len(), "decoding authentication file");

    match encoding {
        Encoding::Utf8 => String::from_utf8(body.to_vec())
            .map_err(|e| ConfigError::Decode(format!("invalid UTF-8: {}", e)).into()),
        Encoding::Utf16Le => decode_utf16(body, u16::from_le_bytes),
        Encoding::Utf16Be => decode_utf16(body, u16::from_be_bytes),
    }
}

fn decode_utf16(body: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String> {
    if body.len() % 2 != 0 {
        return Err(ConfigError::Decode(format!(
            "truncated UTF-16 input: {} bytes is not a whole number of code units",
            body.len()
        ))
        .into());
    }

    let units = body.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|e| ConfigError::Decode(format!("invalid UTF-16: {}", e)).into())
}
