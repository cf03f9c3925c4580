//! # Encoding Module
//!
//! This module converts between the raw bytes on the wire and the text a
//! terminal user types or reads. It supports Hex, UTF-8, ASCII and binary
//! renderings. The connection itself never looks at payloads.

use log::error;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::SerialLinkError;

/// Longest payload prefix shown by [`hex_preview`].
const PREVIEW_BYTES: usize = 32;

static NON_HEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9a-fA-F]").expect("Invalid regex pattern"));

/// serial port data type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// hex digits, separators ignored
    Hex,
    /// utf8 text
    Utf8,
    /// ascii text, other bytes shown as '.'
    Ascii,
    /// space-separated bit groups
    Binary,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Hex => write!(f, "hex"),
            DataType::Utf8 => write!(f, "utf8"),
            DataType::Ascii => write!(f, "ascii"),
            DataType::Binary => write!(f, "binary"),
        }
    }
}

impl FromStr for DataType {
    type Err = SerialLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(DataType::Hex),
            "utf8" | "utf-8" => Ok(DataType::Utf8),
            "ascii" => Ok(DataType::Ascii),
            "binary" | "bin" => Ok(DataType::Binary),
            other => Err(SerialLinkError::encoding(format!(
                "unknown data type '{other}'"
            ))),
        }
    }
}

/// Encodes a string to bytes based on the specified data type.
///
/// # Examples
///
/// ```
/// use serial_link::serial::encoding::{encode_string, DataType};
///
/// let bytes = encode_string("48656C6C6F", DataType::Hex);
/// assert_eq!(bytes, vec![0x48, 0x65, 0x6C, 0x6C, 0x6F]);
///
/// let bytes = encode_string("Hello", DataType::Utf8);
/// assert_eq!(bytes, vec![72, 101, 108, 108, 111]);
/// ```
#[must_use]
pub fn encode_string(source_data: &str, data_type: DataType) -> Vec<u8> {
    match data_type {
        DataType::Hex => encode_hex(source_data),
        DataType::Utf8 | DataType::Ascii | DataType::Binary => source_data.as_bytes().to_vec(),
    }
}

/// Decodes bytes to a string based on the specified data type.
///
/// # Examples
///
/// ```
/// use serial_link::serial::encoding::{decode_bytes, DataType};
///
/// let text = decode_bytes(&[0x48, 0x65, 0x6C, 0x6C, 0x6F], DataType::Hex);
/// assert_eq!(text, "48656c6c6f");
///
/// let text = decode_bytes(&[72, 101, 108, 108, 111], DataType::Utf8);
/// assert_eq!(text, "Hello");
/// ```
#[must_use]
pub fn decode_bytes(source_data: &[u8], data_type: DataType) -> String {
    match data_type {
        DataType::Hex => hex::encode(source_data),
        DataType::Utf8 => String::from_utf8_lossy(source_data).replace('\u{FFFD}', "❓"),
        DataType::Ascii => source_data
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect(),
        DataType::Binary => source_data
            .iter()
            .map(|b| format!("{:08b}", b))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Short hex rendering of a payload for log lines.
#[must_use]
pub fn hex_preview(bytes: &[u8]) -> String {
    if bytes.len() <= PREVIEW_BYTES {
        hex::encode(bytes)
    } else {
        format!(
            "{}… (+{} bytes)",
            hex::encode(&bytes[..PREVIEW_BYTES]),
            bytes.len() - PREVIEW_BYTES
        )
    }
}

/// Encodes a hex string to bytes.
///
/// This function removes all non-hex characters and pads with a leading zero
/// if the string has an odd length.
fn encode_hex(source_data: &str) -> Vec<u8> {
    let hex_str = NON_HEX.replace_all(source_data, "");

    let cleaned_hex = if !hex_str.len().is_multiple_of(2) {
        format!("0{hex_str}")
    } else {
        hex_str.to_string()
    };

    match hex::decode(&cleaned_hex) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!("Hex encoding error: {err}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_hex_simple() {
        let result = encode_string("48656C6C6F", DataType::Hex);
        assert_eq!(result, vec![0x48, 0x65, 0x6C, 0x6C, 0x6F]);
    }

    #[test]
    fn test_encode_hex_with_separators() {
        let result = encode_string("48 65:6C-6C 6F", DataType::Hex);
        assert_eq!(result, vec![0x48, 0x65, 0x6C, 0x6C, 0x6F]);
    }

    #[test]
    fn test_encode_hex_odd_length() {
        let result = encode_string("F", DataType::Hex);
        assert_eq!(result, vec![0x0F]);
    }

    #[test]
    fn test_encode_hex_empty() {
        assert!(encode_string("  ", DataType::Hex).is_empty());
    }

    #[test]
    fn test_decode_utf8_invalid() {
        let result = decode_bytes(&[0xFF, 0xFE], DataType::Utf8);
        assert!(result.contains('❓'));
    }

    #[test]
    fn test_decode_ascii_masks_control_bytes() {
        assert_eq!(decode_bytes(b"OK\r\n\x80", DataType::Ascii), "OK...");
    }

    #[test]
    fn test_decode_binary() {
        assert_eq!(decode_bytes(&[1, 0x80], DataType::Binary), "00000001 10000000");
    }

    #[test]
    fn test_hex_preview_truncates() {
        assert_eq!(hex_preview(&[0x41, 0x42]), "4142");
        let long = vec![0u8; PREVIEW_BYTES + 3];
        let preview = hex_preview(&long);
        assert!(preview.ends_with("(+3 bytes)"));
        assert!(preview.starts_with(&"00".repeat(PREVIEW_BYTES)));
    }

    #[test]
    fn test_data_type_from_str() {
        assert_eq!("HEX".parse::<DataType>().unwrap(), DataType::Hex);
        assert_eq!("utf-8".parse::<DataType>().unwrap(), DataType::Utf8);
        assert_eq!("bin".parse::<DataType>().unwrap(), DataType::Binary);
        assert!(matches!(
            "gbk".parse::<DataType>(),
            Err(SerialLinkError::Encoding(_))
        ));
    }
}
