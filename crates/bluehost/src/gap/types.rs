use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a Bluetooth device address from text
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrParseError {
    #[error("Invalid address length: {0}")]
    InvalidLength(usize),

    #[error("Invalid hex digits in address: {0}")]
    InvalidHex(String),
}

/// A 48-bit Bluetooth device address
///
/// Stored little-endian as it appears on the wire; rendered most-significant
/// byte first, colon separated, as addresses are conventionally printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr {
    pub bytes: [u8; 6],
}

impl BdAddr {
    pub fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() >= 6 {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&slice[0..6]);
            Some(Self { bytes })
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.bytes[5],
            self.bytes[4],
            self.bytes[3],
            self.bytes[2],
            self.bytes[1],
            self.bytes[0]
        )
    }
}

impl FromStr for BdAddr {
    type Err = AddrParseError;

    /// Accepts `"AA:BB:CC:DD:EE:FF"` or bare `"AABBCCDDEEFF"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped: String = s.chars().filter(|c| *c != ':').collect();
        if stripped.len() != 12 {
            return Err(AddrParseError::InvalidLength(stripped.len()));
        }

        let decoded =
            hex::decode(&stripped).map_err(|_| AddrParseError::InvalidHex(s.to_string()))?;

        // Text form is MSB first; storage is wire order (LSB first)
        let mut bytes = [0u8; 6];
        for (i, b) in decoded.iter().enumerate() {
            bytes[5 - i] = *b;
        }
        Ok(Self { bytes })
    }
}
