//! Transaction identifier as a fixed-width byte string
//!
//! Transaction IDs are opaque big-endian byte sequences of 4, 8, 16, or
//! 20 bytes, decoded by length. Equality and ordering derive from the byte
//! sequence, so IDs of different widths still compare deterministically
//! (unsigned lexicographic order).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Maximum supported identifier width in bytes.
const MAX_LEN: usize = 20;

/// The widths a transaction identifier may have on the wire.
const SUPPORTED_LENGTHS: [usize; 4] = [4, 8, 16, 20];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unsupported transaction id length: {0} (expected 4, 8, 16, or 20)")]
    UnsupportedLength(usize),

    #[error("invalid hex transaction id: {0}")]
    InvalidHex(String),
}

/// Immutable fixed-width transaction identifier.
///
/// The identifier is stored zero-padded in a fixed buffer so that derived
/// equality and hashing are stable across equal values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId {
    len: u8,
    bytes: [u8; MAX_LEN],
}

impl TransactionId {
    /// Decode an identifier from its raw big-endian byte representation.
    /// The width is determined by the slice length.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, Error> {
        if !SUPPORTED_LENGTHS.contains(&raw.len()) {
            return Err(Error::UnsupportedLength(raw.len()));
        }
        let mut bytes = [0u8; MAX_LEN];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            len: raw.len() as u8,
            bytes,
        })
    }

    /// Shorthand for the common eight-byte identifier.
    pub fn from_u64(value: u64) -> Self {
        Self::from_bytes(&value.to_be_bytes()).expect("eight bytes is a supported width")
    }

    /// Shorthand for a four-byte identifier.
    pub fn from_u32(value: u32) -> Self {
        Self::from_bytes(&value.to_be_bytes()).expect("four bytes is a supported width")
    }

    /// Parse an identifier from uppercase or lowercase hex without separators.
    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        if hex.len() % 2 != 0 {
            return Err(Error::InvalidHex(hex.to_string()));
        }
        let mut raw = Vec::with_capacity(hex.len() / 2);
        for i in (0..hex.len()).step_by(2) {
            let byte = u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| Error::InvalidHex(hex.to_string()))?;
            raw.push(byte);
        }
        Self::from_bytes(&raw)
    }

    /// The identifier's byte representation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Width in bytes (4, 8, 16, or 20).
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Check whether the identifier occupies `buf[offset..offset + len]`.
    pub fn matches_at(&self, buf: &[u8], offset: usize) -> bool {
        buf.len() >= offset + self.len() && &buf[offset..offset + self.len()] == self.as_bytes()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.as_bytes() {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl PartialOrd for TransactionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TransactionId {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lexicographic comparison of the raw bytes; a shorter id that is a
        // prefix of a longer one orders first.
        self.as_bytes().cmp(other.as_bytes())
    }
}
