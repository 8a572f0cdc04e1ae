//! Ordered byte-array keys with meta-key sentinels
//!
//! The key domain is a totally ordered set of concrete byte strings with two
//! designated infinity endpoints, `First` and `Last`, which are accepted as
//! range bounds but never stored. `Any` is a predicate sentinel comparing
//! equal to every non-null key; `Null` is strictly least. The full
//! comparison table:
//!
//! | left \ right | Null | Any | First | Last | concrete |
//! |--------------|------|-----|-------|------|----------|
//! | Null         |  =   |  <  |   <   |  <   |    <     |
//! | Any          |  >   |  =  |   =   |  =   |    =     |
//! | First        |  >   |  =  |   =   |  <   |    <     |
//! | Last         |  >   |  =  |   >   |  =   |    >     |
//!
//! Concrete keys compare by unsigned lexicographic byte order.

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Key {
    /// Strictly least; never stored.
    Null,
    /// Compares equal to every non-null key; never stored.
    Any,
    /// Lower infinity endpoint for ranges.
    First,
    /// Upper infinity endpoint for ranges.
    Last,
    /// A concrete byte-array key.
    Bytes(Bytes),
}

impl Key {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Key::Bytes(bytes.into())
    }

    /// Big-endian four-byte key.
    pub fn from_u32(value: u32) -> Self {
        Key::Bytes(Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    /// Big-endian eight-byte key.
    pub fn from_u64(value: u64) -> Self {
        Key::Bytes(Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    /// Parse a concrete key from hex, two digits per byte.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() % 2 != 0 {
            return Err(Error::InvalidHex(hex.to_string()));
        }
        let mut raw = Vec::with_capacity(hex.len() / 2);
        for i in (0..hex.len()).step_by(2) {
            let byte = u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| Error::InvalidHex(hex.to_string()))?;
            raw.push(byte);
        }
        Ok(Key::Bytes(raw.into()))
    }

    /// Build a composite key from parts using a length-prefixed encoding:
    /// each part is written as a big-endian u32 length followed by its bytes.
    pub fn join(parts: &[&[u8]]) -> Self {
        let total: usize = parts.iter().map(|p| 4 + p.len()).sum();
        let mut out = Vec::with_capacity(total);
        for part in parts {
            out.extend_from_slice(&(part.len() as u32).to_be_bytes());
            out.extend_from_slice(part);
        }
        Key::Bytes(out.into())
    }

    /// Split a composite key produced by [`Key::join`] back into its parts.
    pub fn split(&self) -> Result<Vec<Bytes>> {
        let bytes = self.as_bytes().ok_or(Error::NotConcrete)?;
        let mut parts = Vec::new();
        let mut at = 0usize;
        while at < bytes.len() {
            if at + 4 > bytes.len() {
                return Err(Error::MalformedComposite);
            }
            let len = u32::from_be_bytes(bytes[at..at + 4].try_into().unwrap()) as usize;
            at += 4;
            if at + len > bytes.len() {
                return Err(Error::MalformedComposite);
            }
            parts.push(Bytes::copy_from_slice(&bytes[at..at + len]));
            at += len;
        }
        Ok(parts)
    }

    /// The raw bytes of a concrete key, or `None` for sentinels.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Key::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Key::Null)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Key::Any)
    }

    pub fn is_first(&self) -> bool {
        matches!(self, Key::First)
    }

    pub fn is_last(&self) -> bool {
        matches!(self, Key::Last)
    }

    /// A range endpoint sentinel: `First` or `Last`.
    pub fn is_meta(&self) -> bool {
        matches!(self, Key::First | Key::Last)
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Key::Bytes(_))
    }

    /// The single comparison function the table above specifies; `Ord` and
    /// `PartialEq` both delegate here.
    pub fn compare(&self, other: &Key) -> Ordering {
        use Key::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Any, _) | (_, Any) => Ordering::Equal,
            (First, First) => Ordering::Equal,
            (First, _) => Ordering::Less,
            (_, First) => Ordering::Greater,
            (Last, Last) => Ordering::Equal,
            (Last, _) => Ordering::Greater,
            (_, Last) => Ordering::Less,
            (Bytes(a), Bytes(b)) => a.as_ref().cmp(b.as_ref()),
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Only concrete keys are stored in keyed containers; sentinels hash
        // by discriminant.
        match self {
            Key::Null => state.write_u8(0),
            Key::Any => state.write_u8(1),
            Key::First => state.write_u8(2),
            Key::Last => state.write_u8(3),
            Key::Bytes(bytes) => {
                state.write_u8(4);
                state.write(bytes);
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Null => write!(f, "<null>"),
            Key::Any => write!(f, "<any>"),
            Key::First => write!(f, "<first>"),
            Key::Last => write!(f, "<last>"),
            Key::Bytes(bytes) => {
                for byte in bytes.iter() {
                    write!(f, "{:02X}", byte)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_table() {
        use Ordering::*;
        let concrete = Key::from_u32(7);
        let rows = [
            (Key::Null, Key::Null, Equal),
            (Key::Null, Key::Any, Less),
            (Key::Null, Key::First, Less),
            (Key::Null, Key::Last, Less),
            (Key::Null, concrete.clone(), Less),
            (Key::Any, Key::Null, Greater),
            (Key::Any, Key::Any, Equal),
            (Key::Any, Key::First, Equal),
            (Key::Any, Key::Last, Equal),
            (Key::Any, concrete.clone(), Equal),
            (Key::First, Key::Null, Greater),
            (Key::First, Key::Any, Equal),
            (Key::First, Key::First, Equal),
            (Key::First, Key::Last, Less),
            (Key::First, concrete.clone(), Less),
            (Key::Last, Key::Null, Greater),
            (Key::Last, Key::Any, Equal),
            (Key::Last, Key::First, Greater),
            (Key::Last, Key::Last, Equal),
            (Key::Last, concrete.clone(), Greater),
        ];
        for (left, right, expected) in rows {
            assert_eq!(left.compare(&right), expected, "{} vs {}", left, right);
        }
    }

    #[test]
    fn test_concrete_lexicographic_order() {
        let a = Key::from_bytes(vec![0x01]);
        let b = Key::from_bytes(vec![0x01, 0x00]);
        let c = Key::from_bytes(vec![0x02]);
        let d = Key::from_bytes(vec![0xFF]);
        assert!(a < b);
        assert!(b < c);
        assert!(c < d);
        // Unsigned comparison: 0xFF sorts above 0x02.
        assert!(d > c);
    }

    #[test]
    fn test_sentinels_bracket_concrete_keys() {
        let k = Key::from_u64(u64::MAX);
        assert!(Key::First < k);
        assert!(k < Key::Last);
        assert!(Key::Null < Key::First);
    }

    #[test]
    fn test_equality_follows_table() {
        let k = Key::from_u32(1);
        assert_eq!(Key::Any, k);
        assert_eq!(Key::Any, Key::First);
        assert_ne!(Key::Null, Key::Any);
        assert_ne!(Key::First, Key::Last);
        assert_eq!(k, Key::from_u32(1));
    }

    #[test]
    fn test_hex_roundtrip() {
        let k = Key::from_hex("00FF10").unwrap();
        assert_eq!(k.to_string(), "00FF10");
        assert!(Key::from_hex("0F0").is_err());
        assert!(Key::from_hex("GG").is_err());
    }

    #[test]
    fn test_join_split() {
        let k = Key::join(&[b"user".as_slice(), b"", b"42"]);
        let parts = k.split().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].as_ref(), b"user");
        assert_eq!(parts[1].as_ref(), b"");
        assert_eq!(parts[2].as_ref(), b"42");
    }

    #[test]
    fn test_split_rejects_truncated() {
        let k = Key::from_bytes(vec![0, 0, 0, 9, 1, 2]);
        assert_eq!(k.split(), Err(Error::MalformedComposite));
        assert_eq!(Key::First.split(), Err(Error::NotConcrete));
    }
}
