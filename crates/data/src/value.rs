//! Byte-array values with null/any sentinels
//!
//! Values follow the same sentinel conventions as keys, minus the range
//! endpoints: `Null` is strictly least and `Any` compares equal to every
//! non-null value. Concrete values are unsigned byte strings.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Absent value; strictly least. Reads of deleted keys produce this.
    Null,
    /// Predicate sentinel comparing equal to every non-null value.
    Any,
    /// A concrete byte-array value.
    Bytes(Bytes),
}

impl Value {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Value::Bytes(bytes.into())
    }

    pub fn from_u32(value: u32) -> Self {
        Value::Bytes(Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    pub fn from_u64(value: u64) -> Self {
        Value::Bytes(Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Value::Any)
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Value::Bytes(_))
    }

    pub fn compare(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Any, _) | (_, Any) => Ordering::Equal,
            (Bytes(a), Bytes(b)) => a.as_ref().cmp(b.as_ref()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "<null>"),
            Value::Any => write!(f, "<any>"),
            Value::Bytes(bytes) => {
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
    fn test_sentinel_comparisons() {
        let v = Value::from_u32(5);
        assert!(Value::Null < v);
        assert!(Value::Null < Value::Any);
        assert_eq!(Value::Any, v);
        assert_ne!(Value::Null, v);
        assert_eq!(v, Value::from_u32(5));
    }

    #[test]
    fn test_lexicographic_order() {
        let a = Value::from_bytes(vec![0x00, 0x01]);
        let b = Value::from_bytes(vec![0x00, 0x02]);
        let c = Value::from_bytes(vec![0x80]);
        assert!(a < b);
        assert!(b < c);
    }
}
