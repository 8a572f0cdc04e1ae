//! Persistent storage over a fjall keyspace
//!
//! Keys and values are stored as their raw byte representations in a single
//! partition; the partition's byte order coincides with the key domain's
//! unsigned lexicographic order, so `next`/`previous` are range scans.

use crate::{Error, InitializableStorage, Result, Storage};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use monokv_data::{Key, Value};
use std::ops::Bound;
use std::path::Path;

pub struct DiskStorage {
    keyspace: Keyspace,
    data: PartitionHandle,
}

impl DiskStorage {
    pub fn open(path: &Path) -> Result<Self> {
        let keyspace = Config::new(path).open()?;
        let data = keyspace.open_partition("data", PartitionCreateOptions::default())?;
        Ok(Self { keyspace, data })
    }

    /// Flush and sync everything to disk.
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn storable_key(key: &Key) -> Result<&[u8]> {
        key.as_bytes().ok_or_else(|| Error::InvalidKey(key.clone()))
    }
}

impl Storage for DiskStorage {
    fn exists(&self, key: &Key) -> Result<bool> {
        if key.is_any() {
            return Ok(!self.data.is_empty()?);
        }
        if !key.is_concrete() {
            return Ok(false);
        }
        Ok(self.data.contains_key(Self::storable_key(key)?)?)
    }

    fn read(&self, key: &Key) -> Result<Option<Value>> {
        if !key.is_concrete() {
            return Ok(None);
        }
        let slice = self.data.get(Self::storable_key(key)?)?;
        Ok(slice.map(|bytes| Value::from_bytes(bytes.to_vec())))
    }

    fn next(&self, key: &Key, inclusive: bool) -> Result<Option<Key>> {
        let pair = match key {
            Key::Any | Key::Last => None,
            Key::Null | Key::First => self.data.iter().next().transpose()?,
            Key::Bytes(bytes) => {
                let start = bytes.to_vec();
                if inclusive {
                    self.data.range(start..).next().transpose()?
                } else {
                    self.data
                        .range((Bound::Excluded(start), Bound::Unbounded))
                        .next()
                        .transpose()?
                }
            }
        };
        Ok(pair.map(|(k, _)| Key::from_bytes(k.to_vec())))
    }

    fn previous(&self, key: &Key, inclusive: bool) -> Result<Option<Key>> {
        let pair = match key {
            Key::Any | Key::Null | Key::First => None,
            Key::Last => self.data.iter().next_back().transpose()?,
            Key::Bytes(bytes) => {
                let end = bytes.to_vec();
                if inclusive {
                    self.data.range(..=end).next_back().transpose()?
                } else {
                    self.data
                        .range((Bound::Unbounded, Bound::Excluded(end)))
                        .next_back()
                        .transpose()?
                }
            }
        };
        Ok(pair.map(|(k, _)| Key::from_bytes(k.to_vec())))
    }

    fn write(&mut self, key: &Key, value: Value) -> Result<()> {
        let raw_value = value
            .as_bytes()
            .ok_or_else(|| Error::InvalidValue(value.clone()))?;
        self.data.insert(Self::storable_key(key)?, raw_value)?;
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        self.data.remove(Self::storable_key(key)?)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let keys: Vec<_> = self
            .data
            .iter()
            .map(|pair| pair.map(|(k, _)| k))
            .collect::<std::result::Result<_, _>>()?;
        tracing::debug!("clearing {} persisted entries", keys.len());
        for key in keys {
            self.data.remove(key)?;
        }
        Ok(())
    }
}

impl InitializableStorage for DiskStorage {
    fn load(&mut self, initial: Vec<(Key, Value)>) -> Result<()> {
        for (key, value) in initial {
            self.write(&key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u64) -> Key {
        Key::from_u64(n)
    }

    fn value(n: u64) -> Value {
        Value::from_u64(n)
    }

    #[test]
    fn test_read_write_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::open(dir.path()).unwrap();

        storage.write(&key(1), value(10)).unwrap();
        assert_eq!(storage.read(&key(1)).unwrap(), Some(value(10)));
        assert!(storage.exists(&key(1)).unwrap());
        assert!(storage.exists(&Key::Any).unwrap());

        storage.delete(&key(1)).unwrap();
        assert_eq!(storage.read(&key(1)).unwrap(), None);
    }

    #[test]
    fn test_navigation_matches_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::open(dir.path()).unwrap();
        for n in [10u64, 20, 30] {
            storage.write(&key(n), value(n)).unwrap();
        }

        assert_eq!(storage.next(&Key::First, true).unwrap(), Some(key(10)));
        assert_eq!(storage.next(&key(10), false).unwrap(), Some(key(20)));
        assert_eq!(storage.previous(&Key::Last, true).unwrap(), Some(key(30)));
        assert_eq!(storage.previous(&key(30), false).unwrap(), Some(key(20)));
        assert_eq!(storage.next(&Key::Last, true).unwrap(), None);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut storage = DiskStorage::open(dir.path()).unwrap();
            storage.write(&key(7), value(77)).unwrap();
            storage.persist().unwrap();
        }
        let storage = DiskStorage::open(dir.path()).unwrap();
        assert_eq!(storage.read(&key(7)).unwrap(), Some(value(77)));
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::open(dir.path()).unwrap();
        for n in 0..10u64 {
            storage.write(&key(n), value(n)).unwrap();
        }
        storage.clear().unwrap();
        assert!(!storage.exists(&Key::Any).unwrap());
    }

    #[test]
    fn test_rejects_sentinels() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = DiskStorage::open(dir.path()).unwrap();
        assert!(storage.write(&Key::First, value(1)).is_err());
        assert!(storage.write(&key(1), Value::Null).is_err());
        assert_eq!(storage.read(&Key::Last).unwrap(), None);
    }
}
