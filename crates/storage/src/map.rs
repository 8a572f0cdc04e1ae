//! In-memory ordered-map storage
//!
//! Single-threaded, no locking; the lock manager serializes access above
//! this layer.

use crate::{Error, InitializableStorage, Result, Storage};
use monokv_data::{Key, Value};
use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included, Unbounded};

pub struct MapStorage {
    entries: BTreeMap<Key, Value>,
    /// Benchmarking mode: drop writes on the floor to measure the
    /// surrounding machinery without storage cost. Never use for real data.
    fake_writes: bool,
}

impl Default for MapStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MapStorage {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            fake_writes: false,
        }
    }

    /// Benchmarking constructor; see `fake_writes`.
    pub fn with_fake_writes() -> Self {
        Self {
            entries: BTreeMap::new(),
            fake_writes: true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MapStorage {
    fn exists(&self, key: &Key) -> Result<bool> {
        if key.is_any() {
            return Ok(!self.entries.is_empty());
        }
        if !key.is_concrete() {
            return Ok(false);
        }
        Ok(self.entries.contains_key(key))
    }

    fn read(&self, key: &Key) -> Result<Option<Value>> {
        if !key.is_concrete() {
            return Ok(None);
        }
        Ok(self.entries.get(key).cloned())
    }

    fn next(&self, key: &Key, inclusive: bool) -> Result<Option<Key>> {
        let lower = match key {
            Key::Any | Key::Last => return Ok(None),
            Key::Null | Key::First => Unbounded,
            Key::Bytes(_) => {
                if inclusive {
                    Included(key.clone())
                } else {
                    Excluded(key.clone())
                }
            }
        };
        Ok(self
            .entries
            .range((lower, Unbounded))
            .next()
            .map(|(k, _)| k.clone()))
    }

    fn previous(&self, key: &Key, inclusive: bool) -> Result<Option<Key>> {
        let upper = match key {
            Key::Any | Key::Null | Key::First => return Ok(None),
            Key::Last => Unbounded,
            Key::Bytes(_) => {
                if inclusive {
                    Included(key.clone())
                } else {
                    Excluded(key.clone())
                }
            }
        };
        Ok(self
            .entries
            .range((Unbounded, upper))
            .next_back()
            .map(|(k, _)| k.clone()))
    }

    fn write(&mut self, key: &Key, value: Value) -> Result<()> {
        if !key.is_concrete() {
            return Err(Error::InvalidKey(key.clone()));
        }
        if !self.fake_writes {
            self.entries.insert(key.clone(), value);
        }
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        if !key.is_concrete() {
            return Err(Error::InvalidKey(key.clone()));
        }
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

impl InitializableStorage for MapStorage {
    fn load(&mut self, initial: Vec<(Key, Value)>) -> Result<()> {
        for (key, value) in initial {
            if !key.is_concrete() {
                return Err(Error::InvalidKey(key));
            }
            self.entries.insert(key, value);
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
        let mut storage = MapStorage::new();
        assert_eq!(storage.read(&key(1)).unwrap(), None);

        storage.write(&key(1), value(10)).unwrap();
        assert_eq!(storage.read(&key(1)).unwrap(), Some(value(10)));
        assert!(storage.exists(&key(1)).unwrap());

        storage.delete(&key(1)).unwrap();
        assert_eq!(storage.read(&key(1)).unwrap(), None);
    }

    #[test]
    fn test_any_asks_for_emptiness() {
        let mut storage = MapStorage::new();
        assert!(!storage.exists(&Key::Any).unwrap());
        storage.write(&key(1), value(1)).unwrap();
        assert!(storage.exists(&Key::Any).unwrap());
        assert_eq!(storage.read(&Key::Any).unwrap(), None);
    }

    #[test]
    fn test_navigation_with_sentinels() {
        let mut storage = MapStorage::new();
        for n in [10u64, 20, 30] {
            storage.write(&key(n), value(n)).unwrap();
        }

        assert_eq!(storage.next(&Key::First, true).unwrap(), Some(key(10)));
        assert_eq!(storage.previous(&Key::Last, true).unwrap(), Some(key(30)));
        assert_eq!(storage.next(&Key::Last, true).unwrap(), None);
        assert_eq!(storage.previous(&Key::First, true).unwrap(), None);
    }

    #[test]
    fn test_navigation_between_keys() {
        let mut storage = MapStorage::new();
        for n in [10u64, 20, 30] {
            storage.write(&key(n), value(n)).unwrap();
        }

        assert_eq!(storage.next(&key(20), true).unwrap(), Some(key(20)));
        assert_eq!(storage.next(&key(20), false).unwrap(), Some(key(30)));
        assert_eq!(storage.next(&key(15), true).unwrap(), Some(key(20)));
        assert_eq!(storage.previous(&key(20), true).unwrap(), Some(key(20)));
        assert_eq!(storage.previous(&key(20), false).unwrap(), Some(key(10)));
        assert_eq!(storage.previous(&key(5), false).unwrap(), None);
    }

    #[test]
    fn test_rejects_sentinel_writes() {
        let mut storage = MapStorage::new();
        for sentinel in [Key::Null, Key::Any, Key::First, Key::Last] {
            assert!(storage.write(&sentinel, value(1)).is_err());
            assert!(storage.delete(&sentinel).is_err());
        }
    }

    #[test]
    fn test_fake_writes_drop_silently() {
        let mut storage = MapStorage::with_fake_writes();
        storage.write(&key(1), value(1)).unwrap();
        assert_eq!(storage.read(&key(1)).unwrap(), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_load() {
        let mut storage = MapStorage::new();
        storage
            .load(vec![(key(1), value(1)), (key(2), value(2))])
            .unwrap();
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.read(&key(2)).unwrap(), Some(value(2)));
    }
}
