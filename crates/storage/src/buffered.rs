//! Per-transaction buffered writes over any storage
//!
//! Writes and deletes go into a buffer keyed by the transaction ID and only
//! reach the underlying storage when the transaction finishes with commit.
//! Reads inside the transaction see its own buffered writes; a buffered
//! delete reads as `Value::Null`. Navigation is served by the underlying
//! storage only, so buffered (uncommitted) keys are not visible to
//! `next`/`previous`.

use crate::{Error, InitializableStorage, Result, Storage, TransactionalStorage};
use monokv_common::TransactionId;
use monokv_data::{Key, Value};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct TxBuffer {
    writes: HashMap<Key, Value>,
    deletes: HashSet<Key>,
    cleared: bool,
}

pub struct BufferedStorage<S> {
    inner: S,
    pending: HashMap<TransactionId, TxBuffer>,
    current: Option<TransactionId>,
}

impl<S: Storage> BufferedStorage<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending: HashMap::new(),
            current: None,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn current_buffer(&self) -> Result<&TxBuffer> {
        let tid = self.current.ok_or(Error::NoActiveTransaction)?;
        self.pending
            .get(&tid)
            .ok_or(Error::UnknownTransaction(tid))
    }

    fn current_buffer_mut(&mut self) -> Result<&mut TxBuffer> {
        let tid = self.current.ok_or(Error::NoActiveTransaction)?;
        self.pending
            .get_mut(&tid)
            .ok_or(Error::UnknownTransaction(tid))
    }
}

impl<S: Storage> Storage for BufferedStorage<S> {
    fn exists(&self, key: &Key) -> Result<bool> {
        self.inner.exists(key)
    }

    fn read(&self, key: &Key) -> Result<Option<Value>> {
        let buffer = self.current_buffer()?;
        if buffer.deletes.contains(key) {
            return Ok(Some(Value::Null));
        }
        if let Some(value) = buffer.writes.get(key) {
            return Ok(Some(value.clone()));
        }
        self.inner.read(key)
    }

    fn next(&self, key: &Key, inclusive: bool) -> Result<Option<Key>> {
        self.inner.next(key, inclusive)
    }

    fn previous(&self, key: &Key, inclusive: bool) -> Result<Option<Key>> {
        self.inner.previous(key, inclusive)
    }

    fn write(&mut self, key: &Key, value: Value) -> Result<()> {
        let buffer = self.current_buffer_mut()?;
        buffer.writes.insert(key.clone(), value);
        Ok(())
    }

    fn delete(&mut self, key: &Key) -> Result<()> {
        let buffer = self.current_buffer_mut()?;
        buffer.deletes.insert(key.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let buffer = self.current_buffer_mut()?;
        buffer.cleared = true;
        Ok(())
    }
}

impl<S: Storage> TransactionalStorage for BufferedStorage<S> {
    fn start(&mut self, tid: TransactionId) {
        self.pending.insert(tid, TxBuffer::default());
        self.current = Some(tid);
    }

    fn end(&mut self) {
        self.current = None;
    }

    fn finish(&mut self, tid: TransactionId, commit: bool) -> Result<()> {
        let buffer = self
            .pending
            .remove(&tid)
            .ok_or(Error::UnknownTransaction(tid))?;
        if !commit {
            tracing::debug!("discarded buffered writes of {}", tid);
            return Ok(());
        }
        if buffer.cleared {
            self.inner.clear()?;
            return Ok(());
        }
        let writes = buffer.writes.len();
        let deletes = buffer.deletes.len();
        for (key, value) in buffer.writes {
            self.inner.write(&key, value)?;
        }
        for key in buffer.deletes {
            self.inner.delete(&key)?;
        }
        tracing::debug!("committed {}: {} writes, {} deletes", tid, writes, deletes);
        Ok(())
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.current = None;
    }
}

impl<S: InitializableStorage> InitializableStorage for BufferedStorage<S> {
    fn load(&mut self, initial: Vec<(Key, Value)>) -> Result<()> {
        self.inner.load(initial)
    }
}
