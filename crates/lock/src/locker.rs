//! Transactional locker facade
//!
//! Routes point locks to per-key queues and range locks to the range index,
//! and tracks the set of keys and ranges each pending transaction holds so
//! that `update` and `unlock` can fan out to every structure the
//! transaction occupies.
//!
//! The caller drives one transaction at a time through
//! `start .. lock calls .. end`; `update` and `unlock` address any pending
//! transaction by ID. Executable transaction IDs produced by a call are
//! accumulated into the caller-supplied set.

use crate::counter::Counter;
use crate::error::{Error, Result};
use crate::key_lock::KeyLock;
use crate::range_lock::RangeLock;
use monokv_common::TransactionId;
use monokv_data::Key;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

struct Context {
    tid: TransactionId,
    timestamp: i64,
    counter: Arc<Counter>,
}

#[derive(Default)]
struct LockingState {
    keys: HashSet<Key>,
    ranges: HashSet<(Key, Key)>,
    /// Last timestamp this transaction was ordered at; `update` may only
    /// move it forward.
    timestamp: i64,
}

pub struct TransactionalLocker {
    key_locks: HashMap<Key, KeyLock>,
    range_locks: RangeLock,
    pending: HashMap<TransactionId, LockingState>,
    current: Option<Context>,
}

impl Default for TransactionalLocker {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionalLocker {
    pub fn new() -> Self {
        Self {
            key_locks: HashMap::new(),
            range_locks: RangeLock::new(),
            pending: HashMap::new(),
            current: None,
        }
    }

    /// Establish the lock-declaration context for one transaction. The
    /// counter is the transaction's shared conflict counter; it is lent to
    /// every lock record created until `end`.
    pub fn start(&mut self, tid: TransactionId, timestamp: i64, counter: Arc<Counter>) {
        tracing::debug!("lock context start: {} at {}", tid, timestamp);
        self.pending.insert(
            tid,
            LockingState {
                timestamp,
                ..Default::default()
            },
        );
        self.current = Some(Context {
            tid,
            timestamp,
            counter,
        });
    }

    pub fn read_lock(&mut self, key: &Key) -> Result<()> {
        if !key.is_concrete() {
            return Err(Error::InvalidKey(key.clone()));
        }
        let ctx = self.current.as_ref().ok_or(Error::NoActiveTransaction)?;
        let (tid, timestamp, counter) = (ctx.tid, ctx.timestamp, ctx.counter.clone());
        self.key_locks
            .entry(key.clone())
            .or_insert_with(KeyLock::new)
            .read_lock(tid, timestamp, counter.clone());
        // a point lock also enters the range index as a degenerate entry so
        // that range holders order against it
        self.range_locks
            .read_lock(key, key, tid, timestamp, counter, true);
        let state = self.held_state(tid);
        state.keys.insert(key.clone());
        state.ranges.insert((key.clone(), key.clone()));
        Ok(())
    }

    pub fn write_lock(&mut self, key: &Key) -> Result<()> {
        if !key.is_concrete() {
            return Err(Error::InvalidKey(key.clone()));
        }
        let ctx = self.current.as_ref().ok_or(Error::NoActiveTransaction)?;
        let (tid, timestamp, counter) = (ctx.tid, ctx.timestamp, ctx.counter.clone());
        self.key_locks
            .entry(key.clone())
            .or_insert_with(KeyLock::new)
            .write_lock(tid, timestamp, counter.clone());
        self.range_locks
            .write_lock(key, key, tid, timestamp, counter, true);
        let state = self.held_state(tid);
        state.keys.insert(key.clone());
        state.ranges.insert((key.clone(), key.clone()));
        Ok(())
    }

    pub fn read_range_lock(&mut self, start: &Key, end: &Key) -> Result<()> {
        validate_range(start, end)?;
        let ctx = self.current.as_ref().ok_or(Error::NoActiveTransaction)?;
        let (tid, timestamp, counter) = (ctx.tid, ctx.timestamp, ctx.counter.clone());
        self.range_locks
            .read_lock(start, end, tid, timestamp, counter, false);
        self.held_state(tid)
            .ranges
            .insert((start.clone(), end.clone()));
        Ok(())
    }

    pub fn write_range_lock(&mut self, start: &Key, end: &Key) -> Result<()> {
        validate_range(start, end)?;
        let ctx = self.current.as_ref().ok_or(Error::NoActiveTransaction)?;
        let (tid, timestamp, counter) = (ctx.tid, ctx.timestamp, ctx.counter.clone());
        self.range_locks
            .write_lock(start, end, tid, timestamp, counter, false);
        self.held_state(tid)
            .ranges
            .insert((start.clone(), end.clone()));
        Ok(())
    }

    /// Write-lock the whole key space, `[First, Last]`.
    pub fn write_all_lock(&mut self) -> Result<()> {
        self.write_range_lock(&Key::First, &Key::Last)
    }

    /// Clear the declaration context. No emissions.
    pub fn end(&mut self) {
        self.current = None;
    }

    /// Re-order a pending transaction to a later (or equal) timestamp in
    /// every structure it occupies. IDs whose conflict count reaches zero
    /// are added to `executables`.
    pub fn update(
        &mut self,
        tid: TransactionId,
        timestamp: i64,
        executables: &mut HashSet<TransactionId>,
    ) -> Result<()> {
        let state = self
            .pending
            .get_mut(&tid)
            .ok_or(Error::UnknownTransaction(tid))?;
        if timestamp < state.timestamp {
            return Err(Error::TimestampRegression {
                tid,
                current: state.timestamp,
                proposed: timestamp,
            });
        }
        for (start, end) in &state.ranges {
            self.range_locks
                .update(start, end, tid, timestamp, executables);
        }
        for key in &state.keys {
            self.key_locks
                .get_mut(key)
                .expect("held key has a lock entry")
                .update(tid, timestamp, executables);
        }
        state.timestamp = timestamp;
        tracing::debug!("reordered {} to {}: {} runnable", tid, timestamp, executables.len());
        Ok(())
    }

    /// Release every lock the transaction holds. `commit` asserts that a
    /// writing transaction reached the head of its queues. Lock entries
    /// whose queues drain are dropped from the key map.
    pub fn unlock(
        &mut self,
        tid: TransactionId,
        executables: &mut HashSet<TransactionId>,
        commit: bool,
    ) -> Result<()> {
        let state = self
            .pending
            .remove(&tid)
            .ok_or(Error::UnknownTransaction(tid))?;
        for (start, end) in &state.ranges {
            self.range_locks.unlock(start, end, tid, executables);
        }
        for key in &state.keys {
            let lock = self
                .key_locks
                .get_mut(key)
                .expect("held key has a lock entry");
            lock.unlock(tid, executables, commit);
            if lock.is_empty() {
                self.key_locks.remove(key);
            }
        }
        tracing::debug!("unlocked {} (commit: {}): {} runnable", tid, commit, executables.len());
        Ok(())
    }

    /// Number of pending transactions.
    pub fn size(&self) -> usize {
        self.pending.len()
    }

    /// Drop all lock state.
    pub fn reset(&mut self) {
        self.key_locks.clear();
        self.range_locks.clear();
        self.pending.clear();
        self.current = None;
    }

    /// Graphviz dump of every wait queue, for diagnostics.
    pub fn to_graph(&self) -> String {
        let mut out = String::from("digraph locks {\n");
        let ranges = self.range_locks.to_graph();
        if !ranges.is_empty() {
            out.push_str(&ranges);
            out.push('\n');
        }
        for (key, lock) in &self.key_locks {
            let sub = lock.to_graph(&key.to_string());
            if !sub.is_empty() {
                out.push_str(&sub);
                out.push('\n');
            }
        }
        out.push('}');
        out
    }

    fn held_state(&mut self, tid: TransactionId) -> &mut LockingState {
        self.pending
            .get_mut(&tid)
            .expect("active context implies a pending state")
    }
}

fn validate_range(start: &Key, end: &Key) -> Result<()> {
    if start.is_null() || end.is_null() || start.is_any() || end.is_any() {
        return Err(Error::InvalidRange(start.clone(), end.clone()));
    }
    Ok(())
}
