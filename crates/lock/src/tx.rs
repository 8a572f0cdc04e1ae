//! Per-lock transaction records
//!
//! A `TxRecord` represents one transaction's presence in one lock structure:
//! its identity, its ordering timestamp, whether it reads or writes, and a
//! single queue-conflict bit. All records of one transaction share the same
//! [`Counter`] by reference, so a conflict charged against any record blocks
//! the transaction globally. A record is executable exactly when its
//! queue-conflict bit is clear and the shared counter reads zero (the bit
//! itself holds one counter unit, so a zero counter implies a clear bit).
//!
//! Records order by timestamp when both sides carry a non-negative one and
//! fall back to TID order otherwise; negative timestamps mean "unordered".
//! Identity is the TID alone.

use crate::counter::Counter;
use monokv_common::TransactionId;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxMode {
    Reader,
    Writer,
}

#[derive(Debug)]
pub(crate) struct TxRecord {
    tid: TransactionId,
    timestamp: i64,
    mode: TxMode,
    queue_conflict: bool,
    /// Set on range-index entries that stand in for a point lock. Two point
    /// entries never conflict in the tree; the per-key queue already orders
    /// them.
    point: bool,
    counter: Arc<Counter>,
}

impl TxRecord {
    pub fn reader(tid: TransactionId, timestamp: i64, counter: Arc<Counter>) -> Self {
        Self {
            tid,
            timestamp,
            mode: TxMode::Reader,
            queue_conflict: false,
            point: false,
            counter,
        }
    }

    pub fn writer(tid: TransactionId, timestamp: i64, counter: Arc<Counter>) -> Self {
        Self {
            tid,
            timestamp,
            mode: TxMode::Writer,
            queue_conflict: false,
            point: false,
            counter,
        }
    }

    pub fn mark_point(&mut self) {
        self.point = true;
    }

    pub fn is_point(&self) -> bool {
        self.point
    }

    pub fn tid(&self) -> TransactionId {
        self.tid
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn update_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    pub fn is_reader(&self) -> bool {
        self.mode == TxMode::Reader
    }

    pub fn is_writer(&self) -> bool {
        self.mode == TxMode::Writer
    }

    /// Reader -> Writer; the only legal mode change.
    pub fn promote(&mut self) {
        self.mode = TxMode::Writer;
    }

    pub fn is_executable(&self) -> bool {
        !self.queue_conflict && self.counter.is_free()
    }

    pub fn has_queue_conflict(&self) -> bool {
        self.queue_conflict
    }

    /// Charge one counter unit for this record's queue position. Idempotent.
    pub fn set_queue_conflict(&mut self) {
        if !self.queue_conflict {
            self.queue_conflict = true;
            self.counter.acquire();
        }
    }

    /// Clear the queue-conflict bit and release its counter unit. Returns
    /// true when the release made the transaction runnable.
    pub fn unset_queue_conflict(&mut self) -> bool {
        if self.queue_conflict {
            self.queue_conflict = false;
            if self.counter.is_free() {
                panic!("mismatched queue and shared conflict counters");
            }
            self.counter.release();
            return self.counter.is_free();
        }
        false
    }

    /// Charge `n` counter units for earlier conflicting ranges.
    pub fn add_tree_conflicts(&self, n: u32) {
        self.counter.acquire_n(n);
    }

    /// Release one range-conflict unit. Returns true when the release made
    /// the transaction runnable.
    pub fn remove_tree_conflict(&self) -> bool {
        if self.counter.is_free() {
            panic!("mismatched tree conflict counting");
        }
        self.counter.release();
        self.counter.is_free()
    }
}

impl PartialEq for TxRecord {
    fn eq(&self, other: &Self) -> bool {
        self.tid == other.tid
    }
}

impl Eq for TxRecord {}

impl PartialOrd for TxRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TxRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.timestamp >= 0 && other.timestamp >= 0 {
            self.timestamp.cmp(&other.timestamp)
        } else {
            self.tid.cmp(&other.tid)
        }
    }
}

/// A record shared between the range tree and its snapshot windows.
///
/// Range records are referenced from two places at once (the interval tree
/// and the sorted overlap window of the operation in flight), so they live
/// behind a reference-counted cell. The lock manager is single-threaded;
/// only the conflict counter inside is observable from other threads.
#[derive(Debug, Clone)]
pub(crate) struct SharedTxRecord(Rc<RefCell<TxRecord>>);

impl SharedTxRecord {
    pub fn new(record: TxRecord) -> Self {
        Self(Rc::new(RefCell::new(record)))
    }

    pub fn tid(&self) -> TransactionId {
        self.0.borrow().tid
    }

    pub fn timestamp(&self) -> i64 {
        self.0.borrow().timestamp
    }

    pub fn set_timestamp(&self, timestamp: i64) {
        self.0.borrow_mut().update_timestamp(timestamp);
    }

    pub fn is_reader(&self) -> bool {
        self.0.borrow().is_reader()
    }

    pub fn is_writer(&self) -> bool {
        self.0.borrow().is_writer()
    }

    pub fn promote(&self) {
        self.0.borrow_mut().promote();
    }

    pub fn is_point(&self) -> bool {
        self.0.borrow().is_point()
    }

    pub fn is_executable(&self) -> bool {
        self.0.borrow().is_executable()
    }

    pub fn add_tree_conflicts(&self, n: u32) {
        self.0.borrow().add_tree_conflicts(n);
    }

    pub fn remove_tree_conflict(&self) -> bool {
        self.0.borrow().remove_tree_conflict()
    }
}

impl PartialEq for SharedTxRecord {
    fn eq(&self, other: &Self) -> bool {
        self.tid() == other.tid()
    }
}

impl Eq for SharedTxRecord {}

impl PartialOrd for SharedTxRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SharedTxRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.borrow().cmp(&other.0.borrow())
    }
}
