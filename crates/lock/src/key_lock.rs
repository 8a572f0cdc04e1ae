//! Per-key FIFO lock queue
//!
//! Semantics of the queue:
//! 1. only one transaction can hold the write lock
//! 2. many transactions can share the read lock
//! 3. a lone reader can upgrade its lock to write
//! 4. a writer can also read
//!
//! The queue holds at most one leading run of unblocked readers; every
//! record behind a writer (or behind a blocked record) carries the
//! queue-conflict bit and one unit on its transaction's shared counter.
//! `update` re-orders a record to a later timestamp in place, first handing
//! admission to the successors it no longer blocks; `unlock` removes the
//! record and admits successors up to the next blocking boundary. Every
//! counter transition to zero performed by a call pushes that transaction ID
//! into the caller's executables set, exactly once.

use crate::counter::Counter;
use crate::deque::SortableDeque;
use crate::tx::TxRecord;
use monokv_common::TransactionId;
use std::collections::HashSet;
use std::sync::Arc;

const DEFAULT_QUEUE_SIZE: usize = 16;

/// `(is_reader, has_queue_conflict)` of a predecessor, observed at the time
/// the admission pass walks over it.
type PrevFlags = Option<(bool, bool)>;

pub(crate) struct KeyLock {
    queue: SortableDeque<TxRecord>,
}

impl KeyLock {
    pub fn new() -> Self {
        Self {
            queue: SortableDeque::with_capacity(DEFAULT_QUEUE_SIZE),
        }
    }

    pub fn read_lock(&mut self, tid: TransactionId, timestamp: i64, counter: Arc<Counter>) {
        if self.queue.back().is_some_and(|last| last.tid() == tid) {
            return;
        }
        let blocked = self
            .queue
            .back()
            .is_some_and(|last| last.is_writer() || last.has_queue_conflict());
        let mut tx = TxRecord::reader(tid, timestamp, counter);
        if blocked {
            tx.set_queue_conflict();
        }
        self.queue.push_back(tx);
    }

    pub fn write_lock(&mut self, tid: TransactionId, timestamp: i64, counter: Arc<Counter>) {
        let len = self.queue.len();
        if let Some(last) = self.queue.back_mut() {
            if last.tid() == tid {
                if last.is_reader() {
                    last.promote();
                    // the upgrade must wait for everyone already queued ahead
                    if len > 1 {
                        last.set_queue_conflict();
                    }
                }
                return;
            }
        }
        let mut tx = TxRecord::writer(tid, timestamp, counter);
        if !self.queue.is_empty() {
            tx.set_queue_conflict();
        }
        self.queue.push_back(tx);
    }

    /// Move the record to a later timestamp, admitting successors it no
    /// longer orders ahead of, then re-sort the queue and recompute the
    /// record's own conflict state from its new position.
    pub fn update(
        &mut self,
        tid: TransactionId,
        timestamp: i64,
        executables: &mut HashSet<TransactionId>,
    ) {
        if self.queue.is_empty() {
            panic!("update on an empty lock queue");
        }
        let Some(m) = self.queue.position(|tx| tx.tid() == tid) else {
            panic!("update timestamp on missing tid: {}", tid);
        };

        let mut cur = self.queue.cursor_from(m);
        let prev_flags: PrevFlags = cur
            .current()
            .map(|prev| (prev.is_reader(), prev.has_queue_conflict()));
        let tx = cur.next();
        if tx.tid() != tid {
            panic!("lock queue cursor misaligned: {} != {}", tx.tid(), tid);
        }
        if tx.timestamp() > timestamp {
            panic!(
                "timestamp lower than current value: {} > {}",
                tx.timestamp(),
                timestamp
            );
        }
        let tx_is_reader = tx.is_reader();

        if tx_is_reader && prev_flags.is_none() && cur.has_next() {
            // a leading reader moving later can admit at most its immediate
            // successor, and only if that successor stays behind it in time
            let next = cur.next();
            if next.timestamp() < timestamp && next.unset_queue_conflict() {
                executables.insert(next.tid());
            }
        }
        if !tx_is_reader && admits_successors(prev_flags) {
            let mut prev = prev_flags;
            while cur.has_next() {
                let next = cur.next();
                if next.timestamp() > timestamp {
                    break;
                }
                if next.is_writer() {
                    if prev.is_none() && next.unset_queue_conflict() {
                        executables.insert(next.tid());
                    }
                    break;
                }
                if reader_admitted(prev) && next.unset_queue_conflict() {
                    executables.insert(next.tid());
                }
                prev = Some((true, next.has_queue_conflict()));
            }
        }
        drop(cur);

        self.queue
            .get_mut(m)
            .expect("record position is live")
            .update_timestamp(timestamp);
        self.queue.sort();

        if self.queue.front().is_some_and(|first| first.tid() == tid) {
            // order unchanged
            if self.queue.front().expect("non-empty").is_executable() {
                executables.insert(tid);
            }
            return;
        }

        // the record moved off the head; its conflict state follows its new
        // position
        let new_pos = self
            .queue
            .position(|tx| tx.tid() == tid)
            .expect("record survives the sort");
        if self.queue.get(new_pos).expect("live").is_writer() {
            self.queue
                .get_mut(new_pos)
                .expect("live")
                .set_queue_conflict();
        } else {
            let prev_conflict = match self.queue.previous_before(|tx| tx.tid() == tid) {
                Some(prev) => prev.has_queue_conflict(),
                None => panic!("no record ahead of {} after reorder", tid),
            };
            let tx = self.queue.get_mut(new_pos).expect("live");
            if !prev_conflict && tx.has_queue_conflict() {
                panic!("reader {} blocked behind an unblocked predecessor", tid);
            }
            if prev_conflict {
                tx.set_queue_conflict();
            }
        }
    }

    /// Remove the record and admit successors up to the first blocking
    /// boundary. A committing writer must be at the head of the queue.
    pub fn unlock(
        &mut self,
        tid: TransactionId,
        executables: &mut HashSet<TransactionId>,
        commit: bool,
    ) {
        if self.queue.is_empty() {
            panic!("unlock on an empty lock queue");
        }
        let Some(m) = self.queue.position(|tx| tx.tid() == tid) else {
            panic!("unlock of missing tid: {}", tid);
        };

        let mut cur = self.queue.cursor_from(m);
        let prev_flags: PrevFlags = cur
            .current()
            .map(|prev| (prev.is_reader(), prev.has_queue_conflict()));
        let tx = cur.next();
        if tx.tid() != tid {
            panic!("lock queue cursor misaligned: {} != {}", tx.tid(), tid);
        }
        let tx_is_reader = tx.is_reader();
        if commit && !tx_is_reader && prev_flags.is_some() {
            panic!("committing writer {} is not at the head of its queue", tid);
        }

        cur.remove();

        if tx_is_reader && prev_flags.is_none() && cur.has_next() {
            let next = cur.next();
            if next.unset_queue_conflict() {
                executables.insert(next.tid());
            }
        }
        if !tx_is_reader && admits_successors(prev_flags) {
            let mut prev = prev_flags;
            while cur.has_next() {
                let next = cur.next();
                if next.is_writer() {
                    if prev.is_none() && next.unset_queue_conflict() {
                        executables.insert(next.tid());
                    }
                    break;
                }
                if next.unset_queue_conflict() {
                    executables.insert(next.tid());
                }
                prev = Some((true, next.has_queue_conflict()));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Graphviz fragment of the queue's wait order, for diagnostics.
    pub fn to_graph(&self, name: &str) -> String {
        if self.queue.is_empty() {
            return String::new();
        }
        let mut out = format!("subgraph key{} {{\n", name);
        let mut prev: Option<TransactionId> = None;
        for tx in self.queue.iter() {
            if let Some(p) = prev {
                out.push_str(&format!("tid{} -> tid{}\n", p, tx.tid()));
            }
            prev = Some(tx.tid());
        }
        out.push('}');
        out
    }
}

/// A removed or re-ordered writer hands admission onward only when its own
/// predecessor was absent or unblocked.
fn admits_successors(prev: PrevFlags) -> bool {
    prev.map_or(true, |(_, conflict)| !conflict)
}

/// A reader successor clears when nothing precedes it or its immediate
/// predecessor is an unblocked reader.
fn reader_admitted(prev: PrevFlags) -> bool {
    prev.map_or(true, |(is_reader, conflict)| is_reader && !conflict)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: u64) -> TransactionId {
        TransactionId::from_u64(n)
    }

    fn counter() -> Arc<Counter> {
        Arc::new(Counter::new())
    }

    #[test]
    fn test_fifo_readers_then_writer() {
        let mut lock = KeyLock::new();
        let (c1, c2, c3) = (counter(), counter(), counter());
        let mut exec = HashSet::new();

        lock.read_lock(tid(1), 10, c1.clone());
        lock.read_lock(tid(2), 20, c2.clone());
        lock.write_lock(tid(3), 30, c3.clone());

        // both readers run immediately; the writer waits on one conflict
        assert!(c1.is_free());
        assert!(c2.is_free());
        assert_eq!(c3.value(), 1);

        lock.unlock(tid(1), &mut exec, true);
        assert!(exec.is_empty());

        lock.unlock(tid(2), &mut exec, true);
        assert_eq!(exec, HashSet::from([tid(3)]));
        assert!(c3.is_free());
    }

    #[test]
    fn test_writer_blocks_reader() {
        let mut lock = KeyLock::new();
        let (c1, c2) = (counter(), counter());
        let mut exec = HashSet::new();

        lock.write_lock(tid(1), 10, c1.clone());
        lock.read_lock(tid(2), 20, c2.clone());
        assert!(c1.is_free());
        assert_eq!(c2.value(), 1);

        lock.unlock(tid(1), &mut exec, true);
        assert_eq!(exec, HashSet::from([tid(2)]));
        assert!(c2.is_free());
    }

    #[test]
    fn test_relock_by_tail_owner_is_noop() {
        let mut lock = KeyLock::new();
        let c1 = counter();
        lock.read_lock(tid(1), 10, c1.clone());
        lock.read_lock(tid(1), 10, c1.clone());
        lock.write_lock(tid(1), 10, c1.clone());
        lock.write_lock(tid(1), 10, c1.clone());
        assert_eq!(lock.len(), 1);
        assert!(c1.is_free());
    }

    #[test]
    fn test_lone_reader_upgrade_stays_executable() {
        let mut lock = KeyLock::new();
        let (c1, c2) = (counter(), counter());
        let mut exec = HashSet::new();

        lock.read_lock(tid(1), 10, c1.clone());
        lock.write_lock(tid(1), 10, c1.clone());
        assert!(c1.is_free());

        // a reader arriving after the upgrade waits behind the writer
        lock.read_lock(tid(2), 20, c2.clone());
        assert_eq!(c2.value(), 1);

        lock.unlock(tid(1), &mut exec, true);
        assert_eq!(exec, HashSet::from([tid(2)]));
    }

    #[test]
    fn test_upgrade_behind_other_holder_blocks() {
        let mut lock = KeyLock::new();
        let (c1, c2) = (counter(), counter());
        let mut exec = HashSet::new();

        lock.read_lock(tid(1), 10, c1.clone());
        lock.read_lock(tid(2), 20, c2.clone());
        lock.write_lock(tid(2), 20, c2.clone());
        // the upgrade waits for the first reader to clear
        assert_eq!(c2.value(), 1);

        lock.unlock(tid(1), &mut exec, false);
        assert_eq!(exec, HashSet::from([tid(2)]));
    }

    #[test]
    fn test_update_reorders_past_queued_reader() {
        let mut lock = KeyLock::new();
        let (c1, c2) = (counter(), counter());
        let mut exec = HashSet::new();

        lock.write_lock(tid(1), 30, c1.clone());
        lock.read_lock(tid(2), 20, c2.clone());
        assert!(c1.is_free());
        assert_eq!(c2.value(), 1);

        lock.update(tid(1), 40, &mut exec);

        // the reader moves to the head and runs; the writer now waits
        assert_eq!(exec, HashSet::from([tid(2)]));
        assert!(c2.is_free());
        assert_eq!(c1.value(), 1);
    }

    #[test]
    fn test_update_without_reorder_reports_executable_head() {
        let mut lock = KeyLock::new();
        let c1 = counter();
        let mut exec = HashSet::new();

        lock.write_lock(tid(1), 10, c1.clone());
        lock.update(tid(1), 15, &mut exec);
        assert_eq!(exec, HashSet::from([tid(1)]));
    }

    #[test]
    fn test_update_same_timestamp_is_legal() {
        let mut lock = KeyLock::new();
        let (c1, c2) = (counter(), counter());
        let mut exec = HashSet::new();

        lock.read_lock(tid(1), 10, c1);
        lock.write_lock(tid(2), 20, c2.clone());
        lock.update(tid(2), 20, &mut exec);
        // nothing unblocks: the writer stays queued behind the reader
        assert_eq!(exec, HashSet::from([]));
        assert_eq!(c2.value(), 1);
    }

    #[test]
    fn test_update_timestamp_cutoff_limits_admission() {
        let mut lock = KeyLock::new();
        let (c1, c2, c3) = (counter(), counter(), counter());
        let mut exec = HashSet::new();

        lock.write_lock(tid(1), 10, c1.clone());
        lock.read_lock(tid(2), 20, c2.clone());
        lock.read_lock(tid(3), 50, c3.clone());
        assert_eq!((c2.value(), c3.value()), (1, 1));

        // moving the writer to 30 passes the first reader only
        lock.update(tid(1), 30, &mut exec);
        assert_eq!(exec, HashSet::from([tid(2)]));
        assert!(c2.is_free());
        assert_eq!(c3.value(), 1);
        assert_eq!(c1.value(), 1);
    }

    #[test]
    fn test_unlock_admits_reader_run_up_to_writer() {
        let mut lock = KeyLock::new();
        let (c1, c2, c3, c4) = (counter(), counter(), counter(), counter());
        let mut exec = HashSet::new();

        lock.write_lock(tid(1), 10, c1);
        lock.read_lock(tid(2), 20, c2.clone());
        lock.read_lock(tid(3), 30, c3.clone());
        lock.write_lock(tid(4), 40, c4.clone());

        let mut first = HashSet::new();
        lock.unlock(tid(1), &mut first, true);
        // the whole reader run clears; the trailing writer stays blocked
        assert_eq!(first, HashSet::from([tid(2), tid(3)]));
        assert_eq!(c4.value(), 1);

        lock.unlock(tid(2), &mut exec, true);
        assert!(exec.is_empty());
        lock.unlock(tid(3), &mut exec, true);
        assert_eq!(exec, HashSet::from([tid(4)]));
    }

    #[test]
    fn test_emission_is_edge_triggered() {
        let mut lock = KeyLock::new();
        let (c1, c2) = (counter(), counter());

        lock.write_lock(tid(1), 10, c1);
        lock.write_lock(tid(2), 20, c2.clone());
        // a second unit on the same transaction's counter, as another queue
        // would charge it
        c2.acquire();
        assert_eq!(c2.value(), 2);

        let mut exec = HashSet::new();
        lock.unlock(tid(1), &mut exec, true);
        // the conflict cleared but the counter is still held elsewhere
        assert!(exec.is_empty());
        assert_eq!(c2.value(), 1);
    }

    #[test]
    #[should_panic(expected = "not at the head of its queue")]
    fn test_committing_writer_mid_queue_panics() {
        let mut lock = KeyLock::new();
        let (c1, c2) = (counter(), counter());
        lock.read_lock(tid(1), 10, c1);
        lock.write_lock(tid(2), 20, c2);
        let mut exec = HashSet::new();
        lock.unlock(tid(2), &mut exec, true);
    }

    #[test]
    #[should_panic(expected = "empty lock queue")]
    fn test_unlock_on_empty_queue_panics() {
        let mut lock = KeyLock::new();
        let mut exec = HashSet::new();
        lock.unlock(tid(1), &mut exec, false);
    }

    #[test]
    #[should_panic(expected = "missing tid")]
    fn test_update_missing_tid_panics() {
        let mut lock = KeyLock::new();
        lock.read_lock(tid(1), 10, counter());
        let mut exec = HashSet::new();
        lock.update(tid(2), 20, &mut exec);
    }

    #[test]
    fn test_to_graph_lists_queue_edges() {
        let mut lock = KeyLock::new();
        lock.read_lock(tid(1), 10, counter());
        lock.write_lock(tid(2), 20, counter());
        let graph = lock.to_graph("k");
        assert!(graph.starts_with("subgraph keyk {"));
        assert!(graph.contains(&format!("tid{} -> tid{}", tid(1), tid(2))));
    }
}
