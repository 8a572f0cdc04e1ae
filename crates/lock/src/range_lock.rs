//! Range-lock index over the augmented interval tree
//!
//! Semantics of a range lock:
//! 1. many transactions can share the write lock (over disjoint or even
//!    overlapping ranges; ordering decides who runs first)
//! 2. many transactions can share the read lock
//! 3. a lone reader can upgrade its lock to write
//! 4. a writer can also read
//!
//! Every operation snapshots the currently overlapping entries into a
//! [`SortableDeque`] window, sorts the window into transaction order, and
//! decides admission locally. A record's tree-conflict count always equals
//! the number of strictly earlier conflicting entries: a reader is charged
//! one unit per earlier writer, a writer one unit per earlier entry.
//! `update` and `unlock` maintain that by pairwise decrement; a re-ordered
//! record is credited with every conflict it releases, since those entries
//! now precede it.
//!
//! Point locks enter the index too, as degenerate `[k, k]` entries flagged
//! as points, so that range holders (a whole-space writer in particular)
//! order against them. Two point entries never conflict here (the per-key
//! queue already orders same-key points), and a transaction's own entries
//! never conflict with each other; both filters apply identically to the
//! conflict counting and to the pairwise decrements, keeping the accounting
//! symmetric.

use crate::counter::Counter;
use crate::deque::SortableDeque;
use crate::interval_tree::{IntervalEntry, IntervalTreeMap};
use crate::tx::{SharedTxRecord, TxRecord};
use monokv_common::TransactionId;
use monokv_data::Key;
use std::collections::HashSet;
use std::sync::Arc;

/// Initial capacity of the overlap snapshot window.
const DEFAULT_WINDOW_SIZE: usize = 16;

type Entry = IntervalEntry<Key, SharedTxRecord>;

pub(crate) struct RangeLock {
    tree: IntervalTreeMap<Key, SharedTxRecord>,
}

impl RangeLock {
    pub fn new() -> Self {
        Self {
            tree: IntervalTreeMap::new(),
        }
    }

    fn window(&self, start: &Key, end: &Key) -> SortableDeque<Entry> {
        let mut window = SortableDeque::with_capacity(DEFAULT_WINDOW_SIZE);
        self.tree.get_all(start, end, &mut window);
        window
    }

    pub fn read_lock(
        &mut self,
        start: &Key,
        end: &Key,
        tid: TransactionId,
        timestamp: i64,
        counter: Arc<Counter>,
        point: bool,
    ) {
        let mut window = self.window(start, end);
        window.sort();
        if window
            .back()
            .is_some_and(|entry| entry_matches(entry, start, end, tid))
        {
            return;
        }
        let mut record = TxRecord::reader(tid, timestamp, counter);
        if point {
            record.mark_point();
        }
        let tx = SharedTxRecord::new(record);
        // the window is a snapshot of the tree, so the number of earlier
        // writers in it is exactly this record's conflict count
        let mut conflicts = 0;
        while let Some(entry) = window.pop_front() {
            if entry.value.tid() == tid || (point && entry.value.is_point()) {
                continue;
            }
            if entry.value.is_writer() {
                conflicts += 1;
            }
        }
        tx.add_tree_conflicts(conflicts);
        if !self.tree.put(start.clone(), end.clone(), tx) {
            panic!("duplicate range entry for {}", tid);
        }
    }

    pub fn write_lock(
        &mut self,
        start: &Key,
        end: &Key,
        tid: TransactionId,
        timestamp: i64,
        counter: Arc<Counter>,
        point: bool,
    ) {
        let mut window = self.window(start, end);
        window.sort();
        if window
            .back()
            .is_some_and(|entry| entry_matches(entry, start, end, tid))
        {
            let entry = window.pop_back().expect("matched entry is present");
            let tx = entry.value;
            if tx.is_reader() {
                tx.promote();
                // the upgrade now conflicts with every reader left in the
                // window
                let is_point = tx.is_point();
                let mut conflicts = 0;
                while let Some(other) = window.pop_front() {
                    if other.value.tid() == tid || (is_point && other.value.is_point()) {
                        continue;
                    }
                    if other.value.is_reader() {
                        conflicts += 1;
                    }
                }
                tx.add_tree_conflicts(conflicts);
            }
            return;
        }
        let mut record = TxRecord::writer(tid, timestamp, counter);
        if point {
            record.mark_point();
        }
        let tx = SharedTxRecord::new(record);
        let mut conflicts = 0;
        while let Some(entry) = window.pop_front() {
            if entry.value.tid() == tid || (point && entry.value.is_point()) {
                continue;
            }
            conflicts += 1;
        }
        tx.add_tree_conflicts(conflicts);
        if !self.tree.put(start.clone(), end.clone(), tx) {
            panic!("duplicate range entry for {}", tid);
        }
    }

    /// Move the record for `(start, end, tid)` to a later timestamp,
    /// decrementing every later entry it no longer precedes (readers
    /// decrement only writers) and crediting the record with the released
    /// conflicts. The entry is re-inserted to keep the tree ordered.
    pub fn update(
        &mut self,
        start: &Key,
        end: &Key,
        tid: TransactionId,
        timestamp: i64,
        executables: &mut HashSet<TransactionId>,
    ) {
        if self.tree.is_empty() {
            panic!("update on an empty range index");
        }
        let mut window = self.window(start, end);
        if window.is_empty() {
            panic!("update timestamp on missing tid: {}", tid);
        }
        window.sort();
        let Some(m) = window.position(|entry| entry_matches(entry, start, end, tid)) else {
            panic!("update timestamp on missing tid: {}", tid);
        };

        let mut cur = window.cursor_from(m);
        let tx = cur.next().value.clone();
        if tx.timestamp() > timestamp {
            panic!(
                "timestamp lower than current value: {} > {}",
                tx.timestamp(),
                timestamp
            );
        }
        let is_point = tx.is_point();

        if tx.is_reader() && cur.has_next() {
            let mut conflicts = 0u32;
            while cur.has_next() {
                let next = cur.next().value.clone();
                if next.tid() == tid {
                    continue;
                }
                if next.timestamp() > timestamp {
                    break;
                }
                if is_point && next.is_point() {
                    continue;
                }
                if next.is_writer() {
                    conflicts += 1;
                    if next.remove_tree_conflict() {
                        executables.insert(next.tid());
                    }
                }
            }
            tx.add_tree_conflicts(conflicts);
        }
        if tx.is_writer() && cur.has_next() {
            let mut conflicts = 0u32;
            while cur.has_next() {
                let next = cur.next().value.clone();
                if next.tid() == tid {
                    continue;
                }
                if next.timestamp() > timestamp {
                    break;
                }
                if is_point && next.is_point() {
                    continue;
                }
                conflicts += 1;
                if next.remove_tree_conflict() {
                    executables.insert(next.tid());
                }
            }
            tx.add_tree_conflicts(conflicts);
        }
        drop(cur);

        // re-insert under the new timestamp to keep the tree ordered
        self.tree.remove(start, end, &tx);
        tx.set_timestamp(timestamp);
        self.tree.put(start.clone(), end.clone(), tx.clone());

        window.sort();
        if window
            .front()
            .is_some_and(|entry| entry_matches(entry, start, end, tid))
        {
            // an ordering request that did not change the actual order
            if tx.is_executable() {
                executables.insert(tid);
            }
        }
    }

    /// Remove the record for `(start, end, tid)` and decrement every later
    /// conflicting entry, with no timestamp bound.
    pub fn unlock(
        &mut self,
        start: &Key,
        end: &Key,
        tid: TransactionId,
        executables: &mut HashSet<TransactionId>,
    ) {
        if self.tree.is_empty() {
            panic!("unlock on an empty range index");
        }
        let mut window = self.window(start, end);
        if window.is_empty() {
            panic!("unlock of missing tid: {}", tid);
        }
        window.sort();
        let Some(m) = window.position(|entry| entry_matches(entry, start, end, tid)) else {
            panic!("unlock of missing tid: {}", tid);
        };

        let mut cur = window.cursor_from(m);
        let tx = cur.next().value.clone();
        self.tree.remove(start, end, &tx);
        cur.remove();
        let is_point = tx.is_point();

        if tx.is_reader() {
            while cur.has_next() {
                let next = cur.next().value.clone();
                if next.tid() == tid || (is_point && next.is_point()) {
                    continue;
                }
                if next.is_writer() && next.remove_tree_conflict() {
                    executables.insert(next.tid());
                }
            }
        }
        if tx.is_writer() {
            while cur.has_next() {
                let next = cur.next().value.clone();
                if next.tid() == tid || (is_point && next.is_point()) {
                    continue;
                }
                if next.remove_tree_conflict() {
                    executables.insert(next.tid());
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Graphviz fragment of the range wait order, for diagnostics.
    pub fn to_graph(&self) -> String {
        let mut it = self.tree.iter();
        let Some(first) = it.next() else {
            return String::new();
        };
        let mut out = String::from("subgraph ranges {\n");
        let mut prev = first.tid();
        for tx in it {
            out.push_str(&format!("tid{} -> tid{}\n", prev, tx.tid()));
            prev = tx.tid();
        }
        out.push('}');
        out
    }
}

/// True when the entry is this transaction's lock on exactly this range.
fn entry_matches(entry: &Entry, start: &Key, end: &Key, tid: TransactionId) -> bool {
    entry.start == *start && entry.end == *end && entry.value.tid() == tid
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

    fn key(n: u64) -> Key {
        Key::from_u64(n)
    }

    #[test]
    fn test_overlapping_ranges_conflict() {
        let mut lock = RangeLock::new();
        let (c1, c2) = (counter(), counter());
        let mut exec = HashSet::new();

        lock.write_lock(&key(10), &key(20), tid(1), 10, c1.clone(), false);
        lock.read_lock(&key(15), &key(25), tid(2), 20, c2.clone(), false);
        assert!(c1.is_free());
        assert_eq!(c2.value(), 1);

        lock.unlock(&key(10), &key(20), tid(1), &mut exec);
        assert_eq!(exec, HashSet::from([tid(2)]));
        assert!(c2.is_free());
        assert_eq!(lock.len(), 1);
    }

    #[test]
    fn test_disjoint_ranges_do_not_conflict() {
        let mut lock = RangeLock::new();
        let (c1, c2) = (counter(), counter());

        lock.write_lock(&key(10), &key(20), tid(1), 10, c1.clone(), false);
        lock.write_lock(&key(21), &key(30), tid(2), 20, c2.clone(), false);
        assert!(c1.is_free());
        assert!(c2.is_free());
    }

    #[test]
    fn test_readers_share_a_range() {
        let mut lock = RangeLock::new();
        let (c1, c2, c3) = (counter(), counter(), counter());

        lock.read_lock(&key(0), &key(50), tid(1), 10, c1.clone(), false);
        lock.read_lock(&key(10), &key(60), tid(2), 20, c2.clone(), false);
        lock.write_lock(&key(20), &key(30), tid(3), 30, c3.clone(), false);
        assert!(c1.is_free());
        assert!(c2.is_free());
        // the writer waits on both overlapping readers
        assert_eq!(c3.value(), 2);

        let mut exec = HashSet::new();
        lock.unlock(&key(0), &key(50), tid(1), &mut exec);
        assert!(exec.is_empty());
        lock.unlock(&key(10), &key(60), tid(2), &mut exec);
        assert_eq!(exec, HashSet::from([tid(3)]));
    }

    #[test]
    fn test_relock_same_range_is_noop() {
        let mut lock = RangeLock::new();
        let c1 = counter();
        lock.read_lock(&key(1), &key(2), tid(1), 10, c1.clone(), false);
        lock.read_lock(&key(1), &key(2), tid(1), 10, c1.clone(), false);
        assert_eq!(lock.len(), 1);
        assert!(c1.is_free());
    }

    #[test]
    fn test_own_ranges_never_conflict() {
        let mut lock = RangeLock::new();
        let c1 = counter();
        lock.write_lock(&Key::First, &Key::Last, tid(1), 10, c1.clone(), false);
        lock.write_lock(&key(5), &key(9), tid(1), 10, c1.clone(), false);
        assert!(c1.is_free());
    }

    #[test]
    fn test_reader_upgrade_counts_remaining_readers() {
        let mut lock = RangeLock::new();
        let (c1, c2) = (counter(), counter());

        lock.read_lock(&key(0), &key(10), tid(1), 10, c1.clone(), false);
        lock.read_lock(&key(5), &key(15), tid(2), 20, c2.clone(), false);
        assert!(c2.is_free());

        // the later reader upgrades; it now waits on the earlier reader
        lock.write_lock(&key(5), &key(15), tid(2), 20, c2.clone(), false);
        assert_eq!(c2.value(), 1);

        let mut exec = HashSet::new();
        lock.unlock(&key(0), &key(10), tid(1), &mut exec);
        assert_eq!(exec, HashSet::from([tid(2)]));
    }

    #[test]
    fn test_writer_counts_whole_window() {
        let mut lock = RangeLock::new();
        let (c1, c2, c3) = (counter(), counter(), counter());

        lock.read_lock(&key(0), &key(10), tid(1), 10, c1, false);
        lock.write_lock(&key(5), &key(15), tid(2), 20, c2, false);
        lock.write_lock(&key(8), &key(9), tid(3), 30, c3.clone(), false);
        assert_eq!(c3.value(), 2);
    }

    #[test]
    fn test_update_reorders_and_swaps_conflicts() {
        let mut lock = RangeLock::new();
        let (c1, c2) = (counter(), counter());
        let mut exec = HashSet::new();

        lock.write_lock(&key(10), &key(20), tid(1), 30, c1.clone(), false);
        lock.write_lock(&key(15), &key(25), tid(2), 20, c2.clone(), false);
        // the later arrival has the earlier timestamp but still waits
        assert!(c1.is_free());
        assert_eq!(c2.value(), 1);

        lock.update(&key(10), &key(20), tid(1), 40, &mut exec);
        // pairwise swap: the moved writer now waits, the other runs
        assert_eq!(exec, HashSet::from([tid(2)]));
        assert!(c2.is_free());
        assert_eq!(c1.value(), 1);
    }

    #[test]
    fn test_update_respects_timestamp_cutoff() {
        let mut lock = RangeLock::new();
        let (c1, c2, c3) = (counter(), counter(), counter());
        let mut exec = HashSet::new();

        lock.write_lock(&key(0), &key(50), tid(1), 10, c1.clone(), false);
        lock.write_lock(&key(10), &key(20), tid(2), 20, c2.clone(), false);
        lock.write_lock(&key(30), &key(40), tid(3), 60, c3.clone(), false);
        assert_eq!((c2.value(), c3.value()), (1, 1));

        lock.update(&key(0), &key(50), tid(1), 30, &mut exec);
        // only the entry inside the cutoff is released and swapped
        assert_eq!(exec, HashSet::from([tid(2)]));
        assert_eq!(c1.value(), 1);
        assert_eq!(c3.value(), 1);
    }

    #[test]
    fn test_update_unchanged_order_reports_executable() {
        let mut lock = RangeLock::new();
        let c1 = counter();
        let mut exec = HashSet::new();

        lock.write_lock(&key(1), &key(2), tid(1), 10, c1, false);
        lock.update(&key(1), &key(2), tid(1), 15, &mut exec);
        assert_eq!(exec, HashSet::from([tid(1)]));
    }

    #[test]
    fn test_reader_update_decrements_only_writers() {
        let mut lock = RangeLock::new();
        let (c1, c2, c3) = (counter(), counter(), counter());
        let mut exec = HashSet::new();

        lock.read_lock(&key(0), &key(50), tid(1), 10, c1.clone(), false);
        lock.read_lock(&key(5), &key(15), tid(2), 20, c2.clone(), false);
        lock.write_lock(&key(10), &key(20), tid(3), 30, c3.clone(), false);
        assert_eq!(c3.value(), 2);

        lock.update(&key(0), &key(50), tid(1), 40, &mut exec);
        // the writer loses the reader's unit but still waits on the other
        // reader; the untouched reader emits nothing
        assert!(exec.is_empty());
        assert_eq!(c3.value(), 1);
        // the moved reader is now charged for the writer ahead of it
        assert_eq!(c1.value(), 1);
        assert!(c2.is_free());
    }

    #[test]
    fn test_point_entries_ignore_each_other() {
        let mut lock = RangeLock::new();
        let (c1, c2) = (counter(), counter());

        lock.write_lock(&key(5), &key(5), tid(1), 10, c1.clone(), true);
        lock.read_lock(&key(5), &key(5), tid(2), 20, c2.clone(), true);
        assert!(c1.is_free());
        assert!(c2.is_free());
    }

    #[test]
    fn test_range_writer_blocks_point_entry() {
        let mut lock = RangeLock::new();
        let (c1, c2) = (counter(), counter());
        let mut exec = HashSet::new();

        lock.write_lock(&Key::First, &Key::Last, tid(1), 10, c1.clone(), false);
        lock.read_lock(&key(5), &key(5), tid(2), 20, c2.clone(), true);
        assert_eq!(c2.value(), 1);

        lock.unlock(&Key::First, &Key::Last, tid(1), &mut exec);
        assert_eq!(exec, HashSet::from([tid(2)]));
    }

    #[test]
    fn test_point_writer_blocks_later_range() {
        let mut lock = RangeLock::new();
        let (c1, c2) = (counter(), counter());
        let mut exec = HashSet::new();

        lock.write_lock(&key(5), &key(5), tid(1), 10, c1.clone(), true);
        lock.read_lock(&key(0), &key(9), tid(2), 20, c2.clone(), false);
        assert_eq!(c2.value(), 1);

        lock.unlock(&key(5), &key(5), tid(1), &mut exec);
        assert_eq!(exec, HashSet::from([tid(2)]));
    }

    #[test]
    #[should_panic(expected = "empty range index")]
    fn test_unlock_on_empty_index_panics() {
        let mut lock = RangeLock::new();
        let mut exec = HashSet::new();
        lock.unlock(&key(1), &key(2), tid(1), &mut exec);
    }

    #[test]
    #[should_panic(expected = "missing tid")]
    fn test_update_missing_tid_panics() {
        let mut lock = RangeLock::new();
        lock.write_lock(&key(1), &key(2), tid(1), 10, counter(), false);
        let mut exec = HashSet::new();
        lock.update(&key(5), &key(6), tid(2), 20, &mut exec);
    }

    #[test]
    fn test_to_graph_lists_tree_order() {
        let mut lock = RangeLock::new();
        lock.write_lock(&key(1), &key(2), tid(1), 10, counter(), false);
        lock.write_lock(&key(3), &key(4), tid(2), 20, counter(), false);
        let graph = lock.to_graph();
        assert!(graph.starts_with("subgraph ranges {"));
        assert!(graph.contains("->"));
    }
}
