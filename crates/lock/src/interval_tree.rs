//! Augmented interval tree over `(start, end, value)` triples
//!
//! A red-black tree keyed by the lexicographic order of the whole triple,
//! augmented per node with the minimum start and maximum end of its subtree.
//! The augments prune overlap queries: a subtree can only contain an
//! interval overlapping `[start, end]` when `min_start <= end` and
//! `max_end >= start`, which makes `get_all` O(log n + k).
//!
//! Intervals are closed: `[a, b]` and `[c, d]` overlap iff `a <= d && b >= c`.
//!
//! Nodes live in a slot arena and reference each other by index; freed slots
//! are recycled through a free list. The balancing code follows the CLR
//! algorithms with null-safe accessors (absent children are black).

use crate::deque::SortableDeque;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Debug)]
struct Node<K, V> {
    start: K,
    end: K,
    min_start: K,
    max_end: K,
    value: V,
    left: Option<usize>,
    right: Option<usize>,
    parent: Option<usize>,
    color: Color,
}

impl<K: Clone, V> Node<K, V> {
    fn new(start: K, end: K, value: V, parent: Option<usize>) -> Self {
        Self {
            min_start: start.clone(),
            max_end: end.clone(),
            start,
            end,
            value,
            left: None,
            right: None,
            parent,
            color: Color::Black,
        }
    }
}

/// A `(start, end, value)` triple as surfaced by overlap queries.
///
/// Entries order by their value alone, so a window of overlapping entries
/// sorts into transaction order; equality compares the whole triple.
#[derive(Debug, Clone)]
pub struct IntervalEntry<K, V> {
    pub start: K,
    pub end: K,
    pub value: V,
}

impl<K: PartialEq, V: Ord> PartialEq for IntervalEntry<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end && self.value == other.value
    }
}

impl<K: PartialEq, V: Ord> Eq for IntervalEntry<K, V> {}

impl<K: PartialEq, V: Ord> PartialOrd for IntervalEntry<K, V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: PartialEq, V: Ord> Ord for IntervalEntry<K, V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

pub struct IntervalTreeMap<K, V> {
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    root: Option<usize>,
    len: usize,
}

impl<K: Ord + Clone, V: Ord + Clone> Default for IntervalTreeMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone, V: Ord + Clone> IntervalTreeMap<K, V> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.len = 0;
    }

    /// Insert a triple. Returns false when a triple-equal entry exists.
    pub fn put(&mut self, start: K, end: K, value: V) -> bool {
        let Some(mut t) = self.root else {
            let id = self.alloc(Node::new(start, end, value, None));
            self.root = Some(id);
            self.len = 1;
            return true;
        };

        let (parent, went_left) = loop {
            let node = self.node(t);
            let cmp = start
                .cmp(&node.start)
                .then_with(|| end.cmp(&node.end))
                .then_with(|| value.cmp(&node.value));
            match cmp {
                Ordering::Less => match node.left {
                    Some(l) => t = l,
                    None => break (t, true),
                },
                Ordering::Greater => match node.right {
                    Some(r) => t = r,
                    None => break (t, false),
                },
                Ordering::Equal => return false,
            }
        };

        let id = self.alloc(Node::new(start, end, value, Some(parent)));
        if went_left {
            self.node_mut(parent).left = Some(id);
        } else {
            self.node_mut(parent).right = Some(id);
        }
        self.fix_after_insertion(id);
        self.fix_augments_up(Some(id));
        self.len += 1;
        true
    }

    /// Remove the entry matching the triple. Returns false when absent.
    pub fn remove(&mut self, start: &K, end: &K, value: &V) -> bool {
        let Some(found) = self.find(start, end, value) else {
            return false;
        };
        self.remove_node(found);
        true
    }

    fn remove_node(&mut self, found: usize) {
        let mut p = found;

        // A node with two children swaps contents with its in-order
        // successor and the successor's slot is the one unlinked.
        if self.node(p).left.is_some() && self.node(p).right.is_some() {
            let s = self.successor(p).expect("internal node has a successor");
            let (s_start, s_end, s_value) = {
                let sn = self.node(s);
                (sn.start.clone(), sn.end.clone(), sn.value.clone())
            };
            let pn = self.node_mut(p);
            pn.start = s_start;
            pn.end = s_end;
            pn.value = s_value;
            p = s;
        }

        let parent = self.node(p).parent;
        let replacement = self.node(p).left.or(self.node(p).right);

        if let Some(r) = replacement {
            self.node_mut(r).parent = parent;
            match parent {
                None => self.root = Some(r),
                Some(pp) => {
                    if self.node(pp).left == Some(p) {
                        self.node_mut(pp).left = Some(r);
                    } else {
                        self.node_mut(pp).right = Some(r);
                    }
                }
            }
            let removed_color = self.node(p).color;
            self.dealloc(p);
            if removed_color == Color::Black {
                self.fix_after_deletion(Some(r));
            }
        } else if parent.is_none() {
            self.root = None;
            self.dealloc(p);
        } else {
            // No children: rebalance with p as a phantom, then unlink.
            if self.node(p).color == Color::Black {
                self.fix_after_deletion(Some(p));
            }
            if let Some(pp) = self.node(p).parent {
                if self.node(pp).left == Some(p) {
                    self.node_mut(pp).left = None;
                } else if self.node(pp).right == Some(p) {
                    self.node_mut(pp).right = None;
                }
            }
            self.dealloc(p);
        }

        self.fix_augments_up(parent);
        self.len -= 1;
    }

    /// Any one value whose interval overlaps `[start, end]`.
    pub fn get(&self, start: &K, end: &K) -> Option<&V> {
        let mut p = self.root;
        while let Some(i) = p {
            if self.intersects(i, start, end) {
                return Some(&self.node(i).value);
            }
            let left = self.node(i).left;
            p = match left {
                Some(l) if self.children_intersects(l, start, end) => Some(l),
                _ => self.node(i).right,
            };
        }
        None
    }

    /// The overlapping value with the smallest start, biasing left whenever
    /// the left subtree could still contain an overlap with a smaller start.
    pub fn get_first(&self, start: &K, end: &K) -> Option<&V> {
        let mut p = self.root;
        while let Some(i) = p {
            let node = self.node(i);
            let left = node.left;
            let right = node.right;
            if let Some(l) = left {
                let go_left = self.children_intersects(l, start, end)
                    && match right {
                        None => true,
                        Some(r) => {
                            self.node(l).min_start == self.node(r).min_start
                                || self.node(r).min_start > *start
                        }
                    };
                if go_left {
                    p = Some(l);
                    continue;
                }
            }
            if let Some(r) = right {
                if !self.intersects(i, start, end) && self.children_intersects(r, start, end) {
                    p = Some(r);
                    continue;
                }
            }
            break;
        }
        match p {
            Some(i) if self.intersects(i, start, end) => Some(&self.node(i).value),
            _ => None,
        }
    }

    /// The overlapping value with the largest start, biasing right.
    pub fn get_last(&self, start: &K, end: &K) -> Option<&V> {
        let mut p = self.root;
        while let Some(i) = p {
            let node = self.node(i);
            if let Some(r) = node.right {
                if self.children_intersects(r, start, end) {
                    p = Some(r);
                    continue;
                }
            }
            if let Some(l) = node.left {
                if !self.intersects(i, start, end) && self.children_intersects(l, start, end) {
                    p = Some(l);
                    continue;
                }
            }
            break;
        }
        match p {
            Some(i) if self.intersects(i, start, end) => Some(&self.node(i).value),
            _ => None,
        }
    }

    /// Push every stored triple overlapping `[start, end]` into the sink, in
    /// tree order. Descends into a subtree only when its augments admit an
    /// overlap.
    pub fn get_all(&self, start: &K, end: &K, sink: &mut SortableDeque<IntervalEntry<K, V>>) {
        self.collect(self.root, start, end, sink);
    }

    fn collect(
        &self,
        e: Option<usize>,
        start: &K,
        end: &K,
        sink: &mut SortableDeque<IntervalEntry<K, V>>,
    ) {
        let Some(e) = e else { return };
        let node = self.node(e);
        if let Some(l) = node.left {
            if self.children_intersects(l, start, end) {
                self.collect(Some(l), start, end, sink);
            }
        }
        if self.intersects(e, start, end) {
            sink.push_back(IntervalEntry {
                start: node.start.clone(),
                end: node.end.clone(),
                value: node.value.clone(),
            });
        }
        if let Some(r) = node.right {
            if self.children_intersects(r, start, end) {
                self.collect(Some(r), start, end, sink);
            }
        }
    }

    /// In-order iteration over all stored values.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tree: self,
            next: self.first(),
        }
    }

    /// Cursor positioned at the entry matching the triple, iterating the run
    /// of successors that share the anchor's `(start, end)` interval.
    /// Supports removing the current entry mid-iteration.
    pub fn iter_at(&mut self, start: &K, end: &K, value: &V) -> EqualIntervalCursor<'_, K, V> {
        let anchor = (start.clone(), end.clone());
        let next = self.find(start, end, value);
        let current = next.and_then(|n| {
            let prev = self.predecessor(n)?;
            let pn = self.node(prev);
            (pn.start == anchor.0 && pn.end == anchor.1).then_some(prev)
        });
        EqualIntervalCursor {
            tree: self,
            anchor,
            current,
            next,
        }
    }

    fn first(&self) -> Option<usize> {
        let mut p = self.root?;
        while let Some(l) = self.node(p).left {
            p = l;
        }
        Some(p)
    }

    fn successor(&self, t: usize) -> Option<usize> {
        if let Some(r) = self.node(t).right {
            let mut p = r;
            while let Some(l) = self.node(p).left {
                p = l;
            }
            return Some(p);
        }
        let mut ch = t;
        let mut p = self.node(t).parent;
        while let Some(pi) = p {
            if self.node(pi).right != Some(ch) {
                break;
            }
            ch = pi;
            p = self.node(pi).parent;
        }
        p
    }

    fn predecessor(&self, t: usize) -> Option<usize> {
        if let Some(l) = self.node(t).left {
            let mut p = l;
            while let Some(r) = self.node(p).right {
                p = r;
            }
            return Some(p);
        }
        let mut ch = t;
        let mut p = self.node(t).parent;
        while let Some(pi) = p {
            if self.node(pi).left != Some(ch) {
                break;
            }
            ch = pi;
            p = self.node(pi).parent;
        }
        p
    }

    fn find(&self, start: &K, end: &K, value: &V) -> Option<usize> {
        self.find_from(self.root, start, end, value)
    }

    fn find_from(&self, e: Option<usize>, start: &K, end: &K, value: &V) -> Option<usize> {
        let e = e?;
        let node = self.node(e);
        if node.start == *start && node.end == *end && node.value == *value {
            return Some(e);
        }
        if let Some(l) = node.left {
            if self.children_contains(l, start, end) {
                if let Some(found) = self.find_from(Some(l), start, end, value) {
                    return Some(found);
                }
            }
        }
        if let Some(r) = node.right {
            if self.children_contains(r, start, end) {
                if let Some(found) = self.find_from(Some(r), start, end, value) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn intersects(&self, id: usize, start: &K, end: &K) -> bool {
        let node = self.node(id);
        node.start <= *end && node.end >= *start
    }

    fn children_intersects(&self, id: usize, start: &K, end: &K) -> bool {
        let node = self.node(id);
        node.min_start <= *end && node.max_end >= *start
    }

    fn children_contains(&self, id: usize, start: &K, end: &K) -> bool {
        let node = self.node(id);
        node.min_start <= *start && node.max_end >= *end
    }

    // ── Arena plumbing ───────────────────────────────────────────────────

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        if let Some(id) = self.free.pop() {
            self.nodes[id] = Some(node);
            id
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn dealloc(&mut self, id: usize) {
        self.nodes[id] = None;
        self.free.push(id);
    }

    fn node(&self, id: usize) -> &Node<K, V> {
        self.nodes[id].as_ref().expect("stale tree node id")
    }

    fn node_mut(&mut self, id: usize) -> &mut Node<K, V> {
        self.nodes[id].as_mut().expect("stale tree node id")
    }

    // ── Null-safe accessors for the balancing code ───────────────────────

    fn color_of(&self, id: Option<usize>) -> Color {
        id.map_or(Color::Black, |i| self.node(i).color)
    }

    fn set_color(&mut self, id: Option<usize>, color: Color) {
        if let Some(i) = id {
            self.node_mut(i).color = color;
        }
    }

    fn parent_of(&self, id: Option<usize>) -> Option<usize> {
        id.and_then(|i| self.node(i).parent)
    }

    fn left_of(&self, id: Option<usize>) -> Option<usize> {
        id.and_then(|i| self.node(i).left)
    }

    fn right_of(&self, id: Option<usize>) -> Option<usize> {
        id.and_then(|i| self.node(i).right)
    }

    // ── Augment maintenance ──────────────────────────────────────────────

    fn fix_augment(&mut self, id: usize) {
        let (min_start, max_end) = {
            let node = self.node(id);
            let mut min = node.start.clone();
            let mut max = node.end.clone();
            if let Some(l) = node.left {
                let ln = self.node(l);
                if ln.min_start < min {
                    min = ln.min_start.clone();
                }
                if ln.max_end > max {
                    max = ln.max_end.clone();
                }
            }
            if let Some(r) = node.right {
                let rn = self.node(r);
                if rn.min_start < min {
                    min = rn.min_start.clone();
                }
                if rn.max_end > max {
                    max = rn.max_end.clone();
                }
            }
            (min, max)
        };
        let node = self.node_mut(id);
        node.min_start = min_start;
        node.max_end = max_end;
    }

    fn fix_augments_up(&mut self, from: Option<usize>) {
        let mut x = from;
        while let Some(i) = x {
            self.fix_augment(i);
            x = self.node(i).parent;
        }
    }

    // ── CLR balancing ────────────────────────────────────────────────────

    fn rotate_left(&mut self, p: Option<usize>) {
        let Some(p) = p else { return };
        let r = self.node(p).right.expect("rotate_left without right child");
        let rl = self.node(r).left;
        self.node_mut(p).right = rl;
        if let Some(rl) = rl {
            self.node_mut(rl).parent = Some(p);
        }
        let pp = self.node(p).parent;
        self.node_mut(r).parent = pp;
        match pp {
            None => self.root = Some(r),
            Some(pp) => {
                if self.node(pp).left == Some(p) {
                    self.node_mut(pp).left = Some(r);
                } else {
                    self.node_mut(pp).right = Some(r);
                }
            }
        }
        self.node_mut(r).left = Some(p);
        self.node_mut(p).parent = Some(r);
        self.fix_augment(p);
        self.fix_augment(r);
    }

    fn rotate_right(&mut self, p: Option<usize>) {
        let Some(p) = p else { return };
        let l = self.node(p).left.expect("rotate_right without left child");
        let lr = self.node(l).right;
        self.node_mut(p).left = lr;
        if let Some(lr) = lr {
            self.node_mut(lr).parent = Some(p);
        }
        let pp = self.node(p).parent;
        self.node_mut(l).parent = pp;
        match pp {
            None => self.root = Some(l),
            Some(pp) => {
                if self.node(pp).right == Some(p) {
                    self.node_mut(pp).right = Some(l);
                } else {
                    self.node_mut(pp).left = Some(l);
                }
            }
        }
        self.node_mut(l).right = Some(p);
        self.node_mut(p).parent = Some(l);
        self.fix_augment(p);
        self.fix_augment(l);
    }

    fn fix_after_insertion(&mut self, e: usize) {
        self.node_mut(e).color = Color::Red;
        let mut x = Some(e);

        while let Some(xi) = x {
            if Some(xi) == self.root || self.color_of(self.parent_of(x)) != Color::Red {
                break;
            }
            if self.parent_of(x) == self.left_of(self.parent_of(self.parent_of(x))) {
                let y = self.right_of(self.parent_of(self.parent_of(x)));
                if self.color_of(y) == Color::Red {
                    self.set_color(self.parent_of(x), Color::Black);
                    self.set_color(y, Color::Black);
                    self.set_color(self.parent_of(self.parent_of(x)), Color::Red);
                    x = self.parent_of(self.parent_of(x));
                } else {
                    if x == self.right_of(self.parent_of(x)) {
                        x = self.parent_of(x);
                        self.rotate_left(x);
                    }
                    self.set_color(self.parent_of(x), Color::Black);
                    self.set_color(self.parent_of(self.parent_of(x)), Color::Red);
                    self.rotate_right(self.parent_of(self.parent_of(x)));
                }
            } else {
                let y = self.left_of(self.parent_of(self.parent_of(x)));
                if self.color_of(y) == Color::Red {
                    self.set_color(self.parent_of(x), Color::Black);
                    self.set_color(y, Color::Black);
                    self.set_color(self.parent_of(self.parent_of(x)), Color::Red);
                    x = self.parent_of(self.parent_of(x));
                } else {
                    if x == self.left_of(self.parent_of(x)) {
                        x = self.parent_of(x);
                        self.rotate_right(x);
                    }
                    self.set_color(self.parent_of(x), Color::Black);
                    self.set_color(self.parent_of(self.parent_of(x)), Color::Red);
                    self.rotate_left(self.parent_of(self.parent_of(x)));
                }
            }
        }
        let root = self.root.expect("fixup with empty tree");
        self.node_mut(root).color = Color::Black;
    }

    fn fix_after_deletion(&mut self, e: Option<usize>) {
        let mut x = e;

        while x != self.root && self.color_of(x) == Color::Black {
            if x == self.left_of(self.parent_of(x)) {
                let mut sib = self.right_of(self.parent_of(x));

                if self.color_of(sib) == Color::Red {
                    self.set_color(sib, Color::Black);
                    self.set_color(self.parent_of(x), Color::Red);
                    self.rotate_left(self.parent_of(x));
                    sib = self.right_of(self.parent_of(x));
                }

                if self.color_of(self.left_of(sib)) == Color::Black
                    && self.color_of(self.right_of(sib)) == Color::Black
                {
                    self.set_color(sib, Color::Red);
                    x = self.parent_of(x);
                } else {
                    if self.color_of(self.right_of(sib)) == Color::Black {
                        self.set_color(self.left_of(sib), Color::Black);
                        self.set_color(sib, Color::Red);
                        self.rotate_right(sib);
                        sib = self.right_of(self.parent_of(x));
                    }
                    self.set_color(sib, self.color_of(self.parent_of(x)));
                    self.set_color(self.parent_of(x), Color::Black);
                    self.set_color(self.right_of(sib), Color::Black);
                    self.rotate_left(self.parent_of(x));
                    x = self.root;
                }
            } else {
                let mut sib = self.left_of(self.parent_of(x));

                if self.color_of(sib) == Color::Red {
                    self.set_color(sib, Color::Black);
                    self.set_color(self.parent_of(x), Color::Red);
                    self.rotate_right(self.parent_of(x));
                    sib = self.left_of(self.parent_of(x));
                }

                if self.color_of(self.right_of(sib)) == Color::Black
                    && self.color_of(self.left_of(sib)) == Color::Black
                {
                    self.set_color(sib, Color::Red);
                    x = self.parent_of(x);
                } else {
                    if self.color_of(self.left_of(sib)) == Color::Black {
                        self.set_color(self.right_of(sib), Color::Black);
                        self.set_color(sib, Color::Red);
                        self.rotate_left(sib);
                        sib = self.left_of(self.parent_of(x));
                    }
                    self.set_color(sib, self.color_of(self.parent_of(x)));
                    self.set_color(self.parent_of(x), Color::Black);
                    self.set_color(self.left_of(sib), Color::Black);
                    self.rotate_right(self.parent_of(x));
                    x = self.root;
                }
            }
        }

        self.set_color(x, Color::Black);
    }
}

/// In-order iterator over stored values.
pub struct Iter<'a, K, V> {
    tree: &'a IntervalTreeMap<K, V>,
    next: Option<usize>,
}

impl<'a, K: Ord + Clone, V: Ord + Clone> Iterator for Iter<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        self.next = self.tree.successor(id);
        Some(&self.tree.node(id).value)
    }
}

/// Cursor over the run of entries sharing one `(start, end)` interval.
///
/// `current()` is the entry most recently returned by `next()`. Removing the
/// current entry keeps its successor reachable: a removal may splice triple
/// contents across nodes, so the cursor re-finds its neighbors by triple
/// instead of trusting node identity.
pub struct EqualIntervalCursor<'a, K, V> {
    tree: &'a mut IntervalTreeMap<K, V>,
    anchor: (K, K),
    current: Option<usize>,
    next: Option<usize>,
}

impl<'a, K: Ord + Clone, V: Ord + Clone> EqualIntervalCursor<'a, K, V> {
    pub fn current(&self) -> Option<&V> {
        self.current.map(|i| &self.tree.node(i).value)
    }

    pub fn has_next(&self) -> bool {
        match self.next {
            None => false,
            Some(n) => {
                let node = self.tree.node(n);
                node.start == self.anchor.0 && node.end == self.anchor.1
            }
        }
    }

    /// Advance to the next entry with the anchor interval. Panics past the
    /// end; callers guard with `has_next`.
    pub fn next(&mut self) -> &V {
        let n = self.next.expect("cursor advanced past the equal-interval run");
        self.current = Some(n);
        self.next = self.tree.successor(n);
        &self.tree.node(n).value
    }

    /// Remove the current entry from the tree.
    pub fn remove(&mut self) {
        let cur = self.current.expect("cursor remove before next");
        let (cur_start, cur_end, cur_value) = {
            let node = self.tree.node(cur);
            (node.start.clone(), node.end.clone(), node.value.clone())
        };
        let next_triple = self.next.map(|n| {
            let node = self.tree.node(n);
            (node.start.clone(), node.end.clone(), node.value.clone())
        });
        let prev_triple = self.tree.predecessor(cur).and_then(|p| {
            let node = self.tree.node(p);
            (node.start == self.anchor.0 && node.end == self.anchor.1).then(|| {
                (node.start.clone(), node.end.clone(), node.value.clone())
            })
        });

        self.tree.remove_node(cur);

        self.current = prev_triple.and_then(|(s, e, v)| self.tree.find(&s, &e, &v));
        self.next = next_triple.and_then(|(s, e, v)| self.tree.find(&s, &e, &v));
    }
}
