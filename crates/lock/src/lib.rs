//! Transactional lock manager for monokv
//!
//! Clients declare per-transaction read/write sets as point keys and key
//! ranges. The lock manager orders conflicting transactions by timestamp,
//! tracks cross-transaction dependencies through a shared per-transaction
//! conflict counter, and emits the set of transaction IDs that became
//! runnable after every state-changing call.
//!
//! The core is single-threaded by design: one event loop owns the lock
//! manager, every operation runs to completion, and nothing blocks. The
//! conflict counter is nevertheless atomic so that monitoring paths in other
//! threads may observe it.
//!
//! Components, leaves first:
//! - [`Counter`]: the shared conflict count; zero means runnable
//! - [`SortableDeque`]: ring-buffer deque with in-place sort and a removal
//!   cursor, backing the per-key queues and range snapshots
//! - [`IntervalTreeMap`]: augmented red-black interval tree backing the
//!   range-lock index
//! - [`TransactionalLocker`]: the facade routing point locks to per-key
//!   queues and range locks to the interval tree

mod counter;
mod deque;
mod error;
mod interval_tree;
mod key_lock;
mod locker;
mod range_lock;
mod tx;

pub use counter::Counter;
pub use deque::{Cursor, SortableDeque};
pub use error::{Error, Result};
pub use interval_tree::{EqualIntervalCursor, IntervalEntry, IntervalTreeMap, Iter};
pub use locker::TransactionalLocker;
