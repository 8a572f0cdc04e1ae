//! Storage back-ends for monokv
//!
//! A storage is a key-addressable ordered map over the key domain: point
//! reads and writes plus ordered navigation (`next`/`previous`) between
//! concrete keys, with the `First`/`Last` sentinels accepted as navigation
//! origins. [`BufferedStorage`] layers per-transaction write buffering with
//! read-your-own-writes on top of any storage; [`MapStorage`] keeps
//! everything in memory and [`DiskStorage`] persists through fjall.

mod buffered;
mod disk;
mod map;

pub use buffered::BufferedStorage;
pub use disk::DiskStorage;
pub use map::MapStorage;

use monokv_common::TransactionId;
use monokv_data::{Key, Value};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("storage backend error: {0}")]
    Backend(#[from] fjall::Error),

    #[error("key is not storable: {0}")]
    InvalidKey(Key),

    #[error("value is not storable: {0}")]
    InvalidValue(Value),

    #[error("no transaction in progress")]
    NoActiveTransaction,

    #[error("missing buffered state for transaction: {0}")]
    UnknownTransaction(TransactionId),
}

/// A key-addressable ordered map.
pub trait Storage {
    /// Whether a key is present. The `Any` sentinel asks whether the
    /// storage holds anything at all.
    fn exists(&self, key: &Key) -> Result<bool>;

    /// Read a key. Sentinel keys read as absent.
    fn read(&self, key: &Key) -> Result<Option<Value>>;

    /// The smallest stored key at or above `key` (`inclusive`) or strictly
    /// above it. `First` navigates from the bottom of the key space.
    fn next(&self, key: &Key, inclusive: bool) -> Result<Option<Key>>;

    /// The largest stored key at or below `key` (`inclusive`) or strictly
    /// below it. `Last` navigates from the top of the key space.
    fn previous(&self, key: &Key, inclusive: bool) -> Result<Option<Key>>;

    fn write(&mut self, key: &Key, value: Value) -> Result<()>;

    fn delete(&mut self, key: &Key) -> Result<()>;

    fn clear(&mut self) -> Result<()>;
}

/// A storage that can be bulk-loaded with initial content.
pub trait InitializableStorage: Storage {
    fn load(&mut self, initial: Vec<(Key, Value)>) -> Result<()>;
}

/// A storage with per-transaction buffered writes.
///
/// Writes and deletes between `start` and `end` land in a buffer keyed by
/// the transaction ID; `finish` applies the buffer to the underlying
/// storage on commit or discards it on abort.
pub trait TransactionalStorage: Storage {
    fn start(&mut self, tid: TransactionId);

    fn end(&mut self);

    fn finish(&mut self, tid: TransactionId, commit: bool) -> Result<()>;

    fn reset(&mut self);
}
