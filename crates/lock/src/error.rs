//! Error types for the lock manager
//!
//! Only user errors surface here: invalid sentinel keys for an operation,
//! operations outside a transaction context, unknown transaction IDs, and
//! non-monotone timestamps. Invariant violations (counter underflow,
//! misaligned queue positions, a committing writer that is not at the head
//! of its queue) indicate corrupted lock state and panic instead.

use monokv_common::TransactionId;
use monokv_data::Key;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid key for this operation: {0}")]
    InvalidKey(Key),

    #[error("invalid range endpoints: [{0}, {1}]")]
    InvalidRange(Key, Key),

    #[error("no active transaction context")]
    NoActiveTransaction,

    #[error("unknown transaction: {0}")]
    UnknownTransaction(TransactionId),

    #[error("timestamp {proposed} is below the current timestamp {current} of {tid}")]
    TimestampRegression {
        tid: TransactionId,
        current: i64,
        proposed: i64,
    },
}
