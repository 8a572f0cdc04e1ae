//! Common types for monokv
//!
//! This crate defines:
//! - Transaction IDs (fixed-width big-endian byte strings)

mod transaction_id;

pub use transaction_id::Error;
pub use transaction_id::TransactionId;
