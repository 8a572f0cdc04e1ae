//! Key and value types for monokv
//!
//! This crate defines:
//! - `Key`: ordered byte-array keys with the four meta-key sentinels
//!   (`Null`, `Any`, `First`, `Last`)
//! - `Value`: byte-array values with null/any sentinels
//! - `operators`: unsigned big-integer arithmetic and concatenation over
//!   value byte arrays

mod error;
mod key;
pub mod operators;
mod value;

pub use error::{Error, Result};
pub use key::Key;
pub use value::Value;
