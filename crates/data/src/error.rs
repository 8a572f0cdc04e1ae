//! Error types for key/value handling

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("operation requires a concrete (non-sentinel) operand")]
    NotConcrete,

    #[error("arithmetic overflow: {0}")]
    Overflow(&'static str),

    #[error("not implemented: {0}")]
    Unsupported(&'static str),

    #[error("malformed composite key")]
    MalformedComposite,
}
