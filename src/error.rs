//! Error types for hash field operations.
//!
//! Only the numeric increment paths can fail. Missing or expired fields are
//! reported through `Option`/`bool` results, never through errors.

use thiserror::Error;

/// Errors surfaced by hash object operations.
///
/// Every error is local to the single field it was raised for. The rest of
/// the hash object stays untouched and fully usable.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HashError {
    /// The stored value could not be parsed as a signed 64-bit integer.
    #[error("hash value is not an integer")]
    NotAnInteger,

    /// The stored value could not be parsed as a finite float.
    #[error("hash value is not a float")]
    NotAFloat,

    /// A float increment produced NaN or an infinity.
    #[error("increment would produce NaN or Infinity")]
    NonFiniteResult,

    /// An integer increment left the i64 range.
    #[error("increment or decrement would overflow")]
    IncrementOverflow,
}

/// Result type for hash object operations.
pub type HashResult<T> = Result<T, HashError>;
