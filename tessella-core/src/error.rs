//! Error types for tessella-core
//!
//! A single error enum covers the whole store surface. Retriable
//! transaction errors (`Conflict`) are handled inside the transaction
//! envelope and never reach callers of the public API.

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// A URI failed validation (empty)
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// An index entry referenced an ID with no ID→URI mapping
    #[error("Dangling ID {0}: no URI mapping exists")]
    DanglingId(u64),

    /// A stored key failed to decode
    #[error("Corrupt key: {0}")]
    CorruptKey(String),

    /// A transaction exceeded the KV store's wall-clock budget
    #[error("Transaction exceeded its time budget")]
    TransactionTooLong,

    /// A transaction exceeded a payload ceiling
    #[error("Transaction too large: {0}")]
    TransactionTooLarge(String),

    /// A retriable error persisted through the bounded retry loop
    #[error("Retries exhausted after {0} attempts")]
    MaxRetriesExceeded(usize),

    /// Write conflict with a concurrently committed transaction.
    ///
    /// Retriable: the transaction envelope retries these and they never
    /// surface through the public store API.
    #[error("Transaction conflict")]
    Conflict,

    /// Non-retriable error from the underlying KV store
    #[error("KV store error: {0}")]
    Kv(String),

    /// Invariant violated — a bug signal, not a caller error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid URI error
    pub fn invalid_uri(msg: impl Into<String>) -> Self {
        Error::InvalidUri(msg.into())
    }

    /// Create a corrupt key error
    pub fn corrupt_key(msg: impl Into<String>) -> Self {
        Error::CorruptKey(msg.into())
    }

    /// Create a transaction-too-large error
    pub fn too_large(msg: impl Into<String>) -> Self {
        Error::TransactionTooLarge(msg.into())
    }

    /// Create a KV backend error
    pub fn kv(msg: impl Into<String>) -> Self {
        Error::Kv(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Whether the transaction envelope should retry on this error.
    ///
    /// Only commit conflicts are retriable; everything else propagates.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Conflict)
    }
}
