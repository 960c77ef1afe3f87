//! Error types for the wallet ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// A missing wallet or transaction is not an error: reads return `Ok(None)`.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed entry, rejected before any write is attempted
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// The atomic write did not apply; the whole batch is unapplied
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Business precondition checked by a calling workflow
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// The caller's deadline passed before the store confirmed the commit.
    ///
    /// The write may still complete afterwards.
    #[error("Deadline exceeded before commit was confirmed")]
    DeadlineExceeded,

    /// Persisted record could not be decoded
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Background task failed
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Metrics registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// How a caller should surface an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself is wrong; retrying it unchanged will fail again
    Client,
    /// Transient server-side failure; the whole batch may be resubmitted
    Retryable,
    /// Outcome unknown or the store is damaged
    Internal,
}

impl Error {
    /// Classify this error for the caller
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidEntry(_) | Error::Precondition(_) => ErrorCategory::Client,
            Error::Commit(_) | Error::Storage(_) => ErrorCategory::Retryable,
            Error::DeadlineExceeded
            | Error::CorruptRecord(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Concurrency(_)
            | Error::Metrics(_) => ErrorCategory::Internal,
        }
    }

    /// Whether resubmitting the same entries in a fresh call is safe and may succeed
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Retryable
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Concurrency(err.to_string())
    }
}
