//! Error taxonomy for the ETL pipeline and query engines.

use thiserror::Error;

/// Unified error type for decode, normalize, persistence, and query failures.
///
/// Decode and persistence errors abort a whole ingestion run; normalize
/// errors are isolated to the record that produced them. Query-side errors
/// (`Validation`, `NoData`) map to client-facing responses.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed source structure: missing column, wrong wire type, or
    /// row-count metadata that disagrees with the readable rows. Fatal for
    /// the run; there is no per-row skip for decode failures.
    #[error("decode error: {0}")]
    Decode(String),

    /// Malformed optional field on a single record (e.g. an unparsable
    /// point string). Recoverable: the pipeline drops the record and keeps
    /// going.
    #[error("normalize error: {0}")]
    Normalize(String),

    /// Bulk-write failure against the trip store. `transient` failures
    /// (network, timeout) are retried with backoff before the run aborts;
    /// non-transient ones abort immediately.
    #[error("persistence error: {message}")]
    Persistence { message: String, transient: bool },

    /// Malformed query input, surfaced to the caller as a client error.
    #[error("invalid query: {0}")]
    Validation(String),

    /// An aggregation matched no contributing records.
    #[error("no matching records")]
    NoData,

    /// A violated internal invariant, e.g. a worker task that panicked.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl Error {
    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    pub fn normalize(msg: impl Into<String>) -> Self {
        Error::Normalize(msg.into())
    }

    pub fn persistence(msg: impl Into<String>, transient: bool) -> Self {
        Error::Persistence {
            message: msg.into(),
            transient,
        }
    }

    /// Whether a failed store write may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Persistence { transient: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
