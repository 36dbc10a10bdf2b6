//! Error types for the ingestion pipeline
//!
//! Everything except [`ParseError`] is fatal to a run. Parse failures are
//! absorbed by the worker pool and only show up as a dropped-line count.

use std::path::PathBuf;
use thiserror::Error;

use crate::db::DbError;
use crate::pipeline::RunState;

pub type Result<T> = std::result::Result<T, IngestError>;

/// Terminal error of an ingestion run
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Failed reading decompressed archive content: {0}")]
    Stream(#[source] std::io::Error),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Ingestion cancelled")]
    Cancelled,

    #[error("Invalid ingest configuration: {0}")]
    Config(#[from] geonames_common::GeonamesError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Illegal run state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RunState, to: RunState },
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Task(err.to_string())
    }
}

/// Neither the cache nor the network produced the archive
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Failed to read cached archive {path}: {source}")]
    CacheRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download {url} after {attempts} attempt(s): {source}")]
    Network {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive is not a readable zip container: {0}")]
    Corrupt(#[from] zip::result::ZipError),

    #[error("Archive has no entry named '{name}'")]
    MissingEntry { name: String },
}

/// Step of a batch transaction that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Begin,
    Execute,
    Commit,
}

impl std::fmt::Display for WritePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WritePhase::Begin => write!(f, "begin"),
            WritePhase::Execute => write!(f, "execute"),
            WritePhase::Commit => write!(f, "commit"),
        }
    }
}

/// A batch transaction failed and was rolled back
///
/// Batches before `batch_start` are already committed.
#[derive(Debug, Error)]
#[error("Batch upsert failed at {phase} (batch_start={batch_start}, batch_size={batch_size}): {source}")]
pub struct WriteError {
    pub batch_start: usize,
    pub batch_size: usize,
    pub phase: WritePhase,
    #[source]
    pub source: sqlx::Error,
}

/// A line that cannot become a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid field count: expected at least {expected}, got {found}")]
    InvalidFieldCount { expected: usize, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_error_carries_batch_context() {
        let err = WriteError {
            batch_start: 3000,
            batch_size: 1000,
            phase: WritePhase::Execute,
            source: sqlx::Error::Protocol("connection reset".to_string()),
        };

        let message = err.to_string();
        assert!(message.contains("batch_start=3000"));
        assert!(message.contains("batch_size=1000"));
        assert!(message.contains("execute"));
    }

    #[test]
    fn test_missing_entry_names_the_entry() {
        let err = IngestError::from(ArchiveError::MissingEntry {
            name: "allCountries.txt".to_string(),
        });
        assert_eq!(err.to_string(), "Archive has no entry named 'allCountries.txt'");
    }
}
