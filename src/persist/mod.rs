//! Observation journal abstraction.

/// SQLite observation journal.
pub mod sqlite;

use crate::{
    observation::{CacheSnapshotV1, StoredObservation},
    types::ObsSeq,
};

/// Failure writing or replaying the observation journal.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// SQLite failure.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Payload encode/decode failure.
    #[error("payload: {0}")]
    Serde(#[from] serde_json::Error),
    /// Anything else, e.g. an unsupported payload version.
    #[error("{0}")]
    Message(String),
}

/// Result alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Durable destination for logged observations.
pub trait GuessSink: Send {
    /// Appends a batch in sequence order. Returns the last sequence written.
    fn append(&mut self, observations: &[StoredObservation]) -> PersistResult<ObsSeq>;
    /// Highest sequence already stored; new writes continue after it.
    fn latest_seq(&self) -> PersistResult<ObsSeq> {
        Ok(0)
    }
    /// Forces buffered writes out.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
    /// Records a snapshot covering `snapshot.last_seq`.
    fn write_snapshot(&mut self, _snapshot: &CacheSnapshotV1) -> PersistResult<()> {
        Ok(())
    }
    /// Drops journal rows up to and including `seq`. Returns rows removed.
    fn compact_through(&mut self, _seq: ObsSeq) -> PersistResult<usize> {
        Ok(0)
    }
}
