//! Sync run errors

use thiserror::Error;

use crate::decode::{ConfigurationError, DecodeError};
use crate::source::SourceError;
use crate::statistics::StatisticsError;
use crate::store::StoreError;

/// Every way a sync run can fail
///
/// The first failing dataset aborts the run. Batches already written for
/// that dataset, and every dataset finished before it, stay committed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Dataset '{dataset}' failed to decode after {committed_batches} committed batches: {source}")]
    Decode {
        dataset: String,
        committed_batches: u64,
        #[source]
        source: DecodeError,
    },

    #[error("Dataset '{dataset}' failed to write after {committed_batches} committed batches: {source}")]
    Write {
        dataset: String,
        committed_batches: u64,
        #[source]
        source: StoreError,
    },

    #[error("Failed to record synchronization marker: {0}")]
    Marker(#[source] StoreError),

    #[error(transparent)]
    Statistics(#[from] StatisticsError),

    #[error("A sync run is already in progress")]
    AlreadyRunning,

    #[error("Decoder task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// Dataset the failure belongs to, if any
    pub fn dataset(&self) -> Option<&str> {
        match self {
            SyncError::Decode { dataset, .. } | SyncError::Write { dataset, .. } => Some(dataset),
            SyncError::Source(err) => err.dataset(),
            _ => None,
        }
    }

    /// Batches that stayed committed for the failing dataset
    pub fn committed_batches(&self) -> Option<u64> {
        match self {
            SyncError::Decode {
                committed_batches, ..
            }
            | SyncError::Write {
                committed_batches, ..
            } => Some(*committed_batches),
            _ => None,
        }
    }
}
