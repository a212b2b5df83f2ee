//! Batched upsert writer
//!
//! Buffers decoded records and hands them to a [`BatchSink`] every
//! `batch_size` records, plus once at the end for a non-empty remainder.
//! Batches that were flushed before a failure stay committed.

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::decode::ConfigurationError;
use crate::store::{BatchSink, StoreError, StoredRecord};

/// PostgreSQL limit on bind parameters in one statement
pub const MAX_BIND_PARAMETERS: usize = 65535;

/// How a batch treats rows whose key already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Overwrite non-key columns of the existing row
    Merge,
    /// Keep the existing row and drop the incoming one
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    pub batch_size: usize,
    /// Log progress every this many batches
    pub progress_every: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            progress_every: 200,
        }
    }
}

impl WriterConfig {
    /// Check the batch fits in one statement for a table of `columns` columns
    pub fn validate(&self, columns: usize) -> Result<(), ConfigurationError> {
        let fits = self
            .batch_size
            .checked_mul(columns)
            .is_some_and(|params| params <= MAX_BIND_PARAMETERS);

        if self.batch_size == 0 || !fits {
            return Err(ConfigurationError::InvalidBatchSize {
                batch_size: self.batch_size,
                columns,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub records: u64,
    pub batches: u64,
}

#[derive(Debug, Error)]
pub enum WriteError<E>
where
    E: std::error::Error + 'static,
{
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Record stream failed after {committed_batches} committed batches: {source}")]
    Upstream {
        committed_batches: u64,
        #[source]
        source: E,
    },

    #[error("Batch rejected after {committed_batches} committed batches: {source}")]
    Store {
        committed_batches: u64,
        #[source]
        source: StoreError,
    },
}

pub struct BatchWriter<R: StoredRecord> {
    dataset: String,
    sink: Arc<dyn BatchSink<R>>,
    policy: ConflictPolicy,
    config: WriterConfig,
}

impl<R: StoredRecord> BatchWriter<R> {
    pub fn new(
        dataset: impl Into<String>,
        sink: Arc<dyn BatchSink<R>>,
        policy: ConflictPolicy,
        config: WriterConfig,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            sink,
            policy,
            config,
        }
    }

    /// Drain `records` into the sink
    ///
    /// Stops at the first upstream error or rejected batch. Records buffered
    /// but not yet flushed at that point are discarded.
    pub async fn write<S, E>(&self, records: S) -> Result<WriteReport, WriteError<E>>
    where
        S: Stream<Item = Result<R, E>> + Send,
        E: std::error::Error + Send + 'static,
    {
        self.config.validate(R::COLUMNS.len())?;

        let mut records = std::pin::pin!(records);
        let mut buffer: Vec<R> = Vec::with_capacity(self.config.batch_size);
        let mut report = WriteReport::default();

        while let Some(item) = records.next().await {
            let record = item.map_err(|source| WriteError::Upstream {
                committed_batches: report.batches,
                source,
            })?;
            buffer.push(record);

            if buffer.len() >= self.config.batch_size {
                self.flush(&mut buffer, &mut report).await?;
            }
        }

        if !buffer.is_empty() {
            self.flush(&mut buffer, &mut report).await?;
        }

        info!(
            dataset = %self.dataset,
            records = report.records,
            batches = report.batches,
            "Finished writing dataset"
        );

        Ok(report)
    }

    async fn flush<E>(
        &self,
        buffer: &mut Vec<R>,
        report: &mut WriteReport,
    ) -> Result<(), WriteError<E>>
    where
        E: std::error::Error + 'static,
    {
        let records = buffer.len() as u64;
        let batch = match self.policy {
            ConflictPolicy::Merge => collapse_duplicate_keys(buffer.drain(..)),
            ConflictPolicy::Ignore => buffer.drain(..).collect(),
        };

        self.sink
            .write_batch(&batch, self.policy)
            .await
            .map_err(|source| WriteError::Store {
                committed_batches: report.batches,
                source,
            })?;

        report.records += records;
        report.batches += 1;

        if self.config.progress_every > 0 && report.batches % self.config.progress_every == 0 {
            info!(
                dataset = %self.dataset,
                batches = report.batches,
                records = report.records,
                "Write progress"
            );
        }

        Ok(())
    }
}

/// Keep only the last occurrence of each key, in order of those occurrences
///
/// One `INSERT … ON CONFLICT DO UPDATE` cannot touch the same row twice.
fn collapse_duplicate_keys<R: StoredRecord>(records: impl DoubleEndedIterator<Item = R>) -> Vec<R> {
    let mut seen = HashSet::new();
    let mut kept: Vec<R> = records.rev().filter(|r| seen.insert(r.key())).collect();
    kept.reverse();
    kept
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::datasets::Rating;

    fn rating(tconst: &str, votes: i64) -> Rating {
        Rating {
            tconst: tconst.into(),
            average_rating: 7.0,
            num_votes: votes,
        }
    }

    #[test]
    fn test_collapse_keeps_last_occurrence() {
        let batch = vec![rating("tt1", 1), rating("tt2", 2), rating("tt1", 3)];
        let kept = collapse_duplicate_keys(batch.into_iter());
        assert_eq!(kept, vec![rating("tt2", 2), rating("tt1", 3)]);
    }

    #[test]
    fn test_validate_batch_size() {
        let config = |batch_size| WriterConfig {
            batch_size,
            progress_every: 1,
        };
        assert!(config(100).validate(9).is_ok());
        assert!(config(7281).validate(9).is_ok());
        assert!(config(7282).validate(9).is_err());
        assert!(config(0).validate(3).is_err());
        assert!(config(usize::MAX).validate(2).is_err());
    }
}
