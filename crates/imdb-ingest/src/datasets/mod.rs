//! IMDb dataset definitions
//!
//! A dataset ties a remote file to a record schema, a conflict policy and a
//! sink. [`Dataset`] is the generic pipeline; [`DatasetKind`] names the four
//! IMDb files this crate knows how to ingest.

pub mod akas;
pub mod episodes;
pub mod ratings;
pub mod titles;

pub use akas::TitleAka;
pub use episodes::Episode;
pub use ratings::Rating;
pub use titles::{AkaSummary, Title, TitleDetails};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::config::SyncConfig;
use crate::decode::{ConfigurationError, DecodeError, Schema, TsvDecoder};
use crate::error::SyncError;
use crate::source::{SourceError, StagedFile};
use crate::store::{BatchSink, StoredRecord};
use crate::writer::{BatchWriter, ConflictPolicy, WriteError, WriteReport, WriterConfig};

/// One step of a sync run
#[async_trait]
pub trait DatasetJob: Send + Sync {
    fn name(&self) -> &str;

    fn url(&self) -> &str;

    /// Decode the staged file and write every record
    async fn ingest(&self, staged: &StagedFile) -> Result<WriteReport, SyncError>;
}

/// Decode-and-write pipeline for record type `R`
pub struct Dataset<R: StoredRecord> {
    name: String,
    url: String,
    decoder: TsvDecoder<R>,
    policy: ConflictPolicy,
    sink: Arc<dyn BatchSink<R>>,
    writer: WriterConfig,
    channel_capacity: usize,
}

impl<R: StoredRecord> Dataset<R> {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        schema: Schema<R>,
        policy: ConflictPolicy,
        sink: Arc<dyn BatchSink<R>>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            decoder: TsvDecoder::new(Arc::new(schema)),
            policy,
            sink,
            writer: WriterConfig::default(),
            channel_capacity: 4096,
        }
    }

    pub fn with_empty_values<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.decoder = self.decoder.with_empty_values(tokens);
        self
    }

    pub fn with_writer_config(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Turn a writer failure into a run failure for this dataset
    fn write_failure(&self, staged: &StagedFile, err: WriteError<DecodeError>) -> SyncError {
        match err {
            WriteError::Configuration(e) => SyncError::Configuration(e),
            WriteError::Upstream {
                source: DecodeError::Read { line, source },
                ..
            } => SyncError::Source(
                staged.decompression_error(format!("read failed at line {line}: {source}")),
            ),
            WriteError::Upstream {
                committed_batches,
                source,
            } => SyncError::Decode {
                dataset: self.name.clone(),
                committed_batches,
                source,
            },
            WriteError::Store {
                committed_batches,
                source,
            } => SyncError::Write {
                dataset: self.name.clone(),
                committed_batches,
                source,
            },
        }
    }
}

#[async_trait]
impl<R: StoredRecord> DatasetJob for Dataset<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn ingest(&self, staged: &StagedFile) -> Result<WriteReport, SyncError> {
        self.writer.validate(R::COLUMNS.len())?;

        let (tx, rx) = mpsc::channel::<Result<R, DecodeError>>(self.channel_capacity);
        let decoder = self.decoder.clone();
        let file = staged.clone();

        // Decoding is blocking I/O plus CPU work; the writer paces it through
        // the bounded channel.
        let producer = tokio::task::spawn_blocking(move || -> Result<(), SourceError> {
            let reader = file.open()?;
            let records = match decoder.decode(reader) {
                Ok(records) => records,
                Err(err) => {
                    let _ = tx.blocking_send(Err(err));
                    return Ok(());
                }
            };

            for item in records {
                let failed = item.is_err();
                if tx.blocking_send(item).is_err() || failed {
                    break;
                }
            }
            Ok(())
        });

        let writer = BatchWriter::new(
            self.name.clone(),
            Arc::clone(&self.sink),
            self.policy,
            self.writer.clone(),
        );
        let written = writer.write(ReceiverStream::new(rx)).await;

        producer.await??;
        let report = written.map_err(|err| self.write_failure(staged, err))?;

        debug!(dataset = %self.name, records = report.records, "Dataset ingested");
        Ok(report)
    }
}

/// The IMDb dataset files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Titles,
    Episodes,
    Ratings,
    Akas,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 4] = [
        DatasetKind::Titles,
        DatasetKind::Episodes,
        DatasetKind::Ratings,
        DatasetKind::Akas,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DatasetKind::Titles => "titles",
            DatasetKind::Episodes => "episodes",
            DatasetKind::Ratings => "ratings",
            DatasetKind::Akas => "akas",
        }
    }

    /// File name on the dataset host
    pub fn file_name(self) -> &'static str {
        match self {
            DatasetKind::Titles => "title.basics.tsv.gz",
            DatasetKind::Episodes => "title.episode.tsv.gz",
            DatasetKind::Ratings => "title.ratings.tsv.gz",
            DatasetKind::Akas => "title.akas.tsv.gz",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            DatasetKind::Titles => Title::TABLE,
            DatasetKind::Episodes => Episode::TABLE,
            DatasetKind::Ratings => Rating::TABLE,
            DatasetKind::Akas => TitleAka::TABLE,
        }
    }

    pub fn column_count(self) -> usize {
        match self {
            DatasetKind::Titles => Title::COLUMNS.len(),
            DatasetKind::Episodes => Episode::COLUMNS.len(),
            DatasetKind::Ratings => Rating::COLUMNS.len(),
            DatasetKind::Akas => TitleAka::COLUMNS.len(),
        }
    }

    pub fn policy(self) -> ConflictPolicy {
        match self {
            DatasetKind::Akas => ConflictPolicy::Ignore,
            _ => ConflictPolicy::Merge,
        }
    }

    /// Build the pipeline for this dataset against `store`
    pub fn job<S>(self, config: &SyncConfig, store: Arc<S>) -> Result<Arc<dyn DatasetJob>, ConfigurationError>
    where
        S: BatchSink<Title> + BatchSink<Episode> + BatchSink<Rating> + BatchSink<TitleAka> + 'static,
    {
        let url = config.url_for(self);
        let job: Arc<dyn DatasetJob> = match self {
            DatasetKind::Titles => {
                let sink: Arc<dyn BatchSink<Title>> = store;
                Arc::new(configure(Dataset::new(self.name(), url, Title::schema()?, self.policy(), sink), config))
            }
            DatasetKind::Episodes => {
                let sink: Arc<dyn BatchSink<Episode>> = store;
                Arc::new(configure(Dataset::new(self.name(), url, Episode::schema()?, self.policy(), sink), config))
            }
            DatasetKind::Ratings => {
                let sink: Arc<dyn BatchSink<Rating>> = store;
                Arc::new(configure(Dataset::new(self.name(), url, Rating::schema()?, self.policy(), sink), config))
            }
            DatasetKind::Akas => {
                let sink: Arc<dyn BatchSink<TitleAka>> = store;
                Arc::new(configure(Dataset::new(self.name(), url, TitleAka::schema()?, self.policy(), sink), config))
            }
        };
        Ok(job)
    }
}

fn configure<R: StoredRecord>(dataset: Dataset<R>, config: &SyncConfig) -> Dataset<R> {
    dataset
        .with_empty_values(config.empty_values.iter().cloned())
        .with_writer_config(config.writer())
        .with_channel_capacity(config.channel_capacity)
}

/// Pipelines for every configured dataset, in run order
pub fn build_jobs<S>(config: &SyncConfig, store: Arc<S>) -> Result<Vec<Arc<dyn DatasetJob>>, ConfigurationError>
where
    S: BatchSink<Title> + BatchSink<Episode> + BatchSink<Rating> + BatchSink<TitleAka> + 'static,
{
    config
        .datasets
        .iter()
        .map(|kind| kind.job(config, Arc::clone(&store)))
        .collect()
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for DatasetKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "titles" | "title.basics" => Ok(DatasetKind::Titles),
            "episodes" | "title.episode" => Ok(DatasetKind::Episodes),
            "ratings" | "title.ratings" => Ok(DatasetKind::Ratings),
            "akas" | "title.akas" => Ok(DatasetKind::Akas),
            _ => Err(ConfigurationError::InvalidDeclaration(format!(
                "unknown dataset '{s}'"
            ))),
        }
    }
}
