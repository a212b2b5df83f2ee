//! Dataset download and staging
//!
//! Each dataset file is streamed to `<staging>/<dataset>.tsv.gz.part`, renamed
//! once complete, and then read back through a gzip decoder so the
//! decompressed content is never held in memory as a whole.

use flate2::read::GzDecoder;
use futures::{Stream, StreamExt};
use reqwest::Client;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const READ_BUFFER_SIZE: usize = 256 * 1024;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to retrieve dataset '{dataset}' from {url}: {reason}")]
    Retrieval {
        dataset: String,
        url: String,
        reason: String,
    },

    #[error("Dataset '{dataset}' is not a valid gzip stream ({}): {reason}", path.display())]
    Decompression {
        dataset: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to stage dataset '{dataset}' at {}: {source}", path.display())]
    Staging {
        dataset: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    pub fn dataset(&self) -> Option<&str> {
        match self {
            SourceError::Retrieval { dataset, .. }
            | SourceError::Decompression { dataset, .. }
            | SourceError::Staging { dataset, .. } => Some(dataset),
        }
    }
}

/// Downloads dataset files into a staging directory
#[derive(Debug, Clone)]
pub struct DatasetSource {
    client: Client,
    staging_dir: PathBuf,
}

impl DatasetSource {
    pub fn new(client: Client, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            staging_dir: staging_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Download `url` into the staging directory
    pub async fn fetch(&self, dataset: &str, url: &str) -> Result<StagedFile, SourceError> {
        let staging = |path: &Path| {
            let path = path.to_path_buf();
            move |source| SourceError::Staging {
                dataset: dataset.to_string(),
                path,
                source,
            }
        };
        let retrieval = |reason: String| SourceError::Retrieval {
            dataset: dataset.to_string(),
            url: url.to_string(),
            reason,
        };

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(staging(&self.staging_dir))?;

        let partial = self.staging_dir.join(format!("{dataset}.tsv.gz.part"));
        let target = self.staging_dir.join(format!("{dataset}.tsv.gz"));

        info!(dataset, url, "Downloading dataset");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| retrieval(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(retrieval(format!("unexpected status {status}")));
        }

        let file = tokio::fs::File::create(&partial)
            .await
            .map_err(staging(&partial))?;
        let downloaded = match write_partial(&partial, file, response.bytes_stream()).await {
            Ok(downloaded) => downloaded,
            Err(BodyError::Transport(reason)) => return Err(retrieval(reason)),
            Err(BodyError::Write(source)) => return Err(staging(&partial)(source)),
        };

        tokio::fs::rename(&partial, &target)
            .await
            .map_err(staging(&target))?;

        info!(
            dataset,
            bytes = downloaded,
            path = %target.display(),
            "Dataset staged"
        );

        Ok(StagedFile::new(dataset, target))
    }
}

#[derive(Debug)]
enum BodyError {
    Transport(String),
    Write(io::Error),
}

/// Copy a response body into the `.part` file at `partial`
///
/// The partial file is removed on any failure.
async fn write_partial<S, B, E, W>(partial: &Path, mut writer: W, body: S) -> Result<u64, BodyError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    W: AsyncWrite + Unpin,
{
    let mut body = std::pin::pin!(body);
    let copied = async {
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| BodyError::Transport(e.to_string()))?;
            writer.write_all(chunk.as_ref()).await.map_err(BodyError::Write)?;
            written += chunk.as_ref().len() as u64;
        }
        writer.flush().await.map_err(BodyError::Write)?;
        Ok::<_, BodyError>(written)
    }
    .await;
    drop(writer);

    if copied.is_err() {
        if let Err(e) = tokio::fs::remove_file(partial).await {
            debug!(path = %partial.display(), error = %e, "Could not remove partial download");
        }
    }
    copied
}

/// A compressed dataset file on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    dataset: String,
    path: PathBuf,
}

impl StagedFile {
    pub fn new(dataset: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            dataset: dataset.into(),
            path: path.into(),
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the file as a buffered stream of decompressed bytes
    ///
    /// Only the gzip header is checked here; corrupt deflate data surfaces
    /// as read errors while the stream is consumed.
    pub fn open(&self) -> Result<BufReader<GzDecoder<File>>, SourceError> {
        let mut file = File::open(&self.path).map_err(|source| self.staging_error(source))?;

        let mut magic = [0u8; 2];
        match file.read_exact(&mut magic) {
            Ok(()) if magic == GZIP_MAGIC => {}
            Ok(()) => return Err(self.decompression_error("missing gzip magic bytes")),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(self.decompression_error("file is shorter than a gzip header"))
            }
            Err(e) => return Err(self.staging_error(e)),
        }
        file.seek(SeekFrom::Start(0))
            .map_err(|source| self.staging_error(source))?;

        debug!(dataset = %self.dataset, path = %self.path.display(), "Opened staged file");
        Ok(BufReader::with_capacity(READ_BUFFER_SIZE, GzDecoder::new(file)))
    }

    /// Delete the staged file
    pub async fn remove(&self) -> Result<(), SourceError> {
        tokio::fs::remove_file(&self.path)
            .await
            .map_err(|source| self.staging_error(source))?;
        debug!(dataset = %self.dataset, path = %self.path.display(), "Removed staged file");
        Ok(())
    }

    pub(crate) fn decompression_error(&self, reason: impl Into<String>) -> SourceError {
        SourceError::Decompression {
            dataset: self.dataset.clone(),
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn staging_error(&self, source: io::Error) -> SourceError {
        SourceError::Staging {
            dataset: self.dataset.clone(),
            path: self.path.clone(),
            source,
        }
    }
}
