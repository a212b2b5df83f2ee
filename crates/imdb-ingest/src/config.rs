//! Sync configuration
//!
//! Loaded from environment variables (call `dotenvy::dotenv()` first to pick
//! up a `.env` file):
//!
//! | variable | default |
//! |---|---|
//! | `IMDB_DATASETS_BASE_URL` | `https://datasets.imdbws.com` |
//! | `IMDB_DATASETS` | `titles,episodes,ratings,akas` |
//! | `IMDB_STAGING_DIR` | `<tmp>/imdb-sync` |
//! | `IMDB_BATCH_SIZE` | `100` |
//! | `IMDB_PROGRESS_EVERY` | `200` |
//! | `IMDB_EMPTY_VALUES` | `\N` |
//! | `IMDB_KEEP_STAGED_FILES` | `false` |
//! | `IMDB_CHANNEL_CAPACITY` | `4096` |

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::datasets::DatasetKind;
use crate::writer::WriterConfig;

pub const DEFAULT_BASE_URL: &str = "https://datasets.imdbws.com";
pub const DEFAULT_EMPTY_VALUE: &str = "\\N";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    pub base_url: String,
    /// Datasets in run order
    pub datasets: Vec<DatasetKind>,
    pub staging_dir: PathBuf,
    pub batch_size: usize,
    pub progress_every: u64,
    /// Raw cell values decoded as absent
    pub empty_values: Vec<String>,
    pub keep_staged_files: bool,
    /// Decoded records buffered between the decoder thread and the writer
    pub channel_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            datasets: DatasetKind::ALL.to_vec(),
            staging_dir: std::env::temp_dir().join("imdb-sync"),
            batch_size: 100,
            progress_every: 200,
            empty_values: vec![DEFAULT_EMPTY_VALUE.to_string()],
            keep_staged_files: false,
            channel_capacity: 4096,
        }
    }
}

impl SyncConfig {
    /// Load sync configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let datasets = match std::env::var("IMDB_DATASETS") {
            Ok(list) => parse_datasets(&list)?,
            Err(_) => defaults.datasets,
        };

        let empty_values = match std::env::var("IMDB_EMPTY_VALUES") {
            Ok(list) => list
                .split(',')
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => defaults.empty_values,
        };

        let config = Self {
            base_url: std::env::var("IMDB_DATASETS_BASE_URL").unwrap_or(defaults.base_url),
            datasets,
            staging_dir: std::env::var("IMDB_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_dir),
            batch_size: env_parse("IMDB_BATCH_SIZE", defaults.batch_size)?,
            progress_every: env_parse("IMDB_PROGRESS_EVERY", defaults.progress_every)?,
            empty_values,
            keep_staged_files: std::env::var("IMDB_KEEP_STAGED_FILES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.keep_staged_files),
            channel_capacity: env_parse("IMDB_CHANNEL_CAPACITY", defaults.channel_capacity)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.datasets.is_empty() {
            anyhow::bail!("IMDB_DATASETS must name at least one dataset");
        }
        if self.base_url.trim().is_empty() {
            anyhow::bail!("IMDB_DATASETS_BASE_URL cannot be empty");
        }
        if self.progress_every == 0 {
            anyhow::bail!("IMDB_PROGRESS_EVERY must be greater than 0");
        }
        if self.channel_capacity == 0 {
            anyhow::bail!("IMDB_CHANNEL_CAPACITY must be greater than 0");
        }

        let writer = self.writer();
        for kind in &self.datasets {
            writer
                .validate(kind.column_count())
                .with_context(|| format!("IMDB_BATCH_SIZE is invalid for dataset '{kind}'"))?;
        }

        Ok(())
    }

    pub fn writer(&self) -> WriterConfig {
        WriterConfig {
            batch_size: self.batch_size,
            progress_every: self.progress_every,
        }
    }

    /// Download URL of a dataset file
    pub fn url_for(&self, kind: DatasetKind) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), kind.file_name())
    }
}

fn parse_datasets(list: &str) -> anyhow::Result<Vec<DatasetKind>> {
    let mut datasets = Vec::new();
    for name in list.split(',').filter(|name| !name.trim().is_empty()) {
        let kind: DatasetKind = name.parse()?;
        if datasets.contains(&kind) {
            anyhow::bail!("Dataset '{kind}' is listed more than once in IMDB_DATASETS");
        }
        datasets.push(kind);
    }
    Ok(datasets)
}

fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{name} has invalid value '{raw}': {e}")),
        Err(_) => Ok(default),
    }
}
