//! Storage backends
//!
//! The pipeline talks to storage through four narrow traits so the same
//! orchestrator runs against PostgreSQL in production and against the
//! in-process [`MemoryStore`] for dry runs and tests.
//!
//! - [`BatchSink`]: batched upserts under a [`ConflictPolicy`]
//! - [`StatisticsSource`]: row counts, grouped counts and predicate counts
//! - [`SyncMarkerStore`]: synchronization markers
//! - [`TitleLookup`]: point lookups by [`ImdbId`]

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imdb_common::ImdbId;
use thiserror::Error;

use crate::datasets::{Episode, Rating, Title, TitleAka, TitleDetails};
use crate::decode::FieldValue;
use crate::writer::ConflictPolicy;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A record type with a table mapping
///
/// `COLUMNS` lists every stored column in the order `to_values` produces
/// them; `KEY` is the conflict target and must be a subset of `COLUMNS`.
pub trait StoredRecord: Clone + Send + Sync + 'static {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];
    const KEY: &'static [&'static str];

    fn to_values(&self) -> Vec<FieldValue>;

    /// Rendered key values, in `KEY` order
    fn key(&self) -> Vec<String> {
        let values = self.to_values();
        Self::KEY
            .iter()
            .filter_map(|key| Self::COLUMNS.iter().position(|column| column == key))
            .filter_map(|index| values.get(index))
            .map(ToString::to_string)
            .collect()
    }
}

#[async_trait]
pub trait BatchSink<R: StoredRecord>: Send + Sync {
    /// Write one batch in a single statement; returns affected rows
    async fn write_batch(&self, batch: &[R], policy: ConflictPolicy) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait StatisticsSource: Send + Sync {
    async fn count_rows(&self, table: &str) -> Result<i64, StoreError>;

    /// Count rows per distinct value of `column`
    ///
    /// With `fan_out`, `column` is list-valued and a row counts once in
    /// every group it lists.
    async fn group_counts(
        &self,
        table: &str,
        column: &str,
        fan_out: bool,
    ) -> Result<Vec<(String, i64)>, StoreError>;

    async fn count_where_true(&self, table: &str, column: &str) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait SyncMarkerStore: Send + Sync {
    async fn last_marker(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn record_marker(&self, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TitleLookup: Send + Sync {
    /// The title with its alternative titles, ordered by (region, language, title)
    async fn find_title(&self, id: &ImdbId) -> Result<Option<TitleDetails>, StoreError>;
}

/// Everything a full sync and the read surface need from one backend
pub trait ImdbStore:
    BatchSink<Title>
    + BatchSink<Episode>
    + BatchSink<Rating>
    + BatchSink<TitleAka>
    + StatisticsSource
    + SyncMarkerStore
    + TitleLookup
    + 'static
{
}

impl<S> ImdbStore for S where
    S: BatchSink<Title>
        + BatchSink<Episode>
        + BatchSink<Rating>
        + BatchSink<TitleAka>
        + StatisticsSource
        + SyncMarkerStore
        + TitleLookup
        + 'static
{
}

/// Quote a table or column name after checking it is a plain identifier
pub(crate) fn quote_identifier(name: &str) -> Result<String, StoreError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !valid {
        return Err(StoreError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("imdb_titles").unwrap(), "\"imdb_titles\"");
        assert!(quote_identifier("").is_err());
        assert!(quote_identifier("1titles").is_err());
        assert!(quote_identifier("titles; DROP TABLE x").is_err());
        assert!(quote_identifier("Titles").is_err());
    }

    #[test]
    fn test_key_follows_key_order() {
        let aka = TitleAka {
            title_id: "tt0000001".into(),
            title: "Carmencita".into(),
            region: "US".into(),
            language: String::new(),
            is_original_title: false,
        };
        assert_eq!(aka.key(), vec!["tt0000001", "US", "", "Carmencita"]);
    }
}
