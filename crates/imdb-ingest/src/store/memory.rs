//! In-process store for dry runs and tests
//!
//! Rows are keyed by their rendered key values, so conflict handling matches
//! the PostgreSQL backend: merge replaces the stored row, ignore keeps the
//! first one. Every successful flush is logged per table, and a table can be
//! told to reject its n-th batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imdb_common::ImdbId;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    BatchSink, StatisticsSource, StoreError, StoredRecord, SyncMarkerStore, TitleLookup,
};
use crate::datasets::{AkaSummary, Title, TitleAka, TitleDetails};
use crate::decode::FieldValue;
use crate::writer::ConflictPolicy;

struct StoredRow {
    values: Vec<FieldValue>,
    record: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Table {
    columns: &'static [&'static str],
    rows: BTreeMap<Vec<String>, StoredRow>,
}

impl Table {
    fn column_index(&self, table: &str, column: &str) -> Result<usize, StoreError> {
        self.columns
            .iter()
            .position(|c| *c == column)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }
}

#[derive(Default)]
struct Inner {
    tables: HashMap<String, Table>,
    flushes: HashMap<String, Vec<usize>>,
    attempts: HashMap<String, usize>,
    fail_on_batch: HashMap<String, usize>,
    markers: Vec<DateTime<Utc>>,
    unavailable: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject the `batch`-th write (1-based) to `table`
    pub fn fail_on_batch(&self, table: &str, batch: usize) {
        self.lock().fail_on_batch.insert(table.to_string(), batch);
    }

    /// Make statistics and marker calls fail until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Record sizes of every successful flush to `table`, in order
    pub fn flushes(&self, table: &str) -> Vec<usize> {
        self.lock().flushes.get(table).cloned().unwrap_or_default()
    }

    pub fn markers(&self) -> Vec<DateTime<Utc>> {
        self.lock().markers.clone()
    }

    pub fn len(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Stored record with the given key values
    pub fn get<R: StoredRecord>(&self, key: &[&str]) -> Option<R> {
        let key: Vec<String> = key.iter().map(|k| k.to_string()).collect();
        self.lock()
            .tables
            .get(R::TABLE)?
            .rows
            .get(&key)?
            .record
            .downcast_ref::<R>()
            .cloned()
    }

    /// Every stored record of a type, ordered by key
    pub fn rows<R: StoredRecord>(&self) -> Vec<R> {
        self.lock()
            .tables
            .get(R::TABLE)
            .map(|table| {
                table
                    .rows
                    .values()
                    .filter_map(|row| row.record.downcast_ref::<R>().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_available(inner: &Inner) -> Result<(), StoreError> {
        if inner.unavailable {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: StoredRecord> BatchSink<R> for MemoryStore {
    async fn write_batch(&self, batch: &[R], policy: ConflictPolicy) -> Result<u64, StoreError> {
        let mut inner = self.lock();

        let attempt = {
            let attempts = inner.attempts.entry(R::TABLE.to_string()).or_default();
            *attempts += 1;
            *attempts
        };
        if inner.fail_on_batch.get(R::TABLE) == Some(&attempt) {
            return Err(StoreError::Unavailable(format!(
                "batch {attempt} to {} rejected",
                R::TABLE
            )));
        }

        let table = inner.tables.entry(R::TABLE.to_string()).or_default();
        table.columns = R::COLUMNS;

        let mut affected = 0;
        for record in batch {
            let row = StoredRow {
                values: record.to_values(),
                record: Box::new(record.clone()),
            };
            match policy {
                ConflictPolicy::Merge => {
                    table.rows.insert(record.key(), row);
                    affected += 1;
                }
                ConflictPolicy::Ignore => {
                    if let std::collections::btree_map::Entry::Vacant(slot) =
                        table.rows.entry(record.key())
                    {
                        slot.insert(row);
                        affected += 1;
                    }
                }
            }
        }

        inner
            .flushes
            .entry(R::TABLE.to_string())
            .or_default()
            .push(batch.len());

        Ok(affected)
    }
}

#[async_trait]
impl StatisticsSource for MemoryStore {
    async fn count_rows(&self, table: &str) -> Result<i64, StoreError> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner.tables.get(table).map_or(0, |t| t.rows.len() as i64))
    }

    async fn group_counts(
        &self,
        table: &str,
        column: &str,
        fan_out: bool,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let inner = self.lock();
        Self::check_available(&inner)?;

        let Some(stored) = inner.tables.get(table) else {
            return Ok(Vec::new());
        };
        let index = stored.column_index(table, column)?;

        let mut groups: BTreeMap<String, i64> = BTreeMap::new();
        for row in stored.rows.values() {
            match row.values.get(index) {
                Some(FieldValue::List(items)) if fan_out => {
                    for item in items {
                        *groups.entry(item.clone()).or_default() += 1;
                    }
                }
                Some(value) => *groups.entry(value.to_string()).or_default() += 1,
                None => {}
            }
        }

        Ok(groups.into_iter().collect())
    }

    async fn count_where_true(&self, table: &str, column: &str) -> Result<i64, StoreError> {
        let inner = self.lock();
        Self::check_available(&inner)?;

        let Some(stored) = inner.tables.get(table) else {
            return Ok(0);
        };
        let index = stored.column_index(table, column)?;

        Ok(stored
            .rows
            .values()
            .filter(|row| row.values.get(index).and_then(FieldValue::as_bool) == Some(true))
            .count() as i64)
    }
}

#[async_trait]
impl SyncMarkerStore for MemoryStore {
    async fn last_marker(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner.markers.iter().max().copied())
    }

    async fn record_marker(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_available(&inner)?;
        inner.markers.push(at);
        Ok(())
    }
}

#[async_trait]
impl TitleLookup for MemoryStore {
    async fn find_title(&self, id: &ImdbId) -> Result<Option<TitleDetails>, StoreError> {
        Self::check_available(&self.lock())?;
        let Some(title) = self.get::<Title>(&[id.as_str()]) else {
            return Ok(None);
        };

        // Rows iterate in key order, which already groups by title id
        let akas = self
            .rows::<TitleAka>()
            .into_iter()
            .filter(|aka| aka.title_id == id.as_str())
            .map(AkaSummary::from);

        Ok(Some(TitleDetails::new(title, akas)))
    }
}
