//! Grouped counts over the synchronized tables
//!
//! The aggregator owns the current [`StatisticsSnapshot`] behind an
//! `RwLock<Option<Arc<_>>>`. Computing a snapshot happens outside the lock;
//! the write lock is held only to swap the pointer, so readers see either the
//! previous snapshot or the new one. A failed recompute empties the slot and
//! readers get the store error until a computation succeeds.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::datasets::{Episode, Rating, Title, TitleAka};
use crate::store::{StatisticsSource, StoreError, StoredRecord, SyncMarkerStore};

#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("Failed to compute statistics: {0}")]
    Store(#[from] StoreError),
}

/// A categorical column to group by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub table: String,
    pub column: String,
    /// Key name used when rendering one group, e.g. `type`
    pub label: String,
    /// The column is list-valued; a row counts in each listed group
    pub fan_out: bool,
}

/// A boolean column whose true rows are counted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub name: String,
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsSpec {
    /// Table whose row count is reported as `count`
    pub primary: String,
    pub tables: Vec<String>,
    pub dimensions: Vec<Dimension>,
    pub predicates: Vec<Predicate>,
}

impl StatisticsSpec {
    /// Counts for every dataset, title types, genres and adult titles
    pub fn imdb() -> Self {
        Self {
            primary: Title::TABLE.to_string(),
            tables: vec![
                Title::TABLE.to_string(),
                Episode::TABLE.to_string(),
                Rating::TABLE.to_string(),
                TitleAka::TABLE.to_string(),
            ],
            dimensions: vec![
                Dimension {
                    name: "types".into(),
                    table: Title::TABLE.into(),
                    column: "title_type".into(),
                    label: "type".into(),
                    fan_out: false,
                },
                Dimension {
                    name: "genres".into(),
                    table: Title::TABLE.into(),
                    column: "genres".into(),
                    label: "genre".into(),
                    fan_out: true,
                },
            ],
            predicates: vec![Predicate {
                name: "adult".into(),
                table: Title::TABLE.into(),
                column: "is_adult".into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub key: String,
    pub count: i64,
}

/// Immutable result of one statistics computation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    /// Marker of the sync the snapshot reflects; `None` before the first sync
    pub as_of: Option<DateTime<Utc>>,
    pub computed_at: DateTime<Utc>,
    pub count: i64,
    pub totals: BTreeMap<String, i64>,
    /// Groups per dimension, ascending by key
    pub groups: BTreeMap<String, Vec<GroupCount>>,
    pub predicates: BTreeMap<String, i64>,
}

impl StatisticsSnapshot {
    pub fn group(&self, dimension: &str) -> &[GroupCount] {
        self.groups.get(dimension).map(Vec::as_slice).unwrap_or_default()
    }

    /// Render with per-dimension labels:
    /// `{"count": 2, "types": [{"type": "movie", "count": 1}], "adult": 0, ...}`
    pub fn to_json(&self, spec: &StatisticsSpec) -> Value {
        let mut body = Map::new();
        body.insert("as_of".into(), json!(self.as_of));
        body.insert("count".into(), json!(self.count));
        body.insert("totals".into(), json!(self.totals));

        for dimension in &spec.dimensions {
            let groups: Vec<Value> = self
                .group(&dimension.name)
                .iter()
                .map(|g| {
                    let mut item = Map::new();
                    item.insert(dimension.label.clone(), json!(g.key));
                    item.insert("count".into(), json!(g.count));
                    Value::Object(item)
                })
                .collect();
            body.insert(dimension.name.clone(), Value::Array(groups));
        }

        for (name, count) in &self.predicates {
            body.insert(name.clone(), json!(count));
        }

        Value::Object(body)
    }
}

pub struct StatisticsAggregator {
    source: Arc<dyn StatisticsSource>,
    markers: Option<Arc<dyn SyncMarkerStore>>,
    spec: StatisticsSpec,
    snapshot: RwLock<Option<Arc<StatisticsSnapshot>>>,
}

impl StatisticsAggregator {
    pub fn new(source: Arc<dyn StatisticsSource>, spec: StatisticsSpec) -> Self {
        Self {
            source,
            markers: None,
            spec,
            snapshot: RwLock::new(None),
        }
    }

    /// Stamp on-demand snapshots with the latest marker from `markers`
    pub fn with_markers(mut self, markers: Arc<dyn SyncMarkerStore>) -> Self {
        self.markers = Some(markers);
        self
    }

    pub fn spec(&self) -> &StatisticsSpec {
        &self.spec
    }

    /// Current snapshot without computing one
    pub fn current(&self) -> Option<Arc<StatisticsSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cached snapshot, computed on first use
    pub async fn get(&self) -> Result<Arc<StatisticsSnapshot>, StatisticsError> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        let as_of = match &self.markers {
            Some(markers) => markers.last_marker().await?,
            None => None,
        };
        let computed = Arc::new(self.compute(as_of).await?);

        // A recompute may have installed a snapshot meanwhile; keep it.
        let mut slot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(slot.get_or_insert(computed)))
    }

    /// Compute a fresh snapshot for the sync at `as_of` and swap it in
    ///
    /// On failure the cached snapshot is dropped, so the next [`get`](Self::get)
    /// recomputes on demand instead of serving counts older than `as_of`.
    pub async fn recompute(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Arc<StatisticsSnapshot>, StatisticsError> {
        let snapshot = match self.compute(Some(as_of)).await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
                warn!(as_of = %as_of, error = %e, "Statistics recompute failed, snapshot cleared");
                return Err(e);
            },
        };
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));

        info!(
            as_of = %as_of,
            count = snapshot.count,
            "Statistics snapshot replaced"
        );
        Ok(snapshot)
    }

    async fn compute(
        &self,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<StatisticsSnapshot, StatisticsError> {
        let mut totals = BTreeMap::new();
        for table in &self.spec.tables {
            totals.insert(table.clone(), self.source.count_rows(table).await?);
        }

        let count = match totals.get(&self.spec.primary) {
            Some(count) => *count,
            None => self.source.count_rows(&self.spec.primary).await?,
        };

        let mut groups = BTreeMap::new();
        for dimension in &self.spec.dimensions {
            let mut counts: Vec<GroupCount> = self
                .source
                .group_counts(&dimension.table, &dimension.column, dimension.fan_out)
                .await?
                .into_iter()
                .map(|(key, count)| GroupCount { key, count })
                .collect();
            counts.sort_by(|a, b| a.key.cmp(&b.key));
            groups.insert(dimension.name.clone(), counts);
        }

        let mut predicates = BTreeMap::new();
        for predicate in &self.spec.predicates {
            let matched = self
                .source
                .count_where_true(&predicate.table, &predicate.column)
                .await?;
            predicates.insert(predicate.name.clone(), matched);
        }

        debug!(count, dimensions = groups.len(), "Computed statistics");

        Ok(StatisticsSnapshot {
            as_of,
            computed_at: Utc::now(),
            count,
            totals,
            groups,
            predicates,
        })
    }
}
