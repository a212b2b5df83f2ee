//! Sync run sequencing
//!
//! ```text
//! Idle → Fetching(d₁) → … → Fetching(dₙ) → Finalizing → Idle
//! ```
//!
//! Datasets run one at a time in configured order. The first failure ends
//! the run; what was written before it stays. Only a fully successful run
//! records a synchronization marker and refreshes the statistics snapshot.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::datasets::{build_jobs, DatasetJob};
use crate::decode::ConfigurationError;
use crate::error::SyncError;
use crate::source::DatasetSource;
use crate::statistics::{StatisticsAggregator, StatisticsSpec};
use crate::store::{ImdbStore, StatisticsSource, SyncMarkerStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Fetching { dataset: String },
    Finalizing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetReport {
    pub dataset: String,
    pub records: u64,
    pub batches: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub marker: DateTime<Utc>,
    pub datasets: Vec<DatasetReport>,
}

impl SyncReport {
    pub fn records(&self) -> u64 {
        self.datasets.iter().map(|d| d.records).sum()
    }
}

/// Next marker after `last`, truncated to the microsecond precision the
/// store keeps
pub fn next_marker(now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = now
        .with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now);

    match last {
        Some(last) if last >= now => last + Duration::microseconds(1),
        _ => now,
    }
}

pub struct SyncOrchestrator {
    source: DatasetSource,
    jobs: Vec<Arc<dyn DatasetJob>>,
    markers: Arc<dyn SyncMarkerStore>,
    statistics: Arc<StatisticsAggregator>,
    keep_staged_files: bool,
    running: Mutex<()>,
    state: watch::Sender<SyncState>,
}

impl SyncOrchestrator {
    pub fn new(
        source: DatasetSource,
        jobs: Vec<Arc<dyn DatasetJob>>,
        markers: Arc<dyn SyncMarkerStore>,
        statistics: Arc<StatisticsAggregator>,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            source,
            jobs,
            markers,
            statistics,
            keep_staged_files: false,
            running: Mutex::new(()),
            state,
        }
    }

    /// Orchestrator for the configured IMDb datasets backed by one store
    pub fn for_store<S: ImdbStore>(
        config: &SyncConfig,
        client: reqwest::Client,
        store: Arc<S>,
    ) -> Result<Self, ConfigurationError> {
        let jobs = build_jobs(config, Arc::clone(&store))?;
        let markers: Arc<dyn SyncMarkerStore> = store.clone();
        let counts: Arc<dyn StatisticsSource> = store;
        let statistics = StatisticsAggregator::new(counts, StatisticsSpec::imdb())
            .with_markers(Arc::clone(&markers));

        Ok(Self::new(
            DatasetSource::new(client, &config.staging_dir),
            jobs,
            markers,
            Arc::new(statistics),
        )
        .keep_staged_files(config.keep_staged_files))
    }

    pub fn keep_staged_files(mut self, keep: bool) -> Self {
        self.keep_staged_files = keep;
        self
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn statistics(&self) -> &Arc<StatisticsAggregator> {
        &self.statistics
    }

    pub fn datasets(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|job| job.name())
    }

    /// Latest recorded synchronization marker
    pub async fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        self.markers.last_marker().await.map_err(SyncError::Marker)
    }

    /// Run every dataset once, then record a marker and refresh statistics
    ///
    /// Returns [`SyncError::AlreadyRunning`] if another run is in progress.
    pub async fn run_sync(&self) -> Result<SyncReport, SyncError> {
        let _running = self.running.try_lock().map_err(|_| SyncError::AlreadyRunning)?;

        let started = Instant::now();
        info!(datasets = self.jobs.len(), "Starting sync run");

        let result = self.run_datasets().await;
        self.state.send_replace(SyncState::Idle);

        match &result {
            Ok(report) => info!(
                marker = %report.marker,
                records = report.records(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Sync run completed"
            ),
            Err(e) => error!(
                error = %e,
                dataset = e.dataset().unwrap_or("-"),
                committed_batches = e.committed_batches().unwrap_or(0),
                "Sync run failed"
            ),
        }

        result
    }

    async fn run_datasets(&self) -> Result<SyncReport, SyncError> {
        let mut datasets = Vec::with_capacity(self.jobs.len());

        for job in &self.jobs {
            self.state.send_replace(SyncState::Fetching {
                dataset: job.name().to_string(),
            });

            let staged = self.source.fetch(job.name(), job.url()).await?;
            let outcome = job.ingest(&staged).await;

            if !self.keep_staged_files {
                if let Err(e) = staged.remove().await {
                    warn!(error = %e, "Failed to remove staged file");
                }
            }

            let report = outcome?;
            info!(
                dataset = job.name(),
                records = report.records,
                batches = report.batches,
                "Dataset synchronized"
            );
            datasets.push(DatasetReport {
                dataset: job.name().to_string(),
                records: report.records,
                batches: report.batches,
            });
        }

        self.state.send_replace(SyncState::Finalizing);

        let last = self.markers.last_marker().await.map_err(SyncError::Marker)?;
        let marker = next_marker(Utc::now(), last);
        self.markers
            .record_marker(marker)
            .await
            .map_err(SyncError::Marker)?;

        self.statistics.recompute(marker).await?;

        Ok(SyncReport { marker, datasets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_marker_uses_now() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        let last = now - Duration::hours(24);
        assert_eq!(next_marker(now, Some(last)), now);
        assert_eq!(next_marker(now, None), now);
    }

    #[test]
    fn test_next_marker_strictly_increases() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        assert_eq!(next_marker(now, Some(now)), now + Duration::microseconds(1));

        let ahead = now + Duration::seconds(5);
        assert_eq!(next_marker(now, Some(ahead)), ahead + Duration::microseconds(1));
    }

    #[test]
    fn test_next_marker_truncates_to_micros() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
            + Duration::nanoseconds(1_234_567);
        assert_eq!(next_marker(now, None).nanosecond(), 1_234_000);
    }

    #[test]
    fn test_state_serializes_with_tag() {
        let fetching = SyncState::Fetching {
            dataset: "titles".into(),
        };
        assert_eq!(
            serde_json::to_value(&fetching).unwrap(),
            serde_json::json!({"state": "fetching", "dataset": "titles"})
        );
        assert_eq!(
            serde_json::to_value(SyncState::Idle).unwrap(),
            serde_json::json!({"state": "idle"})
        );
    }
}
