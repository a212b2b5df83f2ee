//! Periodic sync scheduling
//!
//! At startup the scheduler reads the last synchronization marker. With no
//! marker, or one older than the interval, it syncs right away; otherwise it
//! sleeps until `last + interval`. After that it runs once per interval. A
//! failed run is logged and retried at the next tick.

use chrono::{DateTime, TimeDelta, Utc};
use imdb_ingest::{SyncError, SyncOrchestrator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Whether a completed sync exists, shared with the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Time to wait before the first run
pub fn initial_delay(now: DateTime<Utc>, last: Option<DateTime<Utc>>, interval: Duration) -> Duration {
    let Some(last) = last else {
        return Duration::ZERO;
    };

    let due = TimeDelta::from_std(interval)
        .ok()
        .and_then(|delta| last.checked_add_signed(delta));

    match due {
        Some(due) => (due - now).to_std().unwrap_or(Duration::ZERO),
        None => interval,
    }
}

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    readiness: Readiness,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, interval: Duration, readiness: Readiness) -> Self {
        Self {
            orchestrator,
            interval,
            readiness,
        }
    }

    /// Read the last marker and compute the first delay
    ///
    /// Marks the service ready when a completed sync already exists.
    pub async fn prepare(&self) -> Result<Duration, SyncError> {
        let last = self.orchestrator.last_sync_time().await?;
        if last.is_some() {
            self.readiness.mark_ready();
        }

        let delay = initial_delay(Utc::now(), last, self.interval);
        info!(
            last_sync = ?last,
            delay_secs = delay.as_secs(),
            "Sync schedule prepared"
        );
        Ok(delay)
    }

    /// Run one sync; returns whether it succeeded
    ///
    /// A failed run still marks the service ready when a marker exists.
    pub async fn run_once(&self) -> bool {
        match self.orchestrator.run_sync().await {
            Ok(report) => {
                self.readiness.mark_ready();
                info!(
                    marker = %report.marker,
                    records = report.records(),
                    "Scheduled sync completed"
                );
                true
            },
            Err(e) => {
                error!(error = %e, "Scheduled sync failed, retrying at next tick");
                // Data from an earlier run, or this run's committed marker, is still servable
                if let Ok(Some(_)) = self.orchestrator.last_sync_time().await {
                    self.readiness.mark_ready();
                }
                false
            },
        }
    }

    /// Spawn the scheduling loop
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Sync scheduler started");

            let mut delay = match self.prepare().await {
                Ok(delay) => delay,
                Err(e) => {
                    error!(error = %e, "Failed to read last sync marker");
                    Duration::ZERO
                },
            };

            loop {
                if !delay.is_zero() {
                    let next = TimeDelta::from_std(delay)
                        .ok()
                        .and_then(|d| Utc::now().checked_add_signed(d));
                    info!(next_sync = ?next, "Waiting for next sync");
                    tokio::time::sleep(delay).await;
                }

                self.run_once().await;
                delay = self.interval;
            }
        })
    }
}
