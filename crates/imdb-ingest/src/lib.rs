//! IMDb dataset ingestion pipeline
//!
//! Keeps a local store synchronized with the IMDb dataset dumps:
//!
//! 1. [`source`] downloads each `*.tsv.gz` file into a staging directory
//! 2. [`decode`] maps the tab-separated rows onto typed records
//! 3. [`writer`] upserts the records in fixed-size batches
//! 4. [`orchestrator`] runs the configured datasets in order and records a
//!    synchronization marker
//! 5. [`statistics`] recomputes the grouped counts served to readers

pub mod config;
pub mod datasets;
pub mod decode;
pub mod error;
pub mod orchestrator;
pub mod source;
pub mod statistics;
pub mod store;
pub mod writer;

pub use config::SyncConfig;
pub use error::SyncError;
pub use orchestrator::{SyncOrchestrator, SyncReport, SyncState};
pub use statistics::{StatisticsAggregator, StatisticsSnapshot, StatisticsSpec};
