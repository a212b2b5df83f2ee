//! IMDb Server Library
//!
//! Serves title lookups and statistics over the locally synchronized IMDb
//! datasets, and keeps them fresh with a periodic sync.
//!
//! # Overview
//!
//! - **API Endpoints**: health, title lookup, statistics and sync status
//! - **Scheduling**: [`scheduler::SyncScheduler`] runs the ingestion pipeline
//!   from `imdb-ingest` once per interval
//! - **Configuration**: environment-based, see [`config::Config`]
//! - **Middleware**: CORS, request logging and the first-sync readiness gate

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod scheduler;

// Re-export commonly used types
pub use api::AppState;
pub use error::AppError;
pub use scheduler::{Readiness, SyncScheduler};
