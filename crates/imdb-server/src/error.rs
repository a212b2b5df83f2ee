//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use imdb_ingest::statistics::StatisticsError;
use imdb_ingest::store::StoreError;
use imdb_ingest::SyncError;
use serde_json::json;
use thiserror::Error;

/// Application error types
///
/// Every variant renders as `{"error": ..., "info": ...}` with a matching
/// status code.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid IMDb id: {0}")]
    InvalidImdbId(String),

    #[error("Title not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Statistics error: {0}")]
    Statistics(#[from] StatisticsError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("First synchronization has not completed")]
    Syncing,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, info) = match self {
            AppError::InvalidImdbId(_) => (
                StatusCode::BAD_REQUEST,
                "imdb format is invalid",
                "The IMDb id provided is not a title id. It should be '[tt]0000000[0]'.",
            ),
            AppError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "imdb title cannot be found",
                "The IMDb id provided does not exist in the last synchronization.",
            ),
            AppError::Store(ref e) => {
                tracing::error!("Store error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "store unavailable",
                    "The database cannot be accessed correctly, please try again later.",
                )
            },
            AppError::Statistics(ref e) => {
                tracing::error!("Statistics error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "statistics cannot be calculated",
                    "The database cannot be accessed correctly, please try again later.",
                )
            },
            AppError::Sync(ref e) => {
                tracing::error!("Sync error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "sync status unavailable",
                    "The database cannot be accessed correctly, please try again later.",
                )
            },
            AppError::Syncing => (
                StatusCode::SERVICE_UNAVAILABLE,
                "syncing",
                "First synchronization in progress, please try again later.",
            ),
        };

        (status, Json(json!({ "error": error, "info": info }))).into_response()
    }
}
