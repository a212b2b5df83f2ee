//! HTTP routes
//!
//! | route | response |
//! |---|---|
//! | `GET /healthz` | `OK` |
//! | `GET /v1/imdb/{id}` | title with akas, 400 on a malformed id, 404 when unknown |
//! | `GET /v1/statistics` | current statistics snapshot |
//! | `GET /v1/omdb?i={id}` | OMDb-style title body, see [`omdb`] |
//! | `GET /v1/sync` | sync state and last marker |
//!
//! Everything under `/v1` answers 503 until the first sync has completed.

pub mod omdb;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use imdb_common::ImdbId;
use imdb_ingest::datasets::TitleDetails;
use imdb_ingest::store::TitleLookup;
use imdb_ingest::SyncOrchestrator;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::CorsConfig;
use crate::error::AppError;
use crate::middleware;
use crate::scheduler::Readiness;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub titles: Arc<dyn TitleLookup>,
    pub sync: Arc<SyncOrchestrator>,
    pub readiness: Readiness,
}

/// Build the application router with all routes and middleware
pub fn router(state: AppState, cors: &CorsConfig) -> Router {
    let v1 = Router::new()
        .route("/imdb/:id", get(get_title))
        .route("/omdb", get(omdb::get_omdb_title))
        .route("/statistics", get(get_statistics))
        .route("/sync", get(get_sync_status))
        .route_layer(from_fn_with_state(
            state.readiness.clone(),
            middleware::require_ready,
        ));

    Router::new()
        .route("/healthz", get(health_check))
        .nest("/v1", v1)
        .with_state(state)
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn get_title(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<TitleDetails>, AppError> {
    let id: ImdbId = raw.parse().map_err(|_| AppError::InvalidImdbId(raw))?;

    match state.titles.find_title(&id).await? {
        Some(title) => Ok(Json(title)),
        None => Err(AppError::NotFound(id.to_string())),
    }
}

async fn get_statistics(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let statistics = state.sync.statistics();
    let snapshot = statistics.get().await?;
    Ok(Json(snapshot.to_json(statistics.spec())))
}

async fn get_sync_status(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let last_sync = state.sync.last_sync_time().await?;

    let mut body = json!(state.sync.state());
    if let Value::Object(fields) = &mut body {
        fields.insert("last_sync".into(), json!(last_sync));
    }
    Ok(Json(body))
}
