//! HTTP request handlers

use super::AppState;
use crate::error::ApiResult;
use axum::{extract::State, response::Json};
use jamviz_common::models::HistoryEntry;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rows returned by `GET /history`
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    git_hash: String,
    build_timestamp: String,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "jamviz-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        build_timestamp: env!("BUILD_TIMESTAMP").to_string(),
    })
}

/// Track pushed by the browser extension
#[derive(Debug, Deserialize)]
pub struct TrackPush {
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub album: String,
    /// Artwork URL or data URI, when the page exposes one
    #[serde(default)]
    pub artwork: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

/// POST /track
///
/// Stored for the next reconciliation cycle as an extension candidate. A push
/// with neither artist nor title is acknowledged and ignored; the extension
/// fires on every page change and does not look at the answer.
pub async fn push_track(
    State(state): State<AppState>,
    Json(push): Json<TrackPush>,
) -> Json<StatusResponse> {
    let stored = state
        .inbox
        .push(&push.artist, &push.title, &push.album, push.artwork);
    if !stored {
        debug!("Empty extension push ignored");
    }
    Json(StatusResponse {
        status: if stored { "ok" } else { "ignored" }.to_string(),
    })
}

/// GET /history
///
/// Most recent plays, newest first.
pub async fn get_history(State(state): State<AppState>) -> ApiResult<Json<Vec<HistoryEntry>>> {
    let entries = state.history.recent(HISTORY_LIMIT).await?;
    debug!(count = entries.len(), "History requested");
    Ok(Json(entries))
}
