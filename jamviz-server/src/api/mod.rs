//! HTTP surface
//!
//! One router serves the frame stream, extension ingestion, play history,
//! cached media files and the health check. The frame stream answers on both
//! `/` and `/ws`.

pub mod handlers;
pub mod ws;

use crate::broadcast::HubHandle;
use crate::db::HistoryStore;
use crate::sources::ExtensionInbox;
use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub inbox: Arc<ExtensionInbox>,
    pub history: HistoryStore,
    /// Root of the media cache, served under `/media`
    pub media_dir: PathBuf,
}

/// Create the router
///
/// CORS is permissive: the browser extension posts from page origins.
pub fn create_router(state: AppState) -> Router {
    let media = ServeDir::new(&state.media_dir);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(ws::ws_handler))
        .route("/ws", get(ws::ws_handler))
        .route("/track", post(handlers::push_track))
        .route("/history", get(handlers::get_history))
        .nest_service("/media", media)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
