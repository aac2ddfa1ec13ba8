//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_error, api_ok, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{ErrorCode, SyncroomError, SyncroomResult};
use crate::protocol_constants::SERVICE_ID;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
///
/// Audio files are served from the songs directory at `/songs` with byte-range
/// support so clients can seek. When a static directory is configured it is
/// served as the fallback.
pub fn create_router(state: AppState) -> Router {
    let (songs_dir, static_dir) = {
        let config = state.config.read();
        (config.songs_dir.clone(), config.static_dir.clone())
    };

    let router = Router::new()
        .route("/health", get(health_check))
        .route("/api/playlist", get(get_playlist))
        .route("/api/playlist/refresh", post(refresh_playlist))
        .route("/api/download", post(start_download))
        .route("/api/downloads", get(list_downloads))
        .route("/api/rooms", get(list_rooms))
        .route("/ws", get(ws_handler))
        .nest_service("/songs", ServeDir::new(songs_dir));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness check.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "rooms": state.rooms.room_count(),
        "connections": state.ws_manager.connection_count(),
        "tracks": state.library.playlist().len(),
    }))
}

async fn get_playlist(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "playlist": state.library.playlist().as_ref() }))
}

/// Rescans the songs directory and pushes the new playlist into every room.
async fn refresh_playlist(State(state): State<AppState>) -> Response {
    match state.rooms.refresh_library().await {
        Ok(count) => api_ok(json!({ "count": count })).into_response(),
        Err(e) => {
            log::error!("[Library] Playlist refresh failed: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.code(),
                format!("Playlist generation failed: {}", e),
            )
            .into_response()
        }
    }
}

#[derive(Deserialize)]
struct DownloadRequest {
    #[serde(default)]
    query: String,
}

async fn start_download(
    State(state): State<AppState>,
    Json(payload): Json<DownloadRequest>,
) -> SyncroomResult<impl IntoResponse> {
    let record = state
        .downloads
        .start(&payload.query)
        .map_err(SyncroomError::from)?;
    Ok(api_ok(json!({ "id": record.id })))
}

async fn list_downloads(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "downloads": state.downloads.list() }))
}

async fn list_rooms(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "rooms": state.rooms.room_summaries() }))
}
