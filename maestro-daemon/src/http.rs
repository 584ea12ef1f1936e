//! HTTP control surface (§6 "Control surface (HTTP, loopback)").
//!
//! Enriched from `examples/mmogr-gglib/crates/gglib-axum`: an
//! `Arc`-wrapped state extractor, an `HttpError` → JSON mapping, and a
//! loopback-only permissive CORS layer. The teacher has no HTTP surface of
//! its own (Tauri IPC only), so the route shapes below follow spec.md §6
//! directly rather than any one teacher file.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use maestro_core::model::Mode;
use maestro_core::session::{SessionCoordinator, StatusSnapshot};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

pub type AppState = Arc<SessionCoordinator>;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("{0}")]
    Session(#[from] maestro_core::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.to_string() };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/start", get(start))
        .route("/stop", get(stop))
        .route("/pause", get(pause))
        .route("/resume", get(resume))
        .route("/confirm", post(confirm))
        .route("/cancel", post(cancel))
        .route("/mode", post(set_mode))
        .fallback(not_found)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorBody { error: "not found".into() })).into_response()
}

async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.status())
}

async fn start(State(state): State<AppState>) -> Result<Json<StatusSnapshot>, HttpError> {
    state.start()?;
    Ok(Json(state.status()))
}

async fn stop(State(state): State<AppState>) -> Result<Json<StatusSnapshot>, HttpError> {
    state.stop()?;
    Ok(Json(state.status()))
}

async fn pause(State(state): State<AppState>) -> Json<StatusSnapshot> {
    state.pause();
    Json(state.status())
}

async fn resume(State(state): State<AppState>) -> Json<StatusSnapshot> {
    state.resume();
    Json(state.status())
}

async fn confirm(State(state): State<AppState>) -> Result<Json<StatusSnapshot>, HttpError> {
    state.confirm()?;
    Ok(Json(state.status()))
}

async fn cancel(State(state): State<AppState>) -> Json<StatusSnapshot> {
    state.cancel();
    Json(state.status())
}

#[derive(Deserialize)]
struct SetModeRequest {
    mode: Mode,
}

async fn set_mode(State(state): State<AppState>, Json(req): Json<SetModeRequest>) -> Json<StatusSnapshot> {
    state.set_mode(req.mode);
    Json(state.status())
}
