//! The HTTP front of the store.
//!
//! Six endpoints over one shared engine handle. Every endpoint except the
//! root banner requires the `X-API-Key` header to match the configured key.
//! Engine calls can block (queue backpressure, read batching), so handlers
//! run them under `spawn_blocking` to keep the runtime workers free.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::config::Config;
use crate::engine::Database;
use crate::error::DbError;
use crate::Result;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    api_key: Arc<str>,
    version: Arc<str>,
    port: u16,
}

impl AppState {
    /// Builds handler state from a running engine and the server config.
    pub fn new(db: Arc<Database>, config: &Config) -> Self {
        AppState {
            db,
            api_key: config.api_key.as_str().into(),
            version: config.version.as_str().into(),
            port: config.port,
        }
    }
}

/// query-string carrier for the `path` parameter; absent means empty
#[derive(Debug, Deserialize)]
struct PathQuery {
    #[serde(default)]
    path: String,
}

/// Builds the router with all six endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/save", post(save))
        .route("/read", get(read))
        .route("/delete", post(delete))
        .route("/add", post(add))
        .route("/version", get(version))
        .with_state(state)
}

/// Binds the HTTP listener and serves requests until the process exits.
pub async fn serve(state: AppState) -> Result<()> {
    let port = state.port;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    headers
        .get("X-API-Key")
        .and_then(|value| value.to_str().ok())
        == Some(state.api_key.as_ref())
}

fn forbidden() -> Response {
    (StatusCode::FORBIDDEN, "Forbidden").into_response()
}

async fn root(State(state): State<AppState>) -> String {
    format!("Server running on port {}", state.port)
}

async fn version(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return forbidden();
    }
    state.version.to_string().into_response()
}

async fn save(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if !authorized(&state, &headers) {
        return forbidden();
    }
    let data: Value = match serde_json::from_str(&body) {
        Ok(data) => data,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid JSON format").into_response(),
    };

    let db = Arc::clone(&state.db);
    let path = query.path;
    match tokio::task::spawn_blocking(move || db.set(&path, data)).await {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(DbError::EmptyKey)) => {
            (StatusCode::BAD_REQUEST, "Path parameter is required").into_response()
        }
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to save data: {}", e),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Save task failed: {}", e),
        )
            .into_response(),
    }
}

async fn read(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return forbidden();
    }

    let db = Arc::clone(&state.db);
    let path = query.path;
    match tokio::task::spawn_blocking(move || db.get(&path)).await {
        Ok(Ok(Some(value))) => Json(value).into_response(),
        Ok(Ok(None)) => (StatusCode::NOT_FOUND, "Data not found").into_response(),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to read data: {}", e),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Read task failed: {}", e),
        )
            .into_response(),
    }
}

async fn delete(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return forbidden();
    }
    if query.path.is_empty() {
        return (StatusCode::BAD_REQUEST, "Path parameter is required").into_response();
    }

    let db = Arc::clone(&state.db);
    let path = query.path;
    match tokio::task::spawn_blocking(move || db.delete(&path)).await {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to delete data: {}", e),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Delete task failed: {}", e),
        )
            .into_response(),
    }
}

async fn add(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if !authorized(&state, &headers) {
        return forbidden();
    }
    if query.path.is_empty() {
        return (StatusCode::BAD_REQUEST, "Path parameter is required").into_response();
    }
    let data: Value = match serde_json::from_str(&body) {
        Ok(data) => data,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid JSON format").into_response(),
    };

    let db = Arc::clone(&state.db);
    let path = query.path;
    match tokio::task::spawn_blocking(move || db.add(&path, data)).await {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to add data: {}", e),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Add task failed: {}", e),
        )
            .into_response(),
    }
}
