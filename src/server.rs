//! HTTP serving layer.
//!
//! A thin JSON surface over [`RecommendationEngine`] and [`UserDirectory`]:
//!
//! - `GET /` - liveness text
//! - `GET /tuijian?id=<int>[&k=<int>]` (alias `/recommend`) - recommendations
//! - `GET /users` - every directory entry
//! - `GET /users/{id}` - one directory entry
//! - `GET /health` - store and directory sizes
//!
//! Unknown students get an empty recommendation list, not an error. Only
//! malformed parameters produce a 400.

use crate::directory::UserDirectory;
use crate::error::{FriendRecError, Result};
use crate::model::{UserEntry, UserId};
use crate::recommend::RecommendationEngine;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Everything a request handler needs. Built once at startup, then shared
/// read-only.
#[derive(Debug)]
pub struct AppState {
    pub engine: RecommendationEngine,
    pub directory: UserDirectory,
    /// `k` used when a request does not pass one.
    pub default_top_k: usize,
}

/// JSON error body with an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<FriendRecError> for ApiError {
    fn from(err: FriendRecError) -> Self {
        let status = match err {
            FriendRecError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

/// Response for `/tuijian`.
#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub student_id: i64,
    pub student_info: String,
    pub recommend_friends: Vec<String>,
    pub recommend_ids: Vec<UserId>,
    pub count: usize,
}

/// Response for `/users`.
#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub count: usize,
    pub users: Vec<UserEntry>,
}

/// Response for `/users/{id}`.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub uid: i64,
    pub info: String,
    pub known: bool,
}

/// Response for `/health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub users: usize,
    pub dimension: usize,
    pub directory_entries: usize,
}

/// Parse an optional integer parameter.
fn parse_int_param(
    params: &HashMap<String, String>,
    name: &str,
) -> std::result::Result<Option<i64>, FriendRecError> {
    params
        .get(name)
        .map(|raw| {
            raw.trim().parse::<i64>().map_err(|_| {
                FriendRecError::invalid_parameter(name, format!("expected an integer, got '{raw}'"))
            })
        })
        .transpose()
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(home_handler))
        .route("/tuijian", get(recommend_handler))
        .route("/recommend", get(recommend_handler))
        .route("/users", get(list_users_handler))
        .route("/users/{id}", get(get_user_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn home_handler() -> &'static str {
    "friendrec is running. Try /tuijian?id=1"
}

async fn recommend_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> std::result::Result<Json<RecommendResponse>, ApiError> {
    let student_id =
        parse_int_param(&params, "id")?.ok_or_else(|| ApiError::bad_request("Missing 'id' parameter"))?;

    let top_k = match parse_int_param(&params, "k")? {
        None => state.default_top_k,
        Some(k) => usize::try_from(k).map_err(|_| {
            FriendRecError::invalid_parameter("k", format!("must not be negative, got {k}"))
        })?,
    };

    // The scan is CPU bound, so it runs off the async worker threads.
    let scan_state = Arc::clone(&state);
    let ids = tokio::task::spawn_blocking(move || scan_state.engine.recommend(student_id, top_k))
        .await
        .map_err(|e| FriendRecError::Server(format!("Recommendation task failed: {e}")))?;
    let recommend_friends: Vec<String> = ids.iter().map(|id| state.directory.display(*id)).collect();

    Ok(Json(RecommendResponse {
        student_id,
        student_info: state.directory.display(UserId(student_id)),
        count: ids.len(),
        recommend_friends,
        recommend_ids: ids,
    }))
}

async fn list_users_handler(State(state): State<Arc<AppState>>) -> Json<UsersResponse> {
    let users: Vec<UserEntry> = state.directory.entries().collect();
    Json(UsersResponse {
        count: users.len(),
        users,
    })
}

async fn get_user_handler(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> std::result::Result<Json<UserResponse>, ApiError> {
    let uid = raw.trim().parse::<i64>().map_err(|_| {
        FriendRecError::invalid_parameter("id", format!("expected an integer, got '{raw}'"))
    })?;
    let id = UserId(uid);

    Ok(Json(UserResponse {
        uid,
        info: state.directory.display(id),
        known: state.directory.get(id).is_some(),
    }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        users: state.engine.len(),
        dimension: state.engine.store().dimension(),
        directory_entries: state.directory.len(),
    })
}

/// Bind `addr` and serve until Ctrl-C.
///
/// # Errors
///
/// Returns [`FriendRecError::Server`] if the address cannot be bound or the
/// server fails while running.
pub async fn serve(state: Arc<AppState>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| FriendRecError::Server(format!("failed to bind {addr}: {e}")))?;

    let local = listener
        .local_addr()
        .map_or_else(|_| addr.to_string(), |a| a.to_string());
    info!(
        addr = %local,
        users = state.engine.len(),
        directory_entries = state.directory.len(),
        "Serving recommendations"
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| FriendRecError::Server(e.to_string()))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
