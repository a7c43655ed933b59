use std::sync::Arc;
use axum::{extract::State, http::StatusCode, Json, response::{IntoResponse, Response}};
use rusqlite::Connection;
use crate::AppState;
use crate::identity::{IdentityEngine, IdentityError};

/// Error surfaced by a handler. Domain errors map to 4xx, everything else
/// is a 500.
pub struct ApiError(anyhow::Error);

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<IdentityError>() {
            Some(IdentityError::FaceNotFound(_)) | Some(IdentityError::PersonNotFound(_)) => StatusCode::NOT_FOUND,
            Some(IdentityError::SelfMerge) | Some(IdentityError::EmptyName) | Some(IdentityError::NotLabeled(_)) => {
                StatusCode::BAD_REQUEST
            }
            None => {
                tracing::error!("request failed: {:#}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": format!("{}", self.0) }))).into_response()
    }
}

/// Run blocking store work on a pooled connection.
pub(crate) async fn with_conn<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection, &IdentityEngine) -> anyhow::Result<T> + Send + 'static,
{
    let pool = state.pool.clone();
    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        f(&*conn, &*engine)
    })
    .await
    .map_err(|e| ApiError(anyhow::anyhow!("blocking task failed: {e}")))?
    .map_err(ApiError)
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let params = *state.engine.params();
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "database": "SQLite",
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "eps": params.eps,
        "min_samples": params.min_samples,
    });
    (StatusCode::OK, Json(body))
}

pub async fn resolve_identities(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let report = with_conn(&state, |conn, engine| engine.resolve_identities(conn)).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true, "report": report }))))
}

pub async fn recluster(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let report = with_conn(&state, |conn, engine| engine.recluster(conn)).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true, "report": report }))))
}
