//! Log ingestion handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use trailmark_core::Log;

use crate::error::AppError;
use crate::ServerState;

/// POST /logs - Record one interaction log.
pub async fn create(
    State(state): State<Arc<ServerState>>,
    Json(log): Json<Log>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    state.trace_store.insert_log(&log)?;
    tracing::debug!(log_id = %log.id, agent_id = %log.agent_id, "Log ingested");
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": log.id }))))
}
