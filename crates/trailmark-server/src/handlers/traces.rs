//! Trace observability API handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use trailmark_core::{TraceDetail, TraceSummary};
use trailmark_monitor::{default_step, TraceQuery};

use crate::error::AppError;
use crate::ServerState;

/// Response for listing traces.
#[derive(Serialize)]
pub struct TracesListResponse {
    pub traces: Vec<TraceSummary>,
}

/// A trace plus the step a viewer should open by default.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceDetailResponse {
    #[serde(flatten)]
    pub trace: TraceDetail,
    pub default_step_id: Option<u64>,
}

/// Query parameters for listing traces.
#[derive(Debug, Deserialize, Default)]
pub struct ListTracesQuery {
    pub agent: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// GET /traces - List trace summaries, newest first.
pub async fn list(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<ListTracesQuery>,
) -> Result<Json<TracesListResponse>, AppError> {
    let query = TraceQuery {
        agent: params.agent,
        limit: params.limit.or(Some(50)),
        offset: params.offset,
    };

    let traces = state.trace_store.list_traces(&query)?;
    Ok(Json(TracesListResponse { traces }))
}

/// GET /traces/{id} - Get a single trace.
pub async fn get(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
) -> Result<Json<TraceDetailResponse>, AppError> {
    let trace = state.trace_store.get_trace(&trace_id)?;
    let default_step_id = default_step(&trace).map(|s| s.id);

    Ok(Json(TraceDetailResponse {
        trace,
        default_step_id,
    }))
}

/// POST /traces - Publish a captured trace.
pub async fn create(
    State(state): State<Arc<ServerState>>,
    Json(trace): Json<TraceDetail>,
) -> Result<(StatusCode, Json<TraceSummary>), AppError> {
    state.trace_store.put_trace(&trace).map_err(|e| {
        tracing::warn!(trace_id = %trace.id, "Rejected trace: {}", e);
        e
    })?;

    tracing::info!(trace_id = %trace.id, steps = trace.steps.len(), "Trace ingested");
    Ok((StatusCode::CREATED, Json(trace.summary())))
}
