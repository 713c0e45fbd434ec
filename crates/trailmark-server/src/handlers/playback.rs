//! Playground launch handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;
use trailmark_core::TraceExecutionContext;
use trailmark_monitor::codec::{build_playback_url_at, parse_playback_query};
use trailmark_monitor::extract;

use crate::error::AppError;
use crate::ServerState;

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackMode {
    /// URL carries the full execution context.
    Context,
    /// URL carries only the trace id.
    TraceIdOnly,
}

#[derive(Debug, Serialize)]
pub struct PlaybackUrlResponse {
    pub url: String,
    pub mode: PlaybackMode,
}

/// GET /traces/{id}/playback - Build the "open in playground" link for a trace.
pub async fn playback_url(
    State(state): State<Arc<ServerState>>,
    Path(trace_id): Path<String>,
) -> Result<Json<PlaybackUrlResponse>, AppError> {
    let trace = state.trace_store.get_trace(&trace_id)?;
    let context = extract(&trace);
    let url = build_playback_url_at(&state.playback_path, &trace.id, context.as_ref())?;
    let mode = match context {
        Some(_) => PlaybackMode::Context,
        None => PlaybackMode::TraceIdOnly,
    };

    Ok(Json(PlaybackUrlResponse { url, mode }))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ContextSource {
    Url,
    Trace,
    Unavailable,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorResponse {
    pub trace_id: String,
    pub mode: String,
    pub context_source: ContextSource,
    pub context: Option<TraceExecutionContext>,
}

/// GET /simulator - Rehydrate a playground session from a playback URL.
///
/// Without `context` the stored trace is consulted; a trace that predates
/// context capture yields `contextSource: unavailable`.
pub async fn simulator(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<SimulatorResponse>, AppError> {
    let request = parse_playback_query(&params)?;

    let (context_source, context) = match request.context {
        Some(ctx) => (ContextSource::Url, Some(ctx)),
        None => {
            let trace = state.trace_store.get_trace(&request.trace_id)?;
            match extract(&trace) {
                Some(ctx) => (ContextSource::Trace, Some(ctx)),
                None => (ContextSource::Unavailable, None),
            }
        }
    };

    Ok(Json(SimulatorResponse {
        trace_id: request.trace_id,
        mode: request.mode,
        context_source,
        context,
    }))
}
