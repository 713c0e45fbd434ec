//! Session aggregation handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trailmark_core::Session;
use trailmark_monitor::{CorrelationStrategy, LogBatch};

use crate::corpus::load_corpus;
use crate::error::AppError;
use crate::ServerState;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AggregateRequest {
    /// Inline corpus. When absent the stored corpus is used.
    #[serde(default)]
    pub logs: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub strategy: CorrelationStrategy,
    /// Reference time for the recency window; defaults to the current time.
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    pub sessions: Vec<Session>,
    pub skipped_records: u64,
    pub degraded: bool,
}

/// POST /sessions/aggregate - Group logs into sessions.
pub async fn aggregate(
    State(state): State<Arc<ServerState>>,
    Json(req): Json<AggregateRequest>,
) -> Result<Json<AggregateResponse>, AppError> {
    let (batch, degraded) = match req.logs {
        Some(raw) => (Arc::new(LogBatch::from_raw(raw)), false),
        None => {
            let loaded = load_corpus(&state).await?;
            (loaded.batch, loaded.degraded)
        }
    };

    let strategy = req.strategy;
    let now = req.now.unwrap_or_else(Utc::now);
    let aggregation = state
        .aggregator
        .aggregate(&batch.logs, |log| strategy.key_of(log), now)?;

    tracing::info!(
        sessions = aggregation.sessions.len(),
        skipped = aggregation.skipped + batch.skipped,
        degraded,
        "Aggregated sessions"
    );

    Ok(Json(AggregateResponse {
        sessions: aggregation.sessions,
        skipped_records: aggregation.skipped + batch.skipped,
        degraded,
    }))
}
