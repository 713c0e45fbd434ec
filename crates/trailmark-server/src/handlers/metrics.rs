//! Metrics rollup handler.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use trailmark_monitor::{rollup, MetricsScope, MetricsSummary};

use crate::corpus::load_corpus;
use crate::error::AppError;
use crate::ServerState;

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub summary: MetricsSummary,
    pub degraded: bool,
}

/// GET /metrics/{scope} - Rollup for `platform`, `project:<id>` or `agent:<id>`.
pub async fn summary(
    State(state): State<Arc<ServerState>>,
    Path(scope): Path<String>,
) -> Result<Json<MetricsResponse>, AppError> {
    let scope: MetricsScope = scope.parse()?;
    let loaded = load_corpus(&state).await?;
    let corpus_skipped = loaded.batch.skipped;

    let cancel = CancellationToken::new();
    let deadline = {
        let cancel = cancel.clone();
        let timeout = state.rollup_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        })
    };

    let batch = loaded.batch;
    let result = tokio::task::spawn_blocking(move || rollup(&batch.logs, &scope, &cancel))
        .await
        .map_err(AppError::internal);
    deadline.abort();

    let mut summary = result?.map_err(|e| {
        tracing::warn!("Metrics rollup failed: {}", e);
        e
    })?;
    summary.skipped_records += corpus_skipped;

    Ok(Json(MetricsResponse {
        summary,
        degraded: loaded.degraded,
    }))
}
