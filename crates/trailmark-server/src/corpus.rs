//! Log corpus access with last-known-good fallback.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use trailmark_monitor::{LogBatch, LogQuery, StoreError, TraceStore};

use crate::error::AppError;
use crate::ServerState;

/// Source of raw logs for aggregation and rollups.
#[async_trait]
pub trait LogCorpus: Send + Sync {
    async fn load(&self, query: &LogQuery) -> Result<LogBatch, StoreError>;
}

/// Corpus read from the local trace store.
pub struct StoreCorpus {
    store: Arc<TraceStore>,
}

impl StoreCorpus {
    pub fn new(store: Arc<TraceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LogCorpus for StoreCorpus {
    async fn load(&self, query: &LogQuery) -> Result<LogBatch, StoreError> {
        let store = self.store.clone();
        let query = query.clone();
        tokio::task::spawn_blocking(move || store.list_logs(&query))
            .await
            .map_err(|_| StoreError::Lock)?
    }
}

/// A corpus snapshot and whether it came from the fallback cache.
pub struct Loaded {
    pub batch: Arc<LogBatch>,
    pub degraded: bool,
}

/// Loads the full corpus, refreshing the snapshot on success and serving the
/// previous snapshot (flagged degraded) on failure.
pub async fn load_corpus(state: &ServerState) -> Result<Loaded, AppError> {
    match state.corpus.load(&LogQuery::default()).await {
        Ok(batch) => {
            let batch = Arc::new(batch);
            *state.snapshot.write().await = Some(batch.clone());
            Ok(Loaded {
                batch,
                degraded: false,
            })
        }
        Err(e) => {
            warn!("Log corpus unavailable, trying snapshot: {}", e);
            let snapshot = state.snapshot.read().await.clone();
            snapshot
                .map(|batch| Loaded {
                    batch,
                    degraded: true,
                })
                .ok_or_else(|| AppError::Unavailable("log corpus unavailable".into()))
        }
    }
}
