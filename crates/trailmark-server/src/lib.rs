//! HTTP binding for the trailmark observability engine.

pub mod corpus;
pub mod error;
pub mod handlers;
pub mod seed;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use trailmark_config::TrailmarkConfig;
use trailmark_monitor::{LogBatch, SessionAggregator, TraceStore};

use crate::corpus::LogCorpus;

pub struct ServerState {
    pub trace_store: Arc<TraceStore>,
    pub corpus: Arc<dyn LogCorpus>,
    /// Last corpus that loaded successfully; served in degraded mode.
    pub snapshot: RwLock<Option<Arc<LogBatch>>>,
    pub aggregator: SessionAggregator,
    pub playback_path: String,
    pub rollup_timeout: Duration,
}

impl ServerState {
    pub fn new(
        trace_store: Arc<TraceStore>,
        corpus: Arc<dyn LogCorpus>,
        config: &TrailmarkConfig,
    ) -> Self {
        Self {
            trace_store,
            corpus,
            snapshot: RwLock::new(None),
            aggregator: SessionAggregator::new(config.recency_window()),
            playback_path: config.playback_path.clone(),
            rollup_timeout: config.rollup_timeout(),
        }
    }
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                version = ?req.version(),
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            info!(
                latency = %format!("{} ms", latency.as_millis()),
                status = %res.status().as_u16(),
                "finished processing request"
            );
        });

    let playback_path = state.playback_path.clone();
    let logged_routes = Router::new()
        .route("/traces", get(handlers::traces::list).post(handlers::traces::create))
        .route("/traces/{id}", get(handlers::traces::get))
        .route("/traces/{id}/playback", get(handlers::playback::playback_url))
        .route(&playback_path, get(handlers::playback::simulator))
        .route("/logs", post(handlers::logs::create))
        .route("/sessions/aggregate", post(handlers::sessions::aggregate))
        .route("/metrics/{scope}", get(handlers::metrics::summary))
        .layer(trace_layer);

    Router::new()
        .merge(logged_routes)
        .route("/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}
