//! HTTP route handlers for the trailmark server.

pub mod logs;
pub mod metrics;
pub mod playback;
pub mod sessions;
pub mod traces;

/// Health check endpoint.
pub async fn health() -> &'static str {
    "OK"
}
