//! URL-safe transport encoding for execution contexts.
//!
//! `encode` is compact JSON, percent-encoded, then base64 (URL-safe alphabet,
//! no padding). `decode` reverses each stage and reports which one failed.

use std::collections::HashMap;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::error::Category;
use thiserror::Error;
use trailmark_core::TraceExecutionContext;

/// Page the playground is served from.
pub const PLAYBACK_PATH: &str = "/simulator";

const DEBUG_MODE: &str = "debug";

#[derive(Debug, Error)]
#[error("failed to serialize execution context: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decoded bytes are not UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("invalid percent-encoding")]
    PercentEncoding,
    #[error("invalid JSON: {0}")]
    Json(serde_json::Error),
    #[error("JSON does not describe an execution context: {0}")]
    Schema(serde_json::Error),
    #[error("missing traceId")]
    MissingTraceId,
}

pub fn encode(context: &TraceExecutionContext) -> Result<String, EncodeError> {
    let json = serde_json::to_string(context)?;
    let escaped = urlencoding::encode(&json);
    Ok(URL_SAFE_NO_PAD.encode(escaped.as_bytes()))
}

/// Inverse of [`encode`]. Also accepts standard padded base64.
pub fn decode(encoded: &str) -> Result<TraceExecutionContext, DecodeError> {
    let encoded = encoded.trim();
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .or_else(|_| STANDARD.decode(encoded))?;
    let escaped = String::from_utf8(bytes)?;
    let json = urlencoding::decode(&escaped).map_err(|_| DecodeError::PercentEncoding)?;

    serde_json::from_str(&json).map_err(|e| match e.classify() {
        Category::Data => DecodeError::Schema(e),
        _ => DecodeError::Json(e),
    })
}

/// Builds `/simulator?traceId=<id>&mode=debug[&context=<encoded>]`.
///
/// The trace id is embedded as given; callers only pass path-safe ids.
pub fn build_playback_url(
    trace_id: &str,
    context: Option<&TraceExecutionContext>,
) -> Result<String, EncodeError> {
    build_playback_url_at(PLAYBACK_PATH, trace_id, context)
}

pub fn build_playback_url_at(
    path: &str,
    trace_id: &str,
    context: Option<&TraceExecutionContext>,
) -> Result<String, EncodeError> {
    let mut url = format!("{}?traceId={}&mode={}", path, trace_id, DEBUG_MODE);
    if let Some(ctx) = context {
        url.push_str("&context=");
        url.push_str(&encode(ctx)?);
    }
    Ok(url)
}

/// A playground launch request read back from a playback URL's query.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackRequest {
    pub trace_id: String,
    pub mode: String,
    /// `None` means trace-id-only mode: the consumer looks the trace up itself.
    pub context: Option<TraceExecutionContext>,
}

pub fn parse_playback_query(query: &HashMap<String, String>) -> Result<PlaybackRequest, DecodeError> {
    let trace_id = query
        .get("traceId")
        .filter(|id| !id.is_empty())
        .ok_or(DecodeError::MissingTraceId)?
        .clone();
    let mode = query
        .get("mode")
        .cloned()
        .unwrap_or_else(|| DEBUG_MODE.to_string());
    let context = query
        .get("context")
        .filter(|c| !c.is_empty())
        .map(|c| decode(c))
        .transpose()?;

    Ok(PlaybackRequest {
        trace_id,
        mode,
        context,
    })
}
