//! Sessions derived from correlated logs.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::log::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Completed,
    Active,
    Error,
}

/// A correlated group of logs. Never authored directly; always recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Formatted as `{minutes}m {seconds}s`.
    pub duration: String,
    pub duration_ms: u64,
    pub turn_count: usize,
    pub status: SessionStatus,
    pub summary: String,
    /// Log ids in chronological order.
    pub traces: Vec<String>,
    pub environment: Environment,
    pub tags: BTreeSet<String>,
}
