//! Aggregate metrics over the log corpus at platform, project and agent scope.
//!
//! Every `*_rate` field and `accuracy` is a fraction in `[0, 1]`, never a percentage.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use trailmark_core::Log;

/// Records processed between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollupError {
    #[error("rollup cancelled after {processed} records")]
    Cancelled { processed: usize },
    #[error("invalid metrics scope: {0}")]
    InvalidScope(String),
}

/// Granularity of a rollup. Textual form: `platform`, `project:<id>`, `agent:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MetricsScope {
    Platform,
    Project(String),
    Agent(String),
}

impl MetricsScope {
    pub fn matches(&self, log: &Log) -> bool {
        match self {
            MetricsScope::Platform => true,
            MetricsScope::Project(id) => log.project_id.as_deref() == Some(id.as_str()),
            MetricsScope::Agent(id) => log.agent_id == *id,
        }
    }
}

impl FromStr for MetricsScope {
    type Err = RollupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RollupError::InvalidScope(s.to_string());
        match s.split_once(':') {
            None if s == "platform" => Ok(MetricsScope::Platform),
            Some(("project", id)) if !id.is_empty() => Ok(MetricsScope::Project(id.to_string())),
            Some(("agent", id)) if !id.is_empty() => Ok(MetricsScope::Agent(id.to_string())),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for MetricsScope {
    type Error = RollupError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MetricsScope> for String {
    fn from(scope: MetricsScope) -> Self {
        scope.to_string()
    }
}

impl fmt::Display for MetricsScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricsScope::Platform => f.write_str("platform"),
            MetricsScope::Project(id) => write!(f, "project:{}", id),
            MetricsScope::Agent(id) => write!(f, "agent:{}", id),
        }
    }
}

/// Aggregate metrics for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub scope: MetricsScope,
    pub total_requests: u64,
    pub error_count: u64,
    /// Errors over total requests; 0 when there are no requests.
    pub error_rate: f64,
    /// Project and agent scope only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    /// Mean evaluation score; project and agent scope, when any log is scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub avg_latency_ms: f64,
    /// Nearest-rank 95th percentile.
    pub p95_latency_ms: u64,
    pub total_tokens: u64,
    pub avg_tokens_per_request: f64,
    /// USD.
    pub total_cost: f64,
    pub avg_cost_per_request: f64,
    /// Platform scope only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agents: Option<usize>,
    /// Platform scope only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_projects: Option<usize>,
    /// In-scope records left out because they failed validation.
    pub skipped_records: u64,
}

/// Computes the summary for `scope`, or `Cancelled` if `cancel` fires first.
///
/// A cancelled rollup never yields a partial summary.
pub fn rollup(
    logs: &[Log],
    scope: &MetricsScope,
    cancel: &CancellationToken,
) -> Result<MetricsSummary, RollupError> {
    let mut total_requests = 0u64;
    let mut error_count = 0u64;
    let mut total_tokens = 0u64;
    let mut total_cost = 0.0f64;
    let mut total_latency = 0.0f64;
    let mut latencies: Vec<u64> = Vec::new();
    let mut scores: Vec<f64> = Vec::new();
    let mut agents: HashSet<&str> = HashSet::new();
    let mut projects: HashSet<&str> = HashSet::new();
    let mut skipped_records = 0u64;

    for (processed, log) in logs.iter().enumerate() {
        if processed % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            tracing::debug!(processed, scope = %scope, "Rollup cancelled");
            return Err(RollupError::Cancelled { processed });
        }
        if !scope.matches(log) {
            continue;
        }
        if log.validate().is_err() {
            skipped_records += 1;
            continue;
        }

        total_requests += 1;
        if log.is_error() {
            error_count += 1;
        }
        total_tokens = total_tokens.saturating_add(log.tokens);
        total_cost += log.cost;
        total_latency += log.latency as f64;
        latencies.push(log.latency);
        scores.extend(log.score);
        agents.insert(log.agent_id.as_str());
        if let Some(project) = log.project_id.as_deref() {
            projects.insert(project);
        }
    }

    let error_rate = ratio(error_count as f64, total_requests);
    let narrow = !matches!(scope, MetricsScope::Platform);

    let summary = MetricsSummary {
        scope: scope.clone(),
        total_requests,
        error_count,
        error_rate,
        success_rate: narrow.then(|| if total_requests == 0 { 0.0 } else { 1.0 - error_rate }),
        accuracy: (narrow && !scores.is_empty())
            .then(|| scores.iter().sum::<f64>() / scores.len() as f64),
        avg_latency_ms: ratio(total_latency, total_requests),
        p95_latency_ms: percentile(&mut latencies, 0.95),
        total_tokens,
        avg_tokens_per_request: ratio(total_tokens as f64, total_requests),
        total_cost,
        avg_cost_per_request: ratio(total_cost, total_requests),
        active_agents: (!narrow).then_some(agents.len()),
        active_projects: (!narrow).then_some(projects.len()),
        skipped_records,
    };

    tracing::debug!(
        scope = %scope,
        total_requests,
        error_count,
        skipped_records,
        "Computed metrics rollup"
    );
    Ok(summary)
}

fn ratio(numerator: f64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        numerator / total as f64
    }
}

/// Nearest-rank percentile; 0 for an empty sample.
fn percentile(samples: &mut [u64], p: f64) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    samples.sort_unstable();
    let rank = (p * samples.len() as f64).ceil() as usize;
    samples[rank.clamp(1, samples.len()) - 1]
}
