//! Groups logs into sessions by correlation key.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trailmark_core::{Log, Session, SessionStatus};

const SUMMARY_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("correlation key for log {log_id} is not deterministic ({first:?} then {second:?})")]
    UnstableKey {
        log_id: String,
        first: String,
        second: String,
    },
}

/// Built-in ways of deriving a correlation key from a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "camelCase")]
pub enum CorrelationStrategy {
    SessionId,
    UserId,
    AgentId,
    Workflow,
    /// First tag starting with `prefix`, with the prefix removed.
    TagPrefix { prefix: String },
}

impl Default for CorrelationStrategy {
    fn default() -> Self {
        CorrelationStrategy::SessionId
    }
}

impl CorrelationStrategy {
    /// Returns the key for a log, or an empty string when the log has none.
    pub fn key_of(&self, log: &Log) -> String {
        match self {
            CorrelationStrategy::SessionId => log.session_id.clone().unwrap_or_default(),
            CorrelationStrategy::UserId => log.user_id.clone().unwrap_or_default(),
            CorrelationStrategy::AgentId => log.agent_id.clone(),
            CorrelationStrategy::Workflow => log.workflow.clone().unwrap_or_default(),
            CorrelationStrategy::TagPrefix { prefix } => log
                .tags
                .iter()
                .find_map(|t| t.strip_prefix(prefix.as_str()))
                .map(str::to_string)
                .unwrap_or_default(),
        }
    }
}

/// Sessions produced from a corpus, plus how many logs could not be placed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregation {
    pub sessions: Vec<Session>,
    pub skipped: u64,
}

/// Derives sessions from a flat log corpus.
#[derive(Debug, Clone)]
pub struct SessionAggregator {
    recency_window: Duration,
}

impl SessionAggregator {
    /// `recency_window`: a session whose latest log is at most this old is `Active`.
    pub fn new(recency_window: Duration) -> Self {
        Self { recency_window }
    }

    /// Partitions `logs` by `key_of`, keeping keys in first-seen order.
    ///
    /// Logs that fail validation or yield an empty key are skipped and counted.
    /// The result depends only on the inputs, including `now`.
    pub fn aggregate<F>(
        &self,
        logs: &[Log],
        key_of: F,
        now: DateTime<Utc>,
    ) -> Result<Aggregation, AggregationError>
    where
        F: Fn(&Log) -> String,
    {
        let mut order: Vec<String> = Vec::new();
        let mut partitions: HashMap<String, Vec<&Log>> = HashMap::new();
        let mut skipped = 0u64;

        for log in logs {
            if let Err(reason) = log.validate() {
                tracing::warn!(log_id = %log.id, "Skipping log: {}", reason);
                skipped += 1;
                continue;
            }

            let key = key_of(log);
            let again = key_of(log);
            if key != again {
                return Err(AggregationError::UnstableKey {
                    log_id: log.id.clone(),
                    first: key,
                    second: again,
                });
            }
            if key.is_empty() {
                skipped += 1;
                continue;
            }

            partitions
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(log);
        }

        let mut sessions = Vec::with_capacity(order.len());
        for key in order {
            let Some(mut members) = partitions.remove(&key) else {
                continue;
            };
            members.sort_by_key(|l| l.timestamp);
            sessions.push(self.build_session(key, &members, now));
        }

        tracing::debug!(sessions = sessions.len(), skipped, "Aggregated sessions");
        Ok(Aggregation { sessions, skipped })
    }

    /// `members` is non-empty and sorted by timestamp.
    fn build_session(&self, key: String, members: &[&Log], now: DateTime<Utc>) -> Session {
        let first = members[0];
        let last = members[members.len() - 1];

        let duration_ms = (last.timestamp - first.timestamp)
            .num_milliseconds()
            .max(0) as u64;

        let status = if members.iter().any(|l| l.is_error()) {
            SessionStatus::Error
        } else if self.is_recent(last.timestamp, now) {
            SessionStatus::Active
        } else {
            SessionStatus::Completed
        };

        let user_id = members
            .iter()
            .find_map(|l| l.user_id.as_deref().filter(|u| !u.is_empty()))
            .unwrap_or("anonymous")
            .to_string();

        let tags: BTreeSet<String> = members.iter().flat_map(|l| l.tags.iter().cloned()).collect();

        Session {
            id: key,
            user_id,
            start_time: first.timestamp,
            end_time: last.timestamp,
            duration: format_duration(duration_ms),
            duration_ms,
            turn_count: members.len(),
            status,
            summary: first.input.chars().take(SUMMARY_CHARS).collect(),
            traces: members.iter().map(|l| l.id.clone()).collect(),
            environment: last.environment,
            tags,
        }
    }

    /// Timestamps in the future count as recent.
    fn is_recent(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let age_ms = now.signed_duration_since(last).num_milliseconds();
        let window_ms = i64::try_from(self.recency_window.as_millis()).unwrap_or(i64::MAX);
        age_ms <= window_ms
    }
}

/// Formats elapsed milliseconds as `{minutes}m {seconds}s`.
pub fn format_duration(duration_ms: u64) -> String {
    let secs = duration_ms / 1000;
    format!("{}m {}s", secs / 60, secs % 60)
}
