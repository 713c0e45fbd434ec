//! Interaction log records.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel through which an interaction arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogSource {
    Chat,
    #[serde(rename = "API")]
    Api,
    Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Qa,
    Prod,
}

/// A single agent interaction, written once at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub source: LogSource,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub output: String,
    pub status: LogStatus,
    /// Milliseconds.
    pub latency: u64,
    pub tokens: u64,
    /// USD.
    pub cost: f64,
    pub environment: Environment,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Evaluation score as a fraction in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Log {
    pub fn is_error(&self) -> bool {
        self.status == LogStatus::Error
    }

    /// Rejects records whose numbers would poison an aggregate.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.id.trim().is_empty() {
            return Err("empty log id");
        }
        if !self.cost.is_finite() || self.cost < 0.0 {
            return Err("cost must be a finite, non-negative number");
        }
        if let Some(score) = self.score {
            if !(0.0..=1.0).contains(&score) {
                return Err("score must be within [0, 1]");
            }
        }
        Ok(())
    }
}
