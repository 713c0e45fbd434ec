//! Log corpus snapshots handed to the aggregator and rollup.

use serde::Serialize;
use trailmark_core::Log;

/// A point-in-time slice of the log corpus plus the number of records that
/// could not be used.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
    pub logs: Vec<Log>,
    pub skipped: u64,
}

impl LogBatch {
    /// Parses untrusted JSON records, skipping the ones that do not describe a valid log.
    pub fn from_raw(records: Vec<serde_json::Value>) -> Self {
        let mut batch = Self::default();
        for (index, record) in records.into_iter().enumerate() {
            let parsed = serde_json::from_value::<Log>(record)
                .map_err(|e| e.to_string())
                .and_then(|log| log.validate().map(|_| log).map_err(str::to_string));
            match parsed {
                Ok(log) => batch.logs.push(log),
                Err(reason) => {
                    tracing::warn!(index, "Skipping malformed log record: {}", reason);
                    batch.skipped += 1;
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_raw_skips_malformed_records() {
        let good = json!({
            "id": "log-1", "timestamp": "2024-05-01T12:00:00Z", "agent": "Bot",
            "agentId": "a1", "source": "Chat", "status": "Error", "latency": 5,
            "tokens": 1, "cost": 0.0, "environment": "qa"
        });
        let negative_cost = json!({
            "id": "log-2", "timestamp": "2024-05-01T12:00:00Z", "agent": "Bot",
            "agentId": "a1", "source": "Chat", "status": "Success", "latency": 5,
            "tokens": 1, "cost": -3.0, "environment": "qa"
        });
        let batch = LogBatch::from_raw(vec![good, json!({"id": 7}), negative_cost]);
        assert_eq!(batch.logs.len(), 1);
        assert_eq!(batch.skipped, 2);
    }
}
