//! Demo corpus seeding for empty stores.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};
use trailmark_core::TraceDetail;
use trailmark_monitor::{LogBatch, TraceStore};

/// Seed file layout: `{ "traces": [...], "logs": [...] }`.
#[derive(Deserialize)]
struct SeedFile {
    #[serde(default)]
    traces: Vec<TraceDetail>,
    #[serde(default)]
    logs: Vec<serde_json::Value>,
}

/// Loads the seed file into the store if the store holds no traces and no logs.
pub fn seed_store(store: &TraceStore, path: &Path) -> Result<()> {
    let existing = store.count_traces()? + store.count_logs()?;
    if existing > 0 {
        info!("Store already has {} records, skipping seed", existing);
        return Ok(());
    }

    info!("Seeding demo corpus from {}", path.display());
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let seed: SeedFile = serde_json::from_str(&content).context("failed to parse seed file")?;

    let mut traces = 0;
    for trace in &seed.traces {
        match store.put_trace(trace) {
            Ok(()) => traces += 1,
            Err(e) => warn!("  Skipped trace {}: {}", trace.id, e),
        }
    }

    let batch = LogBatch::from_raw(seed.logs);
    let mut logs = 0;
    for log in &batch.logs {
        match store.insert_log(log) {
            Ok(()) => logs += 1,
            Err(e) => warn!("  Skipped log {}: {}", log.id, e),
        }
    }

    info!(
        "Seeded {} traces and {} logs ({} malformed records skipped)",
        traces, logs, batch.skipped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SEED: &str = r#"{
        "traces": [{
            "id": "seed-1",
            "steps": [
                {"id": 1, "agent": "Orchestrator", "type": "orchestration", "name": "Route",
                 "start": 0, "duration": 4, "status": "success"}
            ],
            "orchestrationContext": {"routingDecision": "direct", "activeSubAgents": []}
        }],
        "logs": [
            {"id": "l1", "timestamp": "2024-05-01T12:00:00Z", "agent": "Bot", "agentId": "a1",
             "source": "Chat", "status": "Success", "latency": 10, "tokens": 3, "cost": 0.1,
             "environment": "dev"},
            {"id": "l2", "broken": true}
        ]
    }"#;

    #[test]
    fn test_seed_only_fills_empty_store() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SEED.as_bytes()).unwrap();
        let store = TraceStore::in_memory().unwrap();

        seed_store(&store, file.path()).unwrap();
        assert_eq!(store.count_traces().unwrap(), 1);
        assert_eq!(store.count_logs().unwrap(), 1);

        seed_store(&store, file.path()).unwrap();
        assert_eq!(store.count_traces().unwrap(), 1);
    }

    #[test]
    fn test_missing_seed_file_is_an_error() {
        let store = TraceStore::in_memory().unwrap();
        assert!(seed_store(&store, Path::new("/nonexistent/seed.json")).is_err());
    }
}
