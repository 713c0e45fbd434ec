//! Capture-time recorder that publishes finished traces to the TraceStore.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use trailmark_core::{
    OrchestrationContext, StepKind, StepStatus, ToolExecution, TraceDetail,
    TraceExecutionContext, TraceStep,
};

use crate::store::{StoreError, TraceStore};

/// Start marker for a step in progress.
#[derive(Debug, Clone, Copy)]
pub struct StepTimer {
    start_ms: u64,
    began: Instant,
}

/// A step as reported by the executing agent.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub agent: String,
    pub kind: StepKind,
    pub name: String,
    pub status: StepStatus,
    pub tool_execution: Option<ToolExecution>,
}

#[derive(Default)]
struct Draft {
    steps: Vec<TraceStep>,
    orchestration: OrchestrationContext,
    execution_context: Option<TraceExecutionContext>,
}

/// Collects steps for one execution and publishes them as a single immutable trace.
///
/// Offsets come from a monotonic clock anchored at construction. Steps may
/// finish out of order; `finish` orders them by start and numbers them in
/// that order.
pub struct TraceRecorder {
    store: Arc<TraceStore>,
    trace_id: String,
    started: Instant,
    draft: Mutex<Draft>,
}

impl TraceRecorder {
    pub fn new(store: Arc<TraceStore>, routing_decision: impl Into<String>) -> Self {
        let draft = Draft {
            orchestration: OrchestrationContext {
                routing_decision: routing_decision.into(),
                ..Default::default()
            },
            ..Default::default()
        };
        Self {
            store,
            trace_id: uuid::Uuid::new_v4().to_string(),
            started: Instant::now(),
            draft: Mutex::new(draft),
        }
    }

    /// Returns the trace ID.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn activate_sub_agent(&self, name: impl Into<String>) {
        let Ok(mut draft) = self.draft.lock() else {
            tracing::warn!("Failed to acquire trace draft lock");
            return;
        };
        draft.orchestration.active_sub_agents.insert(name.into());
    }

    /// Attaches the replay snapshot for this execution.
    pub fn set_execution_context(&self, context: TraceExecutionContext) {
        let Ok(mut draft) = self.draft.lock() else {
            tracing::warn!("Failed to acquire trace draft lock");
            return;
        };
        draft.execution_context = Some(context);
    }

    pub fn start_step(&self) -> StepTimer {
        let began = Instant::now();
        StepTimer {
            start_ms: millis(began.saturating_duration_since(self.started)),
            began,
        }
    }

    pub fn finish_step(&self, timer: StepTimer, outcome: StepOutcome) {
        self.record_step(timer.start_ms, millis(timer.began.elapsed()), outcome);
    }

    /// Records a step with explicit timing (for replayed or imported executions).
    pub fn record_step(&self, start_ms: u64, duration_ms: u64, outcome: StepOutcome) {
        let Ok(mut draft) = self.draft.lock() else {
            tracing::warn!("Failed to acquire trace draft lock");
            return;
        };
        tracing::debug!(
            trace_id = %self.trace_id,
            agent = %outcome.agent,
            kind = %outcome.kind,
            start_ms,
            duration_ms,
            "Recorded step"
        );
        let id = draft.steps.len() as u64 + 1;
        draft.steps.push(TraceStep {
            id,
            agent: outcome.agent,
            kind: outcome.kind,
            name: outcome.name,
            start: start_ms,
            duration: duration_ms,
            status: outcome.status,
            tool_execution: outcome.tool_execution,
        });
    }

    /// Publishes the trace. Nothing is written if the steps violate trace invariants.
    pub fn finish(self) -> Result<TraceDetail, StoreError> {
        let draft = self.draft.into_inner().map_err(|_| StoreError::Lock)?;

        let mut steps = draft.steps;
        steps.sort_by_key(|s| s.start);
        for (index, step) in steps.iter_mut().enumerate() {
            step.id = index as u64 + 1;
        }

        let trace = TraceDetail {
            id: self.trace_id,
            steps,
            orchestration_context: draft.orchestration,
            execution_context: draft.execution_context,
        };

        self.store.put_trace(&trace).map_err(|e| {
            tracing::warn!(trace_id = %trace.id, "Failed to publish trace: {}", e);
            e
        })?;
        tracing::info!(trace_id = %trace.id, steps = trace.steps.len(), "Trace captured");
        Ok(trace)
    }
}

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(agent: &str, kind: StepKind, status: StepStatus) -> StepOutcome {
        let tool_execution = match (&kind, status) {
            (StepKind::Tool, StepStatus::Success) => {
                Some(ToolExecution::succeeded(json!({"q": "x"}), "ok"))
            }
            (StepKind::Tool, StepStatus::Error) => {
                Some(ToolExecution::failed(json!({"q": "x"}), "boom"))
            }
            _ => None,
        };
        StepOutcome {
            agent: agent.to_string(),
            kind,
            name: format!("{} step", agent),
            status,
            tool_execution,
        }
    }

    #[test]
    fn test_recorder_publishes_trace() {
        let store = Arc::new(TraceStore::in_memory().unwrap());
        let recorder = TraceRecorder::new(store.clone(), "delegate to search");
        recorder.activate_sub_agent("Search");

        let timer = recorder.start_step();
        recorder.finish_step(
            timer,
            outcome("Orchestrator", StepKind::Orchestration, StepStatus::Success),
        );
        let timer = recorder.start_step();
        recorder.finish_step(timer, outcome("Search", StepKind::Tool, StepStatus::Success));

        let trace_id = recorder.trace_id().to_string();
        let trace = recorder.finish().unwrap();

        let stored = store.get_trace(&trace_id).unwrap();
        assert_eq!(stored, trace);
        assert_eq!(stored.steps.len(), 2);
        assert!(stored.orchestration_context.active_sub_agents.contains("Search"));
        assert!(stored.steps[0].start <= stored.steps[1].start);
    }

    #[test]
    fn test_out_of_order_completion_is_renumbered() {
        let store = Arc::new(TraceStore::in_memory().unwrap());
        let recorder = TraceRecorder::new(store, "parallel");
        recorder.record_step(40, 5, outcome("B", StepKind::Response, StepStatus::Success));
        recorder.record_step(10, 50, outcome("A", StepKind::Tool, StepStatus::Error));

        let trace = recorder.finish().unwrap();
        let order: Vec<_> = trace.steps.iter().map(|s| (s.id, s.agent.as_str())).collect();
        assert_eq!(order, vec![(1, "A"), (2, "B")]);
    }

    #[test]
    fn test_invalid_trace_is_not_published() {
        let store = Arc::new(TraceStore::in_memory().unwrap());
        let recorder = TraceRecorder::new(store.clone(), "broken");
        let mut bad = outcome("Search", StepKind::Tool, StepStatus::Success);
        bad.tool_execution = None;
        recorder.record_step(0, 1, bad);

        assert!(matches!(recorder.finish(), Err(StoreError::InvalidTrace(_))));
        assert_eq!(store.count_traces().unwrap(), 0);
    }
}
