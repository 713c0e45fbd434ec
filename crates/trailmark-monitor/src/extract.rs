//! Replay context extraction and default step selection.

use trailmark_core::{TraceDetail, TraceExecutionContext, TraceStep};

/// Returns the trace's captured execution context, if it has a usable one.
///
/// Never reconstructs a context from step data: a trace captured before
/// context capture existed simply has nothing to replay.
pub fn extract(trace: &TraceDetail) -> Option<TraceExecutionContext> {
    trace
        .execution_context
        .as_ref()
        .filter(|ctx| !ctx.is_empty())
        .cloned()
}

/// Step shown when the consumer has not picked one: the first failed step,
/// otherwise the first tool step, otherwise none.
pub fn default_step(trace: &TraceDetail) -> Option<&TraceStep> {
    trace
        .steps
        .iter()
        .find(|s| s.is_error())
        .or_else(|| trace.steps.iter().find(|s| s.is_tool()))
}

/// Resolves an explicit selection, falling back to [`default_step`] when there is none.
pub fn effective_selected_step(trace: &TraceDetail, selected: Option<u64>) -> Option<&TraceStep> {
    match selected {
        Some(id) => trace.step(id),
        None => default_step(trace),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trailmark_core::{OrchestrationContext, StepKind, StepStatus, ToolExecution};

    fn step(id: u64, kind: StepKind, status: StepStatus) -> TraceStep {
        let tool_execution = (kind == StepKind::Tool).then(|| match status {
            StepStatus::Success => ToolExecution::succeeded(json!({}), "done"),
            StepStatus::Error => ToolExecution::failed(json!({}), "failed"),
        });
        TraceStep {
            id,
            agent: "Orchestrator".to_string(),
            kind,
            name: format!("step {}", id),
            start: id * 10,
            duration: 5,
            status,
            tool_execution,
        }
    }

    fn trace(steps: Vec<TraceStep>, context: Option<TraceExecutionContext>) -> TraceDetail {
        TraceDetail {
            id: "t".to_string(),
            steps,
            orchestration_context: OrchestrationContext::default(),
            execution_context: context,
        }
    }

    fn context(agent_id: &str) -> TraceExecutionContext {
        TraceExecutionContext {
            agent_id: agent_id.to_string(),
            user_input: json!({"message": "hi"}),
            system_prompt: None,
            model_config: None,
            enabled_tools: None,
            prompt_version: Some("v3".to_string()),
            timestamp: "2024-05-01T12:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_extract_returns_context_verbatim() {
        let t = trace(vec![], Some(context("agent-1")));
        assert_eq!(extract(&t), Some(context("agent-1")));
    }

    #[test]
    fn test_extract_without_context() {
        let t = trace(vec![step(1, StepKind::Tool, StepStatus::Success)], None);
        assert_eq!(extract(&t), None);

        let blank = trace(vec![], Some(context("  ")));
        assert_eq!(extract(&blank), None);
    }

    #[test]
    fn test_default_prefers_first_error() {
        let t = trace(
            vec![
                step(1, StepKind::Orchestration, StepStatus::Success),
                step(2, StepKind::Tool, StepStatus::Error),
                step(3, StepKind::Tool, StepStatus::Success),
            ],
            None,
        );
        assert_eq!(effective_selected_step(&t, None).map(|s| s.id), Some(2));
    }

    #[test]
    fn test_default_falls_back_to_first_tool() {
        let t = trace(
            vec![
                step(1, StepKind::Orchestration, StepStatus::Success),
                step(2, StepKind::Response, StepStatus::Success),
                step(3, StepKind::Tool, StepStatus::Success),
            ],
            None,
        );
        assert_eq!(default_step(&t).map(|s| s.id), Some(3));
    }

    #[test]
    fn test_default_can_be_empty() {
        let t = trace(vec![step(1, StepKind::Response, StepStatus::Success)], None);
        assert!(default_step(&t).is_none());
    }

    #[test]
    fn test_explicit_selection_wins() {
        let t = trace(
            vec![
                step(1, StepKind::Orchestration, StepStatus::Success),
                step(2, StepKind::Tool, StepStatus::Error),
            ],
            None,
        );
        assert_eq!(effective_selected_step(&t, Some(1)).map(|s| s.id), Some(1));
        assert!(effective_selected_step(&t, Some(9)).is_none());
    }
}
