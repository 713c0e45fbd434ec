//! Trace types and structural validation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::StructuredValue;

/// Structural invariant violations found in a trace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("trace id is empty")]
    EmptyId,
    #[error("step {current} follows step {previous}; ids must be strictly ascending")]
    UnorderedSteps { previous: u64, current: u64 },
    #[error("step {step} starts at {start}ms, before the previous step at {previous_start}ms")]
    StartRegressed {
        step: u64,
        start: u64,
        previous_start: u64,
    },
    #[error("tool step {0} has no tool execution payload")]
    MissingToolExecution(u64),
    #[error("step {0} carries a tool execution but is not a tool step")]
    UnexpectedToolExecution(u64),
    #[error("failed tool step {0} has no error message")]
    MissingToolError(u64),
    #[error("successful tool step {0} reports an error")]
    UnexpectedToolError(u64),
    #[error("successful tool step {0} has no output")]
    MissingToolOutput(u64),
    #[error("failed tool step {0} reports both an output and an error")]
    UnexpectedToolOutput(u64),
    #[error("step {step} {field} exceeds the storable range")]
    OutOfRange { step: u64, field: &'static str },
}

/// Largest step id or millisecond offset the store can persist.
pub const MAX_STEP_VALUE: u64 = i64::MAX as u64;

/// Kind of work a step performed. Unknown tags are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepKind {
    Orchestration,
    Tool,
    Response,
    Other(String),
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            StepKind::Orchestration => "orchestration",
            StepKind::Tool => "tool",
            StepKind::Response => "response",
            StepKind::Other(tag) => tag,
        }
    }
}

impl From<String> for StepKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "orchestration" => StepKind::Orchestration,
            "tool" => StepKind::Tool,
            "response" => StepKind::Response,
            _ => StepKind::Other(tag),
        }
    }
}

impl From<StepKind> for String {
    fn from(kind: StepKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Error => "error",
        }
    }

    /// Parses a stored status; anything unrecognized counts as an error.
    pub fn parse(s: &str) -> Self {
        match s {
            "success" => StepStatus::Success,
            _ => StepStatus::Error,
        }
    }
}

/// Optional bookkeeping attached to a tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Payload of a tool step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    #[serde(default)]
    pub input: StructuredValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ToolMetadata>,
}

impl ToolExecution {
    pub fn succeeded(input: StructuredValue, output: impl Into<String>) -> Self {
        Self {
            input,
            output: Some(output.into()),
            error: None,
            metadata: None,
        }
    }

    pub fn failed(input: StructuredValue, error: impl Into<String>) -> Self {
        Self {
            input,
            output: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: ToolMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.trim().is_empty())
    }
}

/// One unit of execution within a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceStep {
    /// Position in execution order, unique within the trace.
    pub id: u64,
    /// Acting agent ("Orchestrator", "System", or a sub-agent name).
    pub agent: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub name: String,
    /// Offset in milliseconds from trace start.
    pub start: u64,
    /// Milliseconds spent in the step.
    pub duration: u64,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_execution: Option<ToolExecution>,
}

impl TraceStep {
    pub fn is_tool(&self) -> bool {
        self.kind == StepKind::Tool
    }

    pub fn is_error(&self) -> bool {
        self.status == StepStatus::Error
    }

    /// Offset at which the step finished.
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.duration)
    }
}

/// Routing state of the orchestrator when the trace was captured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationContext {
    #[serde(default)]
    pub routing_decision: String,
    #[serde(default)]
    pub active_sub_agents: BTreeSet<String>,
}

/// Replayable snapshot of the inputs that produced a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceExecutionContext {
    pub agent_id: String,
    pub user_input: StructuredValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// A present `null` stays `Some(Value::Null)`; only an absent field is `None`.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub model_config: Option<StructuredValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_tools: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_version: Option<String>,
    /// ISO-8601 capture time.
    pub timestamp: String,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<StructuredValue>, D::Error>
where
    D: Deserializer<'de>,
{
    StructuredValue::deserialize(deserializer).map(Some)
}

impl TraceExecutionContext {
    /// A context without an agent cannot be replayed.
    pub fn is_empty(&self) -> bool {
        self.agent_id.trim().is_empty()
    }
}

/// A complete trace: ordered steps plus orchestration and replay context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceDetail {
    pub id: String,
    pub steps: Vec<TraceStep>,
    #[serde(default)]
    pub orchestration_context: OrchestrationContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_context: Option<TraceExecutionContext>,
}

impl TraceDetail {
    /// Checks step ordering, timing monotonicity and tool payload consistency.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }

        let mut previous: Option<&TraceStep> = None;
        for step in &self.steps {
            if let Some(prev) = previous {
                if step.id <= prev.id {
                    return Err(ValidationError::UnorderedSteps {
                        previous: prev.id,
                        current: step.id,
                    });
                }
                if step.start < prev.start {
                    return Err(ValidationError::StartRegressed {
                        step: step.id,
                        start: step.start,
                        previous_start: prev.start,
                    });
                }
            }
            validate_range(step)?;
            validate_tool_payload(step)?;
            previous = Some(step);
        }

        Ok(())
    }

    /// Total wall time covered by the steps.
    pub fn total_duration_ms(&self) -> u64 {
        self.steps.iter().map(TraceStep::end).max().unwrap_or(0)
    }

    pub fn has_errors(&self) -> bool {
        self.steps.iter().any(TraceStep::is_error)
    }

    pub fn step(&self, id: u64) -> Option<&TraceStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn summary(&self) -> TraceSummary {
        let agents: BTreeSet<String> = self.steps.iter().map(|s| s.agent.clone()).collect();
        TraceSummary {
            id: self.id.clone(),
            step_count: self.steps.len(),
            total_duration_ms: self.total_duration_ms(),
            status: if self.has_errors() {
                StepStatus::Error
            } else {
                StepStatus::Success
            },
            agents: agents.into_iter().collect(),
            has_execution_context: self.execution_context.is_some(),
        }
    }
}

fn validate_range(step: &TraceStep) -> Result<(), ValidationError> {
    let fields = [
        ("id", step.id),
        ("start", step.start),
        ("duration", step.duration),
    ];
    match fields.iter().find(|(_, value)| *value > MAX_STEP_VALUE) {
        Some((field, _)) => Err(ValidationError::OutOfRange {
            step: step.id,
            field: *field,
        }),
        None => Ok(()),
    }
}

fn validate_tool_payload(step: &TraceStep) -> Result<(), ValidationError> {
    let Some(exec) = &step.tool_execution else {
        return match step.is_tool() {
            true => Err(ValidationError::MissingToolExecution(step.id)),
            false => Ok(()),
        };
    };

    if !step.is_tool() {
        return Err(ValidationError::UnexpectedToolExecution(step.id));
    }

    match step.status {
        StepStatus::Error if !exec.has_error() => Err(ValidationError::MissingToolError(step.id)),
        StepStatus::Error if exec.output.is_some() => {
            Err(ValidationError::UnexpectedToolOutput(step.id))
        }
        StepStatus::Success if exec.has_error() => {
            Err(ValidationError::UnexpectedToolError(step.id))
        }
        StepStatus::Success if exec.output.is_none() => {
            Err(ValidationError::MissingToolOutput(step.id))
        }
        _ => Ok(()),
    }
}

/// Compact listing view of a stored trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSummary {
    pub id: String,
    pub step_count: usize,
    pub total_duration_ms: u64,
    pub status: StepStatus,
    pub agents: Vec<String>,
    pub has_execution_context: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn step(id: u64, kind: StepKind, start: u64, status: StepStatus) -> TraceStep {
        let tool_execution = (kind == StepKind::Tool).then(|| ToolExecution {
            input: json!({"query": "weather"}),
            output: (status == StepStatus::Success).then(|| "sunny".to_string()),
            error: (status == StepStatus::Error).then(|| "timeout".to_string()),
            metadata: None,
        });
        TraceStep {
            id,
            agent: "Orchestrator".to_string(),
            kind,
            name: format!("step-{}", id),
            start,
            duration: 10,
            status,
            tool_execution,
        }
    }

    fn trace(steps: Vec<TraceStep>) -> TraceDetail {
        TraceDetail {
            id: "trace-1".to_string(),
            steps,
            orchestration_context: OrchestrationContext::default(),
            execution_context: None,
        }
    }

    #[test]
    fn test_valid_trace_passes() {
        let t = trace(vec![
            step(1, StepKind::Orchestration, 0, StepStatus::Success),
            step(2, StepKind::Tool, 10, StepStatus::Error),
            step(3, StepKind::Response, 10, StepStatus::Success),
        ]);
        assert_eq!(t.validate(), Ok(()));
    }

    #[test]
    fn test_unordered_ids_rejected() {
        let t = trace(vec![
            step(2, StepKind::Orchestration, 0, StepStatus::Success),
            step(1, StepKind::Response, 5, StepStatus::Success),
        ]);
        assert_eq!(
            t.validate(),
            Err(ValidationError::UnorderedSteps {
                previous: 2,
                current: 1
            })
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let t = trace(vec![
            step(1, StepKind::Orchestration, 0, StepStatus::Success),
            step(1, StepKind::Response, 5, StepStatus::Success),
        ]);
        assert!(matches!(
            t.validate(),
            Err(ValidationError::UnorderedSteps { .. })
        ));
    }

    #[test]
    fn test_start_regression_rejected() {
        let t = trace(vec![
            step(1, StepKind::Orchestration, 50, StepStatus::Success),
            step(2, StepKind::Response, 20, StepStatus::Success),
        ]);
        assert!(matches!(
            t.validate(),
            Err(ValidationError::StartRegressed { step: 2, .. })
        ));
    }

    #[test]
    fn test_tool_step_requires_payload() {
        let mut s = step(1, StepKind::Tool, 0, StepStatus::Success);
        s.tool_execution = None;
        assert_eq!(
            trace(vec![s]).validate(),
            Err(ValidationError::MissingToolExecution(1))
        );
    }

    #[test]
    fn test_failed_tool_needs_error_message() {
        let mut s = step(1, StepKind::Tool, 0, StepStatus::Error);
        if let Some(exec) = s.tool_execution.as_mut() {
            exec.error = Some("  ".to_string());
        }
        assert_eq!(
            trace(vec![s]).validate(),
            Err(ValidationError::MissingToolError(1))
        );
    }

    #[test]
    fn test_successful_tool_needs_output() {
        let mut s = step(1, StepKind::Tool, 0, StepStatus::Success);
        if let Some(exec) = s.tool_execution.as_mut() {
            exec.output = None;
        }
        assert_eq!(
            trace(vec![s]).validate(),
            Err(ValidationError::MissingToolOutput(1))
        );
    }

    #[test]
    fn test_failed_tool_cannot_carry_output() {
        let mut s = step(1, StepKind::Tool, 0, StepStatus::Error);
        if let Some(exec) = s.tool_execution.as_mut() {
            exec.output = Some("partial".to_string());
        }
        assert_eq!(
            trace(vec![s]).validate(),
            Err(ValidationError::UnexpectedToolOutput(1))
        );
    }

    #[test]
    fn test_unstorable_offsets_rejected() {
        let mut s = step(1, StepKind::Response, 0, StepStatus::Success);
        s.duration = MAX_STEP_VALUE + 1;
        assert_eq!(
            trace(vec![s]).validate(),
            Err(ValidationError::OutOfRange {
                step: 1,
                field: "duration"
            })
        );

        let s = step(u64::MAX, StepKind::Response, 0, StepStatus::Success);
        assert!(matches!(
            trace(vec![s]).validate(),
            Err(ValidationError::OutOfRange { field: "id", .. })
        ));
    }

    #[test]
    fn test_null_model_config_survives_serde() {
        let ctx = TraceExecutionContext {
            agent_id: "agent-1".to_string(),
            user_input: json!("hi"),
            system_prompt: None,
            model_config: Some(serde_json::Value::Null),
            enabled_tools: None,
            prompt_version: None,
            timestamp: "2024-05-01T10:00:00Z".to_string(),
        };
        let text = serde_json::to_string(&ctx).unwrap();
        assert!(text.contains("\"modelConfig\":null"));
        let back: TraceExecutionContext = serde_json::from_str(&text).unwrap();
        assert_eq!(back, ctx);

        let absent: TraceExecutionContext = serde_json::from_value(json!({
            "agentId": "agent-1", "userInput": "hi", "timestamp": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(absent.model_config, None);
    }

    #[test]
    fn test_step_kind_keeps_unknown_tags() {
        let s: TraceStep = serde_json::from_value(json!({
            "id": 1, "agent": "System", "type": "handoff", "name": "transfer",
            "start": 0, "duration": 3, "status": "success"
        }))
        .unwrap();
        assert_eq!(s.kind, StepKind::Other("handoff".to_string()));
        assert_eq!(serde_json::to_value(&s).unwrap()["type"], "handoff");
    }

    #[test]
    fn test_summary_rolls_up_status_and_duration() {
        let t = trace(vec![
            step(1, StepKind::Orchestration, 0, StepStatus::Success),
            step(2, StepKind::Tool, 40, StepStatus::Error),
        ]);
        let summary = t.summary();
        assert_eq!(summary.step_count, 2);
        assert_eq!(summary.total_duration_ms, 50);
        assert_eq!(summary.status, StepStatus::Error);
        assert_eq!(summary.agents, vec!["Orchestrator".to_string()]);
    }

    proptest! {
        #[test]
        fn valid_traces_have_monotonic_starts(
            raw in prop::collection::vec((0u64..50, 0u64..1_000, 0u64..100), 0..12)
        ) {
            let steps: Vec<TraceStep> = raw
                .iter()
                .map(|&(id, start, duration)| {
                    let mut s = step(id, StepKind::Response, start, StepStatus::Success);
                    s.duration = duration;
                    s
                })
                .collect();
            let t = trace(steps);
            if t.validate().is_ok() {
                let mut ordered = t.steps.clone();
                ordered.sort_by_key(|s| s.id);
                prop_assert!(ordered.windows(2).all(|w| w[0].start <= w[1].start));
            }
        }

        #[test]
        fn ascending_ids_with_sorted_starts_validate(
            ids in prop::collection::btree_set(0u64..10_000, 0..12),
            mut starts in prop::collection::vec(0u64..100_000, 12),
        ) {
            starts.sort_unstable();
            let steps: Vec<TraceStep> = ids
                .iter()
                .zip(&starts)
                .map(|(&id, &start)| step(id, StepKind::Tool, start, StepStatus::Success))
                .collect();
            prop_assert_eq!(trace(steps).validate(), Ok(()));
        }
    }
}
