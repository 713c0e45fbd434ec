//! Core data model for trailmark traces, logs and sessions.

mod log;
mod session;
mod trace;

pub use log::{Environment, Log, LogSource, LogStatus};
pub use session::{Session, SessionStatus};
pub use trace::{
    OrchestrationContext, StepKind, StepStatus, MAX_STEP_VALUE, ToolExecution, ToolMetadata, TraceDetail,
    TraceExecutionContext, TraceStep, TraceSummary, ValidationError,
};

/// Arbitrary structured payload (tool input, model config, user input).
pub type StructuredValue = serde_json::Value;
