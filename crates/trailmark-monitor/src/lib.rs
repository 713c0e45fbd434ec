//! Trace storage, session aggregation, replay context handling and metrics rollup.

pub mod codec;
mod corpus;
mod extract;
mod recorder;
mod rollup;
mod session;
mod store;

pub use corpus::LogBatch;
pub use extract::{default_step, effective_selected_step, extract};
pub use recorder::{StepOutcome, StepTimer, TraceRecorder};
pub use rollup::{rollup, MetricsScope, MetricsSummary, RollupError};
pub use session::{format_duration, Aggregation, AggregationError, CorrelationStrategy, SessionAggregator};
pub use store::{LogQuery, StoreError, TraceQuery, TraceStore};
