//! SQLite-backed trace and log storage.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use thiserror::Error;
use trailmark_core::{
    Log, OrchestrationContext, StepKind, StepStatus, TraceDetail, TraceStep, TraceSummary,
    ValidationError,
};

use crate::corpus::LogBatch;

/// Errors from trace store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid trace: {0}")]
    InvalidTrace(#[from] ValidationError),
    #[error("Invalid log: {0}")]
    InvalidLog(String),
    #[error("Already exists: {0}")]
    Duplicate(String),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Lock error")]
    Lock,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Query parameters for listing traces.
#[derive(Debug, Clone, Default)]
pub struct TraceQuery {
    /// Only traces with at least one step by this agent.
    pub agent: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Query parameters for reading the log corpus.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub agent_id: Option<String>,
    pub project_id: Option<String>,
    pub limit: Option<u32>,
}

/// SQLite-backed store of write-once traces and logs.
///
/// A trace is published in a single transaction, so readers see either the
/// whole trace or nothing.
pub struct TraceStore {
    conn: Mutex<Connection>,
}

impl TraceStore {
    /// Opens (or creates) a store at the given database path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS traces (
                trace_id TEXT PRIMARY KEY,
                routing_decision TEXT NOT NULL,
                active_sub_agents TEXT NOT NULL,
                execution_context TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trace_steps (
                trace_id TEXT NOT NULL,
                step_id INTEGER NOT NULL,
                agent TEXT NOT NULL,
                step_type TEXT NOT NULL,
                name TEXT NOT NULL,
                start_ms INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                status TEXT NOT NULL,
                tool_execution TEXT,
                PRIMARY KEY (trace_id, step_id),
                FOREIGN KEY (trace_id) REFERENCES traces(trace_id)
            );

            CREATE TABLE IF NOT EXISTS logs (
                log_id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                project_id TEXT,
                timestamp_ms INTEGER NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_traces_created ON traces(created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_steps_agent ON trace_steps(agent);
            CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp_ms);
            CREATE INDEX IF NOT EXISTS idx_logs_agent ON logs(agent_id);
            CREATE INDEX IF NOT EXISTS idx_logs_project ON logs(project_id);
            "#,
        )?;

        Ok(())
    }

    /// Validates and publishes a trace. Traces are write-once.
    pub fn put_trace(&self, trace: &TraceDetail) -> Result<(), StoreError> {
        trace.validate()?;

        let active_sub_agents =
            serde_json::to_string(&trace.orchestration_context.active_sub_agents)?;
        let execution_context = trace
            .execution_context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let mut step_rows = Vec::with_capacity(trace.steps.len());
        for step in &trace.steps {
            let tool = step
                .tool_execution
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            step_rows.push((step, tool));
        }

        let mut conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            r#"INSERT OR IGNORE INTO traces
               (trace_id, routing_decision, active_sub_agents, execution_context, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                trace.id,
                trace.orchestration_context.routing_decision,
                active_sub_agents,
                execution_context,
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::Duplicate(format!("trace {}", trace.id)));
        }

        {
            let mut stmt = tx.prepare(
                r#"INSERT INTO trace_steps
                   (trace_id, step_id, agent, step_type, name, start_ms, duration_ms,
                    status, tool_execution)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            )?;
            for (step, tool) in &step_rows {
                stmt.execute(params![
                    trace.id,
                    step.id,
                    step.agent,
                    step.kind.as_str(),
                    step.name,
                    step.start,
                    step.duration,
                    step.status.as_str(),
                    tool,
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!(trace_id = %trace.id, steps = trace.steps.len(), "Published trace");
        Ok(())
    }

    /// Retrieves a trace by ID.
    pub fn get_trace(&self, trace_id: &str) -> Result<TraceDetail, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        load_trace(&conn, trace_id)
    }

    /// Lists trace summaries, newest first.
    pub fn list_traces(&self, query: &TraceQuery) -> Result<Vec<TraceSummary>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let mut sql = String::from("SELECT t.trace_id FROM traces t WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref agent) = query.agent {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM trace_steps s WHERE s.trace_id = t.trace_id AND s.agent = ?)",
            );
            params_vec.push(Box::new(agent.clone()));
        }

        sql.push_str(" ORDER BY t.created_at DESC, t.rowid DESC");
        sql.push_str(&format!(" LIMIT {}", query.limit.map(i64::from).unwrap_or(-1)));
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        let ids: Vec<String> = {
            let mut stmt = conn.prepare(&sql)?;
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|p| p.as_ref()).collect();
            let rows = stmt.query_map(params_refs.as_slice(), |row| row.get(0))?;
            rows.collect::<Result<_, _>>()?
        };

        ids.iter()
            .map(|id| load_trace(&conn, id).map(|t| t.summary()))
            .collect()
    }

    pub fn count_traces(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        Ok(conn.query_row("SELECT COUNT(*) FROM traces", [], |r| r.get(0))?)
    }

    /// Inserts a log record. Logs are write-once.
    pub fn insert_log(&self, log: &Log) -> Result<(), StoreError> {
        log.validate()
            .map_err(|reason| StoreError::InvalidLog(format!("{}: {}", log.id, reason)))?;
        let payload = serde_json::to_string(log)?;

        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        let inserted = conn.execute(
            r#"INSERT OR IGNORE INTO logs (log_id, agent_id, project_id, timestamp_ms, payload)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                log.id,
                log.agent_id,
                log.project_id,
                log.timestamp.timestamp_millis(),
                payload,
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::Duplicate(format!("log {}", log.id)));
        }
        Ok(())
    }

    /// Reads logs in chronological order. Unreadable rows are skipped and counted.
    pub fn list_logs(&self, query: &LogQuery) -> Result<LogBatch, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;

        let mut sql = String::from("SELECT log_id, payload FROM logs WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref agent_id) = query.agent_id {
            sql.push_str(" AND agent_id = ?");
            params_vec.push(Box::new(agent_id.clone()));
        }

        if let Some(ref project_id) = query.project_id {
            sql.push_str(" AND project_id = ?");
            params_vec.push(Box::new(project_id.clone()));
        }

        sql.push_str(" ORDER BY timestamp_ms ASC, rowid ASC");

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut batch = LogBatch::default();
        for row in rows {
            let (log_id, payload) = row?;
            match serde_json::from_str::<Log>(&payload) {
                Ok(log) => batch.logs.push(log),
                Err(e) => {
                    tracing::warn!(log_id = %log_id, "Skipping unreadable log: {}", e);
                    batch.skipped += 1;
                }
            }
        }

        Ok(batch)
    }

    pub fn count_logs(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Lock)?;
        Ok(conn.query_row("SELECT COUNT(*) FROM logs", [], |r| r.get(0))?)
    }
}

struct StepRow {
    step_id: u64,
    agent: String,
    step_type: String,
    name: String,
    start_ms: u64,
    duration_ms: u64,
    status: String,
    tool_execution: Option<String>,
}

impl StepRow {
    fn into_step(self) -> Result<TraceStep, StoreError> {
        let tool_execution = self
            .tool_execution
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(TraceStep {
            id: self.step_id,
            agent: self.agent,
            kind: StepKind::from(self.step_type),
            name: self.name,
            start: self.start_ms,
            duration: self.duration_ms,
            status: StepStatus::parse(&self.status),
            tool_execution,
        })
    }
}

fn load_trace(conn: &Connection, trace_id: &str) -> Result<TraceDetail, StoreError> {
    let header = conn.query_row(
        r#"SELECT routing_decision, active_sub_agents, execution_context
           FROM traces WHERE trace_id = ?1"#,
        params![trace_id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        },
    );

    let (routing_decision, active_sub_agents, execution_context) = match header {
        Ok(h) => h,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(StoreError::NotFound(format!("trace {}", trace_id)))
        }
        Err(e) => return Err(e.into()),
    };

    let mut stmt = conn.prepare(
        r#"SELECT step_id, agent, step_type, name, start_ms, duration_ms, status, tool_execution
           FROM trace_steps WHERE trace_id = ?1 ORDER BY step_id"#,
    )?;
    let rows = stmt.query_map(params![trace_id], |row| {
        Ok(StepRow {
            step_id: row.get(0)?,
            agent: row.get(1)?,
            step_type: row.get(2)?,
            name: row.get(3)?,
            start_ms: row.get(4)?,
            duration_ms: row.get(5)?,
            status: row.get(6)?,
            tool_execution: row.get(7)?,
        })
    })?;

    let mut steps = Vec::new();
    for row in rows {
        steps.push(row?.into_step()?);
    }

    Ok(TraceDetail {
        id: trace_id.to_string(),
        steps,
        orchestration_context: OrchestrationContext {
            routing_decision,
            active_sub_agents: serde_json::from_str(&active_sub_agents)?,
        },
        execution_context: execution_context
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
    })
}
