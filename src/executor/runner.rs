//! Task execution runner
//!
//! Decodes task envelopes, dispatches them to their task type and records
//! each step in the tracker.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::service::ClusterService;
use crate::tasks::{
    CreatePod, CreatePvc, DeletePod, DeletePvc, Task, TaskKind, TaskOutcome, TaskPriority,
};

use super::TaskTracker;

// ─────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────

/// A task as handed to the agent: `{ "type": ..., "metadata": ..., "spec": ... }`
#[derive(Debug, Clone)]
pub struct TaskEnvelope {
    pub kind: TaskKind,
    /// The full envelope; the task strips what it does not use
    pub body: Value,
}

impl TaskEnvelope {
    pub fn from_value(body: Value) -> Result<Self> {
        let name = body
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::task_validation("task", "\"type\" is required"))?;

        let kind = TaskKind::from_name(name).ok_or_else(|| Error::UnknownTaskKind {
            kind: name.to_string(),
        })?;

        Ok(Self { kind, body })
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(raw)?)
    }

    pub fn priority(&self) -> TaskPriority {
        self.kind.priority()
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Report
// ─────────────────────────────────────────────────────────────────

/// Error details attached to a failed report
#[derive(Debug, Clone, Serialize)]
pub struct TaskError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&Error> for TaskError {
    fn from(e: &Error) -> Self {
        Self {
            code: e.code().as_str(),
            message: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

/// Result of one task, suitable for handing back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: u64,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TaskOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub execution_time_ms: u64,
}

// ─────────────────────────────────────────────────────────────────
// Task Executor
// ─────────────────────────────────────────────────────────────────

/// Finished tasks kept by default
pub const DEFAULT_TASK_HISTORY: usize = 100;

/// Dispatches envelopes to task implementations
pub struct TaskExecutor {
    tracker: Arc<TaskTracker>,
    task_history: usize,
    create_pod: CreatePod,
    delete_pod: DeletePod,
    create_pvc: CreatePvc,
    delete_pvc: DeletePvc,
}

impl TaskExecutor {
    pub fn new(service: Arc<ClusterService>) -> Self {
        Self {
            tracker: Arc::new(TaskTracker::new()),
            task_history: DEFAULT_TASK_HISTORY,
            create_pod: CreatePod::new(Arc::clone(&service)),
            delete_pod: DeletePod::new(Arc::clone(&service)),
            create_pvc: CreatePvc::new(Arc::clone(&service)),
            delete_pvc: DeletePvc::new(service),
        }
    }

    /// Keep at most `keep` finished tasks in the tracker
    pub fn with_task_history(mut self, keep: usize) -> Self {
        self.task_history = keep;
        self
    }

    /// Run one envelope to completion
    pub async fn execute(&self, envelope: TaskEnvelope) -> Result<TaskOutcome> {
        let (_, result) = self.dispatch(envelope).await;
        result
    }

    /// Run one envelope and summarize the result as a report
    pub async fn submit(&self, envelope: TaskEnvelope) -> TaskReport {
        let kind = envelope.kind;
        let start = Instant::now();
        let (task_id, result) = self.dispatch(envelope).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => TaskReport {
                task_id,
                kind,
                success: true,
                outcome: Some(outcome),
                error: None,
                execution_time_ms,
            },
            Err(e) => TaskReport {
                task_id,
                kind,
                success: false,
                outcome: None,
                error: Some(TaskError::from(&e)),
                execution_time_ms,
            },
        }
    }

    /// Run several envelopes one after another, higher priority first.
    ///
    /// Envelopes of equal priority keep their order; reports are returned
    /// in execution order.
    pub async fn submit_all(&self, mut envelopes: Vec<TaskEnvelope>) -> Vec<TaskReport> {
        envelopes.sort_by_key(|e| std::cmp::Reverse(e.priority()));

        let mut reports = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            reports.push(self.submit(envelope).await);
        }
        reports
    }

    pub fn tracker(&self) -> Arc<TaskTracker> {
        Arc::clone(&self.tracker)
    }

    async fn dispatch(&self, envelope: TaskEnvelope) -> (u64, Result<TaskOutcome>) {
        match envelope.kind {
            TaskKind::CreatePod => self.drive(&self.create_pod, envelope.body).await,
            TaskKind::DeletePod => self.drive(&self.delete_pod, envelope.body).await,
            TaskKind::CreatePvc => self.drive(&self.create_pvc, envelope.body).await,
            TaskKind::DeletePvc => self.drive(&self.delete_pvc, envelope.body).await,
        }
    }

    /// Created → Validated → Running → Succeeded | Failed
    async fn drive<T: Task>(&self, task: &T, body: Value) -> (u64, Result<TaskOutcome>) {
        let task_id = self.tracker.register(T::KIND, T::PRIORITY);

        let validated = match task.validate(body) {
            Ok(validated) => validated,
            Err(e) => {
                warn!(task_id, task = %T::KIND, error = %e, "Task rejected");
                self.tracker.mark_rejected(task_id, e.to_string());
                self.tracker.cleanup_old_tasks(self.task_history);
                return (task_id, Err(e));
            }
        };
        self.tracker.mark_validated(task_id, validated.runtime());

        self.tracker.mark_running(task_id);
        let result = task.run(&validated).await;

        match &result {
            Ok(_) => {
                self.tracker.mark_succeeded(task_id);
                let elapsed = self
                    .tracker
                    .get(task_id)
                    .map(|r| r.execution_time_ms())
                    .unwrap_or_default();
                info!(task_id, task = %T::KIND, execution_time_ms = elapsed, "Task completed");
            }
            Err(e) => {
                self.tracker.mark_failed(task_id, e.to_string());
            }
        }
        self.tracker.cleanup_old_tasks(self.task_history);

        (task_id, result)
    }
}
