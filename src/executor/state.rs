//! Task execution state tracking
//!
//! Tracks every task the executor has seen and where it is in its
//! lifecycle.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::tasks::{TaskKind, TaskPriority};

// ─────────────────────────────────────────────────────────────────
// Task Execution State
// ─────────────────────────────────────────────────────────────────

/// State of a task being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Envelope accepted, body not yet checked
    Created,
    /// Body passed validation
    Validated,
    /// Mutation in progress
    Running,
    /// Mutation completed
    Succeeded,
    /// Mutation failed
    Failed,
    /// Body failed validation; the task never ran
    Rejected,
}

impl TaskState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Created, TaskState::Validated)
                | (TaskState::Created, TaskState::Rejected)
                | (TaskState::Validated, TaskState::Running)
                | (TaskState::Running, TaskState::Succeeded)
                | (TaskState::Running, TaskState::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Rejected
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Created => "created",
            TaskState::Validated => "validated",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Record
// ─────────────────────────────────────────────────────────────────

/// One task as seen by the tracker
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: u64,
    pub kind: TaskKind,
    pub priority: TaskPriority,

    /// Runtime named by the task, once validated
    pub runtime: Option<String>,

    pub state: TaskState,

    /// Wall-clock time the envelope was accepted
    pub received_at: DateTime<Utc>,

    started_at: Option<Instant>,
    completed_at: Option<Instant>,

    /// Error message if rejected or failed
    pub error: Option<String>,
}

impl TaskRecord {
    fn new(id: u64, kind: TaskKind, priority: TaskPriority) -> Self {
        Self {
            id,
            kind,
            priority,
            runtime: None,
            state: TaskState::Created,
            received_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Move to `next`; illegal transitions are ignored and reported as false
    fn transition(&mut self, next: TaskState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        match next {
            TaskState::Running => self.started_at = Some(Instant::now()),
            s if s.is_terminal() => self.completed_at = Some(Instant::now()),
            _ => {}
        }
        true
    }

    /// Get execution time in milliseconds
    pub fn execution_time_ms(&self) -> u64 {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).as_millis() as u64,
            (Some(start), None) => start.elapsed().as_millis() as u64,
            _ => 0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Tracker
// ─────────────────────────────────────────────────────────────────

/// Tracks all active and recently finished tasks
pub struct TaskTracker {
    tasks: RwLock<HashMap<u64, TaskRecord>>,
    next_id: AtomicU64,
    succeeded_count: AtomicU64,
    failed_count: AtomicU64,
    rejected_count: AtomicU64,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            succeeded_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
        }
    }

    /// Register a new task in `Created` state and return its id
    pub fn register(&self, kind: TaskKind, priority: TaskPriority) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.write().insert(id, TaskRecord::new(id, kind, priority));
        id
    }

    pub fn mark_validated(&self, id: u64, runtime: Option<&str>) -> bool {
        let mut tasks = self.tasks.write();
        match tasks.get_mut(&id) {
            Some(task) => {
                task.runtime = runtime.map(str::to_string);
                task.transition(TaskState::Validated)
            }
            None => false,
        }
    }

    pub fn mark_rejected(&self, id: u64, error: String) -> bool {
        self.finish(id, TaskState::Rejected, Some(error), &self.rejected_count)
    }

    pub fn mark_running(&self, id: u64) -> bool {
        let mut tasks = self.tasks.write();
        tasks
            .get_mut(&id)
            .map(|task| task.transition(TaskState::Running))
            .unwrap_or(false)
    }

    pub fn mark_succeeded(&self, id: u64) -> bool {
        self.finish(id, TaskState::Succeeded, None, &self.succeeded_count)
    }

    pub fn mark_failed(&self, id: u64, error: String) -> bool {
        self.finish(id, TaskState::Failed, Some(error), &self.failed_count)
    }

    fn finish(&self, id: u64, state: TaskState, error: Option<String>, counter: &AtomicU64) -> bool {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(&id) else {
            return false;
        };
        if !task.transition(state) {
            return false;
        }
        task.error = error;
        counter.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Snapshot of one task
    pub fn get(&self, id: u64) -> Option<TaskRecord> {
        self.tasks.read().get(&id).cloned()
    }

    /// Number of records currently held
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    pub fn total_succeeded(&self) -> u64 {
        self.succeeded_count.load(Ordering::Relaxed)
    }

    pub fn total_failed(&self) -> u64 {
        self.failed_count.load(Ordering::Relaxed)
    }

    pub fn total_rejected(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    /// Drop the oldest finished tasks, keeping at most `keep_count`
    pub fn cleanup_old_tasks(&self, keep_count: usize) {
        let mut tasks = self.tasks.write();

        let mut finished: Vec<_> = tasks
            .values()
            .filter(|t| t.state.is_terminal())
            .map(|t| (t.id, t.completed_at))
            .collect();

        finished.sort_by_key(|&(id, completed_at)| (completed_at, id));

        let to_remove = finished.len().saturating_sub(keep_count);
        for (id, _) in finished.into_iter().take(to_remove) {
            tasks.remove(&id);
        }
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
