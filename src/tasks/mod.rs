//! Tasks
//!
//! A task is one unit of work sent to the agent, e.g. "create this pod on
//! runtime prod". Each task:
//! - Validates its body: a non-empty `spec` object is required, `metadata`
//!   is optional, anything else is dropped
//! - Runs against the cluster service and reports a typed outcome
//! - Wraps failures as "Failed to run task <Kind>: <cause>"

mod pod;
mod pvc;

pub use pod::*;
pub use pvc::*;

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::error::{messages, Error, Result};

// ─────────────────────────────────────────────────────────────────
// Task Kinds
// ─────────────────────────────────────────────────────────────────

/// Scheduling class of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskPriority::Low => "low",
            TaskPriority::Normal => "normal",
            TaskPriority::High => "high",
        };
        f.write_str(s)
    }
}

/// Task types this agent implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    CreatePod,
    DeletePod,
    #[serde(rename = "CreatePVC")]
    CreatePvc,
    #[serde(rename = "DeletePVC")]
    DeletePvc,
}

impl TaskKind {
    pub const ALL: [TaskKind; 4] = [
        TaskKind::CreatePod,
        TaskKind::DeletePod,
        TaskKind::CreatePvc,
        TaskKind::DeletePvc,
    ];

    /// Wire name of the task type
    pub const fn name(&self) -> &'static str {
        match self {
            TaskKind::CreatePod => "CreatePod",
            TaskKind::DeletePod => "DeletePod",
            TaskKind::CreatePvc => "CreatePVC",
            TaskKind::DeletePvc => "DeletePVC",
        }
    }

    /// Static scheduling class of the task type
    pub const fn priority(&self) -> TaskPriority {
        match self {
            TaskKind::CreatePod
            | TaskKind::DeletePod
            | TaskKind::CreatePvc
            | TaskKind::DeletePvc => TaskPriority::High,
        }
    }

    /// Prefix of every run failure of this kind
    pub fn failure_message(&self) -> String {
        format!("{} {}", messages::FAILED_TO_RUN_TASK, self.name())
    }

    /// Parse a task type name, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Bodies
// ─────────────────────────────────────────────────────────────────

/// Optional routing information carried with a task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskMetadata {
    /// Runtime the task targets; the default runtime when absent
    #[serde(alias = "reName", skip_serializing_if = "Option::is_none")]
    pub runtime_name: Option<String>,

    /// Workflow the task belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
}

/// A task body that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedTask<S> {
    pub metadata: TaskMetadata,
    pub spec: S,
}

impl<S> ValidatedTask<S> {
    pub fn runtime(&self) -> Option<&str> {
        self.metadata.runtime_name.as_deref()
    }
}

/// Identifies an existing namespaced resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
}

/// What a successful task produced
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", content = "resource", rename_all = "camelCase")]
pub enum TaskOutcome {
    PodCreated(Box<Pod>),
    PodDeleted(ResourceRef),
    PvcCreated(Box<PersistentVolumeClaim>),
    PvcDeleted(ResourceRef),
}

/// Check a raw task body and decode its spec.
///
/// Fields other than `metadata` and `spec` are ignored, as are unknown
/// fields inside them.
pub fn validate_body<S: DeserializeOwned>(kind: TaskKind, body: Value) -> Result<ValidatedTask<S>> {
    let Value::Object(mut fields) = body else {
        return Err(Error::task_validation(kind, "task body must be an object"));
    };

    let spec = match fields.remove("spec") {
        None | Some(Value::Null) => {
            return Err(Error::task_validation(kind, "\"spec\" is required"));
        }
        Some(Value::Object(spec)) if spec.is_empty() => {
            return Err(Error::task_validation(kind, "\"spec\" must not be empty"));
        }
        Some(Value::Object(spec)) => spec,
        Some(_) => {
            return Err(Error::task_validation(kind, "\"spec\" must be an object"));
        }
    };

    let metadata = match fields.remove("metadata") {
        None | Some(Value::Null) => TaskMetadata::default(),
        Some(value) => serde_json::from_value(value).map_err(|e| {
            Error::task_validation(kind, format!("invalid \"metadata\": {}", e))
        })?,
    };

    let spec = serde_json::from_value(Value::Object(spec))
        .map_err(|e| Error::task_validation(kind, format!("invalid \"spec\": {}", e)))?;

    Ok(ValidatedTask { metadata, spec })
}

// ─────────────────────────────────────────────────────────────────
// Task Trait
// ─────────────────────────────────────────────────────────────────

/// One task type
#[async_trait]
pub trait Task: Send + Sync {
    /// Decoded form of the task's `spec`
    type Spec: DeserializeOwned + Send + Sync;

    const KIND: TaskKind;
    const PRIORITY: TaskPriority;

    fn validate(&self, body: Value) -> Result<ValidatedTask<Self::Spec>> {
        validate_body(Self::KIND, body)
    }

    /// Perform the work; errors are wrapped by `run`
    async fn execute(&self, task: &ValidatedTask<Self::Spec>) -> Result<TaskOutcome>;

    async fn run(&self, task: &ValidatedTask<Self::Spec>) -> Result<TaskOutcome> {
        info!(
            task = %Self::KIND,
            priority = %Self::PRIORITY,
            runtime = task.runtime().unwrap_or("<default>"),
            "Running task"
        );

        self.execute(task).await.map_err(|e| {
            let err = Error::task_failed(Self::KIND, e);
            error!(task = %Self::KIND, error = %err, "Task failed");
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_names() {
        assert_eq!(TaskKind::from_name("CreatePod"), Some(TaskKind::CreatePod));
        assert_eq!(TaskKind::from_name("createpvc"), Some(TaskKind::CreatePvc));
        assert_eq!(TaskKind::from_name("ScaleDeployment"), None);
        assert_eq!(TaskKind::DeletePvc.to_string(), "DeletePVC");
        assert_eq!(
            serde_json::to_value(TaskKind::CreatePvc).unwrap(),
            json!("CreatePVC")
        );
    }

    #[test]
    fn test_priorities() {
        assert_eq!(TaskKind::CreatePod.priority(), TaskPriority::High);
        assert_eq!(TaskKind::DeletePvc.priority(), TaskPriority::High);
        assert_eq!(TaskKind::CreatePod.failure_message(), "Failed to run task CreatePod");
        assert!(TaskPriority::High > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Low);
    }

    #[test]
    fn test_spec_is_required() {
        let err = validate_body::<Value>(TaskKind::CreatePod, json!({ "metadata": {} })).unwrap_err();
        assert!(matches!(err, Error::TaskValidation { .. }));
        assert!(err.to_string().contains("\"spec\" is required"));

        let err = validate_body::<Value>(TaskKind::CreatePod, json!({ "spec": {} })).unwrap_err();
        assert!(err.to_string().contains("must not be empty"));

        let err = validate_body::<Value>(TaskKind::CreatePod, json!({ "spec": [1] })).unwrap_err();
        assert!(err.to_string().contains("must be an object"));

        let err = validate_body::<Value>(TaskKind::CreatePod, json!("spec")).unwrap_err();
        assert!(err.to_string().contains("must be an object"));
    }

    #[test]
    fn test_unknown_fields_are_dropped() {
        let task = validate_body::<ResourceRef>(
            TaskKind::DeletePod,
            json!({
                "type": "DeletePod",
                "priority": 9,
                "metadata": { "runtimeName": "prod", "workflow": "wf-1", "trace": "x" },
                "spec": { "namespace": "ns1", "name": "build-1", "grace": 5 }
            }),
        )
        .unwrap();

        assert_eq!(task.runtime(), Some("prod"));
        assert_eq!(task.metadata.workflow.as_deref(), Some("wf-1"));
        assert_eq!(
            task.spec,
            ResourceRef {
                namespace: "ns1".to_string(),
                name: "build-1".to_string()
            }
        );
    }

    #[test]
    fn test_legacy_runtime_field() {
        let task = validate_body::<Value>(
            TaskKind::CreatePod,
            json!({ "metadata": { "reName": "staging" }, "spec": { "a": 1 } }),
        )
        .unwrap();
        assert_eq!(task.runtime(), Some("staging"));
    }

    #[test]
    fn test_metadata_is_optional() {
        let task =
            validate_body::<Value>(TaskKind::CreatePod, json!({ "spec": { "a": 1 } })).unwrap();
        assert_eq!(task.metadata, TaskMetadata::default());
        assert_eq!(task.runtime(), None);
    }
}
