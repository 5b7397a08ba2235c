//! Pod tasks

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use serde_json::Value;

use super::{validate_body, ResourceRef, Task, TaskKind, TaskOutcome, TaskPriority, ValidatedTask};
use crate::error::{Error, Result};
use crate::service::ClusterService;

/// Create a pod on the task's runtime
pub struct CreatePod {
    service: Arc<ClusterService>,
}

impl CreatePod {
    pub fn new(service: Arc<ClusterService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Task for CreatePod {
    type Spec = Pod;

    const KIND: TaskKind = TaskKind::CreatePod;
    const PRIORITY: TaskPriority = TaskKind::CreatePod.priority();

    async fn execute(&self, task: &ValidatedTask<Pod>) -> Result<TaskOutcome> {
        let created = self.service.create_pod(task.runtime(), &task.spec).await?;
        Ok(TaskOutcome::PodCreated(Box::new(created)))
    }
}

/// Delete a pod from the task's runtime
pub struct DeletePod {
    service: Arc<ClusterService>,
}

impl DeletePod {
    pub fn new(service: Arc<ClusterService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Task for DeletePod {
    type Spec = ResourceRef;

    const KIND: TaskKind = TaskKind::DeletePod;
    const PRIORITY: TaskPriority = TaskKind::DeletePod.priority();

    fn validate(&self, body: Value) -> Result<ValidatedTask<ResourceRef>> {
        let task: ValidatedTask<ResourceRef> = validate_body(Self::KIND, body)?;
        if task.spec.name.trim().is_empty() {
            return Err(Error::task_validation(Self::KIND, "\"spec.name\" must not be empty"));
        }
        Ok(task)
    }

    async fn execute(&self, task: &ValidatedTask<ResourceRef>) -> Result<TaskOutcome> {
        let target = &task.spec;
        self.service
            .delete_pod(task.runtime(), &target.namespace, &target.name)
            .await?;
        Ok(TaskOutcome::PodDeleted(target.clone()))
    }
}
