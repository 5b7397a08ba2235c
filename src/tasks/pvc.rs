//! Persistent volume claim tasks

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use serde_json::Value;

use super::{validate_body, ResourceRef, Task, TaskKind, TaskOutcome, TaskPriority, ValidatedTask};
use crate::error::{Error, Result};
use crate::service::ClusterService;

/// Create a volume claim on the task's runtime
pub struct CreatePvc {
    service: Arc<ClusterService>,
}

impl CreatePvc {
    pub fn new(service: Arc<ClusterService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Task for CreatePvc {
    type Spec = PersistentVolumeClaim;

    const KIND: TaskKind = TaskKind::CreatePvc;
    const PRIORITY: TaskPriority = TaskKind::CreatePvc.priority();

    async fn execute(&self, task: &ValidatedTask<PersistentVolumeClaim>) -> Result<TaskOutcome> {
        let created = self.service.create_pvc(task.runtime(), &task.spec).await?;
        Ok(TaskOutcome::PvcCreated(Box::new(created)))
    }
}

/// Delete a volume claim from the task's runtime
pub struct DeletePvc {
    service: Arc<ClusterService>,
}

impl DeletePvc {
    pub fn new(service: Arc<ClusterService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Task for DeletePvc {
    type Spec = ResourceRef;

    const KIND: TaskKind = TaskKind::DeletePvc;
    const PRIORITY: TaskPriority = TaskKind::DeletePvc.priority();

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
            .delete_pvc(task.runtime(), &target.namespace, &target.name)
            .await?;
        Ok(TaskOutcome::PvcDeleted(target.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::{runtimes, MockCall, MockClusterClient, MockConnector};
    use crate::runtime::RuntimeRegistry;
    use crate::service::HomeCluster;
    use serde_json::json;

    fn service(connector: Arc<MockConnector>) -> Arc<ClusterService> {
        let registry = Arc::new(RuntimeRegistry::new(
            runtimes(&["default", "prod"]),
            connector.clone(),
        ));
        Arc::new(ClusterService::new(registry, connector, HomeCluster::InCluster, "default"))
    }

    fn claim_body(namespace: &str) -> Value {
        json!({
            "metadata": { "runtimeName": "prod" },
            "spec": {
                "apiVersion": "v1",
                "kind": "PersistentVolumeClaim",
                "metadata": { "name": "workspace", "namespace": namespace },
                "spec": {
                    "accessModes": ["ReadWriteOnce"],
                    "resources": { "requests": { "storage": "1Gi" } }
                }
            }
        })
    }

    #[tokio::test]
    async fn test_create_pvc() {
        let connector = Arc::new(MockConnector::default());
        let task = CreatePvc::new(service(connector.clone()));

        let validated = task.validate(claim_body("ns1")).unwrap();
        let outcome = task.run(&validated).await.unwrap();

        assert!(matches!(outcome, TaskOutcome::PvcCreated(_)));
        assert_eq!(
            connector.client("prod").unwrap().calls(),
            vec![MockCall::CreatePvc {
                namespace: "ns1".to_string(),
                name: "workspace".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_create_pvc_failure_message() {
        let client = Arc::new(MockClusterClient::new("https://prod.example.com/"));
        client.fail_with(403, "Forbidden", "persistentvolumeclaims is forbidden");
        let connector = Arc::new(MockConnector::default().with_client("prod", client));
        let task = CreatePvc::new(service(connector));

        let validated = task.validate(claim_body("ns1")).unwrap();
        let err = task.run(&validated).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Failed to run task CreatePVC: Failed to create Kubernetes pvc with message: persistentvolumeclaims is forbidden"
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_delete_pvc_without_namespace() {
        let connector = Arc::new(MockConnector::default());
        let task = DeletePvc::new(service(connector.clone()));

        let validated = task.validate(json!({ "spec": { "name": "workspace" } })).unwrap();
        let err = task.run(&validated).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Failed to run task DeletePVC: Failed to get Kubernetes namespace for pvc"
        );
        assert_eq!(connector.connect_attempts("default"), 0);
    }

    #[tokio::test]
    async fn test_delete_pvc() {
        let connector = Arc::new(MockConnector::default());
        let task = DeletePvc::new(service(connector.clone()));

        let validated = task
            .validate(json!({
                "metadata": { "runtimeName": "prod" },
                "spec": { "namespace": "ns1", "name": "workspace" }
            }))
            .unwrap();
        let outcome = task.run(&validated).await.unwrap();

        assert!(matches!(outcome, TaskOutcome::PvcDeleted(ref r) if r.name == "workspace"));
        assert_eq!(connector.client("prod").unwrap().calls().len(), 1);
    }
}
