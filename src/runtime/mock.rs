//! Mock cluster for testing
//!
//! Provides in-memory implementations of `ClusterConnector` and
//! `ClusterClient` that record every call and can be told to fail.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use parking_lot::RwLock;
use url::Url;

use super::bundle::RuntimeConfig;
use super::client::{ClusterClient, ClusterConnector};
use crate::error::{Error, Result};

/// Name under which the in-cluster client is tracked
pub const IN_CLUSTER: &str = "in-cluster";

/// Runtime table with one entry per name, hosted at `https://<name>.example.com`
pub fn runtimes(names: &[&str]) -> BTreeMap<String, RuntimeConfig> {
    names
        .iter()
        .filter_map(|name| {
            let host = Url::parse(&format!("https://{}.example.com", name)).ok()?;
            let config = RuntimeConfig::new(
                *name,
                host,
                format!("{}-token", name),
                b"-----BEGIN CERTIFICATE-----".to_vec(),
            );
            Some((name.to_string(), config))
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────
// Mock Connector Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for mock connector behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Simulated time spent establishing a session
    pub connect_latency: Duration,

    /// Number of initial connect attempts per runtime that fail
    pub failing_connects: u32,

    /// Whether connecting to the home cluster fails
    pub fail_in_cluster: bool,
}

/// One recorded call against a mock client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    CreatePod { namespace: String, name: String },
    DeletePod { namespace: String, name: String },
    CreatePvc { namespace: String, name: String },
    DeletePvc { namespace: String, name: String },
}

// ─────────────────────────────────────────────────────────────────
// Mock Connector
// ─────────────────────────────────────────────────────────────────

/// Mock implementation of ClusterConnector for testing
pub struct MockConnector {
    config: MockConfig,
    clients: RwLock<HashMap<String, Arc<MockClusterClient>>>,
    attempts: RwLock<HashMap<String, u32>>,
}

impl MockConnector {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(HashMap::new()),
            attempts: RwLock::new(HashMap::new()),
        }
    }

    /// Pre-register the client handed out for a runtime
    pub fn with_client(self, runtime: &str, client: Arc<MockClusterClient>) -> Self {
        self.clients.write().insert(runtime.to_string(), client);
        self
    }

    /// Number of connect attempts made for a runtime
    pub fn connect_attempts(&self, runtime: &str) -> u32 {
        self.attempts.read().get(runtime).copied().unwrap_or(0)
    }

    /// Client handed out for a runtime, if any
    pub fn client(&self, runtime: &str) -> Option<Arc<MockClusterClient>> {
        self.clients.read().get(runtime).cloned()
    }

    async fn establish(&self, name: &str, endpoint: &str) -> Result<Arc<dyn ClusterClient>> {
        let attempt = {
            let mut attempts = self.attempts.write();
            let count = attempts.entry(name.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if !self.config.connect_latency.is_zero() {
            tokio::time::sleep(self.config.connect_latency).await;
        }

        if attempt <= self.config.failing_connects {
            return Err(Error::ClusterTransport {
                message: format!("connection to {} refused", endpoint),
            });
        }

        let client = self
            .clients
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MockClusterClient::new(endpoint)))
            .clone();

        Ok(client)
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new(MockConfig::default())
    }
}

#[async_trait]
impl ClusterConnector for MockConnector {
    async fn connect(&self, runtime: &RuntimeConfig) -> Result<Arc<dyn ClusterClient>> {
        self.establish(&runtime.name, runtime.host.as_str()).await
    }

    async fn connect_in_cluster(&self) -> Result<Arc<dyn ClusterClient>> {
        if self.config.fail_in_cluster {
            *self.attempts.write().entry(IN_CLUSTER.to_string()).or_insert(0) += 1;
            return Err(Error::ClusterTransport {
                message: "unable to load in-cluster configuration".to_string(),
            });
        }
        self.establish(IN_CLUSTER, "https://kubernetes.default.svc/").await
    }
}

// ─────────────────────────────────────────────────────────────────
// Mock Client
// ─────────────────────────────────────────────────────────────────

/// Mock implementation of ClusterClient for testing
pub struct MockClusterClient {
    endpoint: String,
    failure: RwLock<Option<(u16, String, String)>>,
    calls: RwLock<Vec<MockCall>>,
}

impl MockClusterClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            failure: RwLock::new(None),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Make every subsequent operation answer with an API error
    pub fn fail_with(&self, code: u16, reason: &str, message: &str) {
        *self.failure.write() = Some((code, reason.to_string(), message.to_string()));
    }

    /// Calls received so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().clone()
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure.read().as_ref() {
            Some((code, reason, message)) => {
                Err(Error::cluster_api(*code, reason.clone(), message.clone()))
            }
            None => Ok(()),
        }
    }

    fn record(&self, call: MockCall) {
        self.calls.write().push(call);
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        self.check_failure()?;
        self.record(MockCall::CreatePod {
            namespace: namespace.to_string(),
            name: pod.metadata.name.clone().unwrap_or_default(),
        });

        let mut created = pod.clone();
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.uid = Some(format!("mock-{}", self.calls.read().len()));
        Ok(created)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.check_failure()?;
        self.record(MockCall::DeletePod {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }

    async fn create_pvc(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim> {
        self.check_failure()?;
        self.record(MockCall::CreatePvc {
            namespace: namespace.to_string(),
            name: claim.metadata.name.clone().unwrap_or_default(),
        });

        let mut created = claim.clone();
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.uid = Some(format!("mock-{}", self.calls.read().len()));
        Ok(created)
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()> {
        self.check_failure()?;
        self.record(MockCall::DeletePvc {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime(name: &str) -> RuntimeConfig {
        runtimes(&[name]).remove(name).unwrap()
    }

    #[tokio::test]
    async fn test_mock_connect_counts_attempts() {
        let connector = MockConnector::new(MockConfig {
            failing_connects: 1,
            ..Default::default()
        });

        assert!(connector.connect(&runtime("prod")).await.is_err());
        assert!(connector.connect(&runtime("prod")).await.is_ok());
        assert_eq!(connector.connect_attempts("prod"), 2);
        assert_eq!(connector.connect_attempts("staging"), 0);
    }

    #[tokio::test]
    async fn test_mock_client_failure() {
        let client = MockClusterClient::new("https://h");
        client.fail_with(409, "AlreadyExists", "pods \"p\" already exists");

        let err = client.delete_pod("ns", "p").await.unwrap_err();
        assert!(matches!(err, Error::ClusterApi { code: 409, .. }));
        assert!(client.calls().is_empty());
    }
}
