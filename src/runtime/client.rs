//! Cluster client abstraction
//!
//! `ClusterClient` is the narrow surface the agent needs from a cluster:
//! create and delete pods and volume claims in a namespace. A
//! `ClusterConnector` turns connection material into a ready client,
//! including the capability probe against the API server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::api::{DeleteParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use secrecy::ExposeSecret;
use tracing::{debug, info};

use super::bundle::RuntimeConfig;
use crate::config::KubernetesSettings;
use crate::error::{Error, Result};

/// Operations the agent performs against one cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Human-readable address of the API server this client talks to
    fn endpoint(&self) -> &str;

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod>;

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    async fn create_pvc(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim>;

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()>;
}

/// Builds ready-to-use clients
///
/// A successful `connect` means the API server answered the capability
/// probe; the returned client can be shared across tasks.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Connect to a remote runtime described by the runtimes document
    async fn connect(&self, runtime: &RuntimeConfig) -> Result<Arc<dyn ClusterClient>>;

    /// Connect to the cluster the agent itself runs in
    async fn connect_in_cluster(&self) -> Result<Arc<dyn ClusterClient>>;
}

// ─────────────────────────────────────────────────────────────────
// kube-backed implementation
// ─────────────────────────────────────────────────────────────────

/// Connector backed by `kube::Client`
#[derive(Debug, Clone)]
pub struct KubeConnector {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl KubeConnector {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    pub fn from_settings(settings: &KubernetesSettings) -> Self {
        Self::new(
            Duration::from_secs(settings.connect_timeout_secs),
            Duration::from_secs(settings.read_timeout_secs),
        )
    }

    async fn finish(&self, mut config: Config) -> Result<Arc<dyn ClusterClient>> {
        config.connect_timeout = Some(self.connect_timeout);
        config.read_timeout = Some(self.read_timeout);

        let endpoint = config.cluster_url.to_string();
        let client = Client::try_from(config)?;

        // Capability probe: the server must answer before the client is handed out
        let version = client.apiserver_version().await?;
        info!(
            endpoint = %endpoint,
            server_version = %version.git_version,
            "Connected to Kubernetes API server"
        );

        Ok(Arc::new(KubeClusterClient { client, endpoint }))
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, runtime: &RuntimeConfig) -> Result<Arc<dyn ClusterClient>> {
        debug!(runtime = %runtime.name, host = %runtime.host, "Building client configuration");
        let kubeconfig = runtime_kubeconfig(runtime)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::ClusterTransport {
                message: format!("invalid client configuration for {}: {}", runtime.name, e),
            })?;
        self.finish(config).await
    }

    async fn connect_in_cluster(&self) -> Result<Arc<dyn ClusterClient>> {
        let config = Config::infer().await.map_err(|e| Error::ClusterTransport {
            message: format!("unable to load in-cluster configuration: {}", e),
        })?;
        self.finish(config).await
    }
}

/// Express one runtime as a single-context kubeconfig
fn runtime_kubeconfig(runtime: &RuntimeConfig) -> Result<Kubeconfig> {
    let name = runtime.name.as_str();
    let document = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": name,
            "cluster": {
                "server": runtime.host.as_str(),
                "certificate-authority-data": STANDARD.encode(&runtime.ca_certificate),
            }
        }],
        "users": [{
            "name": name,
            "user": { "token": runtime.token.expose_secret() }
        }],
        "contexts": [{
            "name": name,
            "context": { "cluster": name, "user": name }
        }],
        "current-context": name,
    });

    serde_json::from_value(document).map_err(|e| Error::ClusterTransport {
        message: format!("invalid client configuration for {}: {}", name, e),
    })
}

/// Client for one cluster, backed by `kube::Client`
pub struct KubeClusterClient {
    client: Client,
    endpoint: String,
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<Pod> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(pods.create(&PostParams::default(), pod).await?)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        pods.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn create_pvc(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim> {
        let claims: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        Ok(claims.create(&PostParams::default(), claim).await?)
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<()> {
        let claims: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        claims.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}
