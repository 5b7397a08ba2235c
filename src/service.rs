//! Cluster service
//!
//! Facade the tasks talk to. Every operation:
//! 1. Requires `metadata.namespace` (or an explicit namespace) up front
//! 2. Resolves the runtime name, falling back to the configured default
//! 3. Obtains that runtime's client from the registry
//! 4. Wraps remote failures with an operation-specific prefix
//!
//! Registry failures (unknown runtime, failed initialization) pass
//! through unwrapped.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, info};
use url::Url;

use crate::config::{ClusterMode, KubernetesSettings};
use crate::error::{Error, Result};
use crate::runtime::{
    decode_certificate, parse, read_bundle_file, ClusterClient, ClusterConnector, RuntimeConfig,
    RuntimeRegistry,
};

/// How the agent reaches its own cluster
#[derive(Debug)]
pub enum HomeCluster {
    InCluster,
    Endpoint(RuntimeConfig),
}

/// Facade over the runtime registry
pub struct ClusterService {
    registry: Arc<RuntimeRegistry>,
    connector: Arc<dyn ClusterConnector>,
    home: HomeCluster,
    default_runtime: String,
}

impl ClusterService {
    pub fn new(
        registry: Arc<RuntimeRegistry>,
        connector: Arc<dyn ClusterConnector>,
        home: HomeCluster,
        default_runtime: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            connector,
            home,
            default_runtime: default_runtime.into(),
        }
    }

    /// Build the service from `[kubernetes]` settings.
    ///
    /// Endpoint mode requires URL, bearer token, CA certificate and the
    /// runtimes document path; in-cluster mode only the document path.
    /// The runtimes document is read and decoded here; no cluster is
    /// contacted.
    pub async fn from_settings(
        settings: &KubernetesSettings,
        connector: Arc<dyn ClusterConnector>,
    ) -> Result<Self> {
        let home = match settings.mode {
            ClusterMode::Endpoint => HomeCluster::Endpoint(home_endpoint(settings)?),
            ClusterMode::InCluster => HomeCluster::InCluster,
        };

        let path = settings
            .runtimes_config
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or(Error::MissingRuntimesConfig)?;

        let blob = read_bundle_file(path).await?;
        let runtimes = parse(&blob, settings.effective_encoding())?;
        info!(
            path = %path,
            runtimes = runtimes.len(),
            encoding = %settings.effective_encoding(),
            mode = ?settings.mode,
            "Loaded runtimes configuration"
        );

        let registry = Arc::new(RuntimeRegistry::new(runtimes, Arc::clone(&connector)));
        Ok(Self::new(
            registry,
            connector,
            home,
            settings.default_runtime.clone(),
        ))
    }

    /// Verify the agent can reach its own cluster
    pub async fn init(&self) -> Result<()> {
        let client = match &self.home {
            HomeCluster::InCluster => self.connector.connect_in_cluster().await,
            HomeCluster::Endpoint(endpoint) => self.connector.connect(endpoint).await,
        }
        .map_err(|e| Error::ServiceInit {
            message: e.to_string(),
        })?;

        info!(endpoint = client.endpoint(), "Kubernetes service initialized");
        Ok(())
    }

    pub fn registry(&self) -> &Arc<RuntimeRegistry> {
        &self.registry
    }

    pub fn default_runtime(&self) -> &str {
        &self.default_runtime
    }

    /// Runtime name to use, falling back to the default
    pub fn resolve_runtime<'a>(&'a self, runtime: Option<&'a str>) -> &'a str {
        runtime
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.default_runtime)
    }

    async fn client(&self, runtime: &str) -> Result<Arc<dyn ClusterClient>> {
        debug!(runtime = %runtime, "Resolving runtime client");
        self.registry.get_client(runtime).await
    }

    // ─────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────

    pub async fn create_pod(&self, runtime: Option<&str>, pod: &Pod) -> Result<Pod> {
        let namespace = namespace_of(&pod.metadata, "pod")?;
        let runtime = self.resolve_runtime(runtime);
        let client = self.client(runtime).await?;

        let created = client
            .create_pod(namespace, pod)
            .await
            .map_err(|e| Error::PodCreateFailed {
                source: Box::new(e),
            })?;

        info!(
            runtime = %runtime,
            namespace = %namespace,
            name = created.metadata.name.as_deref().unwrap_or_default(),
            "Pod created"
        );
        Ok(created)
    }

    pub async fn delete_pod(&self, runtime: Option<&str>, namespace: &str, name: &str) -> Result<()> {
        let namespace = require_namespace(namespace, "pod")?;
        let runtime = self.resolve_runtime(runtime);
        let client = self.client(runtime).await?;

        client
            .delete_pod(namespace, name)
            .await
            .map_err(|e| Error::PodDeleteFailed {
                source: Box::new(e),
            })?;

        info!(runtime = %runtime, namespace = %namespace, name = %name, "Pod deleted");
        Ok(())
    }

    pub async fn create_pvc(
        &self,
        runtime: Option<&str>,
        claim: &PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim> {
        let namespace = namespace_of(&claim.metadata, "pvc")?;
        let runtime = self.resolve_runtime(runtime);
        let client = self.client(runtime).await?;

        let created = client
            .create_pvc(namespace, claim)
            .await
            .map_err(|e| Error::PvcCreateFailed {
                source: Box::new(e),
            })?;

        info!(
            runtime = %runtime,
            namespace = %namespace,
            name = created.metadata.name.as_deref().unwrap_or_default(),
            "Pvc created"
        );
        Ok(created)
    }

    pub async fn delete_pvc(&self, runtime: Option<&str>, namespace: &str, name: &str) -> Result<()> {
        let namespace = require_namespace(namespace, "pvc")?;
        let runtime = self.resolve_runtime(runtime);
        let client = self.client(runtime).await?;

        client
            .delete_pvc(namespace, name)
            .await
            .map_err(|e| Error::PvcDeleteFailed {
                source: Box::new(e),
            })?;

        info!(runtime = %runtime, namespace = %namespace, name = %name, "Pvc deleted");
        Ok(())
    }
}

fn namespace_of<'a>(metadata: &'a ObjectMeta, kind: &'static str) -> Result<&'a str> {
    require_namespace(metadata.namespace.as_deref().unwrap_or_default(), kind)
}

fn require_namespace<'a>(namespace: &'a str, kind: &'static str) -> Result<&'a str> {
    if namespace.trim().is_empty() {
        return Err(Error::MissingNamespace { kind });
    }
    Ok(namespace)
}

/// Connection material for the home cluster in endpoint mode
fn home_endpoint(settings: &KubernetesSettings) -> Result<RuntimeConfig> {
    let url = non_empty(settings.url.as_deref()).ok_or(Error::MissingKubernetesUrl)?;
    let token = non_empty(settings.bearer_token.as_deref()).ok_or(Error::MissingBearerToken)?;
    let ca = non_empty(settings.ca_certificate.as_deref()).ok_or(Error::MissingCaCertificate)?;

    let host = Url::parse(url)
        .map_err(|e| Error::config_field_invalid("kubernetes.url", e.to_string()))?;

    let token = STANDARD
        .decode(token.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| {
            Error::config_field_invalid("kubernetes.bearer_token", "bearer token is not valid base64")
        })?;

    let ca_certificate = decode_certificate("home", ca).map_err(|e| {
        Error::config_field_invalid("kubernetes.ca_certificate", e.to_string())
    })?;

    Ok(RuntimeConfig::new("home", host, token.trim(), ca_certificate))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::{runtimes, MockCall, MockClusterClient, MockConfig, MockConnector};
    use crate::runtime::Encoding;

    fn pod(namespace: Option<&str>) -> Pod {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "build-1", "namespace": namespace },
            "spec": { "containers": [{ "name": "main", "image": "alpine:3" }] }
        }))
        .unwrap()
    }

    fn service(connector: Arc<MockConnector>, names: &[&str]) -> ClusterService {
        let registry = Arc::new(RuntimeRegistry::new(runtimes(names), connector.clone()));
        ClusterService::new(registry, connector, HomeCluster::InCluster, "default")
    }

    #[tokio::test]
    async fn test_create_pod_on_named_runtime() {
        let connector = Arc::new(MockConnector::default());
        let service = service(connector.clone(), &["default", "prod"]);

        let created = service.create_pod(Some("prod"), &pod(Some("ns1"))).await.unwrap();
        assert_eq!(created.metadata.namespace.as_deref(), Some("ns1"));

        let calls = connector.client("prod").unwrap().calls();
        assert_eq!(
            calls,
            vec![MockCall::CreatePod {
                namespace: "ns1".to_string(),
                name: "build-1".to_string()
            }]
        );
        assert!(connector.client("default").is_none());
    }

    #[tokio::test]
    async fn test_absent_runtime_uses_default() {
        let connector = Arc::new(MockConnector::default());
        let service = service(connector.clone(), &["default"]);

        service.create_pod(None, &pod(Some("ns1"))).await.unwrap();
        service.create_pod(Some(""), &pod(Some("ns1"))).await.unwrap();
        assert_eq!(connector.client("default").unwrap().calls().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_namespace_fails_before_lookup() {
        let connector = Arc::new(MockConnector::default());
        let service = service(connector.clone(), &["prod"]);

        let err = service.create_pod(Some("prod"), &pod(None)).await.unwrap_err();
        assert!(matches!(err, Error::MissingNamespace { kind: "pod" }));

        // Unknown runtime is never consulted when the namespace is missing
        let err = service.create_pod(Some("nowhere"), &pod(None)).await.unwrap_err();
        assert!(matches!(err, Error::MissingNamespace { .. }));

        let err = service.delete_pvc(Some("prod"), "", "data").await.unwrap_err();
        assert!(matches!(err, Error::MissingNamespace { kind: "pvc" }));
        assert_eq!(connector.connect_attempts("prod"), 0);
    }

    #[tokio::test]
    async fn test_unknown_runtime_passes_through() {
        let service = service(Arc::new(MockConnector::default()), &["prod"]);

        let err = service.create_pod(Some("staging"), &pod(Some("ns1"))).await.unwrap_err();
        assert_eq!(err.to_string(), "runtime staging is not found");
    }

    #[tokio::test]
    async fn test_remote_failure_is_wrapped() {
        let client = Arc::new(MockClusterClient::new("https://prod.example.com/"));
        client.fail_with(409, "AlreadyExists", "pods \"build-1\" already exists");
        let connector = Arc::new(MockConnector::default().with_client("prod", client));
        let service = service(connector, &["prod"]);

        let err = service.create_pod(Some("prod"), &pod(Some("ns1"))).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to create Kubernetes pod with message: pods \"build-1\" already exists"
        );
        assert!(matches!(err.root_cause(), Error::ClusterApi { code: 409, .. }));

        let err = service.delete_pvc(Some("prod"), "ns1", "data").await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to delete Kubernetes pvc with message: "));
    }

    #[tokio::test]
    async fn test_init_reports_home_failure() {
        let connector = Arc::new(MockConnector::new(MockConfig {
            fail_in_cluster: true,
            ..Default::default()
        }));
        let service = service(connector, &[]);

        let err = service.init().await.unwrap_err();
        assert!(matches!(err, Error::ServiceInit { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_from_settings_endpoint_requires_fields() {
        let connector: Arc<dyn ClusterConnector> = Arc::new(MockConnector::default());
        let mut settings = KubernetesSettings {
            mode: ClusterMode::Endpoint,
            ..Default::default()
        };

        let err = ClusterService::from_settings(&settings, connector.clone()).await.err().unwrap();
        assert!(matches!(err, Error::MissingKubernetesUrl));

        settings.url = Some("https://10.0.0.1".to_string());
        let err = ClusterService::from_settings(&settings, connector.clone()).await.err().unwrap();
        assert!(matches!(err, Error::MissingBearerToken));

        settings.bearer_token = Some(STANDARD.encode("token"));
        let err = ClusterService::from_settings(&settings, connector.clone()).await.err().unwrap();
        assert!(matches!(err, Error::MissingCaCertificate));

        settings.ca_certificate = Some(STANDARD.encode("-----BEGIN CERTIFICATE-----\nAA==\n-----END CERTIFICATE-----"));
        settings.runtimes_config = None;
        let err = ClusterService::from_settings(&settings, connector.clone()).await.err().unwrap();
        assert!(matches!(err, Error::MissingRuntimesConfig));
        assert_eq!(err.to_string(), "Failed to read runtimes configuration");
    }

    #[tokio::test]
    async fn test_from_settings_missing_document_means_no_runtimes() {
        let dir = tempfile::tempdir().unwrap();
        let settings = KubernetesSettings {
            runtimes_config: Some(dir.path().join("absent.yaml").display().to_string()),
            ..Default::default()
        };

        let service = ClusterService::from_settings(&settings, Arc::new(MockConnector::default()))
            .await
            .unwrap();
        assert!(service.registry().is_empty());
        assert_eq!(service.default_runtime(), "default");
    }

    #[tokio::test]
    async fn test_from_settings_endpoint_reads_base64_document() {
        let dir = tempfile::tempdir().unwrap();
        let pem = "-----BEGIN CERTIFICATE-----\nAA==\n-----END CERTIFICATE-----";
        let document = format!(
            "Runtimes:\n  prod:\n    Host: https://prod.example.com\n    Token: t\n    Crt: {}\n",
            STANDARD.encode(pem)
        );
        let path = dir.path().join("runtimes.b64");
        std::fs::write(&path, STANDARD.encode(document)).unwrap();

        let mut settings = KubernetesSettings {
            mode: ClusterMode::Endpoint,
            url: Some("https://10.0.0.1".to_string()),
            bearer_token: Some(STANDARD.encode("token")),
            ca_certificate: Some(STANDARD.encode(pem)),
            runtimes_config: Some(path.display().to_string()),
            ..Default::default()
        };

        let service = ClusterService::from_settings(&settings, Arc::new(MockConnector::default()))
            .await
            .unwrap();
        assert!(service.registry().contains("prod"));

        // An explicit plain encoding overrides the endpoint default
        settings.runtimes_encoding = Some(Encoding::Plain);
        let err = ClusterService::from_settings(&settings, Arc::new(MockConnector::default()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::MalformedConfig { .. }));
    }
}
