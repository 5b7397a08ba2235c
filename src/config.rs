//! Configuration system for the runtime agent
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (RUNTIME_AGENT_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values
//!
//! The runtimes document (the per-cluster credential bundle) is a separate
//! file referenced from `[kubernetes].runtimes_config`; see `runtime::bundle`.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::executor::DEFAULT_TASK_HISTORY;
use crate::runtime::Encoding;

/// Placeholder printed in place of credentials
const REDACTED: &str = "<redacted>";

/// Main agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent identity
    pub agent: AgentSettings,

    /// Kubernetes connection and runtimes settings
    pub kubernetes: KubernetesSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Agent identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Agent identifier as registered with the controller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable agent name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Finished tasks kept by the executor for inspection
    pub task_history: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            task_history: DEFAULT_TASK_HISTORY,
        }
    }
}

/// How the agent reaches its own ("home") cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterMode {
    /// Service account credentials mounted into the pod
    #[default]
    InCluster,
    /// Explicit URL, bearer token and CA certificate
    Endpoint,
}

/// Kubernetes settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesSettings {
    /// Home cluster connection mode
    pub mode: ClusterMode,

    /// API server URL (endpoint mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Base64-encoded bearer token (endpoint mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    /// Base64-encoded PEM CA certificate (endpoint mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<String>,

    /// Path to the runtimes document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtimes_config: Option<String>,

    /// Encoding of the runtimes document on disk; unset follows the mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtimes_encoding: Option<Encoding>,

    /// Runtime used when a task does not name one
    pub default_runtime: String,

    /// Connect timeout for cluster clients in seconds
    pub connect_timeout_secs: u64,

    /// Read timeout for cluster clients in seconds
    pub read_timeout_secs: u64,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

impl Default for KubernetesSettings {
    fn default() -> Self {
        Self {
            mode: ClusterMode::InCluster,
            url: None,
            bearer_token: None,
            ca_certificate: None,
            runtimes_config: Some("/etc/runtime-agent/runtimes.yaml".to_string()),
            runtimes_encoding: None,
            default_runtime: "default".to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }
}

impl KubernetesSettings {
    /// Encoding used to read the runtimes document.
    ///
    /// Endpoint deployments receive the document base64-encoded, in-cluster
    /// deployments mount it as plain YAML.
    pub fn effective_encoding(&self) -> Encoding {
        self.runtimes_encoding.unwrap_or(match self.mode {
            ClusterMode::Endpoint => Encoding::Base64,
            ClusterMode::InCluster => Encoding::Plain,
        })
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: format!("{}: {}", path.display(), e.message()),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        config.apply_env_overrides();
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // An explicit path must exist
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            PathBuf::from("runtime-agent.toml"),
            dirs::config_dir()
                .map(|p| p.join("runtime-agent").join("agent.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".runtime-agent").join("agent.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/runtime-agent/agent.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RUNTIME_AGENT_ID") {
            self.agent.id = Some(val);
        }
        if let Ok(val) = std::env::var("RUNTIME_AGENT_NAME") {
            self.agent.name = Some(val);
        }

        if let Ok(val) = std::env::var("RUNTIME_AGENT_TASK_HISTORY") {
            if let Ok(keep) = val.parse() {
                self.agent.task_history = keep;
            }
        }

        if let Ok(val) = std::env::var("RUNTIME_AGENT_KUBE_MODE") {
            match val.to_lowercase().as_str() {
                "in-cluster" => self.kubernetes.mode = ClusterMode::InCluster,
                "endpoint" => self.kubernetes.mode = ClusterMode::Endpoint,
                _ => {}
            }
        }
        if let Ok(val) = std::env::var("RUNTIME_AGENT_KUBE_URL") {
            self.kubernetes.url = Some(val);
        }
        if let Ok(val) = std::env::var("RUNTIME_AGENT_KUBE_TOKEN") {
            self.kubernetes.bearer_token = Some(val);
        }
        if let Ok(val) = std::env::var("RUNTIME_AGENT_KUBE_CA") {
            self.kubernetes.ca_certificate = Some(val);
        }
        if let Ok(val) = std::env::var("RUNTIME_AGENT_RUNTIMES_CONFIG") {
            self.kubernetes.runtimes_config = Some(val);
        }
        if let Ok(val) = std::env::var("RUNTIME_AGENT_RUNTIMES_ENCODING") {
            if let Ok(encoding) = val.parse::<Encoding>() {
                self.kubernetes.runtimes_encoding = Some(encoding);
            }
        }
        if let Ok(val) = std::env::var("RUNTIME_AGENT_DEFAULT_RUNTIME") {
            self.kubernetes.default_runtime = val;
        }

        if let Ok(val) = std::env::var("RUNTIME_AGENT_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("RUNTIME_AGENT_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("RUNTIME_AGENT_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref path) = self.kubernetes.runtimes_config {
            self.kubernetes.runtimes_config = Some(expand_path(path));
        }
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    ///
    /// Presence of the endpoint credentials is checked when the cluster
    /// service is constructed, not here.
    fn validate(&self) -> Result<()> {
        if let Some(ref raw) = self.kubernetes.url {
            let parsed = url::Url::parse(raw).map_err(|e| {
                Error::config_field_invalid("kubernetes.url", format!("Invalid URL '{}': {}", raw, e))
            })?;
            if parsed.scheme() != "https" && parsed.scheme() != "http" {
                return Err(Error::config_field_invalid(
                    "kubernetes.url",
                    "Kubernetes URL must start with http:// or https://",
                ));
            }
        }

        if self.kubernetes.default_runtime.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "kubernetes.default_runtime",
                "default_runtime cannot be empty",
            ));
        }

        if self.kubernetes.connect_timeout_secs == 0 || self.kubernetes.read_timeout_secs == 0 {
            return Err(Error::config_validation("Kubernetes timeouts must be greater than zero"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Copy safe to print: credentials are masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for secret in [
            &mut config.kubernetes.bearer_token,
            &mut config.kubernetes.ca_certificate,
        ] {
            if secret.is_some() {
                *secret = Some(REDACTED.to_string());
            }
        }
        config
    }

    /// Path of the runtimes document, if configured
    pub fn runtimes_path(&self) -> Option<PathBuf> {
        self.kubernetes
            .runtimes_config
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<()> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".runtime-agent")
                .join("agent.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::config_validation(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&config_path, generate_default_config())?;

    println!("Configuration file created: {}", config_path.display());
    Ok(())
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# Runtime Agent Configuration

[agent]
# Agent identifier as registered with the controller
# id = "agent-abc123"

# Human-readable agent name
# name = "My Agent"

# Finished tasks kept in memory for inspection
task_history = 100

[kubernetes]
# How to reach the agent's own cluster: "in-cluster" or "endpoint"
mode = "in-cluster"

# Endpoint mode only: API server URL, base64 bearer token, base64 PEM CA
# url = "https://10.0.0.1:6443"
# bearer_token = ""
# ca_certificate = ""

# Runtimes document (YAML with a top-level Runtimes field).
# A missing file means no runtimes are configured.
runtimes_config = "/etc/runtime-agent/runtimes.yaml"

# Encoding of the runtimes document: "plain" or "base64".
# When unset, endpoint mode reads base64 and in-cluster mode reads plain.
# runtimes_encoding = "plain"

# Runtime used when a task does not name one
default_runtime = "default"

# Cluster client timeouts in seconds
connect_timeout_secs = 10
read_timeout_secs = 30

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.runtime-agent/logs/agent.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
