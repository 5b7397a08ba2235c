//! Error types for the runtime agent
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - Fixed, operation-specific message prefixes that callers can match on
//! - Error chaining from task level down to the cluster API cause
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message prefixes that form the stable, human-readable error catalogue.
pub mod messages {
    pub const MISSING_KUBERNETES_URL: &str =
        "Failed to construct Kubernetes API service, missing Kubernetes URL";
    pub const MISSING_KUBERNETES_BEARER_TOKEN: &str =
        "Failed to construct Kubernetes API service, missing Kubernetes bearer token";
    pub const MISSING_KUBERNETES_CA_CERTIFICATE: &str =
        "Failed to construct Kubernetes API service, missing Kubernetes ca certificate";
    pub const MISSING_RUNTIMES_CONFIG: &str = "Failed to read runtimes configuration";
    pub const MISSING_NAMESPACE: &str = "Failed to get Kubernetes namespace";

    pub const FAILED_TO_INIT: &str = "Failed to complete Kubernetes service initialization";
    pub const FAILED_TO_CREATE_POD: &str = "Failed to create Kubernetes pod";
    pub const FAILED_TO_DELETE_POD: &str = "Failed to delete Kubernetes pod";
    pub const FAILED_TO_CREATE_PVC: &str = "Failed to create Kubernetes pvc";
    pub const FAILED_TO_DELETE_PVC: &str = "Failed to delete Kubernetes pvc";

    pub const FAILED_TO_RUN_TASK: &str = "Failed to run task";
}

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,
    MissingConnectionField = 103,
    MalformedConfig = 104,

    // IO errors (2xx)
    IoRead = 200,
    IoPermission = 202,
    IoNotFound = 203,

    // Runtime lookup / initialization errors (3xx)
    UnknownRuntime = 300,
    RuntimeInit = 301,
    ServiceInit = 302,

    // Cluster API errors (4xx)
    ClusterApi = 400,
    ClusterTransport = 401,
    MissingNamespace = 402,

    // Operation errors (5xx)
    PodCreateFailed = 500,
    PodDeleteFailed = 501,
    PvcCreateFailed = 502,
    PvcDeleteFailed = 503,

    // Task errors (6xx)
    TaskValidation = 600,
    TaskFailed = 601,
    UnknownTaskKind = 602,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E300")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Runtime errors
            400..=499 => 40, // Cluster API errors
            500..=599 => 50, // Operation errors
            600..=699 => 60, // Task errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the agent
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("{}", messages::MISSING_KUBERNETES_URL)]
    MissingKubernetesUrl,

    #[error("{}", messages::MISSING_KUBERNETES_BEARER_TOKEN)]
    MissingBearerToken,

    #[error("{}", messages::MISSING_KUBERNETES_CA_CERTIFICATE)]
    MissingCaCertificate,

    #[error("{}", messages::MISSING_RUNTIMES_CONFIG)]
    MissingRuntimesConfig,

    /// The runtimes document exists but cannot be decoded into runtime entries
    #[error("Malformed runtimes configuration: {message}")]
    MalformedConfig { message: String },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Runtime Errors
    // ─────────────────────────────────────────────────────────────

    /// No runtime entry with this name was configured
    #[error("runtime {runtime} is not found")]
    UnknownRuntime { runtime: String },

    /// Session establishment for a runtime failed
    #[error("Failed to initialize runtime {runtime}: {message}")]
    RuntimeInit { runtime: String, message: String },

    /// The agent's own cluster could not be reached
    #[error("{} with error: {message}", messages::FAILED_TO_INIT)]
    ServiceInit { message: String },

    // ─────────────────────────────────────────────────────────────
    // Cluster API Errors
    // ─────────────────────────────────────────────────────────────

    /// The API server answered with an error status
    #[error("{message}")]
    ClusterApi {
        code: u16,
        reason: String,
        message: String,
    },

    /// The request never got a usable answer from the API server
    #[error("{message}")]
    ClusterTransport { message: String },

    /// Resource definition carries no `metadata.namespace`
    #[error("{} for {kind}", messages::MISSING_NAMESPACE)]
    MissingNamespace { kind: &'static str },

    // ─────────────────────────────────────────────────────────────
    // Operation Errors
    // ─────────────────────────────────────────────────────────────

    #[error("{} with message: {source}", messages::FAILED_TO_CREATE_POD)]
    PodCreateFailed { source: Box<Error> },

    #[error("{} with message: {source}", messages::FAILED_TO_DELETE_POD)]
    PodDeleteFailed { source: Box<Error> },

    #[error("{} with message: {source}", messages::FAILED_TO_CREATE_PVC)]
    PvcCreateFailed { source: Box<Error> },

    #[error("{} with message: {source}", messages::FAILED_TO_DELETE_PVC)]
    PvcDeleteFailed { source: Box<Error> },

    // ─────────────────────────────────────────────────────────────
    // Task Errors
    // ─────────────────────────────────────────────────────────────

    /// Task body did not match the task's schema
    #[error("Task {kind} failed validation: {message}")]
    TaskValidation { kind: String, message: String },

    /// Task run failed; wraps the operation-level error
    #[error("{} {kind}: {source}", messages::FAILED_TO_RUN_TASK)]
    TaskFailed { kind: String, source: Box<Error> },

    /// Envelope names a task type this agent does not implement
    #[error("Unknown task type: {kind}")]
    UnknownTaskKind { kind: String },

    /// Task envelope or output JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => Error::ClusterApi {
                code: response.code,
                reason: response.reason,
                message: response.message,
            },
            other => Error::ClusterTransport {
                message: other.to_string(),
            },
        }
    }
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::MissingKubernetesUrl
            | Error::MissingBearerToken
            | Error::MissingCaCertificate
            | Error::MissingRuntimesConfig => ErrorCode::MissingConnectionField,
            Error::MalformedConfig { .. } => ErrorCode::MalformedConfig,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },

            Error::UnknownRuntime { .. } => ErrorCode::UnknownRuntime,
            Error::RuntimeInit { .. } => ErrorCode::RuntimeInit,
            Error::ServiceInit { .. } => ErrorCode::ServiceInit,

            Error::ClusterApi { .. } => ErrorCode::ClusterApi,
            Error::ClusterTransport { .. } => ErrorCode::ClusterTransport,
            Error::MissingNamespace { .. } => ErrorCode::MissingNamespace,

            Error::PodCreateFailed { .. } => ErrorCode::PodCreateFailed,
            Error::PodDeleteFailed { .. } => ErrorCode::PodDeleteFailed,
            Error::PvcCreateFailed { .. } => ErrorCode::PvcCreateFailed,
            Error::PvcDeleteFailed { .. } => ErrorCode::PvcDeleteFailed,

            Error::TaskValidation { .. } => ErrorCode::TaskValidation,
            Error::TaskFailed { .. } => ErrorCode::TaskFailed,
            Error::UnknownTaskKind { .. } => ErrorCode::UnknownTaskKind,
            Error::Json(_) => ErrorCode::TaskValidation,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable
    ///
    /// Wrapped errors inherit the answer of the cause they carry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RuntimeInit { .. } | Error::ServiceInit { .. } => true,
            Error::ClusterTransport { .. } => true,
            Error::ClusterApi { code, .. } => *code == 429 || *code >= 500,
            Error::PodCreateFailed { source }
            | Error::PodDeleteFailed { source }
            | Error::PvcCreateFailed { source }
            | Error::PvcDeleteFailed { source }
            | Error::TaskFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Check if the error is fatal (agent should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::MissingKubernetesUrl
                | Error::MissingBearerToken
                | Error::MissingCaCertificate
                | Error::MissingRuntimesConfig
                | Error::MalformedConfig { .. }
                | Error::ServiceInit { .. }
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    /// Innermost error of a wrapped chain
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::PodCreateFailed { source }
            | Error::PodDeleteFailed { source }
            | Error::PvcCreateFailed { source }
            | Error::PvcDeleteFailed { source }
            | Error::TaskFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'runtime-agent config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'runtime-agent config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::MissingKubernetesUrl
            | Error::MissingBearerToken
            | Error::MissingCaCertificate => Some(
                "Set url, bearer_token and ca_certificate under [kubernetes], or use mode = \"in-cluster\"."
            ),
            Error::MissingRuntimesConfig => Some(
                "Set runtimes_config under [kubernetes] to the path of the runtimes document."
            ),
            Error::MalformedConfig { .. } => Some(
                "Run 'runtime-agent runtimes list' to see which runtime entry cannot be decoded."
            ),
            Error::UnknownRuntime { .. } => Some(
                "Check the runtime name against 'runtime-agent runtimes list'."
            ),
            Error::RuntimeInit { .. } => Some(
                "Verify the runtime host is reachable and its token and CA certificate are valid."
            ),
            Error::ServiceInit { .. } => Some(
                "The agent cannot reach its own cluster. Check the [kubernetes] connection settings."
            ),
            Error::TaskValidation { .. } => Some(
                "The task body must be an object with a non-empty 'spec' object."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a malformed runtimes document error
    pub fn malformed(message: impl Into<String>) -> Self {
        Error::MalformedConfig {
            message: message.into(),
        }
    }

    /// Create an unknown runtime error
    pub fn unknown_runtime(runtime: impl Into<String>) -> Self {
        Error::UnknownRuntime {
            runtime: runtime.into(),
        }
    }

    /// Create an API error as returned by a cluster
    pub fn cluster_api(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ClusterApi {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    /// Create a task validation error
    pub fn task_validation(kind: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::TaskValidation {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    /// Wrap an error with the task-level failure prefix
    pub fn task_failed(kind: impl fmt::Display, source: Error) -> Self {
        Error::TaskFailed {
            kind: kind.to_string(),
            source: Box::new(source),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::UnknownRuntime.as_str(), "E300");
        assert_eq!(ErrorCode::PodCreateFailed.as_str(), "E500");
        assert_eq!(ErrorCode::InternalError.as_str(), "E900");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::ConfigNotFound.exit_code(), 10);
        assert_eq!(ErrorCode::IoRead.exit_code(), 20);
        assert_eq!(ErrorCode::UnknownRuntime.exit_code(), 30);
        assert_eq!(ErrorCode::ClusterApi.exit_code(), 40);
        assert_eq!(ErrorCode::PvcDeleteFailed.exit_code(), 50);
        assert_eq!(ErrorCode::TaskFailed.exit_code(), 60);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_missing_field_messages() {
        assert_eq!(
            Error::MissingKubernetesUrl.to_string(),
            "Failed to construct Kubernetes API service, missing Kubernetes URL"
        );
        assert_eq!(
            Error::MissingBearerToken.to_string(),
            "Failed to construct Kubernetes API service, missing Kubernetes bearer token"
        );
        assert_eq!(
            Error::MissingCaCertificate.to_string(),
            "Failed to construct Kubernetes API service, missing Kubernetes ca certificate"
        );
        assert!(Error::MissingRuntimesConfig.is_fatal());
    }

    #[test]
    fn test_operation_error_keeps_cause() {
        let err = Error::PodCreateFailed {
            source: Box::new(Error::cluster_api(409, "AlreadyExists", "pods \"web\" already exists")),
        };
        assert_eq!(
            err.to_string(),
            "Failed to create Kubernetes pod with message: pods \"web\" already exists"
        );
        assert_eq!(err.code(), ErrorCode::PodCreateFailed);
    }

    #[test]
    fn test_task_error_double_prefix() {
        let inner = Error::PvcDeleteFailed {
            source: Box::new(Error::ClusterTransport {
                message: "connection reset".into(),
            }),
        };
        let err = Error::task_failed("DeletePvc", inner);
        assert_eq!(
            err.to_string(),
            "Failed to run task DeletePvc: Failed to delete Kubernetes pvc with message: connection reset"
        );
        assert!(matches!(err.root_cause(), Error::ClusterTransport { .. }));
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::ClusterTransport { message: "eof".into() }.is_retryable());
        assert!(Error::cluster_api(503, "ServiceUnavailable", "down").is_retryable());
        assert!(!Error::cluster_api(409, "AlreadyExists", "exists").is_retryable());
        assert!(!Error::unknown_runtime("prod").is_retryable());

        let wrapped = Error::task_failed(
            "CreatePod",
            Error::PodCreateFailed {
                source: Box::new(Error::cluster_api(500, "InternalError", "etcd timeout")),
            },
        );
        assert!(wrapped.is_retryable());
    }

    #[test]
    fn test_error_fatal() {
        assert!(Error::config_not_found("/test").is_fatal());
        assert!(Error::malformed("bad yaml").is_fatal());
        assert!(!Error::unknown_runtime("prod").is_fatal());
    }

    #[test]
    fn test_error_suggestions() {
        let err = Error::config_not_found("/test");
        assert!(err.suggestion().unwrap().contains("config init"));

        let err = Error::unknown_runtime("prod");
        assert!(err.suggestion().unwrap().contains("runtimes list"));
    }

    #[test]
    fn test_format_for_terminal() {
        let err = Error::config_not_found("/test/agent.toml");
        let formatted = err.format_for_terminal();

        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("Hint"));
    }

    #[test]
    fn test_format_for_log() {
        let err = Error::unknown_runtime("staging");
        let formatted = err.format_for_log();

        assert_eq!(formatted, "[E300] runtime staging is not found");
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        assert_eq!(err.code(), ErrorCode::IoNotFound);
    }
}
