//! Runtime Agent
//!
//! Executes pod and volume claim tasks against named remote clusters
//! ("runtimes"). Connection material for every runtime comes from a YAML
//! runtimes document; each runtime is connected lazily and at most once.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod runtime;
pub mod service;
pub mod tasks;

pub use config::AgentConfig;
pub use error::{Error, ErrorCode, Result};
pub use executor::{TaskEnvelope, TaskExecutor, TaskReport};
pub use runtime::{ClusterClient, ClusterConnector, KubeConnector, RuntimeRegistry};
pub use service::ClusterService;
