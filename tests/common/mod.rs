//! Common test utilities and fixtures
//!
//! This module provides shared test infrastructure

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

/// Runtimes document with `default`, `prod` and `staging`
pub fn runtimes_fixture() -> PathBuf {
    fixture_path("runtimes.yaml")
}

/// Runtimes document whose `prod` entry has no token
pub fn malformed_runtimes_fixture() -> PathBuf {
    fixture_path("malformed_runtimes.yaml")
}

/// Command for the runtime-agent binary, isolated from the caller's environment
pub fn agent_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("runtime-agent").unwrap();
    for (key, _) in std::env::vars() {
        if key.starts_with("RUNTIME_AGENT_") || key == "RUST_LOG" {
            cmd.env_remove(key);
        }
    }
    cmd
}

/// A temporary directory holding an agent config file
pub struct ConfigFixture {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
}

impl ConfigFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("agent.toml");
        Self {
            temp_dir,
            config_path,
        }
    }

    /// Config in in-cluster mode pointing at the given runtimes document
    pub fn with_runtimes(runtimes: &Path) -> Self {
        let fixture = Self::new();
        fixture.write_config(&format!(
            r#"
[kubernetes]
mode = "in-cluster"
runtimes_config = "{}"
default_runtime = "default"

[logging]
level = "warn"
"#,
            runtimes.display()
        ));
        fixture
    }

    pub fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    /// Write a file next to the config and return its path
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

/// CreatePod envelope targeting `runtime`
pub fn create_pod_envelope(runtime: &str, namespace: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "type": "CreatePod",
        "metadata": { "runtimeName": runtime, "workflow": "wf-1" },
        "spec": {
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "build-1", "namespace": namespace },
            "spec": { "containers": [{ "name": "main", "image": "alpine:3" }] }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_exist() {
        assert!(fixtures_dir().exists(), "Fixtures directory should exist");
        assert!(runtimes_fixture().exists());
        assert!(malformed_runtimes_fixture().exists());
    }
}
