//! Configuration system tests
//!
//! Tests configuration loading, validation, and environment overrides

mod common;

use common::{agent_cmd, ConfigFixture};
use predicates::prelude::*;

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_minimal_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    agent_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .success();
}

#[test]
fn test_full_endpoint_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[agent]
id = "agent-1"
name = "Build Agent"

[kubernetes]
mode = "endpoint"
url = "https://10.0.0.1:6443"
bearer_token = "dG9rZW4="
ca_certificate = "LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0t"
runtimes_config = "/tmp/runtimes.yaml"
runtimes_encoding = "base64"
default_runtime = "prod"
connect_timeout_secs = 5
read_timeout_secs = 15

[logging]
level = "debug"
json_format = true
"#,
    );

    agent_cmd()
        .args(["config", "show", "--config", fixture.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("mode = \"endpoint\""))
        .stdout(predicate::str::contains("runtimes_encoding = \"base64\""))
        .stdout(predicate::str::contains("default_runtime = \"prod\""))
        .stdout(predicate::str::contains("connect_timeout_secs = 5"))
        .stdout(predicate::str::contains("bearer_token = \"<redacted>\""))
        .stdout(predicate::str::contains("dG9rZW4=").not())
        .stdout(predicate::str::contains("LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0t").not());
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[kubernetes\nmode = ");

    agent_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("Failed to parse configuration"));
}

#[test]
fn test_invalid_mode() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[kubernetes]\nmode = \"sideways\"\n");

    agent_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .code(10);
}

#[test]
fn test_invalid_url_scheme() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[kubernetes]\nurl = \"ftp://10.0.0.1\"\n");

    agent_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("http:// or https://"));
}

#[test]
fn test_empty_default_runtime() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[kubernetes]\ndefault_runtime = \"  \"\n");

    agent_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("default_runtime cannot be empty"));
}

#[test]
fn test_zero_timeout() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[kubernetes]\nread_timeout_secs = 0\n");

    agent_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("greater than zero"));
}

#[test]
fn test_invalid_log_level() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[logging]\nlevel = \"loud\"\n");

    agent_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("Invalid log level 'loud'"));
}

// ─────────────────────────────────────────────────────────────────
// Environment Override Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_overrides_file() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[kubernetes]\ndefault_runtime = \"default\"\n");

    agent_cmd()
        .args(["config", "show", "--config", fixture.path()])
        .env("RUNTIME_AGENT_DEFAULT_RUNTIME", "staging")
        .env("RUNTIME_AGENT_KUBE_MODE", "endpoint")
        .env("RUNTIME_AGENT_LOG_LEVEL", "warn")
        .assert()
        .success()
        .stdout(predicate::str::contains("default_runtime = \"staging\""))
        .stdout(predicate::str::contains("mode = \"endpoint\""))
        .stdout(predicate::str::contains("level = \"warn\""));
}

#[test]
fn test_env_invalid_log_level_rejected() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    agent_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .env("RUNTIME_AGENT_LOG_LEVEL", "chatty")
        .assert()
        .code(10);
}

#[test]
fn test_config_path_from_env() {
    let fixture = ConfigFixture::with_runtimes(&common::runtimes_fixture());

    agent_cmd()
        .args(["runtimes", "list"])
        .env("RUNTIME_AGENT_CONFIG", fixture.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("staging"));
}
