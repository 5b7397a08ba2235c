//! Runtimes document decoding
//!
//! The runtimes document is a YAML file with a top-level `Runtimes` field.
//! Two shapes are accepted for that field:
//!
//! ```yaml
//! Runtimes:
//!   prod:
//!     Host: https://10.0.0.1:6443
//!     Token: <bearer token>
//!     Crt: <PEM or base64-encoded PEM>
//! ```
//!
//! or a list whose entries carry their own `Name`. The whole file may
//! itself be base64-encoded, which is what `Encoding::Base64` selects.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

const PEM_MARKER: &str = "-----BEGIN";

/// How the runtimes document is stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Raw YAML text
    #[default]
    Plain,
    /// YAML text wrapped in standard base64
    Base64,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Plain => "plain",
            Encoding::Base64 => "base64",
        }
    }
}

impl FromStr for Encoding {
    type Err = Error;

    /// Parse an encoding name, case-insensitively
    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plain" | "utf8" | "utf-8" => Ok(Encoding::Plain),
            "base64" => Ok(Encoding::Base64),
            other => Err(Error::config_field_invalid(
                "kubernetes.runtimes_encoding",
                format!("Unknown runtimes encoding '{}'. Must be plain or base64", other),
            )),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection material for one named remote cluster
#[derive(Debug)]
pub struct RuntimeConfig {
    /// Runtime name, unique within a document
    pub name: String,
    /// API server address
    pub host: Url,
    /// Bearer token presented to the API server
    pub token: SecretString,
    /// PEM-encoded CA certificate bundle used to verify the API server
    pub ca_certificate: Vec<u8>,
}

impl RuntimeConfig {
    pub fn new(
        name: impl Into<String>,
        host: Url,
        token: impl Into<String>,
        ca_certificate: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            host,
            token: SecretString::from(token.into()),
            ca_certificate,
        }
    }
}

/// Runtime entry as it appears in the document
#[derive(Debug, Deserialize)]
struct RawRuntime {
    #[serde(rename = "Name", alias = "name", default)]
    name: Option<String>,
    #[serde(rename = "Host", alias = "host", default)]
    host: Option<String>,
    #[serde(rename = "Token", alias = "token", default)]
    token: Option<String>,
    #[serde(rename = "Crt", alias = "crt", default)]
    crt: Option<String>,
}

/// Read the runtimes document from disk.
///
/// A missing file is not an error: it yields an empty blob, which decodes
/// to an empty runtime table.
pub async fn read_bundle_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    match tokio::fs::read(path).await {
        Ok(blob) => {
            debug!(path = %path.display(), bytes = blob.len(), "Read runtimes document");
            Ok(blob)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Runtimes document not found, no runtimes configured");
            Ok(Vec::new())
        }
        Err(e) => Err(Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Decode a runtimes document into a table keyed by runtime name.
///
/// An empty blob, an empty document, or a document without `Runtimes`
/// produces an empty table.
pub fn parse(blob: &[u8], encoding: Encoding) -> Result<BTreeMap<String, RuntimeConfig>> {
    let text = decode_blob(blob, encoding)?;
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let document: Value = serde_yaml::from_str(&text)
        .map_err(|e| Error::malformed(format!("invalid YAML: {}", e)))?;

    let runtimes = match document {
        Value::Null => return Ok(BTreeMap::new()),
        Value::Mapping(mut root) => match root.remove("Runtimes") {
            None | Some(Value::Null) => return Ok(BTreeMap::new()),
            Some(runtimes) => runtimes,
        },
        _ => return Err(Error::malformed("document root must be a mapping")),
    };

    let mut table = BTreeMap::new();
    match runtimes {
        Value::Mapping(entries) => {
            for (key, value) in entries {
                let name = match key {
                    Value::String(name) => name,
                    other => {
                        return Err(Error::malformed(format!(
                            "runtime name must be a string, got {:?}",
                            other
                        )))
                    }
                };
                let raw: RawRuntime = decode_entry(&name, value)?;
                insert_runtime(&mut table, build_runtime(name, raw)?)?;
            }
        }
        Value::Sequence(entries) => {
            for (index, value) in entries.into_iter().enumerate() {
                let label = format!("#{}", index);
                let mut raw: RawRuntime = decode_entry(&label, value)?;
                let name = raw
                    .name
                    .take()
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| {
                        Error::malformed(format!("runtime entry {} has no Name", label))
                    })?;
                insert_runtime(&mut table, build_runtime(name, raw)?)?;
            }
        }
        _ => {
            return Err(Error::malformed(
                "Runtimes must be a mapping of name to runtime or a list of runtimes",
            ))
        }
    }

    debug!(count = table.len(), "Decoded runtimes document");
    Ok(table)
}

fn decode_blob(blob: &[u8], encoding: Encoding) -> Result<String> {
    let bytes = match encoding {
        Encoding::Plain => blob.to_vec(),
        Encoding::Base64 => {
            let compact: Vec<u8> = blob
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            STANDARD
                .decode(compact)
                .map_err(|e| Error::malformed(format!("document is not valid base64: {}", e)))?
        }
    };

    String::from_utf8(bytes).map_err(|_| Error::malformed("document is not valid UTF-8"))
}

fn decode_entry(label: &str, value: Value) -> Result<RawRuntime> {
    serde_yaml::from_value(value)
        .map_err(|e| Error::malformed(format!("runtime {} is not a valid entry: {}", label, e)))
}

fn insert_runtime(
    table: &mut BTreeMap<String, RuntimeConfig>,
    runtime: RuntimeConfig,
) -> Result<()> {
    if table.contains_key(&runtime.name) {
        return Err(Error::malformed(format!(
            "runtime {} is defined more than once",
            runtime.name
        )));
    }
    table.insert(runtime.name.clone(), runtime);
    Ok(())
}

fn build_runtime(name: String, raw: RawRuntime) -> Result<RuntimeConfig> {
    let host = required(&name, "Host", raw.host)?;
    let token = required(&name, "Token", raw.token)?;
    let crt = required(&name, "Crt", raw.crt)?;

    let host = Url::parse(host.trim())
        .map_err(|e| Error::malformed(format!("runtime {} has an invalid Host: {}", name, e)))?;
    if host.scheme() != "https" && host.scheme() != "http" {
        return Err(Error::malformed(format!(
            "runtime {} Host must use http or https, got {}",
            name,
            host.scheme()
        )));
    }

    let ca_certificate = decode_certificate(&name, &crt)?;

    Ok(RuntimeConfig::new(name, host, token.trim(), ca_certificate))
}

fn required(name: &str, field: &str, value: Option<String>) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::malformed(format!("runtime {} is missing {}", name, field)))
}

/// Accept a CA certificate either as PEM text or as base64-wrapped PEM.
pub fn decode_certificate(name: &str, raw: &str) -> Result<Vec<u8>> {
    let trimmed = raw.trim();
    if trimmed.starts_with(PEM_MARKER) {
        return Ok(trimmed.as_bytes().to_vec());
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = STANDARD.decode(compact).map_err(|e| {
        Error::malformed(format!("runtime {} Crt is neither PEM nor base64: {}", name, e))
    })?;

    let pem = String::from_utf8(decoded)
        .map_err(|_| Error::malformed(format!("runtime {} Crt does not decode to PEM", name)))?;
    if !pem.trim_start().starts_with(PEM_MARKER) {
        return Err(Error::malformed(format!(
            "runtime {} Crt does not decode to PEM",
            name
        )));
    }

    Ok(pem.trim().as_bytes().to_vec())
}
