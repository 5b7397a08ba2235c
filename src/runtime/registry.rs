//! Runtime registry
//!
//! Holds one entry per configured runtime and hands out its cluster client.
//! Sessions are established lazily on first use. While a session is being
//! established every caller for that runtime waits on the same in-flight
//! attempt, so each runtime is connected at most once at a time. A failed
//! attempt puts the entry back to `Uninitialized`; the next caller retries.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::bundle::RuntimeConfig;
use super::client::{ClusterClient, ClusterConnector};
use crate::error::{Error, Result};

type ConnectOutcome = std::result::Result<Arc<dyn ClusterClient>, String>;
type PendingConnect = Shared<BoxFuture<'static, ConnectOutcome>>;

/// Lifecycle of one runtime's session
enum ConnectionState {
    Uninitialized,
    Initializing(PendingConnect),
    Ready(Arc<dyn ClusterClient>),
}

/// Observable snapshot of a runtime's session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Uninitialized,
    Initializing,
    Ready,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Uninitialized => "uninitialized",
            ConnectionStatus::Initializing => "initializing",
            ConnectionStatus::Ready => "ready",
        };
        f.write_str(s)
    }
}

struct RuntimeEntry {
    config: Arc<RuntimeConfig>,
    state: ConnectionState,
}

type RuntimeTable = Arc<Mutex<HashMap<String, RuntimeEntry>>>;

/// Lazily-connected table of named runtimes
pub struct RuntimeRegistry {
    runtimes: RuntimeTable,
    connector: Arc<dyn ClusterConnector>,
}

impl RuntimeRegistry {
    /// Build a registry; no connection is attempted until `get_client`
    pub fn new(
        runtimes: BTreeMap<String, RuntimeConfig>,
        connector: Arc<dyn ClusterConnector>,
    ) -> Self {
        let table = runtimes
            .into_iter()
            .map(|(name, config)| {
                let entry = RuntimeEntry {
                    config: Arc::new(config),
                    state: ConnectionState::Uninitialized,
                };
                (name, entry)
            })
            .collect();

        Self {
            runtimes: Arc::new(Mutex::new(table)),
            connector,
        }
    }

    /// Return the ready client for a runtime, connecting it if needed.
    ///
    /// Concurrent callers for the same runtime share one connect attempt
    /// and all receive the same client or the same failure.
    pub async fn get_client(&self, name: &str) -> Result<Arc<dyn ClusterClient>> {
        let pending = {
            let mut runtimes = self.runtimes.lock();
            let entry = runtimes
                .get_mut(name)
                .ok_or_else(|| Error::unknown_runtime(name))?;

            match &entry.state {
                ConnectionState::Ready(client) => return Ok(Arc::clone(client)),
                ConnectionState::Initializing(pending) => {
                    debug!(runtime = %name, "Joining in-flight connection attempt");
                    pending.clone()
                }
                ConnectionState::Uninitialized => {
                    let pending = self.start_connect(name, Arc::clone(&entry.config));
                    entry.state = ConnectionState::Initializing(pending.clone());
                    pending
                }
            }
        };

        pending.await.map_err(|message| Error::RuntimeInit {
            runtime: name.to_string(),
            message,
        })
    }

    /// Create the shared connect attempt. The attempt records its own
    /// outcome in the table. It only makes progress while polled: if every
    /// waiter is dropped the entry stays `Initializing`, and the next
    /// caller resumes the stored attempt instead of starting another.
    fn start_connect(&self, name: &str, config: Arc<RuntimeConfig>) -> PendingConnect {
        let runtimes = Arc::clone(&self.runtimes);
        let connector = Arc::clone(&self.connector);
        let name = name.to_string();

        async move {
            info!(runtime = %name, host = %config.host, "Connecting to runtime");
            let result = connector.connect(&config).await;

            let mut table = runtimes.lock();
            let entry = table.get_mut(&name);
            match result {
                Ok(client) => {
                    if let Some(entry) = entry {
                        entry.state = ConnectionState::Ready(Arc::clone(&client));
                    }
                    info!(runtime = %name, endpoint = client.endpoint(), "Runtime ready");
                    Ok(client)
                }
                Err(e) => {
                    if let Some(entry) = entry {
                        entry.state = ConnectionState::Uninitialized;
                    }
                    warn!(runtime = %name, error = %e, "Runtime connection failed");
                    Err(e.to_string())
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Configured runtime names, sorted
    pub fn runtime_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.runtimes.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.runtimes.lock().contains_key(name)
    }

    /// Connection material for a runtime
    pub fn runtime(&self, name: &str) -> Option<Arc<RuntimeConfig>> {
        self.runtimes
            .lock()
            .get(name)
            .map(|entry| Arc::clone(&entry.config))
    }

    /// Current session state of a runtime
    pub fn state(&self, name: &str) -> Option<ConnectionStatus> {
        self.runtimes.lock().get(name).map(|entry| match entry.state {
            ConnectionState::Uninitialized => ConnectionStatus::Uninitialized,
            ConnectionState::Initializing(_) => ConnectionStatus::Initializing,
            ConnectionState::Ready(_) => ConnectionStatus::Ready,
        })
    }

    pub fn len(&self) -> usize {
        self.runtimes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.lock().is_empty()
    }
}
