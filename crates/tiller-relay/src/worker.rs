//! Worker handles and endpoint resolution.

use std::collections::HashMap;
use std::time::Duration;

use tiller_transport::Channel;
use tokio::sync::Mutex;
use tokio::sync::MutexGuard;

use crate::error::RelayError;
use crate::error::Result;

/// Default metadata label carrying a worker's listening port.
pub const DEFAULT_PORT_LABEL: &str = "tiller.io/port-no";

/// Relay configuration, passed explicitly into pool resolution and
/// dispatch.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Metadata label whose value is the worker's listening port.
    pub port_label: String,
    /// Deadline applied to each per-worker dispatch. `None` disables it.
    pub dispatch_timeout: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port_label: DEFAULT_PORT_LABEL.to_string(),
            dispatch_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Runtime metadata published for a worker process by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct WorkerMetadata {
    /// Worker name, used in every diagnostic that concerns it.
    pub name: String,
    /// Network address the worker is reachable on.
    pub address: String,
    /// Label map; `None` when the orchestrator published no labels.
    pub labels: Option<HashMap<String, String>>,
}

impl WorkerMetadata {
    /// Create metadata with a name and address and no labels.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            labels: None,
        }
    }

    /// Builder-style label insertion.
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.get_or_insert_with(HashMap::new).insert(name.into(), value.into());
        self
    }
}

/// An addressable remote execution endpoint.
///
/// A worker never outlives the pool snapshot that produced it. Its
/// connection is either attached once and reused for the pool's lifetime,
/// or opened per call by the dispatcher; the mode is selected by whether
/// [`attach`](Self::attach) was called.
pub struct Worker {
    name: String,
    address: String,
    port: u16,
    connection: Mutex<Option<Box<dyn Channel>>>,
}

impl Worker {
    /// Resolve a worker handle from its runtime metadata.
    ///
    /// Fails with a distinct error naming the worker when the metadata has
    /// no labels, lacks the configured port label, carries a port value
    /// that is not a valid 16-bit integer, or has no address.
    pub fn resolve(metadata: &WorkerMetadata, config: &RelayConfig) -> Result<Self> {
        let labels = metadata.labels.as_ref().ok_or_else(|| RelayError::NoLabels {
            worker: metadata.name.clone(),
        })?;

        let port_value = labels.get(&config.port_label).ok_or_else(|| RelayError::MissingPortLabel {
            worker: metadata.name.clone(),
            label: config.port_label.clone(),
        })?;

        let port: u16 = port_value.parse().map_err(|_| RelayError::InvalidPort {
            worker: metadata.name.clone(),
            value: port_value.clone(),
        })?;

        if metadata.address.is_empty() {
            return Err(RelayError::MissingAddress {
                worker: metadata.name.clone(),
            });
        }

        Ok(Self {
            name: metadata.name.clone(),
            address: metadata.address.clone(),
            port,
            connection: Mutex::new(None),
        })
    }

    /// Worker name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Worker network address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Worker listening port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Attach a persistent connection, reused by every later dispatch.
    pub async fn attach(&self, channel: Box<dyn Channel>) {
        *self.connection.lock().await = Some(channel);
    }

    /// Whether a persistent connection is attached.
    pub async fn has_connection(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Exclusive access to the connection slot for the duration of one
    /// dispatch. Holding the guard keeps concurrent dispatches off the
    /// channel.
    pub(crate) async fn connection(&self) -> MutexGuard<'_, Option<Box<dyn Channel>>> {
        self.connection.lock().await
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}
