//! Opening channels to remote endpoints.

use async_trait::async_trait;
use snafu::ResultExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::channel::Channel;
use crate::channel::FramedChannel;
use crate::error::ConnectSnafu;
use crate::error::Result;

/// Opens a fresh channel to an endpoint by address and port.
///
/// The dispatcher uses this for per-call connections; tests substitute an
/// in-memory implementation.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a channel to `address:port`.
    async fn connect(&self, address: &str, port: u16) -> Result<Box<dyn Channel>>;
}

/// TCP connector used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    /// Create a TCP connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, address: &str, port: u16) -> Result<Box<dyn Channel>> {
        let stream = TcpStream::connect((address, port)).await.context(ConnectSnafu {
            address: address.to_string(),
            port,
        })?;

        // Request/response traffic is small and latency-bound.
        if let Err(error) = stream.set_nodelay(true) {
            debug!(address, port, %error, "failed to set TCP_NODELAY");
        }

        Ok(Box::new(FramedChannel::new(stream)))
    }
}
