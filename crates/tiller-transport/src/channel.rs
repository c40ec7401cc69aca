//! Framed channel over an async byte stream.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use snafu::ResultExt;
use tiller_protocol::Message;
use tiller_protocol::Response;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

use crate::error::CloseSnafu;
use crate::error::ReceiveSnafu;
use crate::error::Result;
use crate::error::SendSnafu;
use crate::error::TransportError;

/// Maximum frame size (16 MB). Prevents memory exhaustion from malformed
/// length prefixes.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Client end of a request/response connection.
///
/// A channel owns exactly one endpoint at a time. Implementations must not
/// be shared across concurrent dispatches; exclusivity is the caller's job.
#[async_trait]
pub trait Channel: Send {
    /// Serialize and transmit one request.
    async fn send(&mut self, message: &Message) -> Result<()>;

    /// Receive and deserialize one response.
    async fn receive(&mut self) -> Result<Response>;

    /// Tear the connection down. Explicit so failures are observable;
    /// dropping the channel abandons the stream without a clean shutdown.
    async fn close(&mut self) -> Result<()>;
}

/// Length-prefixed JSON framing over any async byte stream.
pub struct FramedChannel<S> {
    stream: S,
}

impl<S> FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a stream in the framing codec.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    async fn write_frame<T: Serialize + Sync>(&mut self, payload: &T) -> Result<()> {
        let json = serde_json::to_vec(payload).map_err(|source| TransportError::Serialize { source })?;

        if json.len() > MAX_FRAME_SIZE as usize {
            return Err(TransportError::FrameTooLarge {
                size: json.len() as u32,
                max: MAX_FRAME_SIZE,
            });
        }

        let len_bytes = (json.len() as u32).to_be_bytes();
        self.stream.write_all(&len_bytes).await.context(SendSnafu)?;
        self.stream.write_all(&json).await.context(SendSnafu)?;
        self.stream.flush().await.context(SendSnafu)?;
        Ok(())
    }

    async fn read_frame<T: DeserializeOwned>(&mut self) -> Result<T> {
        let mut len_bytes = [0u8; 4];
        self.stream.read_exact(&mut len_bytes).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::Closed
            } else {
                TransportError::Receive { source: e }
            }
        })?;

        let len = u32::from_be_bytes(len_bytes);
        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut buf = vec![0u8; len as usize];
        self.stream.read_exact(&mut buf).await.context(ReceiveSnafu)?;

        serde_json::from_slice(&buf).map_err(|source| TransportError::Deserialize { source })
    }

    /// Read one request envelope. Used by the serving side.
    pub async fn read_message(&mut self) -> Result<Message> {
        self.read_frame().await
    }

    /// Write one response envelope. Used by the serving side.
    pub async fn send_response(&mut self, response: &Response) -> Result<()> {
        self.write_frame(response).await
    }

    /// Shut the write half down, signalling EOF to the peer.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await.context(CloseSnafu)
    }
}

#[async_trait]
impl<S> Channel for FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &Message) -> Result<()> {
        self.write_frame(message).await
    }

    async fn receive(&mut self) -> Result<Response> {
        self.read_frame().await
    }

    async fn close(&mut self) -> Result<()> {
        self.shutdown().await
    }
}
