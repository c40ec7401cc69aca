//! Framed socket service loop.

use std::sync::Arc;

use async_trait::async_trait;
use snafu::ResultExt;
use snafu::Snafu;
use tiller_protocol::Message;
use tiller_protocol::Response;
use tiller_relay::Relay;
use tiller_transport::FramedChannel;
use tiller_transport::TransportError;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::executor::Executor;

/// Errors that can stop the service loop.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServeError {
    /// Failed to accept an incoming connection.
    #[snafu(display("failed to accept connection: {source}"))]
    Accept {
        /// Source error.
        source: std::io::Error,
    },
}

/// Anything that can answer one protocol message.
///
/// Implemented by [`Executor`] (execute locally) and
/// [`Relay`](tiller_relay::Relay) (fan out to the worker pool), so a
/// process serves either role with the same loop.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Answer one request. Failures are rendered into
    /// [`Response::Error`]; the connection itself stays healthy.
    async fn handle(&self, message: Message) -> Response;
}

#[async_trait]
impl RequestHandler for Executor {
    async fn handle(&self, message: Message) -> Response {
        match message {
            Message::Command(command) => match self.execute_command(&command).await {
                Ok(()) => Response::Ack,
                Err(error) => {
                    warn!(%error, "command failed");
                    Response::Error {
                        message: error.to_string(),
                    }
                }
            },
            Message::Query(query) => match self.execute_query(&query).await {
                Ok(reply) => Response::Reply(reply),
                Err(error) => {
                    warn!(%error, "query failed");
                    Response::Error {
                        message: error.to_string(),
                    }
                }
            },
        }
    }
}

#[async_trait]
impl RequestHandler for Relay {
    async fn handle(&self, message: Message) -> Response {
        match message {
            Message::Command(command) => match self.dispatch_command(command).await {
                Ok(()) => Response::Ack,
                Err(error) => {
                    warn!(%error, "command relay failed");
                    Response::Error {
                        message: error.to_string(),
                    }
                }
            },
            Message::Query(query) => match self.dispatch_query(query).await {
                Ok(reply) => Response::Reply(reply),
                Err(error) => {
                    warn!(%error, "query relay failed");
                    Response::Error {
                        message: error.to_string(),
                    }
                }
            },
        }
    }
}

/// Accept connections and answer framed requests until the listener fails.
///
/// Each connection gets its own task and is served one request at a time:
/// read a message, answer it, repeat until the peer disconnects.
pub async fn serve<H>(listener: TcpListener, handler: Arc<H>) -> Result<(), ServeError>
where
    H: RequestHandler + ?Sized + 'static,
{
    match listener.local_addr() {
        Ok(address) => info!(%address, "listening"),
        Err(_) => info!("listening"),
    }

    loop {
        let (stream, peer) = listener.accept().await.context(AcceptSnafu)?;
        debug!(%peer, "client connected");
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            if let Err(error) = handle_connection(stream, handler).await {
                warn!(%peer, %error, "connection ended with transport error");
            }
        });
    }
}

async fn handle_connection<H>(stream: TcpStream, handler: Arc<H>) -> tiller_transport::Result<()>
where
    H: RequestHandler + ?Sized,
{
    let mut channel = FramedChannel::new(stream);
    loop {
        let message = match channel.read_message().await {
            Ok(message) => message,
            Err(TransportError::Closed) => {
                debug!("client disconnected");
                return Ok(());
            }
            Err(error) => return Err(error),
        };
        let response = handler.handle(message).await;
        channel.send_response(&response).await?;
    }
}
