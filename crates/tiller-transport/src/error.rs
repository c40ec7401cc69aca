//! Transport error types.

use snafu::Snafu;

/// Result type for transport operations.
pub type Result<T, E = TransportError> = std::result::Result<T, E>;

/// Errors that can occur on a transport channel.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransportError {
    /// Failed to open a connection to an endpoint.
    #[snafu(display("failed to connect to {address}:{port}: {source}"))]
    Connect {
        /// Target address.
        address: String,
        /// Target port.
        port: u16,
        /// Source error.
        source: std::io::Error,
    },

    /// Failed to write a frame to the stream.
    #[snafu(display("failed to send frame: {source}"))]
    Send {
        /// Source error.
        source: std::io::Error,
    },

    /// Failed to read a frame from the stream.
    #[snafu(display("failed to receive frame: {source}"))]
    Receive {
        /// Source error.
        source: std::io::Error,
    },

    /// The peer closed the connection.
    #[snafu(display("connection closed by peer"))]
    Closed,

    /// A frame exceeded the maximum allowed size.
    #[snafu(display("frame size {size} exceeds maximum {max}"))]
    FrameTooLarge {
        /// Offending frame size in bytes.
        size: u32,
        /// Maximum allowed size in bytes.
        max: u32,
    },

    /// Failed to serialize an outgoing payload.
    #[snafu(display("failed to serialize payload: {source}"))]
    Serialize {
        /// Source error.
        source: serde_json::Error,
    },

    /// Failed to deserialize an incoming payload.
    #[snafu(display("failed to deserialize payload: {source}"))]
    Deserialize {
        /// Source error.
        source: serde_json::Error,
    },

    /// Failed to shut the stream down cleanly.
    #[snafu(display("failed to close connection: {source}"))]
    Close {
        /// Source error.
        source: std::io::Error,
    },
}
