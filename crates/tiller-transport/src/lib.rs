//! Framed socket transport for the Tiller protocol.
//!
//! A channel carries exactly one endpoint of a point-to-point connection:
//! one serialized [`Message`](tiller_protocol::Message) out, one serialized
//! [`Response`](tiller_protocol::Response) back per logical call, with
//! explicit teardown.
//!
//! ## Frame format
//!
//! ```text
//! +----------------+------------------+
//! | Length (4 BE)  | JSON payload     |
//! +----------------+------------------+
//! ```
//!
//! Frames larger than [`MAX_FRAME_SIZE`] are rejected on both directions.

#![warn(missing_docs)]

mod channel;
mod connector;
mod error;

pub use channel::Channel;
pub use channel::FramedChannel;
pub use channel::MAX_FRAME_SIZE;
pub use connector::Connector;
pub use connector::TcpConnector;
pub use error::Result;
pub use error::TransportError;
