//! Protocol data model for the Tiller simulation relay.
//!
//! Defines the commands and queries exchanged between clients, the relay,
//! and worker processes, along with the tabular result types they produce.
//! Everything here is plain data: construction, equality, and serde. The
//! framing that puts these types on the wire lives in `tiller-transport`,
//! and the logic that acts on them lives in `tiller-relay` (fan-out) and
//! `tiller-server` (local execution).
//!
//! Requests form a closed set, split by whether a payload comes back:
//!
//! - [`Command`]: fire-and-forget, acknowledged with no payload.
//! - [`Query`]: answered with a typed [`QueryReply`].
//!
//! Column and parameter orderings are significant everywhere in this
//! protocol and are preserved end-to-end; nothing here reorders or
//! deduplicates.

#![warn(missing_docs)]

mod message;
mod request;
mod table;
mod value;

pub use message::Message;
pub use message::QueryReply;
pub use message::Response;
pub use request::Command;
pub use request::Query;
pub use request::ReadQuery;
pub use request::Replacement;
pub use request::RunRequest;
pub use request::SweepRelayRequest;
pub use request::SweepRequest;
pub use table::DataTable;
pub use value::Value;
