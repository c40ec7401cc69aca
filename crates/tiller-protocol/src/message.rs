//! Wire envelopes: one request, one response per logical call.

use serde::Deserialize;
use serde::Serialize;

use crate::request::Command;
use crate::request::Query;
use crate::table::DataTable;

/// Request envelope sent from a client (or the relay) to a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum Message {
    /// A fire-and-forget command.
    Command(Command),
    /// A query expecting a typed reply.
    Query(Query),
}

/// Typed payload of a successful query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum QueryReply {
    /// Reply to a read query.
    Table(DataTable),
    /// Reply to a single sweep: one scalar per output column, in order.
    Scalars(Vec<f64>),
    /// Reply to a sweep relay: one scalar vector per parameter vector,
    /// in input order.
    Matrix(Vec<Vec<f64>>),
}

/// Response envelope sent back for every [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum Response {
    /// Command completed; no payload.
    Ack,
    /// Query completed with a payload.
    Reply(QueryReply),
    /// The request failed; the message describes why.
    Error {
        /// Rendered failure description.
        message: String,
    },
}
