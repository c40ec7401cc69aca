//! Fan-out dispatch across a pool of simulation workers.
//!
//! The relay accepts one logical command or query, sends it to every worker
//! it applies to, and assembles one coherent result (or one aggregated
//! failure) for the caller:
//!
//! - Commands are broadcast to every worker and acknowledged with no
//!   payload; failures are collected into a single aggregate that names
//!   each failing worker.
//! - Read queries fan out, and the partial tables are merged row-union.
//! - Parameter-sweep relays pair parameter vector *i* with worker *i* and
//!   reassemble the output matrix in pairing order, regardless of which
//!   worker finishes first.
//!
//! Worker endpoints are resolved from orchestrator metadata via
//! [`Worker::resolve`]; the label naming the listening port and the
//! per-dispatch deadline are explicit [`RelayConfig`] values, not
//! constants.

#![warn(missing_docs)]

mod dispatch;
mod error;
mod merge;
mod worker;

pub use dispatch::Relay;
pub use error::RelayError;
pub use error::Result;
pub use merge::merge_tables;
pub use worker::RelayConfig;
pub use worker::Worker;
pub use worker::WorkerMetadata;
pub use worker::DEFAULT_PORT_LABEL;
