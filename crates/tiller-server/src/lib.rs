//! Worker-side execution and the socket service loop.
//!
//! A worker process owns one slice of the simulation set. It listens on a
//! socket, reads one framed request at a time, executes it against the
//! local simulation engine and result store, and answers with a typed
//! response. The same service loop also fronts the relay: handlers are
//! anything implementing [`RequestHandler`], so a process either executes
//! requests locally ([`Executor`]) or fans them out
//! ([`tiller_relay::Relay`]).
//!
//! The simulation engine and the tabular store are external collaborators,
//! reached through the [`SimulationRunner`] and [`DataStore`] seams.

#![warn(missing_docs)]

mod engine;
mod error;
mod executor;
mod service;
mod store;

pub use engine::RunError;
pub use engine::SimulationRunner;
pub use error::Result;
pub use error::ServerError;
pub use executor::Executor;
pub use service::serve;
pub use service::RequestHandler;
pub use service::ServeError;
pub use store::DataStore;
pub use store::MemoryStore;
pub use store::StoreError;
