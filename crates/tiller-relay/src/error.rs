//! Relay error types.
//!
//! Fan-out failures are aggregated: every per-worker failure in a dispatch
//! is collected before the call fails, and each one keeps the identity of
//! the worker it came from.

use std::time::Duration;

use snafu::Snafu;
use tiller_transport::TransportError;

/// Result type for relay operations.
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Errors that can occur while resolving workers or dispatching to them.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RelayError {
    /// The worker's metadata carries no labels at all.
    #[snafu(display("worker {worker} has no metadata labels"))]
    NoLabels {
        /// Worker that failed resolution.
        worker: String,
    },

    /// The worker's metadata lacks the configured port label.
    #[snafu(display("worker {worker} has no {label} label"))]
    MissingPortLabel {
        /// Worker that failed resolution.
        worker: String,
        /// Label that was looked up.
        label: String,
    },

    /// The port label's value is not a valid 16-bit port number.
    #[snafu(display("unable to parse port number '{value}' for worker {worker}"))]
    InvalidPort {
        /// Worker that failed resolution.
        worker: String,
        /// Offending label value.
        value: String,
    },

    /// The worker's metadata carries no network address.
    #[snafu(display("worker {worker} has no address"))]
    MissingAddress {
        /// Worker that failed resolution.
        worker: String,
    },

    /// A sweep was dispatched to a worker without a persistent connection.
    #[snafu(display("worker {worker} has no established connection"))]
    NoConnection {
        /// Worker that was targeted.
        worker: String,
    },

    /// The transport to a worker failed.
    #[snafu(display("transport failure for worker {worker}: {source}"))]
    WorkerTransport {
        /// Worker that was targeted.
        worker: String,
        /// Underlying transport failure.
        source: TransportError,
    },

    /// The worker answered with an error response.
    #[snafu(display("worker {worker} reported an error: {message}"))]
    WorkerRejected {
        /// Worker that answered.
        worker: String,
        /// The worker's rendered failure.
        message: String,
    },

    /// The worker answered with the wrong response variant.
    #[snafu(display("unexpected response from worker {worker}: expected {expected}"))]
    UnexpectedResponse {
        /// Worker that answered.
        worker: String,
        /// Response variant that was expected.
        expected: &'static str,
    },

    /// A per-worker dispatch exceeded the configured deadline.
    #[snafu(display("dispatch to worker {worker} timed out after {timeout:?}"))]
    DispatchTimeout {
        /// Worker that was targeted.
        worker: String,
        /// Deadline that was exceeded.
        timeout: Duration,
    },

    /// A requested column disappeared while merging worker results.
    #[snafu(display("column {column} does not exist in table {table} (it disappeared in the merge)"))]
    ColumnMissing {
        /// Missing column.
        column: String,
        /// Table that was merged.
        table: String,
    },

    /// A parameter vector's length does not match the parameter names.
    #[snafu(display(
        "parameter vector {index} has {actual} values but {expected} parameter names were given"
    ))]
    ParameterMismatch {
        /// Index of the offending vector.
        index: usize,
        /// Number of parameter names.
        expected: usize,
        /// Number of values in the vector.
        actual: usize,
    },

    /// The query variant has no relay-side fan-out semantics.
    #[snafu(display("query variant {variant} cannot be dispatched by the relay"))]
    UnsupportedQuery {
        /// Offending variant.
        variant: &'static str,
    },

    /// A dispatch task died before producing a result.
    #[snafu(display("dispatch task failed: {detail}"))]
    TaskFailed {
        /// What went wrong.
        detail: String,
    },

    /// One or more per-worker dispatches failed.
    #[snafu(display(
        "{} of {attempted} worker dispatches failed: [{}]",
        failures.len(),
        render_failures(failures)
    ))]
    Aggregate {
        /// Number of per-worker dispatches that were attempted.
        attempted: usize,
        /// Every per-worker failure, identity preserved.
        failures: Vec<RelayError>,
    },
}

impl RelayError {
    /// The contributing failures: the aggregate's members, or the error
    /// itself for non-aggregate failures.
    pub fn failures(&self) -> &[RelayError] {
        match self {
            Self::Aggregate { failures, .. } => failures,
            other => std::slice::from_ref(other),
        }
    }
}

fn render_failures(failures: &[RelayError]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
