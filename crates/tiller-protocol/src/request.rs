//! Request variants exchanged between client, relay, and workers.

use serde::Deserialize;
use serde::Serialize;

use crate::value::Value;

/// A named parameter override applied to a simulation before it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replacement {
    /// Dotted model path of the parameter to override.
    pub path: String,
    /// Value substituted at that path.
    pub value: Value,
}

impl Replacement {
    /// Create a replacement for `path` with the given value.
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

/// A request to run the simulations held by the receiving worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Overrides applied to the model before the run, in order.
    pub replacements: Vec<Replacement>,
    /// Whether to run post-simulation tools after the run.
    pub run_post_tools: bool,
    /// Whether to run validation tests after the run.
    pub run_tests: bool,
    /// Maximum number of processors to use. Non-positive means all available.
    pub max_processors: i32,
    /// Restrict the run to these simulation names. `None` runs everything.
    pub simulation_names: Option<Vec<String>>,
}

impl RunRequest {
    /// Create a run request with the platform defaults: post-simulation
    /// tools and tests enabled, all processors, all simulations.
    pub fn new(replacements: Vec<Replacement>) -> Self {
        Self {
            replacements,
            run_post_tools: true,
            run_tests: true,
            max_processors: -1,
            simulation_names: None,
        }
    }
}

/// A request to read named columns from a named result table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadQuery {
    /// Table to read from.
    pub table: String,
    /// Columns to fetch, in order. Every one must exist in the result.
    pub columns: Vec<String>,
}

impl ReadQuery {
    /// Create a read query for `table` fetching `columns`.
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }
}

/// A single parameter-sweep run: apply one replacement vector, run, and
/// extract one scalar per output column from the report table.
///
/// The run must leave `table` with exactly one row; the model is assumed
/// to be reset between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRequest {
    /// Overrides applied before the run, in order.
    pub replacements: Vec<Replacement>,
    /// Report table the outputs are read from.
    pub table: String,
    /// Columns extracted from the single report row, in order.
    pub output_columns: Vec<String>,
}

/// Distribution of many independent parameter vectors across the worker
/// pool, one vector per worker, producing a matched matrix of outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRelayRequest {
    /// Parameter paths, matched positionally against each vector.
    pub parameter_names: Vec<String>,
    /// One replacement vector per intended worker, in order.
    pub parameter_vectors: Vec<Vec<f64>>,
    /// Report table the outputs are read from.
    pub table: String,
    /// Columns extracted per run, in order.
    pub output_columns: Vec<String>,
}

/// Fire-and-forget requests: acknowledged, but no payload comes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    /// Run the simulations.
    Run(RunRequest),
}

/// Requests answered with a typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Query {
    /// Fetch columns from a result table.
    Read(ReadQuery),
    /// Run one parameter vector and extract scalar outputs.
    Sweep(SweepRequest),
    /// Distribute parameter vectors across the pool and collect the matrix.
    SweepRelay(SweepRelayRequest),
}
