//! Seam to the simulation engine.

use async_trait::async_trait;
use tiller_protocol::RunRequest;

/// One simulation unit's failure during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    /// Simulation that failed.
    pub simulation: String,
    /// Rendered failure.
    pub message: String,
}

impl RunError {
    /// Create a run error for the named simulation.
    pub fn new(simulation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            simulation: simulation.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.simulation, self.message)
    }
}

/// The simulation engine.
///
/// Implementations apply the request's replacements to the local model,
/// run it honoring `max_processors`, `run_tests`, `run_post_tools` and
/// `simulation_names`, and return every execution error. Independent
/// simulation units fail independently, so implementations collect
/// failures rather than stopping at the first; an empty list is success.
#[async_trait]
pub trait SimulationRunner: Send + Sync {
    /// Run the simulations with the request's replacements applied.
    async fn run(&self, request: &RunRequest) -> Vec<RunError>;
}
