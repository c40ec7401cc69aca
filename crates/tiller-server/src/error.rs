//! Worker-side execution errors.

use snafu::Snafu;

use crate::engine::RunError;
use crate::store::StoreError;

/// Result type for worker-side execution.
pub type Result<T, E = ServerError> = std::result::Result<T, E>;

/// Errors that can occur while executing a request locally.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ServerError {
    /// The run completed, but one or more simulations failed.
    #[snafu(display("run completed with {} error(s): [{}]", errors.len(), render_run_errors(errors)))]
    RunFailed {
        /// Every simulation failure from the run.
        errors: Vec<RunError>,
    },

    /// The result store failed.
    #[snafu(transparent)]
    Store {
        /// Underlying store failure.
        source: StoreError,
    },

    /// A requested column is absent from the table that was read.
    #[snafu(display("column {column} does not exist in table {table}"))]
    ColumnMissing {
        /// Missing column.
        column: String,
        /// Table that was read.
        table: String,
    },

    /// The report table has no rows after the run.
    #[snafu(display("report table {table} is empty; expected exactly one row"))]
    EmptyReport {
        /// Offending table.
        table: String,
    },

    /// The report table has more than one row after the run, so the
    /// outputs are ambiguous. The model is expected to reset the report
    /// between runs.
    #[snafu(display("report table {table} has {rows} rows; expected exactly one"))]
    AmbiguousReport {
        /// Offending table.
        table: String,
        /// Row count that was found.
        rows: usize,
    },

    /// An output cell has no numeric interpretation.
    #[snafu(display("column {column} in table {table} is not numeric"))]
    NotNumeric {
        /// Offending column.
        column: String,
        /// Table that was read.
        table: String,
    },

    /// The query variant cannot be executed locally.
    #[snafu(display("query variant {variant} cannot be executed locally"))]
    UnsupportedQuery {
        /// Offending variant.
        variant: &'static str,
    },
}

fn render_run_errors(errors: &[RunError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
