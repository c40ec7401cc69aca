//! Local execution of commands and queries.

use std::sync::Arc;
use std::time::Instant;

use tiller_protocol::Command;
use tiller_protocol::DataTable;
use tiller_protocol::Query;
use tiller_protocol::QueryReply;
use tiller_protocol::ReadQuery;
use tiller_protocol::RunRequest;
use tiller_protocol::SweepRequest;
use tiller_protocol::Value;
use tracing::debug;
use tracing::info;

use crate::engine::SimulationRunner;
use crate::error::Result;
use crate::error::ServerError;
use crate::store::DataStore;

/// Executes requests directly against the local simulation engine and the
/// result store, instead of relaying them further.
pub struct Executor {
    runner: Arc<dyn SimulationRunner>,
    store: Arc<dyn DataStore>,
}

impl Executor {
    /// Create an executor over the local engine and store.
    pub fn new(runner: Arc<dyn SimulationRunner>, store: Arc<dyn DataStore>) -> Self {
        Self { runner, store }
    }

    /// Execute a fire-and-forget command.
    pub async fn execute_command(&self, command: &Command) -> Result<()> {
        match command {
            Command::Run(request) => self.execute_run(request).await,
        }
    }

    /// Execute a query and produce its typed reply.
    pub async fn execute_query(&self, query: &Query) -> Result<QueryReply> {
        match query {
            Query::Read(read) => self.execute_read(read).await.map(QueryReply::Table),
            Query::Sweep(sweep) => self.execute_sweep(sweep).await.map(QueryReply::Scalars),
            // Sweep relays are decomposed by the relay; a worker only ever
            // sees the per-worker sweeps.
            Query::SweepRelay(_) => Err(ServerError::UnsupportedQuery {
                variant: "SweepRelay",
            }),
        }
    }

    async fn execute_run(&self, request: &RunRequest) -> Result<()> {
        debug!(replacements = request.replacements.len(), "running simulations");
        let started = Instant::now();
        let errors = self.runner.run(request).await;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            errors = errors.len(),
            "run finished"
        );
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServerError::RunFailed { errors })
        }
    }

    async fn execute_read(&self, query: &ReadQuery) -> Result<DataTable> {
        let table = self.store.read(&query.table, &query.columns).await?;
        for column in &query.columns {
            if table.column(column).is_none() {
                return Err(ServerError::ColumnMissing {
                    column: column.clone(),
                    table: query.table.clone(),
                });
            }
        }
        Ok(table)
    }

    /// Apply one replacement vector, run, and extract the output scalars
    /// from the single report row the run must have left behind.
    async fn execute_sweep(&self, query: &SweepRequest) -> Result<Vec<f64>> {
        self.execute_run(&RunRequest::new(query.replacements.clone())).await?;

        let table = self.store.read(&query.table, &query.output_columns).await?;
        for column in &query.output_columns {
            if table.column(column).is_none() {
                return Err(ServerError::ColumnMissing {
                    column: column.clone(),
                    table: query.table.clone(),
                });
            }
        }
        match table.row_count() {
            0 => {
                return Err(ServerError::EmptyReport {
                    table: query.table.clone(),
                })
            }
            1 => {}
            rows => {
                return Err(ServerError::AmbiguousReport {
                    table: query.table.clone(),
                    rows,
                })
            }
        }

        let mut outputs = Vec::with_capacity(query.output_columns.len());
        for column in &query.output_columns {
            let value = table
                .column(column)
                .and_then(|values| values.first())
                .and_then(Value::as_f64)
                .ok_or_else(|| ServerError::NotNumeric {
                    column: column.clone(),
                    table: query.table.clone(),
                })?;
            outputs.push(value);
        }
        Ok(outputs)
    }
}
