//! The fan-out dispatcher.
//!
//! One concurrent task per worker per dispatch call. Every task is spawned
//! before any is joined, and the call returns only after all of them have
//! finished. Per-worker failures are collected into one aggregate; a single
//! worker's failure never masks another's.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tiller_protocol::Command;
use tiller_protocol::DataTable;
use tiller_protocol::Message;
use tiller_protocol::Query;
use tiller_protocol::QueryReply;
use tiller_protocol::ReadQuery;
use tiller_protocol::Replacement;
use tiller_protocol::Response;
use tiller_protocol::SweepRelayRequest;
use tiller_protocol::SweepRequest;
use tiller_transport::Channel;
use tiller_transport::Connector;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::RelayError;
use crate::error::Result;
use crate::merge::merge_tables;
use crate::worker::RelayConfig;
use crate::worker::Worker;
use crate::worker::WorkerMetadata;

/// Dispatcher over a snapshot of the worker pool.
///
/// The snapshot is taken when the relay is built; workers added or removed
/// afterwards are not observed by in-progress dispatches. The relay exposes
/// exactly two operations — [`dispatch_command`](Self::dispatch_command)
/// and [`dispatch_query`](Self::dispatch_query) — and matches on the
/// request variant internally, so callers never branch on the concrete
/// type.
pub struct Relay {
    workers: Vec<Arc<Worker>>,
    connector: Arc<dyn Connector>,
    config: RelayConfig,
}

impl Relay {
    /// Create a relay over an already-resolved worker snapshot.
    pub fn new(workers: Vec<Arc<Worker>>, connector: Arc<dyn Connector>, config: RelayConfig) -> Self {
        Self {
            workers,
            connector,
            config,
        }
    }

    /// Resolve every worker from metadata and build the relay.
    ///
    /// Resolution is fail-fast: the first worker that cannot be resolved
    /// aborts pool construction with its distinct error.
    pub fn from_metadata(
        metadata: &[WorkerMetadata],
        connector: Arc<dyn Connector>,
        config: RelayConfig,
    ) -> Result<Self> {
        let workers = metadata
            .iter()
            .map(|meta| Worker::resolve(meta, &config).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        info!(workers = workers.len(), "resolved worker pool");
        Ok(Self::new(workers, connector, config))
    }

    /// The worker snapshot this relay dispatches over.
    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// Open and attach a persistent connection to every worker.
    ///
    /// Required before parameter-sweep relays; run and read dispatches fall
    /// back to per-call connections without it.
    pub async fn connect_all(&self) -> Result<()> {
        for worker in &self.workers {
            info!(
                worker = worker.name(),
                address = worker.address(),
                port = worker.port(),
                "connecting to worker"
            );
            let channel = self
                .connector
                .connect(worker.address(), worker.port())
                .await
                .map_err(|source| RelayError::WorkerTransport {
                    worker: worker.name().to_string(),
                    source,
                })?;
            worker.attach(channel).await;
            info!(worker = worker.name(), "connection established");
        }
        Ok(())
    }

    /// Broadcast a command to every worker and wait for all of them.
    ///
    /// There is no partial success: either every worker acknowledged, or
    /// the call fails with the aggregate of every per-worker failure.
    pub async fn dispatch_command(&self, command: Command) -> Result<()> {
        debug!(workers = self.workers.len(), "relaying command");

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        for worker in &self.workers {
            let worker = Arc::clone(worker);
            let connector = Arc::clone(&self.connector);
            let message = Message::Command(command.clone());
            let deadline = self.config.dispatch_timeout;
            tasks.spawn(async move {
                let response = relay_message(&worker, connector.as_ref(), &message, deadline).await?;
                expect_ack(worker.name(), response)
            });
        }

        let attempted = self.workers.len();
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(error)) => failures.push(error),
                Err(join_error) => failures.push(RelayError::TaskFailed {
                    detail: join_error.to_string(),
                }),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RelayError::Aggregate { attempted, failures })
        }
    }

    /// Dispatch a query and merge the per-worker results into one reply.
    pub async fn dispatch_query(&self, query: Query) -> Result<QueryReply> {
        match query {
            Query::Read(read) => self.dispatch_read(read).await.map(QueryReply::Table),
            Query::SweepRelay(sweep) => self.dispatch_sweep_relay(sweep).await.map(QueryReply::Matrix),
            // Single sweeps are constructed by the relay itself, one per
            // worker; a caller-supplied one has no defined fan-out.
            Query::Sweep(_) => Err(RelayError::UnsupportedQuery { variant: "Sweep" }),
        }
    }

    async fn dispatch_read(&self, query: ReadQuery) -> Result<DataTable> {
        debug!(table = %query.table, workers = self.workers.len(), "relaying read query");

        let mut tasks: JoinSet<Result<DataTable>> = JoinSet::new();
        for worker in &self.workers {
            let worker = Arc::clone(worker);
            let connector = Arc::clone(&self.connector);
            let message = Message::Query(Query::Read(query.clone()));
            let deadline = self.config.dispatch_timeout;
            tasks.spawn(async move {
                let response = relay_message(&worker, connector.as_ref(), &message, deadline).await?;
                expect_table(worker.name(), response)
            });
        }

        let attempted = self.workers.len();
        let mut partials = Vec::with_capacity(attempted);
        let mut failures = Vec::new();
        // Partials land in completion order; only row order within each
        // worker's contribution is guaranteed.
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(table)) => partials.push(table),
                Ok(Err(error)) => failures.push(error),
                Err(join_error) => failures.push(RelayError::TaskFailed {
                    detail: join_error.to_string(),
                }),
            }
        }
        if !failures.is_empty() {
            return Err(RelayError::Aggregate { attempted, failures });
        }

        let merged = merge_tables(&query.table, partials);
        for column in &query.columns {
            if merged.column(column).is_none() {
                return Err(RelayError::ColumnMissing {
                    column: column.clone(),
                    table: query.table.clone(),
                });
            }
        }
        Ok(merged)
    }

    /// Distribute one parameter vector per worker and reassemble the
    /// output matrix in pairing order.
    async fn dispatch_sweep_relay(&self, query: SweepRelayRequest) -> Result<Vec<Vec<f64>>> {
        if query.parameter_vectors.len() > self.workers.len() {
            // Pairing stops at the shorter sequence; overflow vectors are
            // dropped, not queued.
            warn!(
                vectors = query.parameter_vectors.len(),
                workers = self.workers.len(),
                dropped = query.parameter_vectors.len() - self.workers.len(),
                "more parameter vectors than workers; excess vectors are dropped"
            );
        }

        let mut paired = Vec::new();
        for (index, (vector, worker)) in
            query.parameter_vectors.iter().zip(self.workers.iter()).enumerate()
        {
            if vector.len() != query.parameter_names.len() {
                return Err(RelayError::ParameterMismatch {
                    index,
                    expected: query.parameter_names.len(),
                    actual: vector.len(),
                });
            }
            let replacements: Vec<Replacement> = query
                .parameter_names
                .iter()
                .zip(vector.iter())
                .map(|(name, value)| Replacement::new(name.clone(), *value))
                .collect();
            let request = SweepRequest {
                replacements,
                table: query.table.clone(),
                output_columns: query.output_columns.clone(),
            };
            paired.push((index, Arc::clone(worker), request));
        }

        debug!(pairs = paired.len(), table = %query.table, "relaying parameter sweep");

        let attempted = paired.len();
        let mut tasks: JoinSet<Result<(usize, Vec<f64>)>> = JoinSet::new();
        for (index, worker, request) in paired {
            let deadline = self.config.dispatch_timeout;
            tasks.spawn(async move {
                let message = Message::Query(Query::Sweep(request));
                let response = sweep_on_persistent(&worker, &message, deadline).await?;
                let outputs = expect_scalars(worker.name(), response)?;
                Ok((index, outputs))
            });
        }

        // Placement is by pairing index, never completion order.
        let mut slots: Vec<Option<Vec<f64>>> = vec![None; attempted];
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((index, outputs))) => slots[index] = Some(outputs),
                Ok(Err(error)) => failures.push(error),
                Err(join_error) => failures.push(RelayError::TaskFailed {
                    detail: join_error.to_string(),
                }),
            }
        }
        if !failures.is_empty() {
            return Err(RelayError::Aggregate { attempted, failures });
        }

        let mut matrix = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(outputs) => matrix.push(outputs),
                None => {
                    return Err(RelayError::TaskFailed {
                        detail: format!("no result recorded for parameter vector {index}"),
                    })
                }
            }
        }
        Ok(matrix)
    }
}

/// Send one message to a worker and return its non-error response.
///
/// Uses the worker's persistent connection when one is attached; otherwise
/// opens a per-call connection that is closed on every exit path.
async fn relay_message(
    worker: &Worker,
    connector: &dyn Connector,
    message: &Message,
    deadline: Option<Duration>,
) -> Result<Response> {
    let mut guard = worker.connection().await;
    match guard.as_mut() {
        Some(channel) => {
            with_deadline(worker.name(), deadline, exchange(worker.name(), channel.as_mut(), message))
                .await
        }
        None => {
            drop(guard);
            debug!(
                worker = worker.name(),
                address = worker.address(),
                port = worker.port(),
                "opening per-call connection"
            );
            let mut channel = connector
                .connect(worker.address(), worker.port())
                .await
                .map_err(|source| RelayError::WorkerTransport {
                    worker: worker.name().to_string(),
                    source,
                })?;
            let result =
                with_deadline(worker.name(), deadline, exchange(worker.name(), channel.as_mut(), message))
                    .await;
            if let Err(error) = channel.close().await {
                warn!(worker = worker.name(), %error, "failed to close per-call connection");
            }
            result
        }
    }
}

/// Sweeps go over the worker's persistent connection only; there is no
/// per-call fallback for this variant.
async fn sweep_on_persistent(
    worker: &Worker,
    message: &Message,
    deadline: Option<Duration>,
) -> Result<Response> {
    let mut guard = worker.connection().await;
    let channel = guard.as_mut().ok_or_else(|| RelayError::NoConnection {
        worker: worker.name().to_string(),
    })?;
    with_deadline(worker.name(), deadline, exchange(worker.name(), channel.as_mut(), message)).await
}

async fn exchange(worker: &str, channel: &mut dyn Channel, message: &Message) -> Result<Response> {
    channel.send(message).await.map_err(|source| RelayError::WorkerTransport {
        worker: worker.to_string(),
        source,
    })?;
    let response = channel.receive().await.map_err(|source| RelayError::WorkerTransport {
        worker: worker.to_string(),
        source,
    })?;
    match response {
        Response::Error { message } => Err(RelayError::WorkerRejected {
            worker: worker.to_string(),
            message,
        }),
        other => Ok(other),
    }
}

async fn with_deadline<T, F>(worker: &str, deadline: Option<Duration>, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, operation).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::DispatchTimeout {
                worker: worker.to_string(),
                timeout: limit,
            }),
        },
        None => operation.await,
    }
}

fn expect_ack(worker: &str, response: Response) -> Result<()> {
    match response {
        Response::Ack => Ok(()),
        _ => Err(RelayError::UnexpectedResponse {
            worker: worker.to_string(),
            expected: "Ack",
        }),
    }
}

fn expect_table(worker: &str, response: Response) -> Result<DataTable> {
    match response {
        Response::Reply(QueryReply::Table(table)) => Ok(table),
        _ => Err(RelayError::UnexpectedResponse {
            worker: worker.to_string(),
            expected: "Table",
        }),
    }
}

fn expect_scalars(worker: &str, response: Response) -> Result<Vec<f64>> {
    match response {
        Response::Reply(QueryReply::Scalars(outputs)) => Ok(outputs),
        _ => Err(RelayError::UnexpectedResponse {
            worker: worker.to_string(),
            expected: "Scalars",
        }),
    }
}
