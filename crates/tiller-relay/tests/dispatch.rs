//! Dispatcher tests against scripted in-memory channels.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tiller_protocol::Command;
use tiller_protocol::DataTable;
use tiller_protocol::Message;
use tiller_protocol::Query;
use tiller_protocol::QueryReply;
use tiller_protocol::ReadQuery;
use tiller_protocol::Response;
use tiller_protocol::RunRequest;
use tiller_protocol::SweepRelayRequest;
use tiller_protocol::SweepRequest;
use tiller_protocol::Value;
use tiller_relay::Relay;
use tiller_relay::RelayConfig;
use tiller_relay::RelayError;
use tiller_relay::Worker;
use tiller_relay::WorkerMetadata;
use tiller_relay::DEFAULT_PORT_LABEL;
use tiller_transport::Channel;
use tiller_transport::Connector;
use tiller_transport::TransportError;

type ReplyFn = dyn Fn(&Message) -> Response + Send + Sync;

/// Scripted endpoint behavior, shared between the spec (held by the test
/// for assertions) and every channel built from it.
#[derive(Clone)]
struct ChannelSpec {
    reply: Arc<ReplyFn>,
    delay: Duration,
    fail_send: bool,
    fail_connect: bool,
    sent: Arc<Mutex<Vec<Message>>>,
    closed: Arc<AtomicBool>,
}

impl ChannelSpec {
    fn answering(reply: impl Fn(&Message) -> Response + Send + Sync + 'static) -> Self {
        Self {
            reply: Arc::new(reply),
            delay: Duration::ZERO,
            fail_send: false,
            fail_connect: false,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn acking() -> Self {
        Self::answering(|_| Response::Ack)
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing_send() -> Self {
        let mut spec = Self::acking();
        spec.fail_send = true;
        spec
    }

    fn refusing() -> Self {
        let mut spec = Self::acking();
        spec.fail_connect = true;
        spec
    }

    fn channel(&self) -> ScriptedChannel {
        ScriptedChannel {
            spec: self.clone(),
            pending: None,
        }
    }

    fn sent_messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct ScriptedChannel {
    spec: ChannelSpec,
    pending: Option<Response>,
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn send(&mut self, message: &Message) -> tiller_transport::Result<()> {
        if self.spec.fail_send {
            return Err(TransportError::Send {
                source: io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"),
            });
        }
        self.spec.sent.lock().unwrap().push(message.clone());
        self.pending = Some((self.spec.reply)(message));
        Ok(())
    }

    async fn receive(&mut self) -> tiller_transport::Result<Response> {
        tokio::time::sleep(self.spec.delay).await;
        self.pending.take().ok_or(TransportError::Closed)
    }

    async fn close(&mut self) -> tiller_transport::Result<()> {
        self.spec.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeConnector {
    specs: HashMap<String, ChannelSpec>,
}

impl FakeConnector {
    fn empty() -> Arc<Self> {
        Arc::new(Self {
            specs: HashMap::new(),
        })
    }

    fn with(specs: Vec<(&str, ChannelSpec)>) -> Arc<Self> {
        Arc::new(Self {
            specs: specs.into_iter().map(|(address, spec)| (address.to_string(), spec)).collect(),
        })
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, address: &str, port: u16) -> tiller_transport::Result<Box<dyn Channel>> {
        let spec = self
            .specs
            .get(address)
            .unwrap_or_else(|| panic!("no scripted endpoint for {address}"));
        if spec.fail_connect {
            return Err(TransportError::Connect {
                address: address.to_string(),
                port,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            });
        }
        Ok(Box::new(spec.channel()))
    }
}

fn worker(name: &str, address: &str) -> Arc<Worker> {
    let metadata = WorkerMetadata::new(name, address).with_label(DEFAULT_PORT_LABEL, "27101");
    Arc::new(Worker::resolve(&metadata, &RelayConfig::default()).unwrap())
}

fn floats(values: &[f64]) -> Vec<Value> {
    values.iter().map(|v| Value::Float(*v)).collect()
}

fn report_reply(rows: &[(f64, f64)]) -> Response {
    let table = DataTable::new("Report")
        .with_column("A", floats(&rows.iter().map(|r| r.0).collect::<Vec<_>>()))
        .with_column("B", floats(&rows.iter().map(|r| r.1).collect::<Vec<_>>()));
    Response::Reply(QueryReply::Table(table))
}

/// Replies to a sweep with the sum of its replacement values, exposing
/// which request a worker actually received.
fn summing_sweep() -> impl Fn(&Message) -> Response + Send + Sync + 'static {
    |message| match message {
        Message::Query(Query::Sweep(SweepRequest { replacements, .. })) => {
            let sum: f64 = replacements.iter().filter_map(|r| r.value.as_f64()).sum();
            Response::Reply(QueryReply::Scalars(vec![sum]))
        }
        _ => Response::Error {
            message: "expected a sweep".to_string(),
        },
    }
}

fn run_command() -> Command {
    Command::Run(RunRequest::new(vec![]))
}

fn read_query() -> Query {
    Query::Read(ReadQuery::new("Report", vec!["A".to_string(), "B".to_string()]))
}

fn sweep_relay(vectors: Vec<Vec<f64>>) -> Query {
    Query::SweepRelay(SweepRelayRequest {
        parameter_names: vec!["[Wheat].X".to_string(), "[Wheat].Y".to_string()],
        parameter_vectors: vectors,
        table: "Report".to_string(),
        output_columns: vec!["Yield".to_string()],
    })
}

#[tokio::test]
async fn broadcast_reaches_every_worker() {
    let alpha = ChannelSpec::acking();
    let beta = ChannelSpec::acking();
    let connector = FakeConnector::with(vec![("alpha.local", alpha.clone()), ("beta.local", beta.clone())]);
    let relay = Relay::new(
        vec![worker("alpha", "alpha.local"), worker("beta", "beta.local")],
        connector,
        RelayConfig::default(),
    );

    relay.dispatch_command(run_command()).await.unwrap();

    assert_eq!(alpha.sent_messages().len(), 1);
    assert_eq!(beta.sent_messages().len(), 1);
    // Per-call connections are torn down on the way out.
    assert!(alpha.was_closed());
    assert!(beta.was_closed());
}

#[tokio::test]
async fn broadcast_failure_names_the_failing_worker() {
    let alpha = ChannelSpec::failing_send();
    let beta = ChannelSpec::acking();
    let connector = FakeConnector::with(vec![("alpha.local", alpha.clone()), ("beta.local", beta.clone())]);
    let relay = Relay::new(
        vec![worker("alpha", "alpha.local"), worker("beta", "beta.local")],
        connector,
        RelayConfig::default(),
    );

    let error = relay.dispatch_command(run_command()).await.unwrap_err();

    let failures = error.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        RelayError::WorkerTransport { worker, .. } if worker == "alpha"
    ));
    // The healthy worker was still dispatched to and completed.
    assert_eq!(beta.sent_messages().len(), 1);
    // Even the failed per-call connection is closed.
    assert!(alpha.was_closed());
}

#[tokio::test]
async fn refused_connection_is_wrapped_with_worker_identity() {
    let alpha = ChannelSpec::refusing();
    let connector = FakeConnector::with(vec![("alpha.local", alpha)]);
    let relay = Relay::new(vec![worker("alpha", "alpha.local")], connector, RelayConfig::default());

    let error = relay.dispatch_command(run_command()).await.unwrap_err();

    let failures = error.failures();
    assert_eq!(failures.len(), 1);
    match &failures[0] {
        RelayError::WorkerTransport { worker, source } => {
            assert_eq!(worker, "alpha");
            assert!(matches!(source, TransportError::Connect { .. }));
        }
        other => panic!("expected WorkerTransport, got {other}"),
    }
}

#[tokio::test]
async fn read_merges_rows_across_workers() {
    let alpha = ChannelSpec::answering(|_| report_reply(&[(1.0, 10.0), (2.0, 20.0)]));
    let beta = ChannelSpec::answering(|_| report_reply(&[(3.0, 30.0), (4.0, 40.0)]));
    let connector = FakeConnector::with(vec![("alpha.local", alpha), ("beta.local", beta)]);
    let relay = Relay::new(
        vec![worker("alpha", "alpha.local"), worker("beta", "beta.local")],
        connector,
        RelayConfig::default(),
    );

    let reply = relay.dispatch_query(read_query()).await.unwrap();
    let QueryReply::Table(table) = reply else {
        panic!("expected a table reply");
    };

    assert_eq!(table.row_count(), 4);
    let a = table.column("A").unwrap();
    let b = table.column("B").unwrap();
    assert_eq!(a.len(), 4);
    assert_eq!(b.len(), 4);
    // Rows stay paired within each worker's contribution.
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.as_f64().unwrap() * 10.0, y.as_f64().unwrap());
    }
}

#[tokio::test]
async fn read_fails_when_a_column_disappears_in_the_merge() {
    let alpha = ChannelSpec::answering(|_| report_reply(&[(1.0, 10.0)]));
    let beta = ChannelSpec::answering(|_| {
        let table = DataTable::new("Report").with_column("A", floats(&[2.0]));
        Response::Reply(QueryReply::Table(table))
    });
    let connector = FakeConnector::with(vec![("alpha.local", alpha), ("beta.local", beta)]);
    let relay = Relay::new(
        vec![worker("alpha", "alpha.local"), worker("beta", "beta.local")],
        connector,
        RelayConfig::default(),
    );

    let error = relay.dispatch_query(read_query()).await.unwrap_err();
    match error {
        RelayError::ColumnMissing { column, table } => {
            assert_eq!(column, "B");
            assert_eq!(table, "Report");
        }
        other => panic!("expected ColumnMissing, got {other}"),
    }
}

#[tokio::test]
async fn repeated_reads_are_row_equal() {
    let alpha = ChannelSpec::answering(|_| report_reply(&[(1.0, 10.0), (2.0, 20.0)]));
    let beta = ChannelSpec::answering(|_| report_reply(&[(1.0, 10.0), (2.0, 20.0)]));
    let connector = FakeConnector::with(vec![("alpha.local", alpha), ("beta.local", beta)]);
    let relay = Relay::new(
        vec![worker("alpha", "alpha.local"), worker("beta", "beta.local")],
        connector,
        RelayConfig::default(),
    );

    let first = relay.dispatch_query(read_query()).await.unwrap();
    let second = relay.dispatch_query(read_query()).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn sweep_relay_places_results_by_pairing_order() {
    let slow = ChannelSpec::answering(summing_sweep()).with_delay(Duration::from_millis(100));
    let fast = ChannelSpec::answering(summing_sweep());

    let first = worker("worker-0", "w0.local");
    let second = worker("worker-1", "w1.local");
    first.attach(Box::new(slow.channel())).await;
    second.attach(Box::new(fast.channel())).await;

    let relay = Relay::new(vec![first, second], FakeConnector::empty(), RelayConfig::default());

    let reply = relay
        .dispatch_query(sweep_relay(vec![vec![1.0, 2.0], vec![3.0, 4.0]]))
        .await
        .unwrap();
    let QueryReply::Matrix(matrix) = reply else {
        panic!("expected a matrix reply");
    };

    // worker-1 answers first, but placement follows pairing order.
    assert_eq!(matrix, vec![vec![3.0], vec![7.0]]);
}

#[tokio::test]
async fn sweep_relay_drops_extra_vectors_silently() {
    let spec = ChannelSpec::answering(summing_sweep());
    let only = worker("worker-0", "w0.local");
    only.attach(Box::new(spec.channel())).await;

    let relay = Relay::new(vec![only], FakeConnector::empty(), RelayConfig::default());

    let reply = relay
        .dispatch_query(sweep_relay(vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]))
        .await
        .unwrap();
    let QueryReply::Matrix(matrix) = reply else {
        panic!("expected a matrix reply");
    };

    assert_eq!(matrix, vec![vec![3.0]]);
    assert_eq!(spec.sent_messages().len(), 1);
}

#[tokio::test]
async fn sweep_relay_requires_a_persistent_connection() {
    let spec = ChannelSpec::answering(summing_sweep());
    let unattached = worker("worker-0", "w0.local");
    let attached = worker("worker-1", "w1.local");
    attached.attach(Box::new(spec.channel())).await;

    let relay = Relay::new(vec![unattached, attached], FakeConnector::empty(), RelayConfig::default());

    let error = relay
        .dispatch_query(sweep_relay(vec![vec![1.0, 2.0], vec![3.0, 4.0]]))
        .await
        .unwrap_err();

    let failures = error.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        RelayError::NoConnection { worker } if worker == "worker-0"
    ));
}

#[tokio::test]
async fn sweep_relay_rejects_mismatched_vectors_before_dispatching() {
    let spec = ChannelSpec::answering(summing_sweep());
    let only = worker("worker-0", "w0.local");
    only.attach(Box::new(spec.channel())).await;

    let relay = Relay::new(vec![only], FakeConnector::empty(), RelayConfig::default());

    let error = relay
        .dispatch_query(sweep_relay(vec![vec![1.0]]))
        .await
        .unwrap_err();

    assert!(matches!(error, RelayError::ParameterMismatch { index: 0, expected: 2, actual: 1 }));
    assert!(spec.sent_messages().is_empty());
}

#[tokio::test]
async fn slow_worker_hits_the_dispatch_deadline() {
    let slow = ChannelSpec::acking().with_delay(Duration::from_millis(300));
    let connector = FakeConnector::with(vec![("alpha.local", slow)]);
    let config = RelayConfig {
        dispatch_timeout: Some(Duration::from_millis(50)),
        ..RelayConfig::default()
    };
    let relay = Relay::new(vec![worker("alpha", "alpha.local")], connector, config);

    let error = relay.dispatch_command(run_command()).await.unwrap_err();

    let failures = error.failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        RelayError::DispatchTimeout { worker, .. } if worker == "alpha"
    ));
}

#[tokio::test]
async fn bare_sweep_queries_are_rejected() {
    let relay = Relay::new(vec![], FakeConnector::empty(), RelayConfig::default());

    let error = relay
        .dispatch_query(Query::Sweep(SweepRequest {
            replacements: vec![],
            table: "Report".to_string(),
            output_columns: vec![],
        }))
        .await
        .unwrap_err();

    assert!(matches!(error, RelayError::UnsupportedQuery { variant: "Sweep" }));
}
