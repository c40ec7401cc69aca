//! Relay front end for a pool of simulation workers.
//!
//! Listens for framed protocol requests and fans each one out across the
//! configured worker pool. Worker endpoints are given as orchestrator-style
//! metadata (`name=address:port`); the port travels through the metadata
//! label so endpoint resolution takes the same path it does in production.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tiller_relay::Relay;
use tiller_relay::RelayConfig;
use tiller_relay::WorkerMetadata;
use tiller_relay::DEFAULT_PORT_LABEL;
use tiller_server::serve;
use tiller_transport::TcpConnector;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command line options.
#[derive(Debug, Parser)]
#[command(name = "tiller-relayd", version, about = "Fan simulation commands out across a worker pool")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    listen: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 27040)]
    port: u16,

    /// Worker endpoint as NAME=ADDR:PORT. Repeat once per worker.
    #[arg(long = "worker", value_name = "NAME=ADDR:PORT")]
    workers: Vec<String>,

    /// Metadata label carrying each worker's listening port.
    #[arg(long, default_value = DEFAULT_PORT_LABEL)]
    port_label: String,

    /// Per-worker dispatch deadline in seconds. 0 disables the deadline.
    #[arg(long, default_value_t = 300)]
    dispatch_timeout_secs: u64,

    /// Open persistent connections to all workers at startup. Required
    /// for parameter-sweep relays.
    #[arg(long)]
    connect_eagerly: bool,

    /// Log filter (e.g. info, debug, tiller_relay=trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if cli.workers.is_empty() {
        anyhow::bail!("at least one --worker is required");
    }

    let metadata: Vec<WorkerMetadata> = cli
        .workers
        .iter()
        .map(|spec| parse_worker(spec, &cli.port_label))
        .collect::<Result<_, _>>()
        .map_err(|reason| anyhow::anyhow!(reason))?;

    let config = RelayConfig {
        port_label: cli.port_label.clone(),
        dispatch_timeout: (cli.dispatch_timeout_secs > 0)
            .then(|| Duration::from_secs(cli.dispatch_timeout_secs)),
    };

    let relay = Relay::from_metadata(&metadata, Arc::new(TcpConnector::new()), config)
        .context("failed to resolve worker pool")?;

    if cli.connect_eagerly {
        relay.connect_all().await.context("failed to connect to workers")?;
    }

    let listener = TcpListener::bind((cli.listen.as_str(), cli.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", cli.listen, cli.port))?;

    info!(
        listen = %cli.listen,
        port = cli.port,
        workers = relay.workers().len(),
        "relay started"
    );

    serve(listener, Arc::new(relay)).await.context("relay server failed")?;
    Ok(())
}

/// Parse a `NAME=ADDR:PORT` worker spec into resolvable metadata.
fn parse_worker(spec: &str, port_label: &str) -> Result<WorkerMetadata, String> {
    let (name, endpoint) = spec
        .split_once('=')
        .ok_or_else(|| format!("invalid worker spec '{spec}': expected NAME=ADDR:PORT"))?;
    let (address, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| format!("invalid worker endpoint '{endpoint}': expected ADDR:PORT"))?;
    Ok(WorkerMetadata::new(name, address).with_label(port_label, port))
}
