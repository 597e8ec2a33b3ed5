//! Curator Intake
//!
//! Feeds newline-delimited JSON agent requests through an agent pool and
//! prints one JSON response per line, in input order.
//!
//! # Usage
//!
//! ```bash
//! # Requests from a file
//! curator-intake --input requests.ndjson > responses.ndjson
//!
//! # From stdin, against a local router, no prewarm
//! cat requests.ndjson | curator-intake --router-url http://localhost:8080 --prewarm 0
//!
//! # With verbose logging
//! RUST_LOG=debug curator-intake --input requests.ndjson
//! ```
//!
//! # Environment Variables
//!
//! - `REQUESTY_API_KEY`: router bearer token
//! - `CURATOR_ROUTER_URL`, `CURATOR_PREWARM`, ...: see `curator_core::config`
//! - `RUST_LOG`: log filter (logs go to stderr)
//!
//! # Signals
//!
//! - SIGINT: stop reading, fail queued requests, drain in-flight work

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::EnvFilter;

use curator_core::{load_config_from_path, AgentPool, AgentRequest, AgentResponse, ConfigOverrides, PoolError};

/// Run agent requests from NDJSON through the curator pool
#[derive(Debug, Parser)]
#[command(name = "curator-intake", version, about)]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/curator/curator.toml)
    #[arg(long, env = "CURATOR_CONFIG")]
    config: Option<PathBuf>,

    /// NDJSON request file; stdin when omitted
    #[arg(long)]
    input: Option<PathBuf>,

    /// Router base URL
    #[arg(long)]
    router_url: Option<String>,

    /// Workers to prewarm per agent type
    #[arg(long)]
    prewarm: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("curator_core=info,curator_intake=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = load_config_from_path(args.config.clone().or_else(curator_core::default_config_path))
        .context("loading configuration")?;
    let mut overrides = ConfigOverrides::new();
    if let Some(url) = args.router_url.clone() {
        overrides = overrides.with_router_url(url);
    }
    if let Some(prewarm) = args.prewarm {
        overrides = overrides.with_prewarm(prewarm);
    }
    overrides.apply(&mut config);

    tracing::info!(
        source = %config.source(),
        router = %config.router.base_url,
        prewarm = config.prewarm_per_type,
        "Starting curator intake"
    );

    let pool = config.build_pool().context("building agent pool")?;
    pool.initialize().context("initializing agent pool")?;

    let (pending_tx, pending_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_responses(pending_rx));

    let interrupted = match args.input {
        Some(ref path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            feed_until_interrupt(&pool, file, pending_tx).await?
        }
        None => feed_until_interrupt(&pool, tokio::io::stdin(), pending_tx).await?,
    };

    if interrupted {
        tracing::warn!("Interrupted, shutting down");
        pool.shutdown().await;
    }

    let written = writer.await.context("response writer task")??;

    let stats = pool.get_statistics();
    tracing::info!(
        written,
        processed = stats.requests_processed,
        workers = stats.total_workers,
        health = %pool.health_check(),
        "Intake finished"
    );

    pool.shutdown().await;
    Ok(())
}

/// Feed requests until EOF or Ctrl-C; returns whether Ctrl-C won
async fn feed_until_interrupt<R>(
    pool: &AgentPool,
    source: R,
    pending: mpsc::UnboundedSender<oneshot::Receiver<AgentResponse>>,
) -> anyhow::Result<bool>
where
    R: AsyncRead + Unpin,
{
    tokio::select! {
        fed = feed(pool, source, pending) => {
            let submitted = fed?;
            tracing::info!(submitted, "Input exhausted");
            Ok(false)
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            Ok(true)
        }
    }
}

async fn feed<R>(
    pool: &AgentPool,
    source: R,
    pending: mpsc::UnboundedSender<oneshot::Receiver<AgentResponse>>,
) -> anyhow::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(source).lines();
    let mut line_no = 0usize;
    let mut submitted = 0usize;

    while let Some(line) = lines.next_line().await.context("reading input")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let request: AgentRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "Skipping malformed request");
                continue;
            }
        };

        let receiver = match pool.enqueue(request.clone()) {
            Ok(receiver) => receiver,
            Err(PoolError::QueueFull(depth)) => {
                // Run inline so a full queue slows the reader down
                tracing::debug!(line = line_no, depth, "Intake queue full, processing inline");
                let (tx, rx) = oneshot::channel();
                let _ = tx.send(pool.process_request(request).await);
                rx
            }
            Err(e) => return Err(e).context("submitting request"),
        };

        if pending.send(receiver).is_err() {
            anyhow::bail!("response writer stopped");
        }
        submitted += 1;
    }

    Ok(submitted)
}

async fn write_responses(
    mut pending: mpsc::UnboundedReceiver<oneshot::Receiver<AgentResponse>>,
) -> anyhow::Result<usize> {
    let mut stdout = tokio::io::stdout();
    let mut written = 0usize;

    while let Some(receiver) = pending.recv().await {
        let Ok(response) = receiver.await else {
            tracing::warn!("Request dropped without a response");
            continue;
        };

        let mut line = serde_json::to_vec(&response).context("encoding response")?;
        line.push(b'\n');
        stdout.write_all(&line).await.context("writing response")?;
        written += 1;
    }

    stdout.flush().await.context("flushing output")?;
    Ok(written)
}
