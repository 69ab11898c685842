use anyhow::{Context, Result};
use chunkcast::{
    create_router, AppState, ArchiveStore, CaptureDeviceFactory, CaptureEngine, CaptureSource,
    CaptureStatus, Config, FileSink, NatsTransport, Relay, StreamRegistry, Transport, Viewer,
};
use chunkcast::transport::subject;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long a producer waits for the relay to report archival
const OUTCOME_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "chunkcast", version, about = "Live media chunk pipeline")]
struct Cli {
    /// Configuration file, without extension
    #[arg(long, default_value = "config/chunkcast")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay and its discovery API
    Relay,

    /// Record a source and stream it live
    Publish {
        /// Pre-encoded media file to stream
        #[arg(long, conflicts_with = "synthetic", required_unless_present = "synthetic")]
        file: Option<PathBuf>,

        /// Stream a generated test pattern instead of a file
        #[arg(long)]
        synthetic: bool,

        #[arg(long)]
        stream_id: Option<String>,
    },

    /// Join a live stream and write the reassembled media to a file
    Watch {
        #[arg(long)]
        stream_id: String,

        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Chunkcast v{}", env!("CARGO_PKG_VERSION"));

    let transport = Arc::new(NatsTransport::new(cfg.transport.nats_url.clone()));
    transport
        .open()
        .await
        .with_context(|| format!("Failed to connect to {}", cfg.transport.nats_url))?;

    let result = match cli.command {
        Command::Relay => run_relay(&cfg, transport.clone()).await,
        Command::Publish {
            file,
            synthetic,
            stream_id,
        } => {
            let source = match (file, synthetic) {
                (Some(path), _) => CaptureSource::File(path),
                (None, true) => CaptureSource::Synthetic,
                (None, false) => anyhow::bail!("Either --file or --synthetic is required"),
            };
            run_publish(&cfg, transport.clone(), source, stream_id).await
        }
        Command::Watch { stream_id, out } => {
            run_watch(&cfg, transport.clone(), stream_id, out).await
        }
    };

    if let Err(e) = transport.close().await {
        warn!("Failed to close transport: {}", e);
    }

    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run_relay(cfg: &Config, transport: Arc<NatsTransport>) -> Result<()> {
    let registry = StreamRegistry::with_replay_limit(cfg.relay.replay_limit_bytes);
    let archive = Arc::new(ArchiveStore::new(cfg.relay.recordings_dir.clone()));

    let router = create_router(AppState::new(registry.clone(), archive.clone()));
    let addr = cfg.http.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;

    info!("Discovery API listening on http://{}", addr);
    info!("Archiving recordings to {:?}", archive.dir());

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("HTTP server failed: {}", e);
        }
    });

    let relay = Relay::new(transport, registry, archive);
    let result = relay.run(shutdown_signal()).await;

    server.abort();
    result
}

async fn run_publish(
    cfg: &Config,
    transport: Arc<NatsTransport>,
    source: CaptureSource,
    stream_id: Option<String>,
) -> Result<()> {
    let stream_id = stream_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    subject::validate_stream_id(&stream_id)?;
    let device = CaptureDeviceFactory::create(source);

    let mut engine = CaptureEngine::new(cfg.recorder.clone(), &stream_id, device, transport);

    engine
        .acquire_source()
        .await
        .context("Failed to acquire capture source")?;

    match engine.start().await {
        Ok(CaptureStatus::Started { mime }) => info!("Streaming {} as {}", stream_id, mime),
        Ok(status) => info!("Recorder: {:?}", status),
        Err(e) => {
            engine.teardown().await;
            return Err(e).context("Failed to start recording");
        }
    }

    let status = engine.run(shutdown_signal()).await;
    let stats = engine.stats();
    info!(
        "Recording finished ({:?}): {} segments, {} bytes in {}s",
        status, stats.segments_emitted, stats.bytes_emitted, stats.elapsed_secs
    );

    match engine.await_outcome(OUTCOME_TIMEOUT).await {
        Some(CaptureStatus::Archived { filename, size }) => {
            info!("Relay archived {} ({} bytes)", filename, size)
        }
        Some(CaptureStatus::ArchiveFailed { message }) => {
            warn!("Relay failed to archive: {}", message)
        }
        _ => warn!("No archival outcome from relay"),
    }

    Ok(())
}

async fn run_watch(
    cfg: &Config,
    transport: Arc<NatsTransport>,
    stream_id: String,
    out: PathBuf,
) -> Result<()> {
    subject::validate_stream_id(&stream_id)?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let sink = FileSink::create(&out, events_tx)
        .with_context(|| format!("Failed to create output file: {:?}", out))?;

    let mut viewer = Viewer::new(
        cfg.playback.clone(),
        &stream_id,
        transport,
        Box::new(sink),
        events_rx,
    );

    viewer
        .attach()
        .await
        .with_context(|| format!("Failed to join stream {}", stream_id))?;

    info!("Watching {} into {:?}", stream_id, out);

    let stats = viewer.run(shutdown_signal()).await;
    info!(
        "Viewer finished: {} chunks appended, {} dropped, {} evictions",
        stats.appended, stats.dropped, stats.evictions
    );

    Ok(())
}
