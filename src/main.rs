use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use chainwatch_gae::anomaly::report::ReportWriter;
use chainwatch_gae::config::Config;
use chainwatch_gae::indexer::source::spawn_configured_reader;
use chainwatch_gae::indexer::stream::run_detector;
use chainwatch_gae::pipeline::DetectionSession;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging on stderr (set RUST_LOG=debug for training loss)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("ChainWatch GAE detector starting");

    // Load configuration
    let config_arg = std::env::args().nth(1);
    let (config, config_source) = Config::load_or_default(config_arg.as_deref(), "detector.toml")?;
    tracing::info!(
        window_secs = config.batching.window_secs,
        epochs = config.model.training_epochs,
        threshold = config.scoring.anomaly_threshold,
        embedding_dim = config.model.embedding_dim,
        "Configuration loaded from {}",
        config_source
    );

    let shutdown = CancellationToken::new();

    // Reader task -> bounded queue -> detection loop
    let (tx, mut rx) = mpsc::channel(config.source.queue_capacity);
    let _reader = spawn_configured_reader(&config.source, tx, shutdown.clone()).await?;

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down...");
            signal.cancel();
        }
    });

    let mut session = DetectionSession::new(&config, Instant::now());
    let mut sink = ReportWriter::new(std::io::stdout(), config.output.format);

    let result = run_detector(&mut session, &mut rx, &mut sink, &shutdown).await;
    shutdown.cancel();

    let stats = session.stats();
    tracing::info!(
        accepted = stats.events_accepted,
        rejected = stats.records_rejected,
        processed = stats.batches_processed,
        skipped = stats.batches_skipped,
        "ChainWatch GAE detector stopped"
    );

    // Exit explicitly: a stdin read parked on a blocking thread would otherwise keep the
    // runtime from shutting down.
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {:?}", e);
            std::process::exit(1);
        }
    }
}
