use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::mpsc;
use volspike_broadcast::Broadcaster;
use volspike_core::{AppConfig, ConfigLoader, MetricSnapshot, PushEvent};
use volspike_engine::{AlertBook, AlertStore, ShardWorker, SymbolRouter};
use volspike_ingest::{IngestConfig, MarketCollector, OiPoller};
use volspike_scheduler::{ReleaseTick, TierScheduler};
use volspike_web_api::{ApiServer, AppState};

#[derive(Parser)]
#[command(name = "volspike")]
#[command(about = "Real-time volume spike and threshold alert engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: feed ingestion, detection, scheduling, and the API
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Serve the alert API alone, without the upstream feed
    Server {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => run(&config, true).await,
        Commands::Server { config } => run(&config, false).await,
    }
}

async fn run(config_path: &str, with_feed: bool) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    let store = Arc::new(
        AlertStore::new(&config.database.url, config.database.max_connections)
            .await
            .context("failed to open alert store")?,
    );

    // The store is the source of truth for active alerts at startup.
    let alerts = Arc::new(AlertBook::new());
    let restored = store.load_active().await?;
    let restored_count = restored.len();
    for alert in restored {
        alerts.insert(alert).await;
    }
    tracing::info!(count = restored_count, "restored active alerts from store");

    let broadcaster = Arc::new(Broadcaster::new(config.delivery.clone()));

    if with_feed {
        spawn_pipeline(&config, alerts.clone(), store.clone(), broadcaster.clone());
    }

    let state = AppState {
        alerts,
        store: Some(store),
        broadcaster,
    };
    let addr = format!("{}:{}", config.server.host, config.server.port);
    ApiServer::new(state).serve(&addr).await
}

/// Wires feed → normalizer → shard workers → broadcaster, plus the tier
/// scheduler. Data flows strictly downward; each stage owns its own task.
fn spawn_pipeline(
    config: &AppConfig,
    alerts: Arc<AlertBook>,
    store: Arc<AlertStore>,
    broadcaster: Arc<Broadcaster>,
) {
    let (event_tx, event_rx) = mpsc::channel::<PushEvent>(1024);

    // One worker per symbol shard; a symbol's window has exactly one owner.
    let mut shard_txs = Vec::with_capacity(config.detection.shards.max(1));
    for shard_id in 0..config.detection.shards.max(1) {
        let (tx, rx) = mpsc::channel::<MetricSnapshot>(1024);
        let worker = ShardWorker::new(
            shard_id,
            &config.detection,
            rx,
            event_tx.clone(),
            alerts.clone(),
        )
        .with_store(store.clone());
        tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                tracing::error!(shard = shard_id, error = %e, "shard worker failed");
            }
        });
        shard_txs.push(tx);
    }
    drop(event_tx);
    let router = SymbolRouter::new(shard_txs);

    // Snapshots out of the normalizer fan into the shard router.
    let (snapshot_tx, mut snapshot_rx) = mpsc::channel::<MetricSnapshot>(1024);
    tokio::spawn(async move {
        while let Some(snapshot) = snapshot_rx.recv().await {
            if let Err(e) = router.route(snapshot).await {
                tracing::error!(error = %e, "snapshot routing failed, stopping");
                break;
            }
        }
    });

    // Upstream feed: socket collectors plus the REST open-interest poller,
    // all funneled through one normalizer.
    let (feed_tx, feed_rx) = mpsc::channel(2048);
    tokio::spawn(volspike_ingest::run_normalizer(feed_rx, snapshot_tx));

    let ingest_config = IngestConfig::from(&config.feed);
    let collector = MarketCollector::new(ingest_config.clone(), feed_tx.clone());
    tokio::spawn(async move {
        if let Err(e) = collector.run().await {
            tracing::error!(error = %e, "market collector failed");
        }
    });
    let poller = OiPoller::new(ingest_config, feed_tx);
    tokio::spawn(async move {
        if let Err(e) = poller.run().await {
            tracing::error!(error = %e, "open-interest poller failed");
        }
    });

    // Wall-clock gates for the gated tiers.
    let (tick_tx, tick_rx) = mpsc::channel::<ReleaseTick>(8);
    TierScheduler::new(tick_tx).spawn();

    tokio::spawn(run_event_pump(broadcaster, event_rx, tick_rx));
}

/// Feeds engine events and scheduler releases into the broadcaster.
async fn run_event_pump(
    broadcaster: Arc<Broadcaster>,
    mut events: mpsc::Receiver<PushEvent>,
    mut ticks: mpsc::Receiver<ReleaseTick>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => broadcaster.on_event(&event).await,
                    None => break,
                }
            }
            tick = ticks.recv() => {
                match tick {
                    Some(tick) => {
                        let subscribers = broadcaster.on_release(tick.tier).await;
                        tracing::debug!(
                            tier = tick.tier.as_str(),
                            boundary = %tick.scheduled_for,
                            subscribers,
                            "release delivered"
                        );
                    }
                    None => break,
                }
            }
        }
    }
    tracing::info!("event pump stopped");
}
