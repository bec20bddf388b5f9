use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use neptune_collector::{
    CollectionScheduler, ContractQuerier, HttpSource, LcdTransport, MetricsCollector,
    PostgresClient, ReferenceData, Settings, SnapshotStore, StatusService,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    // Load configuration
    let settings = Settings::new()
        .context("Failed to load config.yaml. Please ensure it exists and is valid")?;

    let postgres = PostgresClient::new(settings.postgres.clone())
        .await
        .context("Failed to initialize database connection")?;
    postgres.migrate().await.context("Failed to apply database schema")?;
    let store: Arc<dyn SnapshotStore> = Arc::new(postgres);

    let transport = LcdTransport::new(&settings.chain).context("Failed to build chain transport")?;
    let external = HttpSource::new(Duration::from_secs(settings.chain.request_timeout_secs))
        .context("Failed to build HTTP client")?;
    let reference = Arc::new(ReferenceData::new(
        &settings.collector.tokens_path,
        &settings.collector.staking_pools_path,
    ));

    let collector = Arc::new(MetricsCollector::new(
        ContractQuerier::new(Arc::new(transport)),
        Arc::new(external),
        reference,
        store.clone(),
        settings.contracts.clone(),
        settings.external.clone(),
        settings.collector.clone(),
    ));

    let scheduler = CollectionScheduler::new(collector.clone());
    let status = StatusService::new(store, collector.subscribe(), scheduler.alive());

    let cancellation_token = CancellationToken::new();
    let scheduler_token = cancellation_token.child_token();
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.run(scheduler_token).await {
            error!("Collection scheduler failed: {:#}", e);
        }
    });

    info!(
        "Collector started - polling every {} minutes",
        settings.collector.interval_minutes
    );

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Collector running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    match status.health().await {
        Ok(report) => info!(
            "Health at shutdown: {}",
            serde_json::to_string(&report).unwrap_or_default()
        ),
        Err(e) => error!("Failed to read health at shutdown: {}", e),
    }

    cancellation_token.cancel();

    // A cycle in progress finishes before the scheduler exits
    info!("Waiting for collection scheduler to stop...");
    let _ = scheduler_handle.await;

    info!("Collector stopped");
    Ok(())
}
