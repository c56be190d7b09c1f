use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use tickerfresh::config::SchedulerConfig;
use tickerfresh::external::remote_collector::RemoteCollector;
use tickerfresh::logging::{init_logging, LoggingConfig};
use tickerfresh::services::event_hub::BroadcastEventHub;
use tickerfresh::services::job_scheduler_service::JobSchedulerService;
use tickerfresh::store::{PgJobQueue, PgTickerIndex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging FIRST
    init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(10);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await
        .context("Failed to connect to Postgres")?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("🗄️ Database migrations applied");

    let config = SchedulerConfig::from_env();
    info!("⚙️ Scheduler config: {:?}", config);

    let collector = RemoteCollector::from_env()?;
    if !collector.is_configured() {
        warn!("⚠️ COLLECTOR_BASE_URL not set; every job will fail until it is configured");
    }

    let events = Arc::new(BroadcastEventHub::default());
    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => debug!(target: "tickerfresh::events", "{}", json),
                    Err(e) => warn!("Failed to serialize job event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => warn!("Event logger lagged, skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let scheduler = JobSchedulerService::new(
        Arc::new(PgJobQueue::new(pool.clone())),
        Arc::new(PgTickerIndex::new(pool.clone())),
        Arc::new(collector),
        events,
        config,
    )?;

    scheduler.start().await?;
    info!("🚀 tickerfresh running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.stop().await?;
    pool.close().await;

    Ok(())
}
