use chrono::Utc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::errors::AppError;
use crate::services::freshness_service::plan_jobs;
use crate::services::job_enqueue_service::enqueue_planned;
use crate::services::job_scheduler_service::JobContext;
use crate::store::{JobQueue, TickerIndex};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchPass {
    pub tickers: usize,
    pub planned: usize,
    pub enqueued: usize,
    pub created: usize,
    pub purged: u64,
}

/// Periodic full-catalog freshness scan. Nothing is enqueued before the
/// startup delay has elapsed; after that a pass runs at once and then on
/// every interval tick until cancelled.
pub async fn run_watcher(ctx: JobContext, cancel: CancellationToken) {
    info!(
        "👀 Ticker watcher starting in {:?} (interval {:?})",
        ctx.config.startup_delay, ctx.config.watch_interval
    );

    tokio::select! {
        _ = cancel.cancelled() => {
            info!("👀 Ticker watcher cancelled during startup delay");
            return;
        }
        _ = sleep(ctx.config.startup_delay) => {}
    }

    let mut ticker = interval(ctx.config.watch_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match watch_pass(&ctx).await {
            Ok(pass) => info!(
                "🔎 Watch pass: {} tickers, {} planned, {} new jobs, {} purged",
                pass.tickers, pass.planned, pass.created, pass.purged
            ),
            Err(e) => error!("Watch pass failed: {}", e),
        }
    }

    info!("👀 Ticker watcher stopped");
}

/// One scan over the whole ticker index, followed by a purge of old
/// finished jobs.
pub async fn watch_pass(ctx: &JobContext) -> Result<WatchPass, AppError> {
    let now = Utc::now();
    let entries = ctx.index.list().await?;
    let planned = plan_jobs(&entries, now);
    let (enqueued, created) = enqueue_planned(ctx, &planned).await;

    let max_age = chrono::Duration::from_std(ctx.config.purge_completed_after)
        .map_err(|e| AppError::Config(format!("Invalid purge age: {}", e)))?;
    let purged = ctx.queue.purge_completed(now - max_age).await?;

    Ok(WatchPass {
        tickers: entries.len(),
        planned: planned.len(),
        enqueued,
        created,
        purged,
    })
}
