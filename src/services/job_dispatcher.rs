use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::external::collector::CollectorError;
use crate::jobs::run_collector;
use crate::models::{Job, JobEventType, JobStatus};
use crate::services::job_scheduler_service::JobContext;
use crate::store::{JobQueue, TickerIndex};

/// Fallback wake-up when no enqueue or completion notification arrives.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Supervising dispatch loop.
///
/// Each iteration reserves capacity first and only then claims a job, so a
/// claimed job never sits in `running` waiting for a slot. Every job runs on
/// its own task tracked by `tracker` and holds its permit until it finishes.
pub async fn run_dispatcher(ctx: JobContext, tracker: TaskTracker, cancel: CancellationToken) {
    info!(
        "🚦 Dispatcher started (max_concurrent={}, heavy_job_limit={})",
        ctx.config.max_concurrent, ctx.config.heavy_job_limit
    );

    loop {
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = ctx.governor.acquire() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Concurrency governor closed: {}", e);
                    break;
                }
            },
        };

        match ctx.queue.dequeue(permit.excluded_job_types()).await {
            Ok(Some(job)) => {
                let permit = permit.fit_to(&job);
                let ctx = ctx.clone();
                tracker.spawn(async move {
                    execute_job(&ctx, job).await;
                    drop(permit);
                    ctx.wake.notify_one();
                });
            }
            Ok(None) => {
                drop(permit);
                wait_for_work(&ctx, &cancel).await;
            }
            Err(e) => {
                drop(permit);
                error!("Failed to dequeue job: {}", e);
                wait_for_work(&ctx, &cancel).await;
            }
        }
    }

    info!("🚦 Dispatcher stopped");
}

async fn wait_for_work(ctx: &JobContext, cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = ctx.wake.notified() => {}
        _ = sleep(POLL_INTERVAL) => {}
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run one claimed job to a recorded outcome. Nothing here returns an error:
/// collector and store failures end up in the job record or the log.
pub async fn execute_job(ctx: &JobContext, job: Job) {
    info!(
        "🏃 Starting {} for {} (attempt {}/{})",
        job.job_type, job.ticker, job.attempts, job.max_attempts
    );
    ctx.publish(JobEventType::JobStarted, job.clone()).await;

    let started = Instant::now();
    let outcome = if job.attempts > job.max_attempts {
        Err(CollectorError::Failed(format!(
            "exceeded max attempts ({}/{})",
            job.attempts, job.max_attempts
        )))
    } else {
        AssertUnwindSafe(run_collector(ctx.collector.as_ref(), &job))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(CollectorError::Panicked(panic_message(payload))))
    };
    let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

    match outcome {
        Ok(()) => record_success(ctx, job, duration_ms).await,
        Err(e) => record_failure(ctx, job, &e.to_string(), duration_ms).await,
    }
}

async fn record_success(ctx: &JobContext, job: Job, duration_ms: i64) {
    let snapshot = match ctx.queue.complete(job.id, None, duration_ms).await {
        Ok(done) => done,
        Err(e) => {
            error!("Failed to mark job {} completed: {}", job.id, e);
            Job {
                status: JobStatus::Completed,
                duration_ms: Some(duration_ms),
                completed_at: Some(Utc::now()),
                ..job.clone()
            }
        }
    };

    if let Some(component) = job.job_type.component() {
        if let Err(e) = ctx.index.update_timestamp(&job.ticker, component, Utc::now()).await {
            error!("Failed to advance {} timestamp for {}: {}", component, job.ticker, e);
        }
    }

    info!("✅ {} for {} completed in {}ms", job.job_type, job.ticker, duration_ms);
    ctx.publish(JobEventType::JobCompleted, snapshot).await;
}

async fn record_failure(ctx: &JobContext, job: Job, error: &str, duration_ms: i64) {
    if job.attempts < job.max_attempts {
        match ctx.queue.requeue(job.id, error, duration_ms).await {
            Ok(Some(requeued)) => {
                warn!(
                    "🔁 {} for {} failed (attempt {}/{}), retrying: {}",
                    job.job_type, job.ticker, job.attempts, job.max_attempts, error
                );
                ctx.publish(JobEventType::JobFailed, requeued).await;
                ctx.wake.notify_one();
                return;
            }
            Ok(None) => debug!("Job {} superseded by a pending twin, failing it", job.id),
            Err(e) => error!("Failed to requeue job {}: {}", job.id, e),
        }
    }

    let snapshot = match ctx.queue.complete(job.id, Some(error), duration_ms).await {
        Ok(failed) => failed,
        Err(e) => {
            error!("Failed to mark job {} failed: {}", job.id, e);
            Job {
                status: JobStatus::Failed,
                error: Some(error.to_string()),
                duration_ms: Some(duration_ms),
                completed_at: Some(Utc::now()),
                ..job.clone()
            }
        }
    };

    error!(
        "❌ {} for {} failed after {} attempt(s): {}",
        job.job_type, job.ticker, job.attempts, error
    );
    ctx.publish(JobEventType::JobFailed, snapshot).await;
}
