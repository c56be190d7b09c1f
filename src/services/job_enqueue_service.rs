use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{CreateJob, Job, JobEventType, JobStatus, JobType};
use crate::services::freshness_service::PlannedJob;
use crate::services::job_scheduler_service::JobContext;
use crate::store::JobQueue;

/// The single path by which jobs enter the queue.
///
/// Returns `Ok(None)` without creating anything when a pending job for the
/// same (job_type, ticker) already exists. Newly created jobs are announced
/// with a `job_queued` event and wake the dispatcher.
pub async fn enqueue_if_needed(
    ctx: &JobContext,
    job_type: JobType,
    ticker: &str,
    priority: i32,
    force: bool,
) -> Result<Option<Job>, AppError> {
    let ticker = ticker.trim();
    if ticker.is_empty() {
        return Err(AppError::Validation("Ticker must not be empty".to_string()));
    }

    if ctx.queue.has_pending_job(job_type, ticker).await? {
        debug!("Skipping {} for {}: already pending", job_type, ticker);
        return Ok(None);
    }

    let created = ctx
        .queue
        .enqueue(CreateJob {
            job_type,
            ticker: ticker.to_string(),
            priority,
            max_attempts: ctx.config.max_attempts,
            force,
        })
        .await?;

    match created {
        Some(job) => {
            debug!("➕ Queued {} for {} (priority {})", job_type, ticker, priority);
            ctx.publish(JobEventType::JobQueued, job.clone()).await;
            ctx.wake.notify_one();
            Ok(Some(job))
        }
        None => {
            debug!("Skipping {} for {}: enqueued concurrently", job_type, ticker);
            Ok(None)
        }
    }
}

/// Enqueue every planned job. Returns how many enqueue calls succeeded,
/// deduplicated ones included, and how many jobs were actually created.
pub async fn enqueue_planned(ctx: &JobContext, planned: &[PlannedJob]) -> (usize, usize) {
    let mut succeeded = 0;
    let mut created = 0;

    for job in planned {
        match enqueue_if_needed(ctx, job.job_type, &job.key, job.priority, false).await {
            Ok(Some(_)) => {
                succeeded += 1;
                created += 1;
            }
            Ok(None) => succeeded += 1,
            Err(e) => warn!("Failed to enqueue {} for {}: {}", job.job_type, job.key, e),
        }
    }

    (succeeded, created)
}

/// Move a pending job ahead of everything else in the queue.
pub async fn push_to_top(ctx: &JobContext, id: Uuid) -> Result<Job, AppError> {
    let mut job = ctx
        .queue
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;

    if job.status != JobStatus::Pending {
        return Err(AppError::Validation(format!(
            "Job {} is {} and cannot be reprioritised",
            id, job.status
        )));
    }

    let priority = ctx.queue.get_max_priority().await?.saturating_add(1);
    if !ctx.queue.set_priority(id, priority).await? {
        return Err(AppError::NotFound(format!("Job {} not found", id)));
    }

    info!("⏫ Pushed job {} ({} {}) to priority {}", id, job.job_type, job.ticker, priority);
    job.priority = priority;
    Ok(job)
}
