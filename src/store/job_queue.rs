use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::job_queries;
use crate::errors::AppError;
use crate::models::{CreateJob, Job, JobRow, JobType};

/// Durable, ordered collection of jobs.
///
/// `dequeue` is an atomic claim: the highest-priority pending job (oldest
/// first on ties) moves to `running` with `started_at` set and `attempts`
/// incremented, and no two callers can ever claim the same job. `enqueue`
/// never creates a second pending job for the same (job_type, ticker).
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Returns `None` when a pending job for the same (job_type, ticker) exists.
    async fn enqueue(&self, job: CreateJob) -> Result<Option<Job>, AppError>;

    /// Claim the next job whose type is not in `excluded`.
    async fn dequeue(&self, excluded: &[JobType]) -> Result<Option<Job>, AppError>;

    /// Finish a running job: `None` marks it completed, `Some(error)` failed.
    async fn complete(&self, id: Uuid, error: Option<&str>, duration_ms: i64) -> Result<Job, AppError>;

    /// Send a running job back to pending after a failed attempt. Returns
    /// `None` when another pending job for the same pair already exists.
    async fn requeue(&self, id: Uuid, error: &str, duration_ms: i64) -> Result<Option<Job>, AppError>;

    /// Cancel a pending job. Returns false when it was not pending.
    async fn cancel(&self, id: Uuid) -> Result<bool, AppError>;

    async fn cancel_by_ticker(&self, ticker: &str) -> Result<u64, AppError>;

    async fn set_priority(&self, id: Uuid, priority: i32) -> Result<bool, AppError>;

    /// Highest priority among pending jobs, 0 when none are pending.
    async fn get_max_priority(&self) -> Result<i32, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Job>, AppError>;

    /// Pending jobs in dispatch order.
    async fn list_pending(&self) -> Result<Vec<Job>, AppError>;

    /// Most recently created jobs of any status.
    async fn list_all(&self, limit: i64) -> Result<Vec<Job>, AppError>;

    async fn list_by_ticker(&self, ticker: &str) -> Result<Vec<Job>, AppError>;

    async fn count_pending(&self) -> Result<i64, AppError>;

    async fn has_pending_job(&self, job_type: JobType, ticker: &str) -> Result<bool, AppError>;

    /// Delete completed, failed and cancelled jobs finished before `older_than`.
    async fn purge_completed(&self, older_than: DateTime<Utc>) -> Result<u64, AppError>;

    /// Crash recovery: return every `running` job to `pending`. Running jobs
    /// that would duplicate a pending one are cancelled instead.
    async fn reset_running_jobs(&self) -> Result<u64, AppError>;
}

#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode(row: Option<JobRow>) -> Result<Option<Job>, AppError> {
    row.map(Job::try_from).transpose()
}

fn decode_all(rows: Vec<JobRow>) -> Result<Vec<Job>, AppError> {
    rows.into_iter().map(Job::try_from).collect()
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: CreateJob) -> Result<Option<Job>, AppError> {
        decode(job_queries::insert_pending(&self.pool, &job).await?)
    }

    async fn dequeue(&self, excluded: &[JobType]) -> Result<Option<Job>, AppError> {
        let excluded: Vec<String> = excluded.iter().map(|t| t.as_str().to_string()).collect();
        decode(job_queries::claim_next(&self.pool, &excluded).await?)
    }

    async fn complete(&self, id: Uuid, error: Option<&str>, duration_ms: i64) -> Result<Job, AppError> {
        decode(job_queries::finish(&self.pool, id, error, duration_ms).await?)?
            .ok_or_else(|| AppError::NotFound(format!("No running job {}", id)))
    }

    async fn requeue(&self, id: Uuid, error: &str, duration_ms: i64) -> Result<Option<Job>, AppError> {
        decode(job_queries::requeue(&self.pool, id, error, duration_ms).await?)
    }

    async fn cancel(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(job_queries::cancel(&self.pool, id).await?)
    }

    async fn cancel_by_ticker(&self, ticker: &str) -> Result<u64, AppError> {
        Ok(job_queries::cancel_by_ticker(&self.pool, ticker).await?)
    }

    async fn set_priority(&self, id: Uuid, priority: i32) -> Result<bool, AppError> {
        Ok(job_queries::set_priority(&self.pool, id, priority).await?)
    }

    async fn get_max_priority(&self) -> Result<i32, AppError> {
        Ok(job_queries::max_pending_priority(&self.pool).await?)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, AppError> {
        decode(job_queries::fetch_one(&self.pool, id).await?)
    }

    async fn list_pending(&self) -> Result<Vec<Job>, AppError> {
        decode_all(job_queries::fetch_pending(&self.pool).await?)
    }

    async fn list_all(&self, limit: i64) -> Result<Vec<Job>, AppError> {
        decode_all(job_queries::fetch_recent(&self.pool, limit).await?)
    }

    async fn list_by_ticker(&self, ticker: &str) -> Result<Vec<Job>, AppError> {
        decode_all(job_queries::fetch_by_ticker(&self.pool, ticker).await?)
    }

    async fn count_pending(&self) -> Result<i64, AppError> {
        Ok(job_queries::count_pending(&self.pool).await?)
    }

    async fn has_pending_job(&self, job_type: JobType, ticker: &str) -> Result<bool, AppError> {
        Ok(job_queries::has_pending(&self.pool, job_type.as_str(), ticker).await?)
    }

    async fn purge_completed(&self, older_than: DateTime<Utc>) -> Result<u64, AppError> {
        Ok(job_queries::purge_finished(&self.pool, older_than).await?)
    }

    async fn reset_running_jobs(&self) -> Result<u64, AppError> {
        Ok(job_queries::reset_running(&self.pool).await?)
    }
}
