use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateJob, JobRow};

const JOB_COLUMNS: &str = "id, job_type, ticker, priority, status, attempts, max_attempts, force, \
                           created_at, started_at, completed_at, duration_ms, error";

/// Insert a pending job unless one is already pending for the same
/// (job_type, ticker). Relies on the `jobs_one_pending_per_ticker` partial index.
pub async fn insert_pending(pool: &PgPool, job: &CreateJob) -> Result<Option<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(&format!(
        r#"
        INSERT INTO jobs (id, job_type, ticker, priority, status, attempts, max_attempts, force, created_at)
        VALUES ($1, $2, $3, $4, 'pending', 0, $5, $6, NOW())
        ON CONFLICT (job_type, ticker) WHERE status = 'pending' DO NOTHING
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(job.job_type.as_str())
    .bind(&job.ticker)
    .bind(job.priority)
    .bind(job.max_attempts)
    .bind(job.force)
    .fetch_optional(pool)
    .await
}

/// Atomically claim the highest-priority pending job whose type is not in
/// `excluded`. Oldest job wins ties.
pub async fn claim_next(pool: &PgPool, excluded: &[String]) -> Result<Option<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(&format!(
        r#"
        UPDATE jobs
        SET status = 'running',
            started_at = NOW(),
            completed_at = NULL,
            duration_ms = NULL,
            attempts = attempts + 1
        WHERE id = (
            SELECT id FROM jobs
            WHERE status = 'pending'
              AND NOT (job_type = ANY($1))
            ORDER BY priority DESC, created_at ASC, id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(excluded)
    .fetch_optional(pool)
    .await
}

/// Move a running job to its terminal state. A `None` error means success.
pub async fn finish(
    pool: &PgPool,
    id: Uuid,
    error: Option<&str>,
    duration_ms: i64,
) -> Result<Option<JobRow>, sqlx::Error> {
    let status = if error.is_some() { "failed" } else { "completed" };

    sqlx::query_as::<_, JobRow>(&format!(
        r#"
        UPDATE jobs
        SET status = $2,
            error = $3,
            duration_ms = $4,
            completed_at = NOW()
        WHERE id = $1 AND status = 'running'
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(status)
    .bind(error)
    .bind(duration_ms)
    .fetch_optional(pool)
    .await
}

/// Put a failed running job back to pending for another attempt. Returns
/// `None` when a pending job for the same (job_type, ticker) was enqueued
/// while this one ran; that job carries the retry instead.
pub async fn requeue(
    pool: &PgPool,
    id: Uuid,
    error: &str,
    duration_ms: i64,
) -> Result<Option<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(&format!(
        r#"
        UPDATE jobs r
        SET status = 'pending',
            error = $2,
            duration_ms = $3,
            completed_at = NULL
        WHERE r.id = $1
          AND r.status = 'running'
          AND NOT EXISTS (
            SELECT 1 FROM jobs p
            WHERE p.status = 'pending' AND p.job_type = r.job_type AND p.ticker = r.ticker
          )
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(error)
    .bind(duration_ms)
    .fetch_optional(pool)
    .await
}

pub async fn cancel(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE jobs SET status = 'cancelled', completed_at = NOW()
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn cancel_by_ticker(pool: &PgPool, ticker: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE jobs SET status = 'cancelled', completed_at = NOW()
         WHERE ticker = $1 AND status = 'pending'",
    )
    .bind(ticker)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn set_priority(pool: &PgPool, id: Uuid, priority: i32) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE jobs SET priority = $2 WHERE id = $1")
        .bind(id)
        .bind(priority)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn max_pending_priority(pool: &PgPool) -> Result<i32, sqlx::Error> {
    let max = sqlx::query_scalar::<_, Option<i32>>(
        "SELECT MAX(priority) FROM jobs WHERE status = 'pending'",
    )
    .fetch_one(pool)
    .await?;

    Ok(max.unwrap_or(0))
}

pub async fn fetch_one(pool: &PgPool, id: Uuid) -> Result<Option<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn fetch_pending(pool: &PgPool) -> Result<Vec<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs
         WHERE status = 'pending'
         ORDER BY priority DESC, created_at ASC"
    ))
    .fetch_all(pool)
    .await
}

pub async fn fetch_recent(pool: &PgPool, limit: i64) -> Result<Vec<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn fetch_by_ticker(pool: &PgPool, ticker: &str) -> Result<Vec<JobRow>, sqlx::Error> {
    sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE ticker = $1 ORDER BY created_at DESC"
    ))
    .bind(ticker)
    .fetch_all(pool)
    .await
}

pub async fn count_pending(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM jobs WHERE status = 'pending'")
        .fetch_one(pool)
        .await
}

pub async fn has_pending(pool: &PgPool, job_type: &str, ticker: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(
             SELECT 1 FROM jobs
             WHERE job_type = $1 AND ticker = $2 AND status = 'pending'
         )",
    )
    .bind(job_type)
    .bind(ticker)
    .fetch_one(pool)
    .await
}

/// Delete finished jobs (completed, failed or cancelled) older than `older_than`.
pub async fn purge_finished(pool: &PgPool, older_than: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM jobs
         WHERE status IN ('completed', 'failed', 'cancelled')
           AND completed_at < $1",
    )
    .bind(older_than)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Return jobs orphaned in `running` by a previous process to `pending`.
///
/// A running job whose (job_type, ticker) already has a pending twin, or a
/// second running copy, is cancelled instead so the one-pending-per-pair index
/// holds after the reset.
pub async fn reset_running(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE jobs r
        SET status = 'cancelled',
            completed_at = NOW(),
            error = 'superseded by a pending job after restart'
        WHERE r.status = 'running'
          AND (
            EXISTS (
                SELECT 1 FROM jobs p
                WHERE p.status = 'pending' AND p.job_type = r.job_type AND p.ticker = r.ticker
            )
            OR r.id NOT IN (
                SELECT DISTINCT ON (job_type, ticker) id FROM jobs
                WHERE status = 'running'
                ORDER BY job_type, ticker, priority DESC, created_at ASC
            )
          )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    let result = sqlx::query(
        "UPDATE jobs SET status = 'pending', started_at = NULL WHERE status = 'running'",
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(result.rows_affected())
}
