use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{CreateJob, Job, JobStatus, JobType};
use crate::store::job_queue::JobQueue;

/// In-process job queue with the same claim and dedup rules as the Postgres
/// queue. Jobs live in insertion order; every operation runs under one lock.
#[derive(Clone, Default)]
pub struct MemoryJobQueue {
    jobs: Arc<Mutex<Vec<Job>>>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

fn outranks(candidate: &Job, best: &Job) -> bool {
    candidate.priority > best.priority
        || (candidate.priority == best.priority && candidate.created_at < best.created_at)
}

fn has_pending_twin(jobs: &[Job], job_type: JobType, ticker: &str) -> bool {
    jobs.iter()
        .any(|j| j.status == JobStatus::Pending && j.job_type == job_type && j.ticker == ticker)
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: CreateJob) -> Result<Option<Job>, AppError> {
        let mut jobs = self.jobs.lock();
        if has_pending_twin(&jobs, job.job_type, &job.ticker) {
            return Ok(None);
        }

        let job = Job::from_create(Uuid::new_v4(), job, Utc::now());
        jobs.push(job.clone());
        Ok(Some(job))
    }

    async fn dequeue(&self, excluded: &[JobType]) -> Result<Option<Job>, AppError> {
        let mut jobs = self.jobs.lock();

        let mut best: Option<usize> = None;
        for (idx, job) in jobs.iter().enumerate() {
            if job.status != JobStatus::Pending || excluded.contains(&job.job_type) {
                continue;
            }
            match best {
                Some(b) if !outranks(job, &jobs[b]) => {}
                _ => best = Some(idx),
            }
        }

        Ok(best.map(|idx| {
            let job = &mut jobs[idx];
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.completed_at = None;
            job.duration_ms = None;
            job.attempts += 1;
            job.clone()
        }))
    }

    async fn complete(&self, id: Uuid, error: Option<&str>, duration_ms: i64) -> Result<Job, AppError> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Running)
            .ok_or_else(|| AppError::NotFound(format!("No running job {}", id)))?;

        job.status = if error.is_some() { JobStatus::Failed } else { JobStatus::Completed };
        job.error = error.map(str::to_string);
        job.duration_ms = Some(duration_ms);
        job.completed_at = Some(Utc::now());
        Ok(job.clone())
    }

    async fn requeue(&self, id: Uuid, error: &str, duration_ms: i64) -> Result<Option<Job>, AppError> {
        let mut jobs = self.jobs.lock();
        let Some(idx) = jobs.iter().position(|j| j.id == id && j.status == JobStatus::Running) else {
            return Ok(None);
        };
        if has_pending_twin(&jobs, jobs[idx].job_type, &jobs[idx].ticker) {
            return Ok(None);
        }

        let job = &mut jobs[idx];
        job.status = JobStatus::Pending;
        job.error = Some(error.to_string());
        job.duration_ms = Some(duration_ms);
        job.completed_at = None;
        Ok(Some(job.clone()))
    }

    async fn cancel(&self, id: Uuid) -> Result<bool, AppError> {
        let mut jobs = self.jobs.lock();
        match jobs.iter_mut().find(|j| j.id == id && j.status == JobStatus::Pending) {
            Some(job) => {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn cancel_by_ticker(&self, ticker: &str) -> Result<u64, AppError> {
        let mut jobs = self.jobs.lock();
        let now = Utc::now();
        let mut cancelled = 0;
        for job in jobs
            .iter_mut()
            .filter(|j| j.ticker == ticker && j.status == JobStatus::Pending)
        {
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(now);
            cancelled += 1;
        }
        Ok(cancelled)
    }

    async fn set_priority(&self, id: Uuid, priority: i32) -> Result<bool, AppError> {
        let mut jobs = self.jobs.lock();
        match jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => {
                job.priority = priority;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_max_priority(&self) -> Result<i32, AppError> {
        Ok(self
            .jobs
            .lock()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| j.priority)
            .max()
            .unwrap_or(0))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>, AppError> {
        Ok(self.jobs.lock().iter().find(|j| j.id == id).cloned())
    }

    async fn list_pending(&self) -> Result<Vec<Job>, AppError> {
        let mut pending: Vec<Job> = self
            .jobs
            .lock()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for identical keys
        pending.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(pending)
    }

    async fn list_all(&self, limit: i64) -> Result<Vec<Job>, AppError> {
        let jobs = self.jobs.lock();
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(jobs.iter().rev().take(limit).cloned().collect())
    }

    async fn list_by_ticker(&self, ticker: &str) -> Result<Vec<Job>, AppError> {
        let jobs = self.jobs.lock();
        Ok(jobs.iter().rev().filter(|j| j.ticker == ticker).cloned().collect())
    }

    async fn count_pending(&self) -> Result<i64, AppError> {
        let count = self
            .jobs
            .lock()
            .iter()
            .filter(|j| j.status == JobStatus::Pending)
            .count();
        Ok(count as i64)
    }

    async fn has_pending_job(&self, job_type: JobType, ticker: &str) -> Result<bool, AppError> {
        Ok(has_pending_twin(&self.jobs.lock(), job_type, ticker))
    }

    async fn purge_completed(&self, older_than: DateTime<Utc>) -> Result<u64, AppError> {
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|j| {
            !(j.status.is_terminal() && j.completed_at.map_or(false, |at| at < older_than))
        });
        Ok((before - jobs.len()) as u64)
    }

    async fn reset_running_jobs(&self) -> Result<u64, AppError> {
        let mut jobs = self.jobs.lock();
        let now = Utc::now();

        // Best running job per (job_type, ticker), unless a pending twin exists
        let mut keep: HashMap<(JobType, String), usize> = HashMap::new();
        for (idx, job) in jobs.iter().enumerate() {
            if job.status != JobStatus::Running || has_pending_twin(&jobs, job.job_type, &job.ticker) {
                continue;
            }
            let key = (job.job_type, job.ticker.clone());
            match keep.get(&key) {
                Some(&k) if !outranks(job, &jobs[k]) => {}
                _ => {
                    keep.insert(key, idx);
                }
            }
        }

        let mut reset = 0;
        for (idx, job) in jobs.iter_mut().enumerate() {
            if job.status != JobStatus::Running {
                continue;
            }
            if keep.get(&(job.job_type, job.ticker.clone())) == Some(&idx) {
                job.status = JobStatus::Pending;
                job.started_at = None;
                reset += 1;
            } else {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(now);
                job.error = Some("superseded by a pending job after restart".to_string());
            }
        }
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(job_type: JobType, ticker: &str, priority: i32) -> CreateJob {
        CreateJob {
            job_type,
            ticker: ticker.to_string(),
            priority,
            max_attempts: 3,
            force: false,
        }
    }

    #[tokio::test]
    async fn test_enqueue_dedups_pending_pair() {
        let queue = MemoryJobQueue::new();

        let first = queue.enqueue(create(JobType::CollectNews, "BHP.AU", 25)).await.unwrap();
        let second = queue.enqueue(create(JobType::CollectNews, "BHP.AU", 90)).await.unwrap();
        let other = queue.enqueue(create(JobType::CollectNews, "CBA.AU", 25)).await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert!(other.is_some());
        assert_eq!(queue.count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dequeue_orders_by_priority_then_age() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(create(JobType::CollectNews, "A", 25)).await.unwrap();
        queue.enqueue(create(JobType::CollectEod, "B", 50)).await.unwrap();
        queue.enqueue(create(JobType::CollectFilings, "C", 50)).await.unwrap();

        let order: Vec<String> = {
            let mut out = Vec::new();
            while let Some(job) = queue.dequeue(&[]).await.unwrap() {
                out.push(job.ticker);
            }
            out
        };
        assert_eq!(order, vec!["B", "C", "A"]);
    }

    #[tokio::test]
    async fn test_dequeue_marks_running_and_counts_attempt() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(create(JobType::CollectEod, "BHP.AU", 50)).await.unwrap();

        let job = queue.dequeue(&[]).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.attempts, 1);
        assert!(job.started_at.is_some());
        assert!(queue.dequeue(&[]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dequeue_skips_excluded_types() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(create(JobType::SummarizeFilings, "A", 99)).await.unwrap();
        queue.enqueue(create(JobType::CollectNews, "B", 1)).await.unwrap();

        let job = queue.dequeue(&[JobType::SummarizeFilings]).await.unwrap().unwrap();
        assert_eq!(job.job_type, JobType::CollectNews);
        assert!(queue.dequeue(&[JobType::SummarizeFilings]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_requeue_yields_to_newer_pending_twin() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(create(JobType::CollectNews, "A", 25)).await.unwrap();
        let running = queue.dequeue(&[]).await.unwrap().unwrap();

        queue.enqueue(create(JobType::CollectNews, "A", 25)).await.unwrap();
        assert!(queue.requeue(running.id, "timeout", 10).await.unwrap().is_none());

        let failed = queue.complete(running.id, Some("timeout"), 10).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_requeued_job_has_no_completion_time() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(create(JobType::CollectNews, "A", 25)).await.unwrap();
        let first = queue.dequeue(&[]).await.unwrap().unwrap();

        let requeued = queue.requeue(first.id, "timeout", 10).await.unwrap().unwrap();
        assert_eq!(requeued.status, JobStatus::Pending);
        assert!(requeued.completed_at.is_none());
        assert_eq!(requeued.duration_ms, Some(10));

        let retry = queue.dequeue(&[]).await.unwrap().unwrap();
        assert_eq!(retry.attempts, 2);
        assert!(retry.completed_at.is_none());
        assert!(retry.duration_ms.is_none());
    }

    #[tokio::test]
    async fn test_complete_requires_running_job() {
        let queue = MemoryJobQueue::new();
        let job = queue.enqueue(create(JobType::CollectNews, "A", 25)).await.unwrap().unwrap();

        let err = queue.complete(job.id, None, 5).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reset_running_cancels_duplicates() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(create(JobType::CollectNews, "A", 25)).await.unwrap();
        queue.enqueue(create(JobType::CollectEod, "B", 50)).await.unwrap();
        let eod = queue.dequeue(&[]).await.unwrap().unwrap();
        let news = queue.dequeue(&[]).await.unwrap().unwrap();
        assert_eq!(eod.job_type, JobType::CollectEod);
        assert_eq!(news.job_type, JobType::CollectNews);

        // A fresh pending twin for the news job appears while it is running
        queue.enqueue(create(JobType::CollectNews, "A", 25)).await.unwrap();

        assert_eq!(queue.reset_running_jobs().await.unwrap(), 1);
        assert_eq!(queue.get(news.id).await.unwrap().unwrap().status, JobStatus::Cancelled);
        let eod = queue.get(eod.id).await.unwrap().unwrap();
        assert_eq!(eod.status, JobStatus::Pending);
        assert!(eod.started_at.is_none());
        assert_eq!(eod.attempts, 1);
        assert_eq!(queue.count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_purge_only_removes_old_finished_jobs() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(create(JobType::CollectNews, "A", 25)).await.unwrap();
        queue.enqueue(create(JobType::CollectNews, "B", 25)).await.unwrap();
        let done = queue.dequeue(&[]).await.unwrap().unwrap();
        queue.complete(done.id, None, 1).await.unwrap();

        let purged = queue
            .purge_completed(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(queue.get(done.id).await.unwrap().is_none());
        assert_eq!(queue.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_max_priority_ignores_finished_jobs() {
        let queue = MemoryJobQueue::new();
        assert_eq!(queue.get_max_priority().await.unwrap(), 0);

        queue.enqueue(create(JobType::CollectEod, "A", 80)).await.unwrap();
        queue.enqueue(create(JobType::CollectNews, "B", 25)).await.unwrap();
        let top = queue.dequeue(&[]).await.unwrap().unwrap();
        queue.complete(top.id, None, 1).await.unwrap();

        assert_eq!(queue.get_max_priority().await.unwrap(), 25);
    }
}
