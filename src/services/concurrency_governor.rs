use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

use crate::models::{Job, JobType, HEAVY_JOB_TYPES};

/// Two nested capacity gates for job execution.
///
/// Every running job holds a global slot (`max_concurrent`). Heavy jobs
/// (document downloads, AI summarisation) additionally hold one of the
/// `heavy_job_limit` heavy slots. Slots are always taken global first, then
/// heavy, and heavy slots are only ever taken by the single dispatch loop, so
/// the two gates cannot deadlock.
pub struct ConcurrencyGovernor {
    global: Arc<Semaphore>,
    heavy: Arc<Semaphore>,
}

impl ConcurrencyGovernor {
    pub fn new(max_concurrent: usize, heavy_job_limit: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_concurrent.max(1))),
            heavy: Arc::new(Semaphore::new(heavy_job_limit.max(1))),
        }
    }

    /// Wait for a global slot, then grab a heavy slot if one is free.
    ///
    /// The heavy slot is never waited for: without it the caller simply
    /// restricts itself to light jobs, so light work keeps flowing while heavy
    /// jobs are saturated.
    pub async fn acquire(&self) -> Result<DispatchPermit, AcquireError> {
        let global = self.global.clone().acquire_owned().await?;
        let heavy = self.heavy.clone().try_acquire_owned().ok();

        Ok(DispatchPermit {
            heavy,
            _global: global,
        })
    }

    pub fn available_permits(&self) -> usize {
        self.global.available_permits()
    }

    pub fn available_heavy_permits(&self) -> usize {
        self.heavy.available_permits()
    }
}

/// Capacity held by one dispatched job. Both slots are released when this is
/// dropped, whether the job finished, failed or panicked.
pub struct DispatchPermit {
    // Field order releases the heavy slot before the global one
    heavy: Option<OwnedSemaphorePermit>,
    _global: OwnedSemaphorePermit,
}

impl DispatchPermit {
    /// Job types this permit cannot run.
    pub fn excluded_job_types(&self) -> &'static [JobType] {
        if self.heavy.is_some() {
            &[]
        } else {
            &HEAVY_JOB_TYPES
        }
    }

    pub fn holds_heavy(&self) -> bool {
        self.heavy.is_some()
    }

    /// Give back the heavy slot when the claimed job turns out to be light.
    pub fn fit_to(mut self, job: &Job) -> Self {
        if !job.job_type.is_heavy() {
            self.heavy = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateJob;
    use chrono::Utc;
    use tokio::time::{sleep, timeout, Duration};
    use uuid::Uuid;

    fn job(job_type: JobType) -> Job {
        Job::from_create(
            Uuid::new_v4(),
            CreateJob {
                job_type,
                ticker: "BHP.AU".to_string(),
                priority: 1,
                max_attempts: 3,
                force: false,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_second_permit_is_light_only_while_heavy_is_held() {
        let governor = ConcurrencyGovernor::new(3, 1);

        let first = governor.acquire().await.unwrap().fit_to(&job(JobType::SummarizeFilings));
        assert!(first.holds_heavy());

        let second = governor.acquire().await.unwrap();
        assert!(!second.holds_heavy());
        assert_eq!(second.excluded_job_types(), &HEAVY_JOB_TYPES);

        drop(first);
        let third = governor.acquire().await.unwrap();
        assert!(third.holds_heavy());
        assert!(third.excluded_job_types().is_empty());
    }

    #[tokio::test]
    async fn test_light_job_returns_heavy_slot() {
        let governor = ConcurrencyGovernor::new(2, 1);

        let permit = governor.acquire().await.unwrap().fit_to(&job(JobType::CollectNews));
        assert!(!permit.holds_heavy());
        assert_eq!(governor.available_heavy_permits(), 1);
        assert_eq!(governor.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_global_limit_blocks_until_release() {
        let governor = Arc::new(ConcurrencyGovernor::new(1, 1));
        let held = governor.acquire().await.unwrap();

        assert!(timeout(Duration::from_millis(50), governor.acquire()).await.is_err());

        let waiter = {
            let governor = governor.clone();
            tokio::spawn(async move { governor.acquire().await.map(|_| ()) })
        };
        sleep(Duration::from_millis(20)).await;
        drop(held);

        timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_zero_limits_still_admit_one_job() {
        let governor = ConcurrencyGovernor::new(0, 0);
        assert_eq!(governor.available_permits(), 1);
        assert_eq!(governor.available_heavy_permits(), 1);
    }
}
