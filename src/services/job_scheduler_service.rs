use crate::config::SchedulerConfig;
use crate::errors::AppError;
use crate::external::collector::Collector;
use crate::models::{Job, JobEvent, JobEventType, JobType, SLOW_JOB_TYPES};
use crate::services::concurrency_governor::ConcurrencyGovernor;
use crate::services::event_hub::EventHub;
use crate::services::freshness_service::plan_jobs;
use crate::services::job_enqueue_service;
use crate::services::ticker_watcher::{self, WatchPass};
use crate::services::job_dispatcher;
use crate::store::{JobQueue, TickerIndex};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use uuid::Uuid;

// Context shared by the watcher, the dispatcher and every job task
#[derive(Clone)]
pub struct JobContext {
    pub queue: Arc<dyn JobQueue>,
    pub index: Arc<dyn TickerIndex>,
    pub collector: Arc<dyn Collector>,
    pub events: Arc<dyn EventHub>,
    pub governor: Arc<ConcurrencyGovernor>,
    /// Signalled when a job is enqueued or finishes.
    pub wake: Arc<Notify>,
    pub config: Arc<SchedulerConfig>,
}

impl JobContext {
    /// Broadcast a lifecycle event with the current pending count.
    pub async fn publish(&self, event_type: JobEventType, job: Job) {
        let queue_size = match self.queue.count_pending().await {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to count pending jobs for event: {}", e);
                0
            }
        };
        self.events.broadcast(JobEvent::new(event_type, job, queue_size));
    }
}

struct RunningScheduler {
    cancel: CancellationToken,
    tracker: TaskTracker,
    loops: Vec<JoinHandle<()>>,
}

pub struct JobSchedulerService {
    context: JobContext,
    running: Mutex<Option<RunningScheduler>>,
}

impl JobSchedulerService {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        index: Arc<dyn TickerIndex>,
        collector: Arc<dyn Collector>,
        events: Arc<dyn EventHub>,
        config: SchedulerConfig,
    ) -> Result<Self, AppError> {
        config.validate().map_err(AppError::Config)?;

        let context = JobContext {
            queue,
            index,
            collector,
            events,
            governor: Arc::new(ConcurrencyGovernor::new(config.max_concurrent, config.heavy_job_limit)),
            wake: Arc::new(Notify::new()),
            config: Arc::new(config),
        };

        Ok(Self {
            context,
            running: Mutex::new(None),
        })
    }

    pub fn context(&self) -> &JobContext {
        &self.context
    }

    /// Recover jobs orphaned by a previous process, then launch the watcher
    /// and dispatch loops.
    pub async fn start(&self) -> Result<(), AppError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(AppError::Validation("Job scheduler is already running".to_string()));
        }

        info!("🚀 Starting job scheduler...");

        let reset = self.context.queue.reset_running_jobs().await?;
        if reset > 0 {
            warn!("♻️ Reset {} job(s) left running by a previous process", reset);
        }

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let watcher = tokio::spawn(ticker_watcher::run_watcher(self.context.clone(), cancel.clone()));
        let dispatcher = tokio::spawn(job_dispatcher::run_dispatcher(
            self.context.clone(),
            tracker.clone(),
            cancel.clone(),
        ));

        *running = Some(RunningScheduler {
            cancel,
            tracker,
            loops: vec![watcher, dispatcher],
        });

        info!("✅ Job scheduler started");
        Ok(())
    }

    /// Stop both loops and wait for in-flight jobs to finish. Stopping a
    /// scheduler that is not running is a no-op.
    ///
    /// The state lock is held until the last job task is done, so a
    /// concurrent `start()` cannot reset a job that is still executing.
    pub async fn stop(&self) -> Result<(), AppError> {
        let mut state = self.running.lock().await;
        let Some(running) = state.take() else {
            return Ok(());
        };

        info!("🛑 Stopping job scheduler...");
        running.cancel.cancel();

        for handle in running.loops {
            if let Err(e) = handle.await {
                error!("Scheduler loop ended abnormally: {}", e);
            }
        }

        running.tracker.close();
        let in_flight = running.tracker.len();
        if in_flight > 0 {
            info!("⏳ Waiting for {} in-flight job(s)", in_flight);
        }
        running.tracker.wait().await;
        drop(state);

        info!("✅ Job scheduler stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn enqueue_if_needed(
        &self,
        job_type: JobType,
        ticker: &str,
        priority: i32,
    ) -> Result<Option<Job>, AppError> {
        job_enqueue_service::enqueue_if_needed(&self.context, job_type, ticker, priority, false).await
    }

    /// One watcher pass limited to `tickers`. Returns the number of enqueue
    /// calls that succeeded, including ones that found a job already pending.
    pub async fn enqueue_ticker_jobs(&self, tickers: &[String]) -> Result<usize, AppError> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for ticker in tickers.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if !seen.insert(ticker) {
                continue;
            }
            if let Some(entry) = self.context.index.get(ticker).await? {
                entries.push(entry);
            }
        }

        let planned = plan_jobs(&entries, Utc::now());
        let (enqueued, created) = job_enqueue_service::enqueue_planned(&self.context, &planned).await;

        info!(
            "📥 On-demand enqueue for {} ticker(s): {} job(s) requested, {} new",
            entries.len(),
            enqueued,
            created
        );
        Ok(enqueued)
    }

    /// Deep refresh: enqueue every slow job type for `ticker` regardless of
    /// freshness, asking collectors to refetch.
    pub async fn enqueue_slow_data_jobs(&self, ticker: &str) -> Result<usize, AppError> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(AppError::Validation("Ticker must not be empty".to_string()));
        }

        let mut enqueued = 0;
        for job_type in SLOW_JOB_TYPES {
            match job_enqueue_service::enqueue_if_needed(
                &self.context,
                job_type,
                ticker,
                job_type.default_priority(),
                true,
            )
            .await
            {
                Ok(_) => enqueued += 1,
                Err(e) => warn!("Failed to enqueue {} for {}: {}", job_type, ticker, e),
            }
        }

        info!("🐢 Deep refresh for {}: {} slow job(s) requested", ticker, enqueued);
        Ok(enqueued)
    }

    pub async fn push_to_top(&self, id: Uuid) -> Result<Job, AppError> {
        job_enqueue_service::push_to_top(&self.context, id).await
    }

    /// Run a full watcher pass immediately, outside the regular interval.
    pub async fn run_watch_pass(&self) -> Result<WatchPass, AppError> {
        ticker_watcher::watch_pass(&self.context).await
    }

    pub async fn cancel_job(&self, id: Uuid) -> Result<bool, AppError> {
        self.context.queue.cancel(id).await
    }

    pub async fn cancel_ticker_jobs(&self, ticker: &str) -> Result<u64, AppError> {
        let cancelled = self.context.queue.cancel_by_ticker(ticker).await?;
        if cancelled > 0 {
            info!("🗑️ Cancelled {} pending job(s) for {}", cancelled, ticker);
        }
        Ok(cancelled)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Option<Job>, AppError> {
        self.context.queue.get(id).await
    }

    pub async fn pending_jobs(&self) -> Result<Vec<Job>, AppError> {
        self.context.queue.list_pending().await
    }

    pub async fn recent_jobs(&self, limit: i64) -> Result<Vec<Job>, AppError> {
        self.context.queue.list_all(limit).await
    }

    pub async fn jobs_for_ticker(&self, ticker: &str) -> Result<Vec<Job>, AppError> {
        self.context.queue.list_by_ticker(ticker).await
    }

    pub async fn queue_size(&self) -> Result<i64, AppError> {
        self.context.queue.count_pending().await
    }
}
