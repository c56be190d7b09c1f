//! Job routing
//!
//! Maps every `JobType` to the collector method that performs it. The match is
//! exhaustive, so adding a job type without deciding how it runs does not
//! compile.

use crate::external::collector::{Collector, CollectorError};
use crate::models::{Job, JobType};

/// Run one job against the collector. For `bulk_eod` the job's `ticker`
/// holds the exchange code.
pub async fn run_collector(collector: &dyn Collector, job: &Job) -> Result<(), CollectorError> {
    let key = job.ticker.as_str();
    let force = job.force;

    match job.job_type {
        JobType::CollectEod => collector.collect_eod(key, force).await,
        JobType::BulkEod => collector.collect_bulk_eod(key, force).await,
        JobType::CollectFundamentals => collector.collect_fundamentals(key, force).await,
        JobType::CollectFilings => collector.collect_filings(key, force).await,
        JobType::DownloadFilingDocuments => collector.download_filing_documents(key, force).await,
        JobType::SummarizeFilings => collector.summarize_filings(key, force).await,
        JobType::CollectNews => collector.collect_news(key, force).await,
        JobType::SynthesizeNewsIntelligence => collector.synthesize_news_intelligence(key, force).await,
        JobType::SynthesizeTimeline => collector.synthesize_timeline(key, force).await,
        JobType::ComputeSignals => collector.compute_signals(key, force).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateJob;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingCollector {
        calls: Mutex<Vec<(&'static str, String, bool)>>,
    }

    impl RecordingCollector {
        fn record(&self, method: &'static str, key: &str, force: bool) -> Result<(), CollectorError> {
            self.calls.lock().push((method, key.to_string(), force));
            Ok(())
        }
    }

    #[async_trait]
    impl Collector for RecordingCollector {
        async fn collect_eod(&self, key: &str, force: bool) -> Result<(), CollectorError> {
            self.record("collect_eod", key, force)
        }
        async fn collect_bulk_eod(&self, key: &str, force: bool) -> Result<(), CollectorError> {
            self.record("bulk_eod", key, force)
        }
        async fn collect_fundamentals(&self, key: &str, force: bool) -> Result<(), CollectorError> {
            self.record("collect_fundamentals", key, force)
        }
        async fn collect_filings(&self, key: &str, force: bool) -> Result<(), CollectorError> {
            self.record("collect_filings", key, force)
        }
        async fn download_filing_documents(&self, key: &str, force: bool) -> Result<(), CollectorError> {
            self.record("download_filing_documents", key, force)
        }
        async fn summarize_filings(&self, key: &str, force: bool) -> Result<(), CollectorError> {
            self.record("summarize_filings", key, force)
        }
        async fn collect_news(&self, key: &str, force: bool) -> Result<(), CollectorError> {
            self.record("collect_news", key, force)
        }
        async fn synthesize_news_intelligence(&self, key: &str, force: bool) -> Result<(), CollectorError> {
            self.record("synthesize_news_intelligence", key, force)
        }
        async fn synthesize_timeline(&self, key: &str, force: bool) -> Result<(), CollectorError> {
            self.record("synthesize_timeline", key, force)
        }
        async fn compute_signals(&self, key: &str, force: bool) -> Result<(), CollectorError> {
            self.record("compute_signals", key, force)
        }
    }

    #[tokio::test]
    async fn test_every_job_type_reaches_its_own_method() {
        let collector = RecordingCollector::default();

        for job_type in JobType::ALL {
            let job = Job::from_create(
                Uuid::new_v4(),
                CreateJob {
                    job_type,
                    ticker: "BHP.AU".to_string(),
                    priority: job_type.default_priority(),
                    max_attempts: 3,
                    force: job_type.is_heavy(),
                },
                Utc::now(),
            );
            run_collector(&collector, &job).await.unwrap();
        }

        let calls = collector.calls.lock();
        assert_eq!(calls.len(), JobType::ALL.len());
        for (job_type, (method, key, force)) in JobType::ALL.iter().zip(calls.iter()) {
            assert_eq!(*method, job_type.as_str());
            assert_eq!(key, "BHP.AU");
            assert_eq!(*force, job_type.is_heavy());
        }
    }
}
