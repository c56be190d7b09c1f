use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::external::collector::{Collector, CollectorError};
use crate::models::JobType;

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Collector backed by an HTTP collection service. Each job becomes
/// `POST {base_url}/collect/{job_type}` with a JSON body.
pub struct RemoteCollector {
    client: reqwest::Client,
    base_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct CollectRequest<'a> {
    ticker: &'a str,
    force: bool,
}

impl RemoteCollector {
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, CollectorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollectorError::Failed(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
        })
    }

    /// Reads `COLLECTOR_BASE_URL` and `COLLECTOR_TIMEOUT_SECS`. A missing base
    /// URL is not an error here; every job then fails as not configured.
    pub fn from_env() -> Result<Self, CollectorError> {
        let base_url = std::env::var("COLLECTOR_BASE_URL").ok();
        let timeout_secs = std::env::var("COLLECTOR_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self::new(base_url, Duration::from_secs(timeout_secs))
    }

    pub fn is_configured(&self) -> bool {
        self.base_url.is_some()
    }

    async fn post(&self, job_type: JobType, key: &str, force: bool) -> Result<(), CollectorError> {
        let base_url = self
            .base_url
            .as_deref()
            .ok_or_else(|| CollectorError::NotConfigured("COLLECTOR_BASE_URL not set".into()))?;

        let url = format!("{}/collect/{}", base_url, job_type);
        debug!("Posting {} for {} to {}", job_type, key, url);

        let resp = self
            .client
            .post(&url)
            .json(&CollectRequest { ticker: key, force })
            .send()
            .await
            .map_err(|e| CollectorError::Network(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CollectorError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CollectorError::BadResponse(format!("HTTP {}: {}", status, body)));
        }

        Ok(())
    }
}

#[async_trait]
impl Collector for RemoteCollector {
    async fn collect_eod(&self, key: &str, force: bool) -> Result<(), CollectorError> {
        self.post(JobType::CollectEod, key, force).await
    }

    async fn collect_bulk_eod(&self, key: &str, force: bool) -> Result<(), CollectorError> {
        self.post(JobType::BulkEod, key, force).await
    }

    async fn collect_fundamentals(&self, key: &str, force: bool) -> Result<(), CollectorError> {
        self.post(JobType::CollectFundamentals, key, force).await
    }

    async fn collect_filings(&self, key: &str, force: bool) -> Result<(), CollectorError> {
        self.post(JobType::CollectFilings, key, force).await
    }

    async fn download_filing_documents(&self, key: &str, force: bool) -> Result<(), CollectorError> {
        self.post(JobType::DownloadFilingDocuments, key, force).await
    }

    async fn summarize_filings(&self, key: &str, force: bool) -> Result<(), CollectorError> {
        self.post(JobType::SummarizeFilings, key, force).await
    }

    async fn collect_news(&self, key: &str, force: bool) -> Result<(), CollectorError> {
        self.post(JobType::CollectNews, key, force).await
    }

    async fn synthesize_news_intelligence(&self, key: &str, force: bool) -> Result<(), CollectorError> {
        self.post(JobType::SynthesizeNewsIntelligence, key, force).await
    }

    async fn synthesize_timeline(&self, key: &str, force: bool) -> Result<(), CollectorError> {
        self.post(JobType::SynthesizeTimeline, key, force).await
    }

    async fn compute_signals(&self, key: &str, force: bool) -> Result<(), CollectorError> {
        self.post(JobType::ComputeSignals, key, force).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_collector_fails_every_job() {
        let collector = RemoteCollector::new(None, Duration::from_secs(1)).unwrap();
        assert!(!collector.is_configured());

        let result = collector.collect_news("BHP.AU", false).await;
        assert!(matches!(result, Err(CollectorError::NotConfigured(_))));
    }

    #[test]
    fn test_blank_base_url_counts_as_unconfigured() {
        let collector = RemoteCollector::new(Some("   ".trim().to_string()), Duration::from_secs(1)).unwrap();
        assert!(!collector.is_configured());

        let collector =
            RemoteCollector::new(Some("http://collector:8080/".to_string()), Duration::from_secs(1)).unwrap();
        assert_eq!(collector.base_url.as_deref(), Some("http://collector:8080"));
    }
}
