use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("collector not configured: {0}")]
    NotConfigured(String),

    #[error("collection failed: {0}")]
    Failed(String),

    #[error("collector panicked: {0}")]
    Panicked(String),
}

/// Performs the actual data work for each job type. `key` is a ticker symbol,
/// or an exchange code for bulk jobs. `force` asks the collector to refetch
/// even when its own caches look current.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect_eod(&self, key: &str, force: bool) -> Result<(), CollectorError>;

    async fn collect_bulk_eod(&self, key: &str, force: bool) -> Result<(), CollectorError>;

    async fn collect_fundamentals(&self, key: &str, force: bool) -> Result<(), CollectorError>;

    async fn collect_filings(&self, key: &str, force: bool) -> Result<(), CollectorError>;

    async fn download_filing_documents(&self, key: &str, force: bool) -> Result<(), CollectorError>;

    async fn summarize_filings(&self, key: &str, force: bool) -> Result<(), CollectorError>;

    async fn collect_news(&self, key: &str, force: bool) -> Result<(), CollectorError>;

    async fn synthesize_news_intelligence(&self, key: &str, force: bool) -> Result<(), CollectorError>;

    async fn synthesize_timeline(&self, key: &str, force: bool) -> Result<(), CollectorError>;

    async fn compute_signals(&self, key: &str, force: bool) -> Result<(), CollectorError>;
}
