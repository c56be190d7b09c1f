use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::ticker_index::Component;

/// Priority given to every per-ticker job of a ticker that was added
/// within [`crate::services::freshness_service::NEW_TICKER_WINDOW`].
/// Sits above every default priority so onboarding is never starved.
pub const NEW_TICKER_PRIORITY: i32 = 100;

/// The closed set of collection jobs the scheduler knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    CollectEod,
    /// Latest bar for every ticker on one exchange; `ticker` holds the exchange code.
    BulkEod,
    CollectFundamentals,
    CollectFilings,
    DownloadFilingDocuments,
    SummarizeFilings,
    CollectNews,
    SynthesizeNewsIntelligence,
    SynthesizeTimeline,
    ComputeSignals,
}

/// Job types that hit rate-limited third parties (document downloads, LLM calls).
pub const HEAVY_JOB_TYPES: [JobType; 2] = [JobType::DownloadFilingDocuments, JobType::SummarizeFilings];

/// Expensive job types enqueued unconditionally by a deep refresh.
pub const SLOW_JOB_TYPES: [JobType; 6] = [
    JobType::DownloadFilingDocuments,
    JobType::SummarizeFilings,
    JobType::SynthesizeTimeline,
    JobType::CollectNews,
    JobType::SynthesizeNewsIntelligence,
    JobType::ComputeSignals,
];

impl JobType {
    pub const ALL: [JobType; 10] = [
        JobType::CollectEod,
        JobType::BulkEod,
        JobType::CollectFundamentals,
        JobType::CollectFilings,
        JobType::DownloadFilingDocuments,
        JobType::SummarizeFilings,
        JobType::CollectNews,
        JobType::SynthesizeNewsIntelligence,
        JobType::SynthesizeTimeline,
        JobType::ComputeSignals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::CollectEod => "collect_eod",
            JobType::BulkEod => "bulk_eod",
            JobType::CollectFundamentals => "collect_fundamentals",
            JobType::CollectFilings => "collect_filings",
            JobType::DownloadFilingDocuments => "download_filing_documents",
            JobType::SummarizeFilings => "summarize_filings",
            JobType::CollectNews => "collect_news",
            JobType::SynthesizeNewsIntelligence => "synthesize_news_intelligence",
            JobType::SynthesizeTimeline => "synthesize_timeline",
            JobType::ComputeSignals => "compute_signals",
        }
    }

    pub fn default_priority(&self) -> i32 {
        match self {
            JobType::CollectEod => 50,
            JobType::BulkEod => 45,
            JobType::ComputeSignals => 40,
            JobType::CollectFundamentals => 30,
            JobType::CollectFilings => 30,
            JobType::CollectNews => 25,
            JobType::DownloadFilingDocuments => 20,
            JobType::SummarizeFilings => 15,
            JobType::SynthesizeNewsIntelligence => 15,
            JobType::SynthesizeTimeline => 10,
        }
    }

    pub fn is_heavy(&self) -> bool {
        matches!(self, JobType::DownloadFilingDocuments | JobType::SummarizeFilings)
    }

    pub fn is_bulk(&self) -> bool {
        matches!(self, JobType::BulkEod)
    }

    /// The ticker-index component whose timestamp a successful run advances.
    /// Bulk jobs have no single ticker, so they map to nothing.
    pub fn component(&self) -> Option<Component> {
        match self {
            JobType::CollectEod => Some(Component::Eod),
            JobType::BulkEod => None,
            JobType::CollectFundamentals => Some(Component::Fundamentals),
            JobType::CollectFilings => Some(Component::Filings),
            JobType::DownloadFilingDocuments => Some(Component::FilingDocuments),
            JobType::SummarizeFilings => Some(Component::FilingSummaries),
            JobType::CollectNews => Some(Component::News),
            JobType::SynthesizeNewsIntelligence => Some(Component::NewsIntelligence),
            JobType::SynthesizeTimeline => Some(Component::Timeline),
            JobType::ComputeSignals => Some(Component::Signals),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .iter()
            .copied()
            .find(|job_type| job_type.as_str() == s)
            .ok_or_else(|| format!("Invalid job type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

// A unit of scheduled collection work as held by the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub ticker: String,
    pub priority: i32,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub force: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

impl Job {
    pub fn from_create(id: Uuid, create: CreateJob, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            job_type: create.job_type,
            ticker: create.ticker,
            priority: create.priority,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: create.max_attempts,
            force: create.force,
            created_at,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateJob {
    pub job_type: JobType,
    pub ticker: String,
    pub priority: i32,
    pub max_attempts: i32,
    #[serde(default)]
    pub force: bool,
}

/// Raw `jobs` row; job type and status are kept as text in the database and
/// validated on the way out.
#[derive(Debug, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub job_type: String,
    pub ticker: String,
    pub priority: i32,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub force: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = AppError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            job_type: row.job_type.parse::<JobType>()?,
            ticker: row.ticker,
            priority: row.priority,
            status: row.status.parse::<JobStatus>()?,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            force: row.force,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_ms: row.duration_ms,
            error: row.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_parse_rejects_unknown() {
        assert_eq!("collect_eod".parse::<JobType>(), Ok(JobType::CollectEod));
        assert!("collect_everything".parse::<JobType>().is_err());
    }

    #[test]
    fn test_job_type_serde_matches_as_str() {
        for job_type in JobType::ALL {
            let json = serde_json::to_string(&job_type).unwrap();
            assert_eq!(json, format!("\"{}\"", job_type.as_str()));
        }
    }

    #[test]
    fn test_new_ticker_priority_beats_every_default() {
        for job_type in JobType::ALL {
            assert!(NEW_TICKER_PRIORITY > job_type.default_priority(), "{}", job_type);
        }
    }

    #[test]
    fn test_only_bulk_eod_lacks_component() {
        for job_type in JobType::ALL {
            assert_eq!(job_type.component().is_none(), job_type.is_bulk(), "{}", job_type);
        }
    }

    #[test]
    fn test_heavy_classification() {
        let heavy: Vec<JobType> = JobType::ALL.into_iter().filter(|t| t.is_heavy()).collect();
        assert_eq!(heavy, HEAVY_JOB_TYPES.to_vec());
    }

    #[test]
    fn test_row_with_unknown_status_is_rejected() {
        let row = JobRow {
            id: Uuid::new_v4(),
            job_type: "collect_news".to_string(),
            ticker: "BHP.AU".to_string(),
            priority: 25,
            status: "paused".to_string(),
            attempts: 0,
            max_attempts: 3,
            force: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error: None,
        };
        assert!(matches!(Job::try_from(row), Err(AppError::Validation(_))));
    }
}
