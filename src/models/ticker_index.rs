use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::job::JobType;

/// One independently refreshed category of data for a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Eod,
    Fundamentals,
    Filings,
    FilingDocuments,
    FilingSummaries,
    News,
    NewsIntelligence,
    Timeline,
    Signals,
}

/// How long a collected component stays fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Fresh until the next trading session closes.
    NextSession,
    MaxAge(Duration),
}

impl Component {
    pub const ALL: [Component; 9] = [
        Component::Eod,
        Component::Fundamentals,
        Component::Filings,
        Component::FilingDocuments,
        Component::FilingSummaries,
        Component::News,
        Component::NewsIntelligence,
        Component::Timeline,
        Component::Signals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Eod => "eod",
            Component::Fundamentals => "fundamentals",
            Component::Filings => "filings",
            Component::FilingDocuments => "filing_documents",
            Component::FilingSummaries => "filing_summaries",
            Component::News => "news",
            Component::NewsIntelligence => "news_intelligence",
            Component::Timeline => "timeline",
            Component::Signals => "signals",
        }
    }

    /// Column in `ticker_index` holding this component's last collection time.
    pub fn column(&self) -> &'static str {
        match self {
            Component::Eod => "eod_collected_at",
            Component::Fundamentals => "fundamentals_collected_at",
            Component::Filings => "filings_collected_at",
            Component::FilingDocuments => "filing_documents_collected_at",
            Component::FilingSummaries => "filing_summaries_collected_at",
            Component::News => "news_collected_at",
            Component::NewsIntelligence => "news_intelligence_collected_at",
            Component::Timeline => "timeline_collected_at",
            Component::Signals => "signals_collected_at",
        }
    }

    pub fn freshness(&self) -> Freshness {
        match self {
            Component::Eod => Freshness::NextSession,
            Component::Fundamentals => Freshness::MaxAge(Duration::hours(24)),
            Component::Filings => Freshness::MaxAge(Duration::hours(6)),
            Component::FilingDocuments => Freshness::MaxAge(Duration::hours(24)),
            Component::FilingSummaries => Freshness::MaxAge(Duration::hours(24)),
            Component::News => Freshness::MaxAge(Duration::hours(4)),
            Component::NewsIntelligence => Freshness::MaxAge(Duration::hours(12)),
            Component::Timeline => Freshness::MaxAge(Duration::hours(24)),
            Component::Signals => Freshness::MaxAge(Duration::hours(12)),
        }
    }

    /// Component that must have been collected at least once before this one
    /// is worth scheduling.
    pub fn prerequisite(&self) -> Option<Component> {
        match self {
            Component::FilingDocuments => Some(Component::Filings),
            Component::FilingSummaries => Some(Component::FilingDocuments),
            Component::NewsIntelligence => Some(Component::News),
            Component::Timeline => Some(Component::FilingSummaries),
            Component::Signals => Some(Component::Eod),
            _ => None,
        }
    }

    /// The per-ticker job that refreshes this component.
    pub fn job_type(&self) -> JobType {
        match self {
            Component::Eod => JobType::CollectEod,
            Component::Fundamentals => JobType::CollectFundamentals,
            Component::Filings => JobType::CollectFilings,
            Component::FilingDocuments => JobType::DownloadFilingDocuments,
            Component::FilingSummaries => JobType::SummarizeFilings,
            Component::News => JobType::CollectNews,
            Component::NewsIntelligence => JobType::SynthesizeNewsIntelligence,
            Component::Timeline => JobType::SynthesizeTimeline,
            Component::Signals => JobType::ComputeSignals,
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Tracking record for one ticker: identity plus the last successful
// collection time of every component (None = never collected).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TickerIndexEntry {
    pub ticker: String,
    pub exchange: String,
    pub added_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub eod_collected_at: Option<DateTime<Utc>>,
    pub fundamentals_collected_at: Option<DateTime<Utc>>,
    pub filings_collected_at: Option<DateTime<Utc>>,
    pub filing_documents_collected_at: Option<DateTime<Utc>>,
    pub filing_summaries_collected_at: Option<DateTime<Utc>>,
    pub news_collected_at: Option<DateTime<Utc>>,
    pub news_intelligence_collected_at: Option<DateTime<Utc>>,
    pub timeline_collected_at: Option<DateTime<Utc>>,
    pub signals_collected_at: Option<DateTime<Utc>>,
}

impl TickerIndexEntry {
    pub fn new(ticker: impl Into<String>, exchange: impl Into<String>, added_at: DateTime<Utc>) -> Self {
        Self {
            ticker: ticker.into(),
            exchange: exchange.into(),
            added_at,
            last_seen_at: added_at,
            eod_collected_at: None,
            fundamentals_collected_at: None,
            filings_collected_at: None,
            filing_documents_collected_at: None,
            filing_summaries_collected_at: None,
            news_collected_at: None,
            news_intelligence_collected_at: None,
            timeline_collected_at: None,
            signals_collected_at: None,
        }
    }

    pub fn collected_at(&self, component: Component) -> Option<DateTime<Utc>> {
        match component {
            Component::Eod => self.eod_collected_at,
            Component::Fundamentals => self.fundamentals_collected_at,
            Component::Filings => self.filings_collected_at,
            Component::FilingDocuments => self.filing_documents_collected_at,
            Component::FilingSummaries => self.filing_summaries_collected_at,
            Component::News => self.news_collected_at,
            Component::NewsIntelligence => self.news_intelligence_collected_at,
            Component::Timeline => self.timeline_collected_at,
            Component::Signals => self.signals_collected_at,
        }
    }

    pub fn set_collected_at(&mut self, component: Component, at: DateTime<Utc>) {
        let slot = match component {
            Component::Eod => &mut self.eod_collected_at,
            Component::Fundamentals => &mut self.fundamentals_collected_at,
            Component::Filings => &mut self.filings_collected_at,
            Component::FilingDocuments => &mut self.filing_documents_collected_at,
            Component::FilingSummaries => &mut self.filing_summaries_collected_at,
            Component::News => &mut self.news_collected_at,
            Component::NewsIntelligence => &mut self.news_intelligence_collected_at,
            Component::Timeline => &mut self.timeline_collected_at,
            Component::Signals => &mut self.signals_collected_at,
        };
        *slot = Some(at);
    }

    /// Builder-style variant of [`set_collected_at`](Self::set_collected_at).
    pub fn with_collected(mut self, component: Component, at: DateTime<Utc>) -> Self {
        self.set_collected_at(component, at);
        self
    }
}
