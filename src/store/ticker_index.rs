use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use std::sync::Arc;

use crate::db::ticker_index_queries;
use crate::errors::AppError;
use crate::models::{Component, TickerIndexEntry};

/// One record per tracked ticker with the last successful collection time of
/// each component.
#[async_trait]
pub trait TickerIndex: Send + Sync {
    /// Track a new ticker, or refresh the exchange and last-seen time of a
    /// known one without touching its collection timestamps.
    async fn upsert(&self, entry: TickerIndexEntry) -> Result<TickerIndexEntry, AppError>;

    async fn get(&self, ticker: &str) -> Result<Option<TickerIndexEntry>, AppError>;

    async fn list(&self) -> Result<Vec<TickerIndexEntry>, AppError>;

    async fn update_timestamp(
        &self,
        ticker: &str,
        component: Component,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn delete(&self, ticker: &str) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct PgTickerIndex {
    pool: PgPool,
}

impl PgTickerIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TickerIndex for PgTickerIndex {
    async fn upsert(&self, entry: TickerIndexEntry) -> Result<TickerIndexEntry, AppError> {
        Ok(ticker_index_queries::upsert(&self.pool, &entry).await?)
    }

    async fn get(&self, ticker: &str) -> Result<Option<TickerIndexEntry>, AppError> {
        Ok(ticker_index_queries::fetch_one(&self.pool, ticker).await?)
    }

    async fn list(&self) -> Result<Vec<TickerIndexEntry>, AppError> {
        Ok(ticker_index_queries::fetch_all(&self.pool).await?)
    }

    async fn update_timestamp(
        &self,
        ticker: &str,
        component: Component,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if ticker_index_queries::update_timestamp(&self.pool, ticker, component, at).await? {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Ticker {} is not indexed", ticker)))
        }
    }

    async fn delete(&self, ticker: &str) -> Result<bool, AppError> {
        Ok(ticker_index_queries::delete(&self.pool, ticker).await?)
    }
}

/// Thread-safe in-process ticker index.
#[derive(Clone, Default)]
pub struct MemoryTickerIndex {
    entries: Arc<DashMap<String, TickerIndexEntry>>,
}

impl MemoryTickerIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TickerIndex for MemoryTickerIndex {
    async fn upsert(&self, entry: TickerIndexEntry) -> Result<TickerIndexEntry, AppError> {
        let stored = self
            .entries
            .entry(entry.ticker.clone())
            .and_modify(|existing| {
                existing.exchange = entry.exchange.clone();
                existing.last_seen_at = entry.last_seen_at;
            })
            .or_insert_with(|| entry.clone());
        Ok(stored.value().clone())
    }

    async fn get(&self, ticker: &str) -> Result<Option<TickerIndexEntry>, AppError> {
        Ok(self.entries.get(ticker).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> Result<Vec<TickerIndexEntry>, AppError> {
        let mut entries: Vec<TickerIndexEntry> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Ok(entries)
    }

    async fn update_timestamp(
        &self,
        ticker: &str,
        component: Component,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        match self.entries.get_mut(ticker) {
            Some(mut entry) => {
                entry.set_collected_at(component, at);
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Ticker {} is not indexed", ticker))),
        }
    }

    async fn delete(&self, ticker: &str) -> Result<bool, AppError> {
        Ok(self.entries.remove(ticker).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_upsert_keeps_collection_history() {
        let index = MemoryTickerIndex::new();
        let added = Utc::now() - Duration::days(3);
        let collected = Utc::now() - Duration::hours(1);

        index
            .upsert(TickerIndexEntry::new("BHP.AU", "AU", added).with_collected(Component::Eod, collected))
            .await
            .unwrap();

        let seen = Utc::now();
        let mut again = TickerIndexEntry::new("BHP.AU", "ASX", seen);
        again.last_seen_at = seen;
        let stored = index.upsert(again).await.unwrap();

        assert_eq!(stored.exchange, "ASX");
        assert_eq!(stored.added_at, added);
        assert_eq!(stored.last_seen_at, seen);
        assert_eq!(stored.collected_at(Component::Eod), Some(collected));
    }

    #[tokio::test]
    async fn test_update_timestamp_unknown_ticker() {
        let index = MemoryTickerIndex::new();
        let err = index
            .update_timestamp("NOPE", Component::News, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_ticker() {
        let index = MemoryTickerIndex::new();
        let now = Utc::now();
        for ticker in ["WOW.AU", "AAPL.US", "BHP.AU"] {
            index.upsert(TickerIndexEntry::new(ticker, "X", now)).await.unwrap();
        }

        let tickers: Vec<String> = index.list().await.unwrap().into_iter().map(|e| e.ticker).collect();
        assert_eq!(tickers, vec!["AAPL.US", "BHP.AU", "WOW.AU"]);
        assert!(index.delete("AAPL.US").await.unwrap());
        assert!(!index.delete("AAPL.US").await.unwrap());
    }
}
