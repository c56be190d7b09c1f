use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{Component, TickerIndexEntry};

const ENTRY_COLUMNS: &str = "ticker, exchange, added_at, last_seen_at, \
                             eod_collected_at, fundamentals_collected_at, filings_collected_at, \
                             filing_documents_collected_at, filing_summaries_collected_at, \
                             news_collected_at, news_intelligence_collected_at, \
                             timeline_collected_at, signals_collected_at";

/// Insert a ticker or refresh its exchange and last-seen time. Collection
/// timestamps and `added_at` of an existing row are left alone.
pub async fn upsert(pool: &PgPool, entry: &TickerIndexEntry) -> Result<TickerIndexEntry, sqlx::Error> {
    sqlx::query_as::<_, TickerIndexEntry>(&format!(
        r#"
        INSERT INTO ticker_index (
            ticker, exchange, added_at, last_seen_at,
            eod_collected_at, fundamentals_collected_at, filings_collected_at,
            filing_documents_collected_at, filing_summaries_collected_at,
            news_collected_at, news_intelligence_collected_at,
            timeline_collected_at, signals_collected_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (ticker) DO UPDATE
        SET exchange = EXCLUDED.exchange,
            last_seen_at = EXCLUDED.last_seen_at
        RETURNING {ENTRY_COLUMNS}
        "#
    ))
    .bind(&entry.ticker)
    .bind(&entry.exchange)
    .bind(entry.added_at)
    .bind(entry.last_seen_at)
    .bind(entry.eod_collected_at)
    .bind(entry.fundamentals_collected_at)
    .bind(entry.filings_collected_at)
    .bind(entry.filing_documents_collected_at)
    .bind(entry.filing_summaries_collected_at)
    .bind(entry.news_collected_at)
    .bind(entry.news_intelligence_collected_at)
    .bind(entry.timeline_collected_at)
    .bind(entry.signals_collected_at)
    .fetch_one(pool)
    .await
}

pub async fn fetch_one(pool: &PgPool, ticker: &str) -> Result<Option<TickerIndexEntry>, sqlx::Error> {
    sqlx::query_as::<_, TickerIndexEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM ticker_index WHERE ticker = $1"
    ))
    .bind(ticker)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_all(pool: &PgPool) -> Result<Vec<TickerIndexEntry>, sqlx::Error> {
    sqlx::query_as::<_, TickerIndexEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM ticker_index ORDER BY ticker"
    ))
    .fetch_all(pool)
    .await
}

/// Set one component's collected-at timestamp. The column name comes from the
/// closed `Component` table, never from caller input.
pub async fn update_timestamp(
    pool: &PgPool,
    ticker: &str,
    component: Component,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(&format!(
        "UPDATE ticker_index SET {} = $2 WHERE ticker = $1",
        component.column()
    ))
    .bind(ticker)
    .bind(at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &PgPool, ticker: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM ticker_index WHERE ticker = $1")
        .bind(ticker)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
