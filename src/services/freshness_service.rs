use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use std::collections::BTreeSet;

use crate::models::{Component, Freshness, JobType, TickerIndexEntry, NEW_TICKER_PRIORITY};

/// A ticker added this recently is treated as new and onboarded ahead of
/// routine refreshes.
pub const NEW_TICKER_WINDOW: std::time::Duration = std::time::Duration::from_secs(10 * 60);

/// Trading sessions close at 22:00 UTC, Monday to Friday.
const SESSION_CLOSE_HOUR_UTC: u32 = 22;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessReport {
    pub stale: Vec<Component>,
    pub is_new: bool,
}

/// One job the watcher should ask for. `key` is a ticker, or an exchange
/// code for bulk jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedJob {
    pub job_type: JobType,
    pub key: String,
    pub priority: i32,
}

fn is_trading_day(weekday: Weekday) -> bool {
    !matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Most recent weekday session close at or before `now`.
pub fn latest_session_close(now: DateTime<Utc>) -> DateTime<Utc> {
    let mut day = now.date_naive();
    for _ in 0..7 {
        if is_trading_day(day.weekday()) {
            if let Some(close) = day.and_hms_opt(SESSION_CLOSE_HOUR_UTC, 0, 0) {
                let close = Utc.from_utc_datetime(&close);
                if close <= now {
                    return close;
                }
            }
        }
        day = day - Duration::days(1);
    }
    // Seven consecutive days always contain a weekday close
    now
}

pub fn is_stale(component: Component, collected_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    let Some(collected_at) = collected_at else {
        return true;
    };

    match component.freshness() {
        Freshness::NextSession => collected_at < latest_session_close(now),
        Freshness::MaxAge(ttl) => now - collected_at >= ttl,
    }
}

pub fn is_new_ticker(entry: &TickerIndexEntry, now: DateTime<Utc>) -> bool {
    let window = Duration::seconds(NEW_TICKER_WINDOW.as_secs() as i64);
    now - entry.added_at < window
}

/// Stale components of one ticker. A derived component whose prerequisite has
/// never been collected is left out, however old it is.
pub fn evaluate(entry: &TickerIndexEntry, now: DateTime<Utc>) -> FreshnessReport {
    let stale = Component::ALL
        .into_iter()
        .filter(|component| {
            component
                .prerequisite()
                .map_or(true, |pre| entry.collected_at(pre).is_some())
        })
        .filter(|component| is_stale(*component, entry.collected_at(*component), now))
        .collect();

    FreshnessReport {
        stale,
        is_new: is_new_ticker(entry, now),
    }
}

/// Turn a set of index entries into the jobs one watcher pass should enqueue.
///
/// Stale EOD data for a ticker that already has history and a known exchange
/// is folded into a single `bulk_eod` job per exchange. Tickers that never had
/// EOD collected get their own `collect_eod` so their history is backfilled.
pub fn plan_jobs(entries: &[TickerIndexEntry], now: DateTime<Utc>) -> Vec<PlannedJob> {
    let mut planned = Vec::new();
    let mut bulk_exchanges = BTreeSet::new();

    for entry in entries {
        let report = evaluate(entry, now);

        for component in report.stale {
            let exchange = entry.exchange.trim();
            if component == Component::Eod
                && entry.eod_collected_at.is_some()
                && !exchange.is_empty()
            {
                bulk_exchanges.insert(exchange.to_string());
                continue;
            }

            let job_type = component.job_type();
            planned.push(PlannedJob {
                job_type,
                key: entry.ticker.clone(),
                priority: if report.is_new {
                    NEW_TICKER_PRIORITY
                } else {
                    job_type.default_priority()
                },
            });
        }
    }

    planned.extend(bulk_exchanges.into_iter().map(|exchange| PlannedJob {
        job_type: JobType::BulkEod,
        key: exchange,
        priority: JobType::BulkEod.default_priority(),
    }));

    planned
}

#[cfg(test)]
mod tests {
    use super::*;

    // Wednesday
    fn wednesday(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 12, hour, 0, 0).unwrap()
    }

    fn established(ticker: &str, exchange: &str, now: DateTime<Utc>) -> TickerIndexEntry {
        TickerIndexEntry::new(ticker, exchange, now - Duration::days(30))
    }

    fn fully_fresh(ticker: &str, exchange: &str, now: DateTime<Utc>) -> TickerIndexEntry {
        Component::ALL
            .into_iter()
            .fold(established(ticker, exchange, now), |entry, c| entry.with_collected(c, now))
    }

    #[test]
    fn test_latest_session_close_same_day_and_weekend() {
        assert_eq!(latest_session_close(wednesday(23)), wednesday(22));
        assert_eq!(latest_session_close(wednesday(21)), wednesday(22) - Duration::days(1));

        let sunday = Utc.with_ymd_and_hms(2024, 6, 16, 12, 0, 0).unwrap();
        let friday_close = Utc.with_ymd_and_hms(2024, 6, 14, 22, 0, 0).unwrap();
        assert_eq!(latest_session_close(sunday), friday_close);

        let monday_morning = Utc.with_ymd_and_hms(2024, 6, 17, 9, 0, 0).unwrap();
        assert_eq!(latest_session_close(monday_morning), friday_close);
    }

    #[test]
    fn test_eod_stale_only_after_a_new_close() {
        let collected = wednesday(22) + Duration::minutes(30);
        assert!(!is_stale(Component::Eod, Some(collected), wednesday(23)));
        assert!(!is_stale(Component::Eod, Some(collected), wednesday(23) + Duration::hours(20)));
        assert!(is_stale(Component::Eod, Some(collected), wednesday(22) + Duration::days(1)));
    }

    #[test]
    fn test_max_age_boundary() {
        let now = wednesday(12);
        assert!(!is_stale(Component::News, Some(now - Duration::minutes(239)), now));
        assert!(is_stale(Component::News, Some(now - Duration::hours(4)), now));
        assert!(is_stale(Component::News, None, now));
    }

    #[test]
    fn test_fresh_ticker_needs_nothing() {
        let now = wednesday(23);
        let report = evaluate(&fully_fresh("BHP.AU", "AU", now), now);
        assert!(report.stale.is_empty());
        assert!(!report.is_new);
    }

    #[test]
    fn test_new_ticker_window() {
        let now = wednesday(12);
        let fresh = TickerIndexEntry::new("BHP.AU", "AU", now - Duration::minutes(9));
        let older = TickerIndexEntry::new("BHP.AU", "AU", now - Duration::minutes(10));
        assert!(is_new_ticker(&fresh, now));
        assert!(!is_new_ticker(&older, now));
    }

    #[test]
    fn test_dependency_suppression_for_never_collected_ticker() {
        let now = wednesday(12);
        let entry = TickerIndexEntry::new("BHP.AU", "AU", now - Duration::hours(1));

        let report = evaluate(&entry, now);
        assert_eq!(
            report.stale,
            vec![Component::Eod, Component::Fundamentals, Component::Filings, Component::News]
        );
    }

    #[test]
    fn test_derived_component_unlocked_once_prerequisite_collected() {
        let now = wednesday(23);
        let entry = TickerIndexEntry::new("BHP.AU", "AU", now - Duration::hours(1))
            .with_collected(Component::Eod, now);

        let report = evaluate(&entry, now);
        assert!(report.stale.contains(&Component::Signals));
        assert!(!report.stale.contains(&Component::Eod));
    }

    #[test]
    fn test_three_stale_tickers_on_one_exchange_share_a_bulk_job() {
        let now = wednesday(23);
        let yesterday = now - Duration::days(1);
        let entries: Vec<TickerIndexEntry> = ["BHP.AU", "CBA.AU", "WOW.AU"]
            .into_iter()
            .map(|t| fully_fresh(t, "AU", now).with_collected(Component::Eod, yesterday))
            .collect();

        let planned = plan_jobs(&entries, now);
        assert_eq!(
            planned,
            vec![PlannedJob {
                job_type: JobType::BulkEod,
                key: "AU".to_string(),
                priority: JobType::BulkEod.default_priority(),
            }]
        );
    }

    #[test]
    fn test_bulk_grouping_is_per_exchange() {
        let now = wednesday(23);
        let yesterday = now - Duration::days(1);
        let entries = vec![
            fully_fresh("BHP.AU", "AU", now).with_collected(Component::Eod, yesterday),
            fully_fresh("AAPL.US", "US", now).with_collected(Component::Eod, yesterday),
            fully_fresh("MSFT.US", "US", now).with_collected(Component::Eod, yesterday),
        ];

        let keys: Vec<(JobType, String)> = plan_jobs(&entries, now)
            .into_iter()
            .map(|p| (p.job_type, p.key))
            .collect();
        assert_eq!(
            keys,
            vec![(JobType::BulkEod, "AU".to_string()), (JobType::BulkEod, "US".to_string())]
        );
    }

    #[test]
    fn test_never_collected_eod_gets_per_ticker_job() {
        let now = wednesday(23);
        let mut entry = fully_fresh("BHP.AU", "AU", now);
        entry.eod_collected_at = None;

        let planned = plan_jobs(&[entry], now);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].job_type, JobType::CollectEod);
        assert_eq!(planned[0].key, "BHP.AU");
    }

    #[test]
    fn test_ticker_without_exchange_is_not_bulked() {
        let now = wednesday(23);
        let entry = fully_fresh("ODD", "", now).with_collected(Component::Eod, now - Duration::days(1));

        let planned = plan_jobs(&[entry], now);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].job_type, JobType::CollectEod);
    }

    #[test]
    fn test_new_ticker_jobs_are_elevated() {
        let now = wednesday(12);
        let entry = TickerIndexEntry::new("BHP.AU", "AU", now - Duration::minutes(2));

        let planned = plan_jobs(&[entry], now);
        assert!(!planned.is_empty());
        for job in planned {
            assert_eq!(job.priority, NEW_TICKER_PRIORITY);
            assert!(job.priority > job.job_type.default_priority());
        }
    }
}
