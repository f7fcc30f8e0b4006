//! Pure decision core for one update run: the weekday gate and the
//! per-record triage into skip / duplicate / enqueue. No clock, no I/O —
//! everything it needs comes in as arguments.

use crate::config::ExchangeConfig;
use crate::models::{existing_key, HistoryEntry, RunStats, StockRecord};
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::HashSet;

/// Markets trade Monday through Friday. No holiday calendar.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Outcome of planning one run: rows to write, counters, and the
/// human-readable notes destined for the run log.
///
/// `stats.updated` stays zero here — the caller sets it once the batch is
/// actually written.
#[derive(Debug, Default)]
pub struct Plan {
    pub entries: Vec<HistoryEntry>,
    pub stats: RunStats,
    pub notes: Vec<String>,
}

/// Triage every watchlist record, in input order.
///
/// Duplicate detection tests membership against the pre-run snapshot only:
/// two colliding records inside the same input batch are BOTH enqueued, so
/// the quote formula is re-evaluated for each. Intentional — see
/// `same_run_collision_both_enqueued` below before changing it.
pub fn plan(
    records: &[StockRecord],
    existing_keys: &HashSet<String>,
    run_timestamp: &str,
    exchanges: &ExchangeConfig,
) -> Plan {
    let mut plan = Plan::default();

    for record in records {
        plan.stats.total += 1;

        // One bad row never aborts the batch.
        if let Err(reason) = triage(record, existing_keys, run_timestamp, exchanges, &mut plan) {
            plan.stats.errors += 1;
            plan.notes
                .push(format!("Error processing '{}': {}", record.ticker, reason));
        }
    }

    plan
}

fn triage(
    record: &StockRecord,
    existing_keys: &HashSet<String>,
    run_timestamp: &str,
    exchanges: &ExchangeConfig,
    plan: &mut Plan,
) -> Result<(), String> {
    if !exchanges.is_supported(&record.exchange) {
        plan.stats.unsupported += 1;
        plan.notes.push(format!(
            "Skipping unsupported exchange {} for {}",
            record.exchange, record.ticker
        ));
        return Ok(());
    }

    if record.ticker.is_empty() {
        return Err("blank ticker".to_string());
    }

    let key = existing_key(&record.exchange, &record.ticker, run_timestamp);
    if existing_keys.contains(&key) {
        plan.stats.duplicates += 1;
        return Ok(());
    }

    plan.entries.push(HistoryEntry::new(record, run_timestamp));
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const RUN_TS: &str = "2024-10-22 09:00";

    fn rec(ticker: &str, exchange: &str) -> StockRecord {
        StockRecord {
            ticker: ticker.to_string(),
            exchange: exchange.to_string(),
        }
    }

    fn exchanges() -> ExchangeConfig {
        ExchangeConfig::default()
    }

    #[test]
    fn test_trading_days() {
        // Tue 2024-10-22 through Thu 2024-10-24
        for day in 22..=24 {
            assert!(is_trading_day(NaiveDate::from_ymd_opt(2024, 10, day).unwrap()));
        }
        // Sat/Sun 2024-10-26/27
        assert!(!is_trading_day(NaiveDate::from_ymd_opt(2024, 10, 26).unwrap()));
        assert!(!is_trading_day(NaiveDate::from_ymd_opt(2024, 10, 27).unwrap()));
        // Monday and Friday count too
        assert!(is_trading_day(NaiveDate::from_ymd_opt(2024, 10, 21).unwrap()));
        assert!(is_trading_day(NaiveDate::from_ymd_opt(2024, 10, 25).unwrap()));
    }

    #[test]
    fn unsupported_exchange_skips_without_error() {
        let plan = plan(
            &[rec("FOO", "UNKNOWN"), rec("BAR", "nasdaq")],
            &HashSet::new(),
            RUN_TS,
            &exchanges(),
        );

        assert!(plan.entries.is_empty());
        assert_eq!(plan.stats.unsupported, 2);
        assert_eq!(plan.stats.errors, 0);
        assert!(plan.notes[0].contains("unsupported exchange UNKNOWN"));
    }

    #[test]
    fn snapshot_duplicate_is_counted_not_enqueued() {
        let mut existing = HashSet::new();
        existing.insert("NASDAQ:AAPL:2024-10-22 09:00".to_string());

        let plan = plan(&[rec("AAPL", "NASDAQ")], &existing, RUN_TS, &exchanges());

        assert!(plan.entries.is_empty());
        assert_eq!(plan.stats.duplicates, 1);
        assert_eq!(plan.stats.errors, 0);
    }

    #[test]
    fn same_run_collision_both_enqueued() {
        // The snapshot is consulted, not the batch being built: identical
        // records in one run are written twice.
        let plan = plan(
            &[rec("AAPL", "NASDAQ"), rec("AAPL", "NASDAQ")],
            &HashSet::new(),
            RUN_TS,
            &exchanges(),
        );

        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.stats.duplicates, 0);
    }

    #[test]
    fn blank_ticker_counts_one_error_and_continues() {
        let plan = plan(
            &[rec("", "NYSE"), rec("IBM", "NYSE")],
            &HashSet::new(),
            RUN_TS,
            &exchanges(),
        );

        assert_eq!(plan.stats.errors, 1);
        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].ticker, "IBM");
        assert!(plan.notes[0].contains("blank ticker"));
    }

    #[test]
    fn mixed_batch_scenario() {
        let plan = plan(
            &[
                rec("AAPL", "NASDAQ"),
                rec("FOO", "UNKNOWN"),
                rec("AAPL", "NASDAQ"),
            ],
            &HashSet::new(),
            RUN_TS,
            &exchanges(),
        );

        assert_eq!(plan.stats.total, 3);
        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.stats.duplicates, 0);
        assert_eq!(plan.stats.errors, 0);
        assert_eq!(plan.stats.unsupported, 1);

        // Both survivors share the run timestamp and carry the lookup formula.
        for entry in &plan.entries {
            assert_eq!(entry.timestamp, RUN_TS);
            assert_eq!(entry.ticker, "AAPL");
            assert_eq!(entry.exchange, "NASDAQ");
            assert_eq!(entry.price_formula, r#"=GOOGLEFINANCE("NASDAQ:AAPL"; "price")"#);
        }
    }

    #[test]
    fn stats_account_for_every_record() {
        let mut existing = HashSet::new();
        existing.insert("NYSE:IBM:2024-10-22 09:00".to_string());

        let mut plan = plan(
            &[
                rec("AAPL", "NASDAQ"), // enqueued
                rec("IBM", "NYSE"),    // duplicate
                rec("FOO", "XXX"),     // unsupported
                rec("", "LSE"),        // error
            ],
            &existing,
            RUN_TS,
            &exchanges(),
        );
        plan.stats.updated = plan.entries.len();

        let s = &plan.stats;
        assert_eq!(s.total, s.updated + s.duplicates + s.unsupported + s.errors);
        assert_eq!(s.total, 4);
    }
}
