use serde::{Deserialize, Serialize};

// ── Watchlist row ─────────────────────────────────────────────────────────────

/// One row of the watchlist tab: a ticker and the exchange it trades on.
/// Both are free-form cell text, trimmed at read time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockRecord {
    pub ticker: String,
    pub exchange: String,
}

// ── History row ───────────────────────────────────────────────────────────────

/// One snapshot row appended to the history tab. Immutable once written;
/// the live price cell is filled in by the spreadsheet when it evaluates
/// the lookup formula.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub exchange: String,
    pub ticker: String,
    /// Minute precision, shared by every entry of one run.
    pub timestamp: String,
    pub price_formula: String,
}

impl HistoryEntry {
    pub fn new(record: &StockRecord, timestamp: &str) -> Self {
        Self {
            exchange: record.exchange.clone(),
            ticker: record.ticker.clone(),
            timestamp: timestamp.to_string(),
            price_formula: price_formula(&record.exchange, &record.ticker),
        }
    }
}

/// Composite identity of a history row: `exchange:ticker:timestamp`.
/// Membership in the pre-run snapshot set decides duplicate skips.
pub fn existing_key(exchange: &str, ticker: &str, timestamp: &str) -> String {
    format!("{}:{}:{}", exchange, ticker, timestamp)
}

/// Live quote lookup over "EXCHANGE:TICKER", evaluated by the spreadsheet.
/// Semicolon separator — the deployment spreadsheet runs an Italian locale.
pub fn price_formula(exchange: &str, ticker: &str) -> String {
    format!(r#"=GOOGLEFINANCE("{}:{}"; "price")"#, exchange, ticker)
}

// ── Run statistics ────────────────────────────────────────────────────────────

/// Counters for one update invocation. Never persisted — reported through
/// the run log only. `total` always equals the sum of the other four.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    pub total: usize,
    pub updated: usize,
    pub duplicates: usize,
    pub unsupported: usize,
    pub errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_key() {
        assert_eq!(
            existing_key("NASDAQ", "AAPL", "2024-10-22 09:00"),
            "NASDAQ:AAPL:2024-10-22 09:00"
        );
    }

    #[test]
    fn test_price_formula() {
        assert_eq!(
            price_formula("NYSE", "IBM"),
            r#"=GOOGLEFINANCE("NYSE:IBM"; "price")"#
        );
    }
}
