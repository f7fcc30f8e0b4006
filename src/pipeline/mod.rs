//! Update pipeline: weekday gate → watchlist read → snapshot index →
//! plan → batch write, with the run log observing every stage.
//!
//! ## Failure policy
//!
//! Reads degrade: a failed watchlist or history read is logged and treated
//! as "nothing there", so a transient glitch never kills the run. Missing
//! tabs and write failures are fatal for the run — `run_absorbing()` is the
//! scheduled entry point and swallows those after logging and (optionally)
//! emailing, so the scheduler always sees a normal return.

pub mod planner;

use crate::config::AppConfig;
use crate::logger::RunLogger;
use crate::models::{existing_key, HistoryEntry, RunStats, StockRecord};
use crate::notify::Notifier;
use crate::sheets::{SheetsStore, ValueInput};
use crate::utils::{col_letter, minute_timestamp, Timer};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

pub struct Pipeline {
    config: AppConfig,
    store: Arc<dyn SheetsStore>,
    logger: Arc<RunLogger>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Pipeline {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn SheetsStore>,
        logger: Arc<RunLogger>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            config,
            store,
            logger,
            notifier,
        }
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.config
            .schedule
            .timezone
            .parse()
            .map_err(|e| anyhow!("Invalid timezone '{}': {}", self.config.schedule.timezone, e))
    }

    /// One update pass at the current wall-clock time.
    pub async fn run(&self) -> Result<RunStats> {
        let tz = self.timezone()?;
        self.run_at(Utc::now().with_timezone(&tz)).await
    }

    /// Scheduled entry point: a fatal error is logged, optionally emailed
    /// once, and absorbed — the scheduler always sees a normal return.
    pub async fn run_absorbing(&self) -> Option<RunStats> {
        let result = self.run().await;
        self.absorb(result).await
    }

    #[cfg(test)]
    pub(crate) async fn run_absorbing_at(&self, now: DateTime<Tz>) -> Option<RunStats> {
        let result = self.run_at(now).await;
        self.absorb(result).await
    }

    async fn absorb(&self, result: Result<RunStats>) -> Option<RunStats> {
        match result {
            Ok(stats) => Some(stats),
            Err(e) => {
                self.logger.error("Stock update failed", &e).await;
                self.send_failure_notice(&e).await;
                self.logger.flush().await;
                None
            }
        }
    }

    pub(crate) async fn run_at(&self, now: DateTime<Tz>) -> Result<RunStats> {
        let _t = Timer::start("Stock update");

        if !planner::is_trading_day(now.date_naive()) {
            self.logger
                .info("Markets closed today, nothing to update")
                .await;
            self.logger.flush().await;
            return Ok(RunStats::default());
        }

        let run_ts = minute_timestamp(&now);
        self.logger
            .info(format!("Starting stock update for {}", run_ts))
            .await;

        // Structural check up front — a missing tab is the fatal case,
        // unlike range reads below which merely degrade.
        let titles = self
            .store
            .sheet_titles()
            .await
            .context("Could not list spreadsheet tabs")?;
        for tab in [&self.config.sheets.source_tab, &self.config.sheets.target_tab] {
            if !titles.iter().any(|t| t == tab) {
                bail!("Tab '{}' not found in spreadsheet", tab);
            }
        }

        let records = match self.read_stock_list().await {
            Ok(records) => records,
            Err(e) => {
                self.logger.error("Failed to read stock list", &e).await;
                Vec::new()
            }
        };
        self.logger
            .info(format!("{} watchlist rows", records.len()))
            .await;

        let existing = match self.read_existing().await {
            Ok(rows) => rows,
            Err(e) => {
                self.logger.error("Failed to read history rows", &e).await;
                Vec::new()
            }
        };
        let existing_keys = existing_key_set(&existing);

        let mut plan = planner::plan(&records, &existing_keys, &run_ts, &self.config.exchanges);
        for note in &plan.notes {
            self.logger.info(note.clone()).await;
        }

        if !plan.entries.is_empty() {
            self.write_batch(&plan.entries)
                .await
                .context("Batch write failed")?;
            plan.stats.updated = plan.entries.len();
        }

        let s = &plan.stats;
        self.logger
            .info(format!(
                "Done: {} rows | {} updated | {} duplicates | {} unsupported | {} errors",
                s.total, s.updated, s.duplicates, s.unsupported, s.errors
            ))
            .await;
        self.logger.flush().await;

        Ok(plan.stats)
    }

    /// Watchlist rows 2..N over the minimal column span covering both the
    /// ticker and exchange columns, whichever order they sit in. Cells are
    /// trimmed here, once, for the whole run.
    pub(crate) async fn read_stock_list(&self) -> Result<Vec<StockRecord>> {
        let cols = &self.config.columns;
        let first = cols.source_ticker.min(cols.source_exchange);
        let last = cols.source_ticker.max(cols.source_exchange);
        let range = format!(
            "{}!{}2:{}",
            self.config.sheets.source_tab,
            col_letter(first),
            col_letter(last)
        );

        let rows = self.store.read_rows(&range).await?;
        let ticker_idx = (cols.source_ticker - first) as usize;
        let exchange_idx = (cols.source_exchange - first) as usize;

        Ok(rows
            .iter()
            .map(|row| StockRecord {
                ticker: cell(row, ticker_idx),
                exchange: cell(row, exchange_idx),
            })
            .collect())
    }

    /// Raw history rows: 4 columns from the exchange column, rows 2..N.
    /// A header-only tab yields an empty list.
    pub(crate) async fn read_existing(&self) -> Result<Vec<Vec<String>>> {
        let cols = &self.config.columns;
        let range = format!(
            "{}!{}2:{}",
            self.config.sheets.target_tab,
            col_letter(cols.target_exchange),
            col_letter(cols.target_exchange + 3)
        );
        self.store.read_rows(&range).await
    }

    /// Append the planned entries after the last used row, as exactly two
    /// bulk range writes with identical row offsets: the formula column
    /// (parsed by the host), then the exchange | ticker | timestamp block
    /// (stored raw). Not transactional — a failure between the two leaves
    /// the formula column ahead of the block.
    pub(crate) async fn write_batch(&self, entries: &[HistoryEntry]) -> Result<()> {
        let sheets = &self.config.sheets;
        let cols = &self.config.columns;

        let last_row = self.store.row_count(&sheets.target_tab).await?;
        let start = last_row + 1;
        let end = last_row + entries.len() as u32;

        let fcol = col_letter(cols.target_formula);
        let formula_range = format!("{}!{}{}:{}{}", sheets.target_tab, fcol, start, fcol, end);
        let formulas = entries
            .iter()
            .map(|e| vec![e.price_formula.clone()])
            .collect();
        self.store
            .write_rows(&formula_range, formulas, ValueInput::UserEntered)
            .await?;

        let block_range = format!(
            "{}!{}{}:{}{}",
            sheets.target_tab,
            col_letter(cols.target_exchange),
            start,
            col_letter(cols.target_timestamp),
            end
        );
        let block = entries
            .iter()
            .map(|e| vec![e.exchange.clone(), e.ticker.clone(), e.timestamp.clone()])
            .collect();
        self.store
            .write_rows(&block_range, block, ValueInput::Raw)
            .await?;

        Ok(())
    }

    /// Dry run: read and triage without writing anything. Reads degrade to
    /// empty exactly as in a live run. `stats.updated` reflects what a live
    /// run would have written.
    pub async fn preview(&self) -> Result<(String, planner::Plan)> {
        let tz = self.timezone()?;
        let run_ts = minute_timestamp(&Utc::now().with_timezone(&tz));

        let records = self.read_stock_list().await.unwrap_or_default();
        let existing = self.read_existing().await.unwrap_or_default();
        let existing_keys = existing_key_set(&existing);

        let mut plan = planner::plan(&records, &existing_keys, &run_ts, &self.config.exchanges);
        plan.stats.updated = plan.entries.len();
        Ok((run_ts, plan))
    }

    async fn send_failure_notice(&self, err: &anyhow::Error) {
        let Some(notifier) = &self.notifier else {
            return;
        };

        let body = format!(
            "{:#}\n\nat {}",
            err,
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Err(ne) = notifier.notify_failure("Stock update failed", &body).await {
            warn!("Failure notification not delivered: {:#}", ne);
        }
    }
}

fn cell(row: &[String], idx: usize) -> String {
    row.get(idx).map(|c| c.trim().to_string()).unwrap_or_default()
}

/// Snapshot keys from raw history rows — first three columns are
/// exchange, ticker, timestamp. Short rows are ignored.
fn existing_key_set(rows: &[Vec<String>]) -> HashSet<String> {
    rows.iter()
        .filter(|row| row.len() >= 3)
        .map(|row| existing_key(row[0].trim(), row[1].trim(), row[2].trim()))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
