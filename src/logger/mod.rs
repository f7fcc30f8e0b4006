//! Buffered run log. Every entry is echoed to the console through `tracing`;
//! when sheet logging is enabled, entries are also buffered and written to
//! the "Logs" tab — informational entries in threshold-sized batches, errors
//! immediately. Flushing never fails the caller: a run must not die while
//! reporting.

use crate::config::LogConfig;
use crate::sheets::{SheetsStore, ValueInput};
use anyhow::Result;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

const LOG_HEADER: [&str; 3] = ["Time", "Type", "Message"];

#[derive(Debug, Clone)]
struct LogEntry {
    time: String,
    level: &'static str,
    message: String,
}

impl LogEntry {
    fn new(level: &'static str, message: String) -> Self {
        Self {
            time: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            level,
            message,
        }
    }

    fn into_row(self) -> Vec<String> {
        vec![self.time, self.level.to_string(), self.message]
    }
}

pub struct RunLogger {
    store: Arc<dyn SheetsStore>,
    tab: String,
    enabled: bool,
    threshold: usize,
    buffer: Mutex<Vec<LogEntry>>,
}

impl RunLogger {
    pub fn new(store: Arc<dyn SheetsStore>, tab: impl Into<String>, cfg: &LogConfig) -> Self {
        Self {
            store,
            tab: tab.into(),
            enabled: cfg.sheet_logging,
            threshold: cfg.flush_threshold.max(1),
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Informational entry. Batched — written out once the buffer reaches
    /// the flush threshold.
    pub async fn info(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);

        // Disabled sheet logging: echo only. Buffering here would grow
        // without bound in the long-lived scheduler process.
        if !self.enabled {
            return;
        }

        let len = self.push(LogEntry::new("INFO", message));
        if len >= self.threshold {
            self.flush().await;
        }
    }

    /// Error entry: message plus the error's display chain. Written out
    /// immediately, regardless of buffer fill.
    pub async fn error(&self, message: &str, err: &anyhow::Error) {
        let text = format!("{}: {:#}", message, err);
        error!("{}", text);

        if !self.enabled {
            return;
        }

        self.push(LogEntry::new("ERROR", text));
        self.flush().await;
    }

    /// Write out everything buffered in one append. Failures are reported
    /// to the console and the batch is dropped — never propagated.
    pub async fn flush(&self) {
        let drained: Vec<LogEntry> = {
            let mut buf = match self.buffer.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *buf)
        };

        if drained.is_empty() {
            return;
        }

        let count = drained.len();
        if let Err(e) = self.try_flush(drained).await {
            warn!("Run log flush failed, {} entries dropped: {:#}", count, e);
        }
    }

    fn push(&self, entry: LogEntry) -> usize {
        let mut buf = match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buf.push(entry);
        buf.len()
    }

    async fn try_flush(&self, entries: Vec<LogEntry>) -> Result<()> {
        self.ensure_log_tab().await?;

        let values: Vec<Vec<String>> = entries.into_iter().map(LogEntry::into_row).collect();
        self.store
            .append_rows(&format!("{}!A:C", self.tab), values, ValueInput::Raw)
            .await
    }

    /// The log tab is created on first use, with its header row.
    async fn ensure_log_tab(&self) -> Result<()> {
        let titles = self.store.sheet_titles().await?;
        if titles.iter().any(|t| t == &self.tab) {
            return Ok(());
        }

        self.store.add_sheet(&self.tab).await?;
        let header = LOG_HEADER.iter().map(|h| h.to_string()).collect();
        self.store
            .write_rows(
                &format!("{}!A1:C1", self.tab),
                vec![header],
                ValueInput::Raw,
            )
            .await
    }
}
