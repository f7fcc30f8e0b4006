pub mod client;
pub mod oauth;

use anyhow::Result;
use async_trait::async_trait;

pub use self::client::GoogleSheetsClient;

// ── Store trait ───────────────────────────────────────────────────────────────

/// How written cell values are interpreted by the spreadsheet:
/// `Raw` stores the text as-is, `UserEntered` lets the host parse
/// formulas, numbers and dates as if typed into the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueInput {
    Raw,
    UserEntered,
}

impl ValueInput {
    pub fn as_param(self) -> &'static str {
        match self {
            ValueInput::Raw => "RAW",
            ValueInput::UserEntered => "USER_ENTERED",
        }
    }
}

/// Swappable spreadsheet backend abstraction. The update pipeline and the
/// run logger only ever talk to this trait, so they can run against a mock
/// store in tests.
#[async_trait]
pub trait SheetsStore: Send + Sync {
    /// Titles of every tab in the spreadsheet.
    async fn sheet_titles(&self) -> Result<Vec<String>>;

    /// Create an empty tab with the given title.
    async fn add_sheet(&self, title: &str) -> Result<()>;

    /// Cell text of an A1 range, row-major. Trailing empty rows/cells are
    /// not padded — callers index defensively.
    async fn read_rows(&self, range: &str) -> Result<Vec<Vec<String>>>;

    /// Overwrite an A1 range with the given rows in one call.
    async fn write_rows(&self, range: &str, values: Vec<Vec<String>>, input: ValueInput)
        -> Result<()>;

    /// Append rows after the last data row of the given range's tab.
    async fn append_rows(&self, range: &str, values: Vec<Vec<String>>, input: ValueInput)
        -> Result<()>;

    /// Number of the last row holding any value (0 for an empty tab).
    async fn row_count(&self, tab: &str) -> Result<u32>;
}

// ── In-memory store for tests ─────────────────────────────────────────────────

#[cfg(test)]
pub mod testing {
    use super::{SheetsStore, ValueInput};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct WriteCall {
        pub range: String,
        pub values: Vec<Vec<String>>,
        pub input: ValueInput,
    }

    /// Recording fake: canned reads keyed by exact range, every write and
    /// append captured in call order, optional failure injection.
    #[derive(Default)]
    pub struct MemorySheets {
        titles: Mutex<Vec<String>>,
        reads: Mutex<HashMap<String, Vec<Vec<String>>>>,
        writes: Mutex<Vec<WriteCall>>,
        appends: Mutex<Vec<WriteCall>>,
        fail_appends: AtomicBool,
        fail_reads: AtomicBool,
    }

    impl MemorySheets {
        pub fn new(tabs: &[&str]) -> Self {
            let store = Self::default();
            *store.titles.lock().unwrap() = tabs.iter().map(|t| t.to_string()).collect();
            store
        }

        pub fn canned(&self, range: &str, rows: Vec<Vec<&str>>) {
            let rows = rows
                .into_iter()
                .map(|r| r.into_iter().map(String::from).collect())
                .collect();
            self.reads.lock().unwrap().insert(range.to_string(), rows);
        }

        pub fn titles(&self) -> Vec<String> {
            self.titles.lock().unwrap().clone()
        }

        pub fn writes(&self) -> Vec<WriteCall> {
            self.writes.lock().unwrap().clone()
        }

        pub fn written_rows(&self, range: &str) -> Vec<Vec<String>> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.range == range)
                .flat_map(|c| c.values.clone())
                .collect()
        }

        pub fn appended_rows(&self, range: &str) -> Vec<Vec<String>> {
            self.appends
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.range == range)
                .flat_map(|c| c.values.clone())
                .collect()
        }

        pub fn fail_appends(&self) {
            self.fail_appends.store(true, Ordering::SeqCst);
        }

        pub fn fail_reads(&self) {
            self.fail_reads.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SheetsStore for MemorySheets {
        async fn sheet_titles(&self) -> Result<Vec<String>> {
            Ok(self.titles())
        }

        async fn add_sheet(&self, title: &str) -> Result<()> {
            self.titles.lock().unwrap().push(title.to_string());
            Ok(())
        }

        async fn read_rows(&self, range: &str) -> Result<Vec<Vec<String>>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(anyhow!("injected read failure for {}", range));
            }
            Ok(self
                .reads
                .lock()
                .unwrap()
                .get(range)
                .cloned()
                .unwrap_or_default())
        }

        async fn write_rows(
            &self,
            range: &str,
            values: Vec<Vec<String>>,
            input: ValueInput,
        ) -> Result<()> {
            self.writes.lock().unwrap().push(WriteCall {
                range: range.to_string(),
                values,
                input,
            });
            Ok(())
        }

        async fn append_rows(
            &self,
            range: &str,
            values: Vec<Vec<String>>,
            input: ValueInput,
        ) -> Result<()> {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(anyhow!("injected append failure for {}", range));
            }
            self.appends.lock().unwrap().push(WriteCall {
                range: range.to_string(),
                values,
                input,
            });
            Ok(())
        }

        async fn row_count(&self, tab: &str) -> Result<u32> {
            Ok(self.read_rows(tab).await?.len() as u32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemorySheets;
    use super::*;

    #[test]
    fn value_input_params() {
        assert_eq!(ValueInput::Raw.as_param(), "RAW");
        assert_eq!(ValueInput::UserEntered.as_param(), "USER_ENTERED");
    }

    #[test]
    fn row_count_follows_the_used_range() {
        tokio_test::block_on(async {
            let store = MemorySheets::new(&["Dati"]);
            assert_eq!(store.row_count("Dati").await.unwrap(), 0);

            store.canned("Dati", vec![vec!["h"], vec!["r1"], vec!["r2"]]);
            assert_eq!(store.row_count("Dati").await.unwrap(), 3);
        });
    }
}
