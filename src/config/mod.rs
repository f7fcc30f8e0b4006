use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level application configuration. Loaded once, passed by value —
/// components never share a mutable configuration object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub sheets: SheetsConfig,

    #[serde(default)]
    pub columns: ColumnsConfig,

    #[serde(default)]
    pub exchanges: ExchangeConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub logging: LogConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

/// Spreadsheet identity and tab names.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SheetsConfig {
    #[serde(default)]
    pub spreadsheet_id: String,

    #[serde(default = "default_service_account_path")]
    pub service_account_json_path: String,

    #[serde(default = "default_source_tab")]
    pub source_tab: String,

    #[serde(default = "default_target_tab")]
    pub target_tab: String,

    #[serde(default = "default_log_tab")]
    pub log_tab: String,
}

/// 1-based column positions in the source and target tabs.
/// Target column 6 holds the spreadsheet-evaluated price and is never written.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnsConfig {
    #[serde(default = "default_source_ticker_col")]
    pub source_ticker: u32,

    #[serde(default = "default_source_exchange_col")]
    pub source_exchange: u32,

    #[serde(default = "default_formula_col")]
    pub target_formula: u32,

    #[serde(default = "default_target_exchange_col")]
    pub target_exchange: u32,

    #[serde(default = "default_target_ticker_col")]
    pub target_ticker: u32,

    #[serde(default = "default_target_timestamp_col")]
    pub target_timestamp: u32,
}

/// Exchange codes the quote formula can resolve. The european/american split
/// is documentation only — the supported-check flattens both lists.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_european_exchanges")]
    pub european: Vec<String>,

    #[serde(default = "default_american_exchanges")]
    pub american: Vec<String>,
}

impl ExchangeConfig {
    /// Case-sensitive exact match against the flattened union.
    pub fn is_supported(&self, exchange: &str) -> bool {
        self.european.iter().chain(self.american.iter()).any(|e| e == exchange)
    }
}

/// Wall-clock trigger times, all in one fixed IANA timezone.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_trigger_times")]
    pub times: Vec<String>,

    #[serde(default = "default_timezone")]
    pub timezone: String,
}

/// Run-log sink behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_true")]
    pub sheet_logging: bool,

    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
}

/// Fatal-error notification. Engaged only when an address is configured
/// AND `email_on_error` is set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub error_email: Option<String>,

    #[serde(default)]
    pub email_on_error: bool,

    #[serde(default)]
    pub mail_endpoint: Option<String>,
}

/// HTTP client pacing for the Sheets API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_service_account_path() -> String {
    "service_account.json".to_string()
}
fn default_source_tab() -> String {
    "Recup".to_string()
}
fn default_target_tab() -> String {
    "Dati".to_string()
}
fn default_log_tab() -> String {
    "Logs".to_string()
}
fn default_source_ticker_col() -> u32 {
    3
}
fn default_source_exchange_col() -> u32 {
    9
}
fn default_formula_col() -> u32 {
    1
}
fn default_target_exchange_col() -> u32 {
    3
}
fn default_target_ticker_col() -> u32 {
    4
}
fn default_target_timestamp_col() -> u32 {
    5
}
fn default_european_exchanges() -> Vec<String> {
    ["MIL", "LSE", "XETRA", "ETR", "BIT"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_american_exchanges() -> Vec<String> {
    ["NASDAQ", "NYSE"].into_iter().map(String::from).collect()
}
fn default_trigger_times() -> Vec<String> {
    ["09:00", "12:00", "15:30", "17:00", "19:00", "22:00"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_timezone() -> String {
    "Europe/Rome".to_string()
}
fn default_true() -> bool {
    true
}
fn default_flush_threshold() -> usize {
    50
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    250
}
fn default_jitter_ms() -> u64 {
    100
}
fn default_max_retries() -> u32 {
    3
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("TICKERSHEET").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg.try_deserialize().unwrap_or_else(|_| AppConfig::default());
        Ok(app_cfg)
    }

    /// Replace whole top-level sections with caller-supplied ones.
    /// Single level only — a supplied section is taken wholesale, never
    /// merged field by field.
    pub fn with_overrides(self, overrides: ConfigOverrides) -> Self {
        Self {
            sheets: overrides.sheets.unwrap_or(self.sheets),
            columns: overrides.columns.unwrap_or(self.columns),
            exchanges: overrides.exchanges.unwrap_or(self.exchanges),
            schedule: overrides.schedule.unwrap_or(self.schedule),
            logging: overrides.logging.unwrap_or(self.logging),
            notify: overrides.notify.unwrap_or(self.notify),
            client: overrides.client.unwrap_or(self.client),
        }
    }
}

/// Per-invocation section replacements, usually read from a TOML file
/// next to the CLI call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverrides {
    pub sheets: Option<SheetsConfig>,
    pub columns: Option<ColumnsConfig>,
    pub exchanges: Option<ExchangeConfig>,
    pub schedule: Option<ScheduleConfig>,
    pub logging: Option<LogConfig>,
    pub notify: Option<NotifyConfig>,
    pub client: Option<ClientConfig>,
}

impl ConfigOverrides {
    pub fn from_file(path: &Path) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .build()
            .with_context(|| format!("Could not read overrides file {:?}", path))?;
        cfg.try_deserialize()
            .with_context(|| format!("Malformed overrides file {:?}", path))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sheets: SheetsConfig::default(),
            columns: ColumnsConfig::default(),
            exchanges: ExchangeConfig::default(),
            schedule: ScheduleConfig::default(),
            logging: LogConfig::default(),
            notify: NotifyConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            service_account_json_path: default_service_account_path(),
            source_tab: default_source_tab(),
            target_tab: default_target_tab(),
            log_tab: default_log_tab(),
        }
    }
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            source_ticker: default_source_ticker_col(),
            source_exchange: default_source_exchange_col(),
            target_formula: default_formula_col(),
            target_exchange: default_target_exchange_col(),
            target_ticker: default_target_ticker_col(),
            target_timestamp: default_target_timestamp_col(),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            european: default_european_exchanges(),
            american: default_american_exchanges(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            times: default_trigger_times(),
            timezone: default_timezone(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            sheet_logging: default_true(),
            flush_threshold: default_flush_threshold(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
        }
    }
}
