mod config;
mod logger;
mod models;
mod notify;
mod pipeline;
mod scheduler;
mod sheets;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{AppConfig, ConfigOverrides};
use crate::logger::RunLogger;
use crate::notify::{MailHook, Notifier};
use crate::pipeline::Pipeline;
use crate::scheduler::UpdateSchedule;
use crate::sheets::GoogleSheetsClient;

#[derive(Parser)]
#[command(name = "tickersheet", about = "Spreadsheet stock price snapshot ETL", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML file whose sections replace the loaded config's, wholesale
    #[arg(short, long, global = true)]
    overrides: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run one update pass now
    Update,

    /// Dry run: read and plan, write nothing
    Plan,

    /// Install the daily triggers and run the firing loop
    Schedule,

    /// Print the effective merged configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "tickersheet=info,warn",
        1 => "tickersheet=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load()?;
    if let Some(path) = &cli.overrides {
        config = config.with_overrides(ConfigOverrides::from_file(path)?);
    }

    match cli.command {
        Command::Update => {
            let pipeline = build_pipeline(config)?;
            match pipeline.run_absorbing().await {
                Some(stats) => info!(
                    "Done: {} rows | {} updated | {} duplicates | {} unsupported | {} errors",
                    stats.total, stats.updated, stats.duplicates, stats.unsupported, stats.errors
                ),
                None => info!("Run failed — see the Logs tab"),
            }
        }

        Command::Plan => {
            let pipeline = build_pipeline(config)?;
            let (run_ts, plan) = pipeline.preview().await?;

            println!("Dry run for {}:", run_ts);
            for note in &plan.notes {
                println!("  {}", note);
            }
            for entry in &plan.entries {
                println!("  would write {:8} {:8} {}", entry.exchange, entry.ticker, entry.timestamp);
            }
            let s = &plan.stats;
            println!(
                "{} rows | {} would update | {} duplicates | {} unsupported | {} errors",
                s.total, s.updated, s.duplicates, s.unsupported, s.errors
            );
        }

        Command::Schedule => {
            let schedule = UpdateSchedule::new(&config.schedule)?;
            let pipeline = build_pipeline(config)?;

            tokio::select! {
                result = schedule.run(&pipeline) => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted — shutting down");
                }
            }
        }

        Command::ShowConfig => {
            println!("{:#?}", config);
        }
    }

    Ok(())
}

fn build_pipeline(config: AppConfig) -> Result<Pipeline> {
    let store = Arc::new(GoogleSheetsClient::new(&config.sheets, &config.client)?);
    let logger = Arc::new(RunLogger::new(
        store.clone(),
        config.sheets.log_tab.clone(),
        &config.logging,
    ));
    let notifier: Option<Arc<dyn Notifier>> = MailHook::from_config(&config.notify)?
        .map(|hook| Arc::new(hook) as Arc<dyn Notifier>);

    Ok(Pipeline::new(config, store, logger, notifier))
}
