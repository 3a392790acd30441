mod analysis;
mod candles;
mod dydx_client;
mod find_markets;
mod mackinnon;
mod ranking;
mod report;
mod stationarity;
mod storage_utils;
mod tui;

use anyhow::Context;
use candles::Timeframe;
use clap::Parser;
use dydx_client::DydxClient;
use std::path::PathBuf;
use storage_utils::{AppConfig, AsyncStorageManager};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Rank exchange markets by ADF stationarity of their closing prices"
)]
struct Args {
    /// Directory holding config.json (defaults to `storage/` next to the binary)
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Comma-separated timeframes, e.g. 1DAY,4HOURS,1HOUR
    #[arg(long, value_delimiter = ',')]
    timeframes: Option<Vec<Timeframe>>,

    /// How many series/markets to show at each end of the ranking
    #[arg(long)]
    top: Option<usize>,

    /// Skip the interactive chart viewer
    #[arg(long)]
    no_chart: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Step 1: Configuration
    let storage = match &args.storage_dir {
        Some(dir) => AsyncStorageManager::new(dir).await?,
        None => AsyncStorageManager::new_relative("storage").await?,
    };
    let mut config = AppConfig::load_or_init(&storage).await?;
    if let Some(timeframes) = args.timeframes {
        config.timeframes = timeframes;
    }
    if let Some(top) = args.top {
        config.top_n = top;
    }
    if config.timeframes.is_empty() {
        anyhow::bail!("no timeframes configured");
    }

    // Step 2: Fetch candles and test every series
    tracing::info!(
        timeframes = ?config.timeframes,
        base_url = %config.api.base_url,
        "starting analysis"
    );
    let client = DydxClient::new(&config.api)?;
    let analysis = analysis::run_analysis_pipeline(&client, &config)
        .await
        .context("analysis pipeline failed")?;

    // Step 3: Report
    report::print_report(&analysis, &config.timeframes, config.top_n);

    // Step 4: Charts
    if !args.no_chart {
        let entries = tui::chart_entries(&analysis, config.top_n);
        tui::run_chart_viewer(entries)?;
    }

    Ok(())
}
