//! The fetch → transform → test pipeline.

use crate::candles::{CandleSeries, Timeframe};
use crate::dydx_client::DydxClient;
use crate::find_markets::{self, MarketFilter, MarketInfo};
use crate::stationarity::{self, AdfResult};
use crate::storage_utils::AppConfig;
use anyhow::Result;
use std::collections::BTreeMap;
use std::time::Duration;

/// One row of the result table: a market on one timeframe.
#[derive(Debug, Clone, PartialEq)]
pub struct StationarityRow {
    pub market: String,
    pub timeframe: Timeframe,
    pub p: f64,
}

#[derive(Debug, Clone)]
pub struct SeriesResult {
    pub adf: AdfResult,
    pub series: CandleSeries,
}

#[derive(Debug, Clone)]
pub struct MarketSummary {
    pub info: MarketInfo,
    pub total_p: f64,
}

#[derive(Debug, Default)]
pub struct Analysis {
    pub rows: Vec<StationarityRow>,
    pub markets: Vec<MarketSummary>,
    pub details: BTreeMap<(String, Timeframe), SeriesResult>,
}

impl Analysis {
    pub fn series_for(&self, row: &StationarityRow) -> Option<&SeriesResult> {
        self.details.get(&(row.market.clone(), row.timeframe))
    }
}

/// Runs the full analysis pipeline:
/// 1. Fetches the market list and keeps the live markets.
/// 2. Fetches candles for every market and timeframe.
/// 3. Tests each close-price series for a unit root.
pub async fn run_analysis_pipeline(client: &DydxClient, config: &AppConfig) -> Result<Analysis> {
    let filter = MarketFilter::from_config(config)?;

    let markets_info = client.get_markets().await?;
    let markets = find_markets::read_markets(&markets_info, &filter);
    tracing::info!(count = markets.len(), "markets selected");

    let pause = Duration::from_millis(config.api.request_pause_ms);
    let mut analysis = Analysis::default();

    for info in markets {
        let mut total_p = 0.0;
        for &timeframe in &config.timeframes {
            // api rate limits
            tokio::time::sleep(pause).await;
            let raw = client.get_candles(&info.market, timeframe).await?;
            let series = CandleSeries::from_raw(&info.market, timeframe, raw);

            let Some(adf) = calc_stationarity(&series) else {
                continue;
            };
            total_p += adf.p_value;
            analysis.rows.push(StationarityRow {
                market: info.market.clone(),
                timeframe,
                p: adf.p_value,
            });
            analysis
                .details
                .insert((info.market.clone(), timeframe), SeriesResult { adf, series });
        }
        analysis.markets.push(MarketSummary { info, total_p });
    }

    Ok(analysis)
}

/// ADF on the close prices. Series that cannot be tested are logged and skipped.
pub fn calc_stationarity(series: &CandleSeries) -> Option<AdfResult> {
    if series.is_empty() {
        tracing::warn!(
            market = %series.market,
            timeframe = %series.timeframe,
            "no candles returned"
        );
        return None;
    }
    match stationarity::adfuller(&series.closes()) {
        Ok(adf) => {
            tracing::info!(
                market = %series.market,
                timeframe = %series.timeframe,
                statistic = format_args!("{:.2}", adf.statistic),
                critical_5pct = format_args!("{:.2}", adf.critical_values.five_pct),
                p_value = format_args!("{:.2}", adf.p_value),
                lags = adf.used_lag,
                nobs = adf.nobs,
                "ADF test"
            );
            Some(adf)
        }
        Err(e) => {
            tracing::warn!(
                market = %series.market,
                timeframe = %series.timeframe,
                candles = series.len(),
                error = %e,
                "skipping series"
            );
            None
        }
    }
}
