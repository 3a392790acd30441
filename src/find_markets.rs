use crate::candles::deserialize_f64_lenient;
use crate::storage_utils::AppConfig;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Deserialize, Debug)]
pub struct MarketsResponse {
    // keyed by market name; BTreeMap keeps the iteration order stable
    pub markets: BTreeMap<String, MarketEntry>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MarketEntry {
    pub market: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "trades24H", default, deserialize_with = "deserialize_f64_lenient")]
    pub trades_24h: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketInfo {
    pub market: String,
    pub trades_24h: u64,
}

/// Which markets make it into the analysis.
pub struct MarketFilter {
    excluded: HashSet<String>,
    pattern: Option<Regex>,
}

impl MarketFilter {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let pattern = config
            .market_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("invalid market_pattern")?;
        Ok(Self {
            excluded: config.excluded_markets.iter().cloned().collect(),
            pattern,
        })
    }

    pub fn allows(&self, market: &str) -> bool {
        if self.excluded.contains(market) {
            return false;
        }
        self.pattern.as_ref().is_none_or(|re| re.is_match(market))
    }
}

pub fn read_markets(response: &MarketsResponse, filter: &MarketFilter) -> Vec<MarketInfo> {
    let mut markets = Vec::with_capacity(response.markets.len());
    for entry in response.markets.values() {
        if !filter.allows(&entry.market) {
            tracing::debug!(market = %entry.market, status = ?entry.status, "skipping market");
            continue;
        }
        let info = MarketInfo {
            market: entry.market.clone(),
            trades_24h: entry.trades_24h.unwrap_or(0.0) as u64,
        };
        tracing::info!(market = %info.market, trades = info.trades_24h, "market");
        markets.push(info);
    }
    markets
}
