use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Timeframe {
    #[serde(rename = "1DAY")]
    OneDay,
    #[serde(rename = "4HOURS")]
    FourHours,
    #[serde(rename = "1HOUR")]
    OneHour,
    #[serde(rename = "30MINS")]
    ThirtyMins,
    #[serde(rename = "15MINS")]
    FifteenMins,
    #[serde(rename = "5MINS")]
    FiveMins,
    #[serde(rename = "1MIN")]
    OneMin,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::OneDay,
        Timeframe::FourHours,
        Timeframe::OneHour,
        Timeframe::ThirtyMins,
        Timeframe::FifteenMins,
        Timeframe::FiveMins,
        Timeframe::OneMin,
    ];

    /// The `resolution` query value the exchange expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneDay => "1DAY",
            Timeframe::FourHours => "4HOURS",
            Timeframe::OneHour => "1HOUR",
            Timeframe::ThirtyMins => "30MINS",
            Timeframe::FifteenMins => "15MINS",
            Timeframe::FiveMins => "5MINS",
            Timeframe::OneMin => "1MIN",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Timeframe::ALL.iter().map(|tf| tf.as_str()).collect();
                format!("unknown timeframe '{}', expected one of {}", s, known.join(", "))
            })
    }
}

// --- Wire format ---

#[derive(Deserialize, Debug)]
pub struct CandlesResponse {
    #[serde(default)]
    pub candles: Vec<RawCandle>,
}

/// One candle as the exchange sends it: prices are decimal strings, newest first.
#[derive(Deserialize, Debug, Clone)]
pub struct RawCandle {
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub open: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub high: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub low: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_lenient")]
    pub close: Option<f64>,
    #[serde(rename = "usdVolume", default, deserialize_with = "deserialize_f64_lenient")]
    pub usd_volume: Option<f64>,
}

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if v.trim().is_empty() {
            Ok(None)
        } else {
            v.trim().parse::<f64>().map(Some).map_err(E::custom)
        }
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

pub fn deserialize_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64Visitor)
}

// --- Tabular series ---

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone)]
pub struct CandleSeries {
    pub market: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
}

impl CandleSeries {
    /// Builds a chronological series out of the newest-first API rows.
    /// Rows without a close price are dropped; other missing fields become NaN.
    pub fn from_raw(market: &str, timeframe: Timeframe, raw: Vec<RawCandle>) -> Self {
        let total = raw.len();
        let candles: Vec<Candle> = raw
            .into_iter()
            .rev()
            .filter_map(|k| {
                Some(Candle {
                    timestamp: k.started_at,
                    close: k.close?,
                    open: k.open.unwrap_or(f64::NAN),
                    high: k.high.unwrap_or(f64::NAN),
                    low: k.low.unwrap_or(f64::NAN),
                    volume: k.usd_volume.unwrap_or(f64::NAN),
                })
            })
            .collect();

        if candles.len() < total {
            tracing::debug!(
                market,
                %timeframe,
                dropped = total - candles.len(),
                "dropped candles without a close price"
            );
        }

        Self {
            market: market.to_string(),
            timeframe,
            candles,
        }
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "candles": [
            {"startedAt": "2023-01-03T00:00:00.000Z", "market": "BTC-USD", "resolution": "1DAY",
             "open": "102.5", "high": "110", "low": "100", "close": "108.25",
             "usdVolume": "5000.5"},
            {"startedAt": "2023-01-02T00:00:00.000Z", "market": "BTC-USD", "resolution": "1DAY",
             "open": "101", "high": "103", "low": "99", "close": "", "usdVolume": "4000"},
            {"startedAt": "2023-01-01T00:00:00.000Z", "market": "BTC-USD", "resolution": "1DAY",
             "open": 100, "high": 101.5, "low": 98, "close": 101, "usdVolume": null}
        ]
    }"#;

    #[test]
    fn parses_string_and_numeric_fields() {
        let resp: CandlesResponse = serde_json::from_str(BODY).unwrap();
        assert_eq!(resp.candles.len(), 3);
        assert_eq!(resp.candles[0].close, Some(108.25));
        assert_eq!(resp.candles[0].usd_volume, Some(5000.5));
        assert_eq!(resp.candles[1].close, None);
        assert_eq!(resp.candles[2].high, Some(101.5));
        assert_eq!(resp.candles[2].usd_volume, None);
    }

    #[test]
    fn series_is_chronological_and_skips_rows_without_close() {
        let resp: CandlesResponse = serde_json::from_str(BODY).unwrap();
        let series = CandleSeries::from_raw("BTC-USD", Timeframe::OneDay, resp.candles);

        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![101.0, 108.25]);
        assert!(series.candles[0].timestamp < series.candles[1].timestamp);
        assert!(series.candles[0].volume.is_nan());
        assert_eq!(series.candles[1].volume, 5000.5);
    }

    #[test]
    fn garbage_number_is_rejected() {
        let body = r#"{"candles": [{"startedAt": "2023-01-01T00:00:00Z", "close": "abc"}]}"#;
        assert!(serde_json::from_str::<CandlesResponse>(body).is_err());
    }

    #[test]
    fn timeframe_names_match_the_exchange() {
        assert_eq!(serde_json::to_string(&Timeframe::FourHours).unwrap(), "\"4HOURS\"");
        let tf: Timeframe = serde_json::from_str("\"30MINS\"").unwrap();
        assert_eq!(tf, Timeframe::ThirtyMins);
        assert_eq!("1day".parse::<Timeframe>().unwrap(), Timeframe::OneDay);
        assert!("2DAYS".parse::<Timeframe>().is_err());
    }
}
