use crate::analysis::StationarityRow;
use crate::candles::Timeframe;
use std::cmp::Ordering;
use std::collections::BTreeMap;

fn ranked(rows: &[StationarityRow], descending: bool) -> Vec<StationarityRow> {
    let mut sorted: Vec<StationarityRow> = rows.iter().filter(|r| !r.p.is_nan()).cloned().collect();
    // stable sort: ties keep first-seen order
    sorted.sort_by(|a, b| {
        let ord = a.p.partial_cmp(&b.p).unwrap_or(Ordering::Equal);
        if descending { ord.reverse() } else { ord }
    });
    sorted
}

/// The `n` series with the smallest p-values.
pub fn most_stationary(rows: &[StationarityRow], n: usize) -> Vec<StationarityRow> {
    let mut out = ranked(rows, false);
    out.truncate(n);
    out
}

/// The `n` series with the largest p-values.
pub fn least_stationary(rows: &[StationarityRow], n: usize) -> Vec<StationarityRow> {
    let mut out = ranked(rows, true);
    out.truncate(n);
    out
}

/// Sum of p-values per market across timeframes, ascending.
/// Markets missing any of `timeframes` are left out so every sum covers the same set.
pub fn sum_by_market(rows: &[StationarityRow], timeframes: &[Timeframe]) -> Vec<(String, f64)> {
    let mut sums: BTreeMap<&str, (f64, Vec<Timeframe>)> = BTreeMap::new();
    for row in rows {
        let entry = sums.entry(row.market.as_str()).or_default();
        entry.0 += row.p;
        entry.1.push(row.timeframe);
    }

    let mut out: Vec<(String, f64)> = sums
        .into_iter()
        .filter(|(market, (sum, seen))| {
            let complete = timeframes.iter().all(|tf| seen.contains(tf));
            if !complete {
                tracing::debug!(
                    market = %market,
                    "not every timeframe tested, leaving out of market ranking"
                );
            }
            complete && !sum.is_nan()
        })
        .map(|(market, (sum, _))| (market.to_string(), sum))
        .collect();
    out.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    out
}

/// First `n` entries of an ascending ranking.
pub fn head<T: Clone>(sorted: &[T], n: usize) -> Vec<T> {
    sorted.iter().take(n).cloned().collect()
}

/// Last `n` entries of an ascending ranking, still in ascending order.
pub fn tail<T: Clone>(sorted: &[T], n: usize) -> Vec<T> {
    sorted[sorted.len().saturating_sub(n)..].to_vec()
}
