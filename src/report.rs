use crate::analysis::{Analysis, MarketSummary, StationarityRow};
use crate::candles::Timeframe;
use crate::ranking;
use chrono::{DateTime, Utc};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

/// Brightness for a p-value: bright when strongly stationary, dim towards p = 1.
fn visibility_ratio(p: f64) -> f64 {
    (0.4 + 0.6 * (1.0 - p)).clamp(0.4, 1.0)
}

fn p_cell(p: f64) -> Cell {
    let ratio = visibility_ratio(p);
    let color = if p < 0.05 {
        Color::Rgb {
            r: 0,
            g: (255.0 * ratio) as u8,
            b: 0,
        }
    } else {
        let gray = (200.0 * ratio) as u8;
        Color::Rgb {
            r: gray,
            g: gray,
            b: gray,
        }
    };
    Cell::new(format!("{:.4}", p))
        .fg(color)
        .set_alignment(CellAlignment::Right)
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

pub fn results_table(rows: &[StationarityRow]) -> Table {
    let mut table = new_table(&["#", "Market", "Timeframe", "p"]);
    for (i, row) in rows.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i).fg(Color::DarkGrey),
            Cell::new(&row.market).fg(Color::Cyan),
            Cell::new(row.timeframe),
            p_cell(row.p),
        ]);
    }
    table
}

pub fn market_sums_table(sums: &[(String, f64)], markets: &[MarketSummary]) -> Table {
    let mut table = new_table(&["Market", "Sum of p", "Trades 24h"]);
    for (market, sum) in sums {
        let trades = markets
            .iter()
            .find(|m| &m.info.market == market)
            .map(|m| m.info.trades_24h.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        table.add_row(vec![
            Cell::new(market).fg(Color::Cyan),
            Cell::new(format!("{:.4}", sum)).set_alignment(CellAlignment::Right),
            Cell::new(trades)
                .fg(Color::DarkGrey)
                .set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%d-%m-%Y %H:%M").to_string()
}

fn print_extreme(label: &str, row: &StationarityRow, analysis: &Analysis) {
    let span = analysis
        .series_for(row)
        .and_then(|d| {
            let candles = &d.series.candles;
            Some((candles.first()?.timestamp, candles.last()?.timestamp))
        })
        .map(|(from, to)| {
            format!(" ({} .. {} UTC)", format_timestamp(from), format_timestamp(to))
        })
        .unwrap_or_default();
    println!("printing the {}: {} {:.4} {}{}", label, row.market, row.p, row.timeframe, span);
}

/// Prints everything the run produced: the full table, the extreme series and the market ranking.
pub fn print_report(analysis: &Analysis, timeframes: &[Timeframe], top_n: usize) {
    if analysis.rows.is_empty() {
        println!("No series could be tested.");
        return;
    }

    println!("\n{}", results_table(&analysis.rows));

    println!();
    for row in ranking::most_stationary(&analysis.rows, top_n) {
        print_extreme("most stationary", &row, analysis);
    }
    for row in ranking::least_stationary(&analysis.rows, top_n) {
        print_extreme("least stationary", &row, analysis);
    }

    for summary in &analysis.markets {
        tracing::debug!(market = %summary.info.market, total_p = summary.total_p, "market total");
    }
    let sums = ranking::sum_by_market(&analysis.rows, timeframes);
    let partial = analysis
        .markets
        .iter()
        .filter(|m| !sums.iter().any(|(market, _)| market == &m.info.market))
        .count();
    if partial > 0 {
        tracing::info!(
            markets = partial,
            "markets without a full set of timeframes left out of the ranking"
        );
    }
    println!(
        "\nSmallest values:\n{}",
        market_sums_table(&ranking::head(&sums, top_n), &analysis.markets)
    );
    println!(
        "\nLargest values:\n{}",
        market_sums_table(&ranking::tail(&sums, top_n), &analysis.markets)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_is_bounded() {
        assert_eq!(visibility_ratio(0.0), 1.0);
        assert_eq!(visibility_ratio(1.0), 0.4);
        assert_eq!(visibility_ratio(7.0), 0.4);
        assert!(visibility_ratio(0.5) > visibility_ratio(0.9));
    }

    #[test]
    fn results_table_has_a_row_per_series() {
        let rows = vec![
            StationarityRow {
                market: "BTC-USD".into(),
                timeframe: Timeframe::OneDay,
                p: 0.01,
            },
            StationarityRow {
                market: "ETH-USD".into(),
                timeframe: Timeframe::OneHour,
                p: 0.73,
            },
        ];
        let rendered = results_table(&rows).to_string();
        assert!(rendered.contains("BTC-USD"));
        assert!(rendered.contains("1HOUR"));
        assert!(rendered.contains("0.7300"));
    }

    #[test]
    fn market_table_shows_trade_counts() {
        use crate::find_markets::MarketInfo;
        let markets = vec![MarketSummary {
            info: MarketInfo {
                market: "BTC-USD".into(),
                trades_24h: 2300,
            },
            total_p: 0.5,
        }];
        let sums = vec![("BTC-USD".to_string(), 0.5), ("ETH-USD".to_string(), 0.9)];
        let rendered = market_sums_table(&sums, &markets).to_string();
        assert!(rendered.contains("2300"));
        assert!(rendered.contains("N/A"));
    }

    #[test]
    fn timestamps_render_day_first() {
        let ts: DateTime<Utc> = "2023-04-05T06:07:00Z".parse().unwrap();
        assert_eq!(format_timestamp(ts), "05-04-2023 06:07");
    }
}
