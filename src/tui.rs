use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    text::Line,
    symbols,
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, Paragraph},
};
use std::io;
use std::time::Duration;

use crate::analysis::{Analysis, StationarityRow};
use crate::ranking;
use crate::report::format_timestamp;

// --- Data & App State ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Group {
    Most,
    Least,
}

#[derive(Debug, Clone)]
pub struct ChartEntry {
    pub group: Group,
    pub row: StationarityRow,
    /// (unix seconds, close)
    pub points: Vec<(f64, f64)>,
}

impl ChartEntry {
    fn label(&self) -> String {
        format!("{} {} p={:.3}", self.row.market, self.row.timeframe, self.row.p)
    }
}

/// The series worth looking at: the `top_n` most and least stationary ones.
pub fn chart_entries(analysis: &Analysis, top_n: usize) -> Vec<ChartEntry> {
    let most = ranking::most_stationary(&analysis.rows, top_n)
        .into_iter()
        .map(|row| (Group::Most, row));
    let least = ranking::least_stationary(&analysis.rows, top_n)
        .into_iter()
        .map(|row| (Group::Least, row));

    most.chain(least)
        .filter_map(|(group, row)| {
            let detail = analysis.series_for(&row)?;
            let points = detail
                .series
                .candles
                .iter()
                .map(|c| (c.timestamp.timestamp() as f64, c.close))
                .collect();
            Some(ChartEntry { group, row, points })
        })
        .collect()
}

struct App {
    entries: Vec<ChartEntry>,
    selected: usize,
}

impl App {
    fn select_prev(&mut self) {
        if !self.entries.is_empty() {
            self.selected = self
                .selected
                .checked_sub(1)
                .unwrap_or(self.entries.len() - 1);
        }
    }

    fn select_next(&mut self) {
        if !self.entries.is_empty() {
            self.selected = (self.selected + 1) % self.entries.len();
        }
    }
}

// --- TUI ---

/// **Chart Viewer**
/// Takes over the terminal until the user quits, then restores it even when
/// drawing failed. Nothing is shown when there is nothing to chart.
pub fn run_chart_viewer(entries: Vec<ChartEntry>) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App {
        entries,
        selected: 0,
    };
    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    res
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            // resize events just fall through to the next draw
            if let Event::Key(key) = event::read()? {
                if !handle_key_event(key, app) {
                    return Ok(());
                }
            }
        }
    }
}

/// Returns false when the viewer should close.
fn handle_key_event(key: KeyEvent, app: &mut App) -> bool {
    if key.kind != KeyEventKind::Press {
        return true;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::Up => app.select_prev(),
        KeyCode::Down => app.select_next(),
        KeyCode::Char(c) => {
            if let Some(digit) = c.to_digit(10) {
                if digit > 0 && digit as usize <= app.entries.len() {
                    app.selected = digit as usize - 1;
                }
            }
        }
        _ => {}
    }
    true
}

fn ui(f: &mut Frame, app: &App) {
    let main_layout = Layout::horizontal([Constraint::Percentage(28), Constraint::Percentage(72)])
        .split(f.size());

    // Render the sidebar
    let sidebar_block = Block::default().borders(Borders::ALL).title("Series");
    let inner_sidebar_area = sidebar_block.inner(main_layout[0]);
    f.render_widget(sidebar_block, main_layout[0]);

    let sidebar_chunks = Layout::vertical([
        Constraint::Min(1),    // series list
        Constraint::Length(1), // key help
    ])
    .split(inner_sidebar_area);

    let mut lines: Vec<Line> = Vec::new();
    let mut current_group = None;
    for (i, entry) in app.entries.iter().enumerate() {
        if current_group != Some(entry.group) {
            let heading = match entry.group {
                Group::Most => "Most stationary",
                Group::Least => "Least stationary",
            };
            lines.push(
                Line::from(heading).style(Style::default().add_modifier(Modifier::BOLD)),
            );
            current_group = Some(entry.group);
        }
        let mut line = Line::from(format!("{} {}", i + 1, entry.label()));
        if i == app.selected {
            line = line.style(Style::default().fg(Color::Yellow).bg(Color::DarkGray));
        }
        lines.push(line);
    }
    f.render_widget(Paragraph::new(lines), sidebar_chunks[0]);
    f.render_widget(
        Paragraph::new("↑/↓ select, q quits").alignment(Alignment::Center),
        sidebar_chunks[1],
    );

    // Render the selected chart
    let Some(entry) = app.entries.get(app.selected) else {
        return;
    };
    render_chart(f, entry, main_layout[1]);
}

fn bounds(points: &[(f64, f64)]) -> ([f64; 2], [f64; 2]) {
    let mut x = [f64::INFINITY, f64::NEG_INFINITY];
    let mut y = [f64::INFINITY, f64::NEG_INFINITY];
    for &(px, py) in points {
        x = [x[0].min(px), x[1].max(px)];
        y = [y[0].min(py), y[1].max(py)];
    }
    if points.is_empty() {
        return ([0.0, 1.0], [0.0, 1.0]);
    }
    // keep flat series visible
    if y[0] == y[1] {
        y = [y[0] - 1.0, y[1] + 1.0];
    }
    (x, y)
}

fn time_label(secs: f64) -> Span<'static> {
    let label = chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(format_timestamp)
        .unwrap_or_else(|| "Unknown Time".to_string());
    Span::raw(label)
}

fn render_chart(f: &mut Frame, entry: &ChartEntry, area: Rect) {
    let (x_bounds, y_bounds) = bounds(&entry.points);
    let color = match entry.group {
        Group::Most => Color::Green,
        Group::Least => Color::Red,
    };

    let datasets = vec![
        Dataset::default()
            .name("close")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(color))
            .data(&entry.points),
    ];

    let mid = (y_bounds[0] + y_bounds[1]) / 2.0;
    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(entry.label()))
        .x_axis(
            Axis::default()
                .title("time (UTC)")
                .style(Style::default().fg(Color::Gray))
                .bounds(x_bounds)
                .labels(vec![time_label(x_bounds[0]), time_label(x_bounds[1])]),
        )
        .y_axis(
            Axis::default()
                .title("close")
                .style(Style::default().fg(Color::Gray))
                .bounds(y_bounds)
                .labels(vec![
                    Span::raw(format!("{:.4}", y_bounds[0])),
                    Span::raw(format!("{:.4}", mid)),
                    Span::raw(format!("{:.4}", y_bounds[1])),
                ]),
        );
    f.render_widget(chart, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SeriesResult;
    use crate::candles::{Candle, CandleSeries, Timeframe};
    use crate::stationarity;
    use crate::stationarity::tests::ar1;
    use chrono::{TimeDelta, Utc};

    fn analysis_with(closes: &[(&str, Vec<f64>)]) -> Analysis {
        let start = Utc::now();
        let mut analysis = Analysis::default();
        for (market, values) in closes {
            let candles = values
                .iter()
                .enumerate()
                .map(|(i, &close)| Candle {
                    timestamp: start + TimeDelta::hours(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 0.0,
                })
                .collect();
            let series = CandleSeries {
                market: market.to_string(),
                timeframe: Timeframe::OneHour,
                candles,
            };
            let adf = stationarity::adfuller(&series.closes()).unwrap();
            analysis.rows.push(StationarityRow {
                market: market.to_string(),
                timeframe: Timeframe::OneHour,
                p: adf.p_value,
            });
            analysis
                .details
                .insert((market.to_string(), Timeframe::OneHour), SeriesResult { adf, series });
        }
        analysis
    }

    #[test]
    fn entries_cover_both_ends_of_the_ranking() {
        let explosive = ar1(1.03, 10.0, 60, 5);
        let choppy = ar1(0.1, 0.0, 60, 9);
        let analysis = analysis_with(&[("UP-USD", explosive), ("CHOP-USD", choppy)]);

        let entries = chart_entries(&analysis, 1);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].group, Group::Most);
        assert_eq!(entries[0].row.market, "CHOP-USD");
        assert_eq!(entries[1].group, Group::Least);
        assert_eq!(entries[1].row.market, "UP-USD");
        assert_eq!(entries[1].points.len(), 60);
        assert!(entries[1].points.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn keys_move_the_selection() {
        let entry = ChartEntry {
            group: Group::Most,
            row: StationarityRow {
                market: "BTC-USD".into(),
                timeframe: Timeframe::OneDay,
                p: 0.1,
            },
            points: vec![(0.0, 1.0)],
        };
        let mut app = App {
            entries: vec![entry.clone(), entry.clone(), entry],
            selected: 0,
        };

        assert!(handle_key_event(KeyEvent::from(KeyCode::Up), &mut app));
        assert_eq!(app.selected, 2);
        assert!(handle_key_event(KeyEvent::from(KeyCode::Down), &mut app));
        assert_eq!(app.selected, 0);
        assert!(handle_key_event(KeyEvent::from(KeyCode::Char('2')), &mut app));
        assert_eq!(app.selected, 1);
        assert!(handle_key_event(KeyEvent::from(KeyCode::Char('9')), &mut app));
        assert_eq!(app.selected, 1);
        assert!(!handle_key_event(KeyEvent::from(KeyCode::Char('q')), &mut app));
    }

    #[test]
    fn flat_series_gets_a_visible_range() {
        let (x, y) = bounds(&[(1.0, 5.0), (2.0, 5.0)]);
        assert_eq!(x, [1.0, 2.0]);
        assert_eq!(y, [4.0, 6.0]);
    }
}
