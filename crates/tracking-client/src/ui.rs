// crates/tracking-client/src/ui.rs

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use tracking_client::{ConnectionState, TrackerPhase};

use crate::app::App;
use crate::components::{fleet_table::draw_fleet_table, status_bar::draw_status_bar};

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(5),    // Drivers
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    draw_header(f, chunks[0], app);
    draw_fleet_table(f, chunks[1], app);
    draw_status_bar(f, chunks[2], app);
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let header_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    // Left: target and connection status
    let (status, color) = match app.manager.state() {
        ConnectionState::Connected => ("Connected ✓", Color::Green),
        ConnectionState::Connecting => ("Reconnecting…", Color::Yellow),
        ConnectionState::Disconnected => ("Disconnected ✗", Color::Red),
    };
    let phase = match app.tracker.phase() {
        TrackerPhase::Idle => "idle",
        TrackerPhase::Connecting => "waiting",
        TrackerPhase::Subscribed => "live",
        TrackerPhase::TornDown => "closed",
    };

    let left = vec![
        Span::styled(app.title(), Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" - "),
        Span::styled(status, Style::default().fg(color)),
        Span::raw(format!(" ({})", phase)),
    ];
    f.render_widget(
        Paragraph::new(Line::from(left)).block(Block::default().borders(Borders::ALL)),
        header_chunks[0],
    );

    // Right: latest server stats
    let stats_text = match app.stats.lock().as_ref() {
        Some(stats) => format_stats(stats),
        None => "No server stats yet".to_string(),
    };
    f.render_widget(
        Paragraph::new(stats_text)
            .style(Style::default().fg(Color::Yellow))
            .block(Block::default().borders(Borders::ALL)),
        header_chunks[1],
    );
}

fn format_stats(stats: &serde_json::Value) -> String {
    match stats.as_object() {
        Some(map) => map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join(" | "),
        None => stats.to_string(),
    }
}
