// crates/tracking-client/src/components/status_bar.rs

use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::App;

pub fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let (line, style) = if let Some(err) = app.tracker.error() {
        (
            Line::from(vec![Span::styled(
                format!("Error: {}", err),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )]),
            Style::default().fg(Color::Red),
        )
    } else if app.tracker.is_loading() {
        (Line::from("Connecting to tracking service..."), Style::default().fg(Color::Yellow))
    } else {
        let mut spans = vec![
            Span::styled("[R]", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::raw("efresh "),
            Span::styled("[↑/↓]", Style::default().fg(Color::Cyan)),
            Span::raw(" Select "),
            Span::styled("[Q]", Style::default().fg(Color::Gray)),
            Span::raw("uit"),
        ];
        if let Some(msg) = &app.message {
            spans.push(Span::raw("  |  "));
            spans.push(Span::styled(msg.clone(), Style::default().fg(Color::Yellow)));
        }
        (Line::from(spans), Style::default())
    };

    let paragraph = Paragraph::new(line)
        .block(Block::default().borders(Borders::ALL).border_style(style))
        .alignment(Alignment::Center);

    f.render_widget(paragraph, area);
}
