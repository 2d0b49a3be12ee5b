// crates/tracking-client/src/components/fleet_table.rs

use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Row, Table, TableState},
    Frame,
};

use crate::app::{sample_age, App};

pub fn draw_fleet_table(f: &mut Frame, area: Rect, app: &App) {
    let header = Row::new(vec!["Driver", "Lat", "Lng", "Hdg", "Speed", "Status", "Age"])
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = app
        .rows
        .values()
        .map(|loc| {
            let (status, status_style) = if loc.is_online {
                ("ONLINE", Style::default().fg(Color::Green))
            } else {
                ("offline", Style::default().fg(Color::DarkGray))
            };

            Row::new(vec![
                Cell::from(app.label(loc.driver_id)),
                Cell::from(format!("{:.5}", loc.latitude)),
                Cell::from(format!("{:.5}", loc.longitude)),
                Cell::from(loc.heading.map_or("-".to_string(), |h| format!("{:.0}°", h))),
                Cell::from(loc.speed.map_or("-".to_string(), |s| format!("{:.1} m/s", s))),
                Cell::from(status).style(status_style),
                Cell::from(sample_age(loc)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Min(16),
        Constraint::Length(11),
        Constraint::Length(11),
        Constraint::Length(5),
        Constraint::Length(10),
        Constraint::Length(8),
        Constraint::Length(5),
    ];

    // Stale data stays visible while disconnected, just dimmed.
    let border_style = if app.tracker.is_connected() {
        Style::default()
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let title = format!(" {} ({}/{} online) ", app.title(), app.online_count(), app.rows.len());
    let table = Table::new(rows, widths)
        .header(header)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(border_style),
        );

    let mut state = TableState::default();
    if !app.rows.is_empty() {
        state.select(Some(app.selected));
    }
    f.render_stateful_widget(table, area, &mut state);
}
