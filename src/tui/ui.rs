// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! TUI rendering
//!
//! - Header: device list and tab bar
//! - Body: the selected section's field table
//! - Footer: status line or key help

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Row, Table, Tabs},
    Frame,
};

use super::app::App;
use crate::decode::{FieldId, Section};

mod palette {
    use ratatui::style::Color;

    pub const TITLE: Color = Color::Cyan;
    pub const HEADER: Color = Color::Green;
    pub const LABEL: Color = Color::Gray;
    pub const VALUE: Color = Color::White;
    pub const INACTIVE: Color = Color::DarkGray;
    pub const ERROR: Color = Color::Red;
}

pub fn draw(f: &mut Frame, app: &App) {
    let device_rows = app.shell.device_count().min(6) as u16;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(device_rows + 2), // Devices
            Constraint::Length(3),               // Tab bar
            Constraint::Min(0),                  // Fields
            Constraint::Length(3),               // Footer
        ])
        .split(f.area());

    draw_devices(f, app, chunks[0]);
    draw_tab_bar(f, app, chunks[1]);
    draw_fields(f, app, app.section(), chunks[2]);
    draw_footer(f, app, chunks[3]);
}

fn draw_devices(f: &mut Frame, app: &App, area: Rect) {
    let lines: Vec<Line> = app
        .shell
        .registry()
        .devices()
        .map(|device| {
            let selected = device.index() == app.shell.selected();
            let marker = if selected { "> " } else { "  " };
            let style = if selected {
                Style::default()
                    .fg(palette::TITLE)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(palette::LABEL)
            };
            Line::from(Span::styled(
                format!("{}{}: {} ({})", marker, device.index(), device.name(), device.capability()),
                style,
            ))
        })
        .collect();

    let title = format!(
        "{} {} | {}",
        crate::APP_NAME,
        crate::VERSION,
        app.shell.registry().backend_name()
    );
    let devices = Paragraph::new(lines).block(
        Block::default().borders(Borders::ALL).title(Span::styled(
            title,
            Style::default()
                .fg(palette::TITLE)
                .add_modifier(Modifier::BOLD),
        )),
    );
    f.render_widget(devices, area);
}

fn draw_tab_bar(f: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<Line> = [FieldId::TabCore, FieldId::TabMemory, FieldId::TabPerformance]
        .into_iter()
        .map(|id| Line::from(id.label()))
        .collect();

    let flags = format!(
        "update:{} heavy:{}",
        if app.shell.auto_update() { "on" } else { "off" },
        if app.shell.heavy_mode() { "on" } else { "off" },
    );
    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title(flags))
        .select(app.selected_tab)
        .style(Style::default().fg(palette::INACTIVE))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD | Modifier::REVERSED)
                .fg(palette::TITLE),
        )
        .divider("|");
    f.render_widget(tabs, area);
}

fn draw_fields(f: &mut Frame, app: &App, section: Section, area: Rect) {
    let rows: Vec<Row> = app
        .shell
        .decoder()
        .section(section)
        .into_iter()
        .map(|field| {
            if field.is_header() {
                Row::new(vec![Span::styled(
                    field.label,
                    Style::default()
                        .fg(palette::HEADER)
                        .add_modifier(Modifier::BOLD),
                )])
            } else {
                Row::new(vec![
                    Span::styled(format!("  {}", field.label), Style::default().fg(palette::LABEL)),
                    Span::styled(field.value, Style::default().fg(palette::VALUE)),
                ])
            }
        })
        .collect();

    let table = Table::new(rows, [Constraint::Length(28), Constraint::Min(10)])
        .block(Block::default().borders(Borders::ALL).title(section.title()));
    f.render_widget(table, area);
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let line = match app.shell.status() {
        Some(status) => Line::from(Span::styled(
            status.text.clone(),
            Style::default()
                .fg(if status.is_error {
                    palette::ERROR
                } else {
                    palette::HEADER
                })
                .add_modifier(Modifier::BOLD),
        )),
        None => {
            let key = |k: &'static str| {
                Span::styled(
                    k,
                    Style::default()
                        .fg(palette::TITLE)
                        .add_modifier(Modifier::BOLD),
                )
            };
            let text = |t: &'static str| Span::styled(t, Style::default().fg(Color::Gray));
            Line::from(vec![
                key("Up/Down"),
                text(" device  "),
                key("1-3"),
                text(" tab  "),
                key("u"),
                text(" update  "),
                key("h"),
                text(" heavy  "),
                key("e/w"),
                text(" save txt/html  "),
                key("q"),
                text(" quit"),
            ])
        }
    };
    let footer = Paragraph::new(line)
        .block(Block::default().borders(Borders::ALL))
        .alignment(Alignment::Center);
    f.render_widget(footer, area);
}
