// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Terminal User Interface (TUI)
//!
//! The same Core / Memory / Performance panels as the desktop window,
//! drawn with ratatui on a crossterm terminal.

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, prelude::Backend, Terminal};
use std::io;
use std::time::{Duration, Instant};

mod app;
mod ui;

pub use app::App;

use crate::shell::ShellController;

/// Run the TUI until the user quits.
pub fn run(shell: ShellController) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(shell);
    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

/// Event loop with a fixed redraw tick
fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    const TICK_MS: u64 = 100;
    let tick_duration = Duration::from_millis(TICK_MS);
    let mut last_tick = Instant::now();

    terminal.draw(|f| ui::draw(f, app))?;

    loop {
        let timeout = tick_duration.saturating_sub(last_tick.elapsed());

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key();
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                        KeyCode::Char('1') => app.set_tab(0),
                        KeyCode::Char('2') => app.set_tab(1),
                        KeyCode::Char('3') => app.set_tab(2),
                        KeyCode::Left => app.previous_tab(),
                        KeyCode::Right | KeyCode::Tab => app.next_tab(),
                        KeyCode::Up | KeyCode::Char('p') => app.shell.select_previous(),
                        KeyCode::Down | KeyCode::Char('n') => app.shell.select_next(),
                        KeyCode::Char('u') => app.toggle_auto_update(),
                        KeyCode::Char('h') => app.toggle_heavy_mode(),
                        KeyCode::Char('e') => app.export_text(),
                        KeyCode::Char('w') => app.export_html(),
                        _ => {}
                    }
                    terminal.draw(|f| ui::draw(f, app))?;
                }
            }
        }

        if last_tick.elapsed() >= tick_duration {
            last_tick = Instant::now();
            app.shell.poll_events();
            app.shell.tick_if_due(last_tick);
            terminal.draw(|f| ui::draw(f, app))?;
        }
    }
}
