// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! TUI state

use std::path::PathBuf;

use crate::decode::Section;
use crate::report::{ReportFormat, ReportMeta};
use crate::shell::ShellController;

const SECTIONS: [Section; 3] = [Section::Core, Section::Memory, Section::Performance];

pub struct App {
    pub shell: ShellController,
    pub selected_tab: usize,
}

impl App {
    pub fn new(shell: ShellController) -> Self {
        Self {
            shell,
            selected_tab: 0,
        }
    }

    pub fn section(&self) -> Section {
        SECTIONS[self.selected_tab.min(SECTIONS.len() - 1)]
    }

    pub fn set_tab(&mut self, tab: usize) {
        if tab < SECTIONS.len() {
            self.selected_tab = tab;
        }
    }

    pub fn next_tab(&mut self) {
        self.selected_tab = (self.selected_tab + 1) % SECTIONS.len();
    }

    pub fn previous_tab(&mut self) {
        self.selected_tab = (self.selected_tab + SECTIONS.len() - 1) % SECTIONS.len();
    }

    /// A key press replaces whatever message is up.
    pub fn on_key(&mut self) {
        self.shell.clear_status();
    }

    pub fn toggle_auto_update(&mut self) {
        let on = !self.shell.auto_update();
        self.shell.set_auto_update(on);
        self.shell
            .set_status(format!("Update results: {}", if on { "on" } else { "off" }));
    }

    pub fn toggle_heavy_mode(&mut self) {
        let on = !self.shell.heavy_mode();
        self.shell.set_heavy_mode(on);
        self.shell
            .set_status(format!("Heavy mode: {}", if on { "on" } else { "off" }));
    }

    pub fn export_text(&mut self) {
        self.export(ReportFormat::Text);
    }

    pub fn export_html(&mut self) {
        self.export(ReportFormat::Html);
    }

    /// Saves to `gprobe-<index>.<ext>` in the working directory.
    fn export(&mut self, format: ReportFormat) {
        let path = PathBuf::from(format!(
            "gprobe-{}.{}",
            self.shell.selected(),
            format.extension()
        ));
        // Status line carries the outcome
        let _ = self.shell.export(&path, format, &ReportMeta::current());
    }
}
