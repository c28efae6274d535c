// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Main window state and drawing

use std::path::PathBuf;
use std::time::{Duration, Instant};

use eframe::egui;
use egui::{Color32, RichText, ScrollArea};

use crate::decode::{FieldId, Section};
use crate::report::{ReportFormat, ReportMeta};
use crate::shell::ShellController;

/// Repaint at least this often so completion events show up promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

mod colors {
    use eframe::egui::Color32;

    pub const ACCENT: Color32 = Color32::from_rgb(0, 200, 220);
    pub const LABEL: Color32 = Color32::from_rgb(150, 150, 160);
    pub const VALUE: Color32 = Color32::from_rgb(230, 230, 235);
    pub const HEADER: Color32 = Color32::from_rgb(120, 220, 120);
    pub const MUTED: Color32 = Color32::from_rgb(110, 110, 120);
    pub const ERROR: Color32 = Color32::from_rgb(240, 90, 90);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Core,
    Memory,
    Performance,
    About,
}

impl Tab {
    fn section(self) -> Option<Section> {
        match self {
            Tab::Core => Some(Section::Core),
            Tab::Memory => Some(Section::Memory),
            Tab::Performance => Some(Section::Performance),
            Tab::About => None,
        }
    }
}

/// The main window
pub struct ProbeApp {
    shell: ShellController,
    tab: Tab,
    export_path: String,
    os_version: String,
    started: Instant,
}

impl ProbeApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, shell: ShellController) -> Self {
        let export_path = format!("{}.{}", default_report_stem(&shell), ReportFormat::Text.extension());
        Self {
            shell,
            tab: Tab::Core,
            export_path,
            os_version: crate::platform::os_version(),
            started: Instant::now(),
        }
    }

    fn draw_controls(&mut self, ui: &mut egui::Ui) {
        let mut selected = self.shell.selected();
        let current = self.shell.selected_device().name().to_string();
        ui.horizontal(|ui| {
            ui.label(RichText::new("Device:").color(colors::LABEL));
            egui::ComboBox::from_id_salt("device_select")
                .selected_text(current)
                .width(ui.available_width() - 8.0)
                .show_ui(ui, |ui| {
                    for device in self.shell.registry().devices() {
                        ui.selectable_value(&mut selected, device.index(), device.name());
                    }
                });
        });
        if selected != self.shell.selected() {
            self.shell.select_device(selected);
        }

        ui.horizontal(|ui| {
            let mut auto_update = self.shell.auto_update();
            if ui.checkbox(&mut auto_update, "Update results").changed() {
                self.shell.set_auto_update(auto_update);
            }
            let mut heavy = self.shell.heavy_mode();
            if ui
                .checkbox(&mut heavy, "Heavy mode")
                .on_hover_text("More iterations per experiment on the next run")
                .changed()
            {
                self.shell.set_heavy_mode(heavy);
            }
        });
    }

    fn draw_tab_bar(&mut self, ui: &mut egui::Ui) {
        let captions = [
            (Tab::Core, FieldId::TabCore.label()),
            (Tab::Memory, FieldId::TabMemory.label()),
            (Tab::Performance, FieldId::TabPerformance.label()),
            (Tab::About, "About"),
        ];
        ui.horizontal(|ui| {
            for (tab, caption) in captions {
                let color = if self.tab == tab {
                    colors::ACCENT
                } else {
                    colors::LABEL
                };
                ui.selectable_value(&mut self.tab, tab, RichText::new(caption).color(color));
            }
        });
    }

    fn draw_section(&self, ui: &mut egui::Ui, section: Section) {
        let fields = self.shell.decoder().section(section);
        ScrollArea::vertical().show(ui, |ui| {
            egui::Grid::new(("fields", section.title()))
                .num_columns(2)
                .spacing([24.0, 6.0])
                .striped(true)
                .show(ui, |ui| {
                    for field in fields {
                        if field.is_header() {
                            ui.label(RichText::new(field.label).strong().color(colors::HEADER));
                            ui.label("");
                        } else {
                            ui.label(RichText::new(field.label).color(colors::LABEL));
                            ui.label(RichText::new(field.value).color(colors::VALUE));
                        }
                        ui.end_row();
                    }
                });
        });
    }

    fn draw_about(&mut self, ui: &mut egui::Ui) {
        ui.heading(RichText::new(crate::APP_NAME_LONG).color(colors::ACCENT));
        ui.add_space(8.0);

        let decoder = self.shell.decoder();
        egui::Grid::new("about_grid")
            .num_columns(2)
            .spacing([24.0, 6.0])
            .show(ui, |ui| {
                let mut row = |label: &str, value: String| {
                    ui.label(RichText::new(label).color(colors::LABEL));
                    ui.label(RichText::new(value).color(colors::VALUE));
                    ui.end_row();
                };
                row("Version", crate::VERSION.to_string());
                row("Platform", crate::platform::platform_string());
                row("OS Version", self.os_version.clone());
                row("Backend", self.shell.registry().backend_name().to_string());
                for field in decoder.section(Section::Driver) {
                    row(field.label, field.value);
                }
                let uptime = self.started.elapsed().as_secs();
                row(
                    "Session",
                    format!("{:02}:{:02}:{:02}", uptime / 3600, (uptime % 3600) / 60, uptime % 60),
                );
            });

        ui.add_space(16.0);
        ui.separator();
        ui.label(RichText::new("Save report").strong());
        ui.horizontal(|ui| {
            ui.label(RichText::new("Path:").color(colors::LABEL));
            ui.add(egui::TextEdit::singleline(&mut self.export_path).desired_width(f32::INFINITY));
        });
        ui.horizontal(|ui| {
            if ui.button("Save as text").clicked() {
                self.export(ReportFormat::Text);
            }
            if ui.button("Save as HTML").clicked() {
                self.export(ReportFormat::Html);
            }
            if ui.button("Copy to clipboard").clicked() {
                let text = self.shell.text_report(&ReportMeta::current());
                ui.ctx().copy_text(text);
                self.shell.set_status("Report copied to clipboard");
            }
        });
    }

    /// Writes to the path field, swapping its extension for `format`'s.
    fn export(&mut self, format: ReportFormat) {
        let mut path = PathBuf::from(self.export_path.trim());
        if path.as_os_str().is_empty() {
            path = PathBuf::from(default_report_stem(&self.shell));
        }
        path.set_extension(format.extension());
        self.export_path = path.display().to_string();
        // Failure is already on the status line
        let _ = self.shell.export(&path, format, &ReportMeta::current());
    }

    fn draw_status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            match self.shell.status() {
                Some(status) => {
                    let color = if status.is_error {
                        colors::ERROR
                    } else {
                        colors::HEADER
                    };
                    ui.label(RichText::new(status.text.as_str()).color(color));
                }
                None => {
                    let results = self.shell.displayed_results();
                    let text = if results.is_measured() {
                        format!(
                            "Run {}{}",
                            results.run,
                            if results.heavy { " (heavy)" } else { "" }
                        )
                    } else {
                        "Not measured".to_string()
                    };
                    ui.label(RichText::new(text).color(colors::MUTED).small());
                }
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(
                    RichText::new(format!("{} device(s)", self.shell.device_count()))
                        .color(colors::MUTED)
                        .small(),
                );
            });
        });
    }
}

impl eframe::App for ProbeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.shell.poll_events();
        self.shell.tick_if_due(now);

        let wait = if self.shell.auto_update() {
            self.shell.time_until_tick(now).min(POLL_INTERVAL)
        } else {
            POLL_INTERVAL
        };
        ctx.request_repaint_after(wait);

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.add_space(4.0);
            self.draw_controls(ui);
            ui.add_space(2.0);
            self.draw_tab_bar(ui);
            ui.add_space(2.0);
        });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.add_space(2.0);
            self.draw_status_bar(ui);
            ui.add_space(2.0);
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::central_panel(&ctx.style()).fill(Color32::from_rgb(24, 24, 28)))
            .show(ctx, |ui| match self.tab.section() {
                Some(section) => self.draw_section(ui, section),
                None => self.draw_about(ui),
            });
    }
}

/// `<device-name>` lowercased with spaces replaced, e.g. `geforce_rtx_3080`.
fn default_report_stem(shell: &ShellController) -> String {
    shell
        .selected_device()
        .name()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
