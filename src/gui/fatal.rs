// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Startup error window

use eframe::egui;
use egui::RichText;

use crate::error::ProbeError;

const ERROR_COLOR: egui::Color32 = egui::Color32::from_rgb(240, 90, 90);

/// Error text plus an OK button that closes the window.
pub struct FatalDialog {
    pub title: String,
    pub message: String,
    pub hint: Option<&'static str>,
}

impl FatalDialog {
    pub fn new(error: &ProbeError) -> Self {
        let hint = match error {
            ProbeError::NoDevices => {
                Some("Only devices with compute capability 1.0 or newer are listed.")
            }
            ProbeError::BackendUnavailable(_) => {
                Some("Check the GPU driver installation, or start with --simulate.")
            }
            _ => None,
        };
        Self {
            title: format!("{} - Error", crate::APP_NAME_LONG),
            message: error.to_string(),
            hint,
        }
    }
}

impl eframe::App for FatalDialog {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(8.0);
            ui.label(RichText::new(&self.message).strong().color(ERROR_COLOR));
            if let Some(hint) = self.hint {
                ui.add_space(4.0);
                ui.label(hint);
            }
            ui.add_space(12.0);
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
                if ui.button("OK").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;

    #[test]
    fn test_no_devices_dialog() {
        let dialog = FatalDialog::new(&ProbeError::NoDevices);
        assert_eq!(dialog.message, "No compute devices found");
        assert!(dialog.title.ends_with("- Error"));
        assert!(dialog.hint.is_some());
    }

    #[test]
    fn test_backend_error_dialog_has_no_hint() {
        let error = ProbeError::from(BackendError::DeviceIndex(3));
        let dialog = FatalDialog::new(&error);
        assert_eq!(dialog.message, error.to_string());
        assert!(dialog.hint.is_none());
    }
}
