// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Desktop interface (egui/eframe)
//!
//! Launch with [`run`] after [`ShellController::startup`] has measured
//! every device once.

mod app;
mod fatal;

pub use app::ProbeApp;
pub use fatal::FatalDialog;

use crate::error::ProbeError;
use crate::shell::ShellController;

/// Open the main window and block until it is closed.
pub fn run(shell: ShellController) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(crate::APP_NAME_LONG)
            .with_inner_size([460.0, 640.0])
            .with_min_inner_size([380.0, 480.0]),
        ..Default::default()
    };

    eframe::run_native(
        crate::APP_NAME,
        options,
        Box::new(|cc| Ok(Box::new(ProbeApp::new(cc, shell)))),
    )
}

/// Show a blocking error window for a startup failure.
///
/// Returns once the user dismisses it.
pub fn show_fatal(error: &ProbeError) -> eframe::Result<()> {
    let dialog = FatalDialog::new(error);
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(dialog.title.clone())
            .with_inner_size([420.0, 160.0])
            .with_resizable(false),
        ..Default::default()
    };

    eframe::run_native(
        crate::APP_NAME,
        options,
        Box::new(|_cc| Ok(Box::new(dialog))),
    )
}
