// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Interface-side controller
//!
//! [`ShellController`] is everything a front end needs besides drawing:
//! the registry, the completion-event receiver, the current selection,
//! the auto-update and heavy-mode toggles, the update timer and the
//! results snapshot currently on screen. The GUI and TUI both drive it
//! from their event loops; it never blocks except in [`startup`].
//!
//! [`startup`]: ShellController::startup

use std::path::Path;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::AcceleratorBackend;
use crate::config::{InterfaceSection, ProbeConfig};
use crate::decode::Decoder;
use crate::device::{BenchmarkResults, DeviceDescriptor, DeviceSnapshot};
use crate::error::Result;
use crate::registry::{DeviceRegistry, DiscoveryProgress, RegistryOptions};
use crate::report::{self, ReportFormat, ReportMeta};
use crate::worker::BenchmarkEvent;

/// How long a status message stays up before the key help returns.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// One-line message shown in place of the footer help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
    set_at: Instant,
}

impl StatusMessage {
    fn new(text: String, is_error: bool) -> Self {
        Self {
            text,
            is_error,
            set_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.set_at) >= STATUS_TIMEOUT
    }
}

pub struct ShellController {
    registry: DeviceRegistry,
    events: Receiver<BenchmarkEvent>,
    selected: usize,
    auto_update: bool,
    heavy_mode: bool,
    interval: Duration,
    last_tick: Instant,
    displayed: Arc<BenchmarkResults>,
    status: Option<StatusMessage>,
}

impl ShellController {
    /// Discover devices and run the first benchmark pass on each.
    ///
    /// Errors here are fatal startup errors.
    pub fn startup(
        backend: Arc<dyn AcceleratorBackend>,
        config: &ProbeConfig,
        progress: &mut dyn DiscoveryProgress,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let registry =
            DeviceRegistry::discover(backend, RegistryOptions::from(config), tx, progress)?;
        for device in registry.devices() {
            device.set_heavy_mode(config.interface.heavy_mode);
        }
        registry.run_initial_benchmarks(progress);
        Ok(Self::new(registry, rx, &config.interface))
    }

    pub fn new(
        registry: DeviceRegistry,
        events: Receiver<BenchmarkEvent>,
        interface: &InterfaceSection,
    ) -> Self {
        let displayed = registry.get(0).results();
        Self {
            registry,
            events,
            selected: 0,
            auto_update: interface.auto_update,
            heavy_mode: interface.heavy_mode,
            interval: interface.update_interval(),
            last_tick: Instant::now(),
            displayed,
            status: None,
        }
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn device_count(&self) -> usize {
        self.registry.count()
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_device(&self) -> &DeviceDescriptor {
        self.registry.get(self.selected)
    }

    pub fn auto_update(&self) -> bool {
        self.auto_update
    }

    pub fn heavy_mode(&self) -> bool {
        self.heavy_mode
    }

    /// Results currently on screen (not necessarily the latest published).
    pub fn displayed_results(&self) -> &BenchmarkResults {
        &self.displayed
    }

    /// Switch the shown device.
    ///
    /// Shows the device's cached results at once and, with auto-update
    /// on, asks its worker for a fresh run.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn select_device(&mut self, index: usize) {
        let device = self.registry.get(index);
        self.selected = index;
        self.displayed = device.results();
        log::debug!("Selected device {}: {}", index, device.name());
        if self.auto_update {
            self.request_selected();
        }
    }

    pub fn select_next(&mut self) {
        let next = (self.selected + 1) % self.registry.count();
        self.select_device(next);
    }

    pub fn select_previous(&mut self) {
        let count = self.registry.count();
        self.select_device((self.selected + count - 1) % count);
    }

    /// Timer callback: re-run the selected device when auto-update is on.
    ///
    /// Returns whether a run was requested.
    pub fn on_timer_tick(&mut self) -> bool {
        self.last_tick = Instant::now();
        if !self.auto_update {
            return false;
        }
        self.request_selected();
        true
    }

    /// Fire [`on_timer_tick`](Self::on_timer_tick) when the interval has
    /// elapsed since the last tick.
    ///
    /// Also drops an expired status message.
    pub fn tick_if_due(&mut self, now: Instant) -> bool {
        self.expire_status(now);
        if now.saturating_duration_since(self.last_tick) < self.interval {
            return false;
        }
        self.on_timer_tick()
    }

    /// Time left until the next tick is due.
    pub fn time_until_tick(&self, now: Instant) -> Duration {
        self.interval
            .saturating_sub(now.saturating_duration_since(self.last_tick))
    }

    pub fn set_auto_update(&mut self, on: bool) {
        self.auto_update = on;
        self.last_tick = Instant::now();
    }

    /// Applies from the next run of the selected device.
    pub fn set_heavy_mode(&mut self, on: bool) {
        self.heavy_mode = on;
        self.selected_device().set_heavy_mode(on);
    }

    fn request_selected(&self) {
        self.selected_device().set_heavy_mode(self.heavy_mode);
        self.registry.request_run(self.selected);
    }

    /// Drain completion events without blocking.
    ///
    /// Events for other devices are discarded. Returns whether the shown
    /// results were refreshed.
    pub fn poll_events(&mut self) -> bool {
        let mut refreshed = false;
        loop {
            match self.events.try_recv() {
                Ok(event) if event.index == self.selected => {
                    self.displayed = self.selected_device().results();
                    refreshed = true;
                }
                Ok(event) => {
                    log::trace!("Ignoring completion for device {}", event.index);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        refreshed
    }

    /// Decoder over the selected device and the results on screen.
    pub fn decoder(&self) -> Decoder<'_> {
        Decoder::from_parts(self.selected_device().info(), *self.displayed)
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            index: self.selected,
            info: self.selected_device().info().clone(),
            results: *self.displayed,
        }
    }

    pub fn text_report(&self, meta: &ReportMeta) -> String {
        report::text_report(&self.snapshot(), meta)
    }

    pub fn html_report(&self, meta: &ReportMeta) -> String {
        report::html_report(&self.snapshot(), meta)
    }

    /// Write a report of what is on screen. Failures are also kept as the
    /// status line.
    pub fn export(&mut self, path: &Path, format: ReportFormat, meta: &ReportMeta) -> Result<()> {
        match report::export(path, format, &self.snapshot(), meta) {
            Ok(()) => {
                self.set_status(format!("Report saved to {}", path.display()));
                Ok(())
            }
            Err(e) => {
                log::warn!("{}", e);
                self.set_error_status(e.to_string());
                Err(e)
            }
        }
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(StatusMessage::new(message.into(), false));
    }

    pub fn set_error_status(&mut self, message: impl Into<String>) {
        self.status = Some(StatusMessage::new(message.into(), true));
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    /// Returns whether a message was dropped.
    pub fn expire_status(&mut self, now: Instant) -> bool {
        match &self.status {
            Some(status) if status.is_expired(now) => {
                self.status = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::{SimulatedBackend, SimulatedDevice};
    use crate::config::BackendKind;
    use crate::decode::FieldId;
    use crate::error::ProbeError;
    use crate::registry::NoProgress;
    use std::thread;

    fn config() -> ProbeConfig {
        let mut config = ProbeConfig::default();
        config.backend.kind = BackendKind::Simulated;
        config.benchmark.copy_payload_mib = 1;
        config.benchmark.copy_iterations = 2;
        config.benchmark.kernel_iterations = 1;
        config.interface.update_interval_ms = 100;
        config
    }

    fn two_devices() -> Arc<SimulatedBackend> {
        Arc::new(SimulatedBackend::new(vec![
            SimulatedDevice::preset("GPU A", 7, 5).with_uniform_bandwidth(6.0e9),
            SimulatedDevice::preset("GPU B", 8, 6).with_uniform_bandwidth(12.0e9),
        ]))
    }

    fn wait_for_refresh(shell: &mut ShellController) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if shell.poll_events() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_startup_measures_before_display() {
        let backend = two_devices();
        let shell = ShellController::startup(backend.clone(), &config(), &mut NoProgress).unwrap();
        assert_eq!(shell.device_count(), 2);
        assert_eq!(shell.selected(), 0);
        assert_eq!(shell.displayed_results().run, 1);
        assert_ne!(shell.decoder().value(FieldId::HostPinnedToDevice), "--");
    }

    #[test]
    fn test_startup_without_devices_is_fatal() {
        let backend = Arc::new(SimulatedBackend::new(vec![SimulatedDevice::emulator()]));
        let err = ShellController::startup(backend.clone(), &config(), &mut NoProgress)
            .err()
            .unwrap();
        assert!(matches!(err, ProbeError::NoDevices));
        assert_eq!(backend.stats().copies, 0);
    }

    #[test]
    fn test_switch_without_auto_update_shows_cached_results() {
        let backend = two_devices();
        let mut shell =
            ShellController::startup(backend.clone(), &config(), &mut NoProgress).unwrap();
        shell.poll_events();
        shell.set_auto_update(false);
        let copies_before = backend.stats().copies;
        let cached = shell.registry().get(1).results();

        shell.select_device(1);
        assert_eq!(shell.selected(), 1);
        assert_eq!(*shell.displayed_results(), *cached);
        assert!(!shell.on_timer_tick());

        thread::sleep(Duration::from_millis(100));
        assert!(!shell.poll_events());
        assert_eq!(backend.stats().copies, copies_before);
        assert_eq!(shell.registry().get(1).results().run, 1);
    }

    #[test]
    fn test_switch_with_auto_update_requests_run() {
        let backend = two_devices();
        let mut shell =
            ShellController::startup(backend.clone(), &config(), &mut NoProgress).unwrap();
        shell.poll_events();
        shell.select_device(1);
        assert!(wait_for_refresh(&mut shell));
        assert_eq!(shell.displayed_results().run, 2);
        assert_eq!(shell.decoder().info().name, "GPU B");
    }

    #[test]
    fn test_events_for_other_devices_are_ignored() {
        let backend = two_devices();
        let mut shell =
            ShellController::startup(backend.clone(), &config(), &mut NoProgress).unwrap();
        shell.poll_events();
        shell.registry().wait_for_run(1);
        assert!(!shell.poll_events());
        assert_eq!(shell.displayed_results().run, 1);
    }

    #[test]
    fn test_timer_tick_and_heavy_mode() {
        let backend = two_devices();
        let mut shell =
            ShellController::startup(backend.clone(), &config(), &mut NoProgress).unwrap();
        shell.poll_events();
        assert!(!shell.tick_if_due(Instant::now()));

        shell.set_heavy_mode(true);
        assert!(shell.tick_if_due(Instant::now() + Duration::from_millis(150)));
        assert!(wait_for_refresh(&mut shell));
        assert!(shell.displayed_results().heavy);
        assert!(shell.time_until_tick(Instant::now()) <= Duration::from_millis(100));
    }

    #[test]
    fn test_select_wraps_around() {
        let backend = two_devices();
        let mut shell =
            ShellController::startup(backend.clone(), &config(), &mut NoProgress).unwrap();
        shell.set_auto_update(false);
        shell.select_previous();
        assert_eq!(shell.selected(), 1);
        shell.select_next();
        assert_eq!(shell.selected(), 0);
    }

    #[test]
    fn test_export_failure_sets_status() {
        let backend = two_devices();
        let mut shell =
            ShellController::startup(backend.clone(), &config(), &mut NoProgress).unwrap();
        let path = Path::new("/nonexistent-dir/gprobe/report.html");
        assert!(shell
            .export(path, ReportFormat::Html, &ReportMeta::current())
            .is_err());
        let status = shell.status().unwrap();
        assert!(status.is_error);
        assert!(status.text.contains("/nonexistent-dir/gprobe/report.html"));
    }

    #[test]
    fn test_status_expires_after_timeout() {
        let backend = two_devices();
        let mut shell =
            ShellController::startup(backend.clone(), &config(), &mut NoProgress).unwrap();
        shell.set_auto_update(false);
        shell.set_status("Heavy mode: on");
        let status = shell.status().unwrap();
        assert!(!status.is_error);
        assert_eq!(status.text, "Heavy mode: on");

        let now = Instant::now();
        assert!(!shell.expire_status(now));
        assert!(shell.status().is_some());

        shell.tick_if_due(now + STATUS_TIMEOUT + Duration::from_millis(10));
        assert!(shell.status().is_none());
        assert!(!shell.expire_status(now + STATUS_TIMEOUT * 2));
    }

    #[test]
    fn test_successful_export_is_not_an_error() {
        let backend = two_devices();
        let mut shell =
            ShellController::startup(backend.clone(), &config(), &mut NoProgress).unwrap();
        let path = std::env::temp_dir().join(format!("gprobe-shell-{}.txt", std::process::id()));
        shell
            .export(&path, ReportFormat::Text, &ReportMeta::current())
            .unwrap();
        let status = shell.status().unwrap();
        assert!(!status.is_error);
        assert!(status.text.starts_with("Report saved to "));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_reports_follow_selection() {
        let backend = two_devices();
        let mut shell =
            ShellController::startup(backend.clone(), &config(), &mut NoProgress).unwrap();
        shell.set_auto_update(false);
        shell.select_device(1);
        let text = shell.text_report(&ReportMeta::current());
        assert!(text.contains("\tName: GPU B\n"));
        assert!(shell.html_report(&ReportMeta::current()).contains("GPU B"));
    }
}
