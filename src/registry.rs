// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Device registry
//!
//! Discovers devices once at startup, drops invalid ones (major version 0),
//! assigns compacted indices and pairs every surviving device with its own
//! [`DeviceWorker`].

use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::backend::{AcceleratorBackend, SerializedBackend};
use crate::bench::BenchmarkConfig;
use crate::config::ProbeConfig;
use crate::device::DeviceDescriptor;
use crate::error::{ProbeError, Result};
use crate::worker::{BenchmarkEvent, DeviceWorker};

/// Receives human-readable progress messages during startup.
pub trait DiscoveryProgress {
    fn report(&mut self, message: &str);
}

impl<F: FnMut(&str)> DiscoveryProgress for F {
    fn report(&mut self, message: &str) {
        self(message)
    }
}

/// Discards progress messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DiscoveryProgress for NoProgress {
    fn report(&mut self, _message: &str) {}
}

/// Discovery options
#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Force one global lock around all backend calls
    pub serialize_calls: bool,
    pub benchmark: BenchmarkConfig,
}

impl From<&ProbeConfig> for RegistryOptions {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            serialize_calls: config.backend.serialize_calls,
            benchmark: config.benchmark_config(),
        }
    }
}

/// Ordered collection of discovered devices and their workers.
pub struct DeviceRegistry {
    backend: Arc<dyn AcceleratorBackend>,
    workers: Vec<DeviceWorker>,
}

impl DeviceRegistry {
    /// Probe the backend and build one worker per eligible device.
    ///
    /// Fails when the backend is absent or no eligible device remains.
    pub fn discover(
        backend: Arc<dyn AcceleratorBackend>,
        options: RegistryOptions,
        events: Sender<BenchmarkEvent>,
        progress: &mut dyn DiscoveryProgress,
    ) -> Result<Self> {
        progress.report("Checking accelerator backend...");
        if !backend.is_present() {
            return Err(ProbeError::BackendUnavailable(format!(
                "{} runtime not found",
                backend.name()
            )));
        }

        let backend: Arc<dyn AcceleratorBackend> =
            if options.serialize_calls || !backend.is_thread_safe() {
                log::debug!("Serializing all {} backend calls", backend.name());
                Arc::new(SerializedBackend::new(backend))
            } else {
                backend
            };

        let count = backend.device_count()?;
        progress.report(&format!("Found {} compute device(s)...", count));
        log::info!("{} backend reports {} device(s)", backend.name(), count);

        let mut workers = Vec::with_capacity(count);
        for raw in 0..count {
            let info = match backend.read_static_descriptor(raw) {
                Ok(info) => info,
                Err(e) => {
                    log::warn!("Cannot read device {}: {}", raw, e);
                    continue;
                }
            };
            if !info.capability.is_valid() {
                log::info!("Skipping device {} ({}): compute capability 0", raw, info.name);
                continue;
            }
            log::info!(
                "Device {}: {} (compute {})",
                workers.len(),
                info.name,
                info.capability
            );
            let device = Arc::new(DeviceDescriptor::new(workers.len(), raw, info));
            workers.push(DeviceWorker::new(
                device,
                Arc::clone(&backend),
                options.benchmark.clone(),
                events.clone(),
            ));
        }

        if workers.is_empty() {
            return Err(ProbeError::NoDevices);
        }
        Ok(Self { backend, workers })
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn count(&self) -> usize {
        self.workers.len()
    }

    /// # Panics
    ///
    /// Panics if `index >= self.count()`.
    pub fn get(&self, index: usize) -> &DeviceDescriptor {
        self.worker(index).device()
    }

    /// # Panics
    ///
    /// Panics if `index >= self.count()`.
    pub fn worker(&self, index: usize) -> &DeviceWorker {
        assert!(
            index < self.workers.len(),
            "device index {} out of range (count {})",
            index,
            self.workers.len()
        );
        &self.workers[index]
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.workers.iter().map(DeviceWorker::device)
    }

    pub fn request_run(&self, index: usize) {
        self.worker(index).request_run(index);
    }

    pub fn wait_for_run(&self, index: usize) {
        self.worker(index).wait_for_run(index);
    }

    /// Synchronous first pass on every device, before anything is shown.
    pub fn run_initial_benchmarks(&self, progress: &mut dyn DiscoveryProgress) {
        for (index, worker) in self.workers.iter().enumerate() {
            progress.report(&format!(
                "Testing device performance: {}...",
                worker.device().name()
            ));
            worker.wait_for_run(index);
        }
    }

    /// `passes` synchronous passes over every device; the last one stays
    /// published.
    pub fn run_batch(&self, passes: u32, progress: &mut dyn DiscoveryProgress) {
        for pass in 1..=passes.max(1) {
            for (index, worker) in self.workers.iter().enumerate() {
                progress.report(&format!(
                    "Pass {}/{}: {}...",
                    pass,
                    passes.max(1),
                    worker.device().name()
                ));
                worker.wait_for_run(index);
            }
        }
    }

    /// `passes` synchronous passes over device `index` only; other devices
    /// are left untouched.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.count()`.
    pub fn run_batch_on(&self, index: usize, passes: u32, progress: &mut dyn DiscoveryProgress) {
        let worker = self.worker(index);
        let passes = passes.max(1);
        for pass in 1..=passes {
            progress.report(&format!(
                "Pass {}/{}: {}...",
                pass,
                passes,
                worker.device().name()
            ));
            worker.wait_for_run(index);
        }
    }

    /// Stop every worker thread and release device buffers.
    pub fn shutdown(&self) {
        for worker in &self.workers {
            worker.shutdown();
        }
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::{SimulatedBackend, SimulatedDevice};
    use std::sync::mpsc;
    use std::time::Duration;

    fn small_options() -> RegistryOptions {
        RegistryOptions {
            serialize_calls: false,
            benchmark: BenchmarkConfig {
                copy_bytes: 1 << 20,
                copy_iterations: 2,
                kernel_iterations: 1,
                heavy_multiplier: 2,
            },
        }
    }

    fn discover(backend: Arc<SimulatedBackend>) -> Result<DeviceRegistry> {
        let (tx, _rx) = mpsc::channel();
        DeviceRegistry::discover(backend, small_options(), tx, &mut NoProgress)
    }

    #[test]
    fn test_filters_major_zero_and_compacts_indices() {
        let backend = Arc::new(SimulatedBackend::new(vec![
            SimulatedDevice::emulator(),
            SimulatedDevice::preset("GPU A", 7, 5),
            SimulatedDevice::emulator(),
            SimulatedDevice::preset("GPU B", 8, 6),
        ]));
        let registry = discover(backend).unwrap();

        assert_eq!(registry.count(), 2);
        assert_eq!(registry.get(0).name(), "GPU A");
        assert_eq!(registry.get(0).index(), 0);
        assert_eq!(registry.get(0).backend_index(), 1);
        assert_eq!(registry.get(1).name(), "GPU B");
        assert_eq!(registry.get(1).index(), 1);
        assert_eq!(registry.get(1).backend_index(), 3);
        let names: Vec<_> = registry.devices().map(|d| d.name().to_string()).collect();
        assert_eq!(names, ["GPU A", "GPU B"]);
    }

    #[test]
    fn test_no_eligible_devices_is_fatal() {
        let backend = Arc::new(SimulatedBackend::new(vec![SimulatedDevice::emulator()]));
        let err = discover(backend.clone()).err().unwrap();
        assert!(matches!(err, ProbeError::NoDevices));
        assert!(err.is_fatal_startup());
        assert_eq!(backend.stats().prepares, 0);
        assert_eq!(backend.stats().copies, 0);
    }

    #[test]
    fn test_absent_backend_is_fatal() {
        let err = discover(Arc::new(SimulatedBackend::absent())).err().unwrap();
        assert!(matches!(err, ProbeError::BackendUnavailable(_)));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_get_out_of_range_panics() {
        let backend = Arc::new(SimulatedBackend::new(vec![SimulatedDevice::preset("GPU", 3, 5)]));
        let registry = discover(backend).unwrap();
        registry.get(1);
    }

    #[test]
    fn test_progress_messages() {
        let backend = Arc::new(SimulatedBackend::new(vec![SimulatedDevice::preset("GPU", 3, 5)]));
        let (tx, _rx) = mpsc::channel();
        let mut messages = Vec::new();
        let mut record = |m: &str| messages.push(m.to_string());
        let registry = DeviceRegistry::discover(backend, small_options(), tx, &mut record).unwrap();
        registry.run_initial_benchmarks(&mut record);
        drop(registry);

        assert_eq!(messages[0], "Checking accelerator backend...");
        assert_eq!(messages[1], "Found 1 compute device(s)...");
        assert!(messages[2].contains("GPU"));
    }

    #[test]
    fn test_initial_benchmarks_measure_every_device() {
        let backend = Arc::new(SimulatedBackend::new(vec![
            SimulatedDevice::preset("GPU A", 7, 5),
            SimulatedDevice::preset("GPU B", 8, 6),
        ]));
        let registry = discover(backend.clone()).unwrap();
        registry.run_initial_benchmarks(&mut NoProgress);
        for device in registry.devices() {
            assert_eq!(device.results().run, 1);
            assert!(device.results().bandwidth.device_to_device > 0.0);
        }

        registry.shutdown();
        let stats = backend.stats();
        assert_eq!(stats.prepares, 2);
        assert_eq!(stats.releases, 2);
    }

    #[test]
    fn test_batch_passes_last_wins() {
        let backend = Arc::new(SimulatedBackend::new(vec![SimulatedDevice::preset("GPU", 3, 5)]));
        let registry = discover(backend.clone()).unwrap();
        registry.run_batch(2, &mut NoProgress);
        assert_eq!(registry.get(0).results().run, 2);
        // 2 passes x 5 copies x 2 iterations
        assert_eq!(backend.stats().copies, 20);
    }

    #[test]
    fn test_batch_on_one_device_leaves_others_idle() {
        let backend = Arc::new(SimulatedBackend::new(vec![
            SimulatedDevice::preset("GPU A", 7, 5),
            SimulatedDevice::preset("GPU B", 8, 6),
            SimulatedDevice::preset("GPU C", 6, 1),
        ]));
        let registry = discover(backend.clone()).unwrap();
        registry.run_batch_on(1, 2, &mut NoProgress);

        let runs: Vec<u64> = registry.devices().map(|d| d.results().run).collect();
        assert_eq!(runs, [0, 2, 0]);
        assert_eq!(backend.stats().prepares, 1);
        assert!(backend.is_prepared(1));
        assert!(!backend.is_prepared(0));
        assert!(!backend.is_prepared(2));
    }

    #[test]
    fn test_non_thread_safe_backend_is_serialized() {
        let backend = Arc::new(
            SimulatedBackend::new(vec![
                SimulatedDevice::preset("GPU A", 7, 5),
                SimulatedDevice::preset("GPU B", 8, 6),
            ])
            .with_latency(Duration::from_millis(1))
            .with_thread_safe(false),
        );
        let registry = discover(backend.clone()).unwrap();
        registry.request_run(0);
        registry.request_run(1);
        registry.wait_for_run(0);
        registry.wait_for_run(1);
        assert_eq!(backend.stats().max_concurrent_calls, 1);
    }

    #[test]
    fn test_events_carry_registry_index() {
        let backend = Arc::new(SimulatedBackend::new(vec![
            SimulatedDevice::emulator(),
            SimulatedDevice::preset("GPU", 3, 5),
        ]));
        let (tx, rx) = mpsc::channel();
        let registry = DeviceRegistry::discover(backend, small_options(), tx, &mut NoProgress).unwrap();
        registry.request_run(0);
        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event.index, 0);
    }
}
