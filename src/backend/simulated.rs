// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Simulated accelerator backend
//!
//! Deterministic in-memory devices with configurable capabilities,
//! bandwidth and throughput figures, artificial call latency and failure
//! injection. Timings are computed from the configured rates, so a copy of
//! `n` bytes at `r` B/s always reports `n / r` seconds.
//!
//! Used by the test-suite, the criterion benches and `gprobe --simulate`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use super::{AcceleratorBackend, BackendError, BufferPlan, CopyKind, KernelKind, KernelProblem};
use crate::device::{
    BandwidthResults, ComputeCapability, ComputeMode, CoreAttributes, DriverAttributes,
    MemoryAttributes, PciLocation, StaticDescriptor, ThroughputResults,
};

/// One simulated device.
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    pub info: StaticDescriptor,
    /// Copy rates in bytes/s. Zero makes the copy unsupported.
    pub bandwidth: BandwidthResults,
    /// Kernel rates in ops/s. Zero makes the kernel unsupported.
    pub throughput: ThroughputResults,
    pub fail_prepare: bool,
    pub failing_copies: HashSet<CopyKind>,
    pub failing_kernels: HashSet<KernelKind>,
}

/// Architecture name and cores per multiprocessor for a capability.
fn architecture(major: u32, minor: u32) -> (&'static str, u32) {
    match (major, minor) {
        (1, _) => ("Tesla", 8),
        (2, 0) => ("Fermi", 32),
        (2, _) => ("Fermi", 48),
        (3, _) => ("Kepler", 192),
        (5, _) => ("Maxwell", 128),
        (6, 0) => ("Pascal", 64),
        (6, _) => ("Pascal", 128),
        (7, 0) | (7, 2) => ("Volta", 64),
        (7, 5) => ("Turing", 64),
        (8, 0) => ("Ampere", 64),
        (8, 9) => ("Ada Lovelace", 128),
        (8, _) => ("Ampere", 128),
        (9, _) => ("Hopper", 128),
        _ => ("", 0),
    }
}

impl SimulatedDevice {
    /// A plausible discrete GPU of the given capability.
    pub fn preset(name: &str, major: u32, minor: u32) -> Self {
        let (arch, cores_per_mp) = architecture(major, minor);
        let multiprocessors = if major >= 7 { 68 } else { 20 };
        let clock_rate_khz = 1_710_000;
        let total_cores = (multiprocessors * cores_per_mp) as f64;
        let clock_hz = clock_rate_khz as f64 * 1000.0;
        let float32 = total_cores * clock_hz * 2.0;

        let info = StaticDescriptor {
            name: name.to_string(),
            capability: ComputeCapability::new(major, minor),
            arch_name: arch.to_string(),
            core: CoreAttributes {
                clock_rate_khz,
                multiprocessors,
                cores_per_multiprocessor: cores_per_mp,
                max_threads_per_multiprocessor: if major >= 2 { 1536 } else { 1024 },
                max_threads_per_block: if major >= 2 { 1024 } else { 512 },
                warp_size: 32,
                regs_per_block: 65536,
                max_threads_dim: [1024, 1024, 64],
                max_grid_size: [2_147_483_647, 65535, 65535],
                pci: PciLocation {
                    domain: 0,
                    bus: 1,
                    device: 0,
                },
                watchdog_enabled: Some(false),
                integrated: false,
                concurrent_kernels: major >= 2,
                compute_mode: ComputeMode::Default,
                stream_priorities: major >= 3,
            },
            memory: MemoryAttributes {
                total_global: 10 * 1024 * 1024 * 1024,
                bus_width_bits: 320,
                clock_rate_khz: 9_501_000,
                ecc_enabled: false,
                l2_cache_size: if major >= 2 { 5 * 1024 * 1024 } else { 0 },
                shared_per_block: 48 * 1024,
                max_pitch: 2_147_483_647,
                total_constant: 64 * 1024,
                texture_alignment: 512,
                texture_1d: 131_072,
                texture_2d: [131_072, 65_536],
                texture_3d: [16_384, 16_384, 16_384],
                gpu_overlap: true,
                map_host_memory: true,
                unified_addressing: major >= 2,
                async_engine_count: if major >= 2 { 2 } else { 1 },
            },
            driver: DriverAttributes {
                driver_version: "550.54.14".to_string(),
                tcc_driver: false,
                driver_dll_version: 12040,
                driver_dll_version_str: String::new(),
                runtime_dll_version: 12040,
                runtime_dll_version_str: String::new(),
            },
        };

        Self {
            info,
            bandwidth: BandwidthResults {
                host_pinned_to_device: 12.5e9,
                host_pageable_to_device: 6.2e9,
                device_to_host_pinned: 13.1e9,
                device_to_host_pageable: 5.4e9,
                device_to_device: 345.0e9,
            },
            throughput: ThroughputResults {
                float32,
                float64: float32 / 32.0,
                int32: float32 / 2.0,
                int24: float32 / 4.0,
                int64: float32 / 16.0,
            },
            fail_prepare: false,
            failing_copies: HashSet::new(),
            failing_kernels: HashSet::new(),
        }
    }

    /// A device reporting major version 0 (emulator or broken probe).
    pub fn emulator() -> Self {
        let mut device = Self::preset("Device Emulation (CPU)", 0, 0);
        device.info.arch_name.clear();
        device
    }

    pub fn with_bandwidth(mut self, kind: CopyKind, bytes_per_sec: f64) -> Self {
        let b = &mut self.bandwidth;
        match kind {
            CopyKind::HostPinnedToDevice => b.host_pinned_to_device = bytes_per_sec,
            CopyKind::HostPageableToDevice => b.host_pageable_to_device = bytes_per_sec,
            CopyKind::DeviceToHostPinned => b.device_to_host_pinned = bytes_per_sec,
            CopyKind::DeviceToHostPageable => b.device_to_host_pageable = bytes_per_sec,
            CopyKind::DeviceToDevice => b.device_to_device = bytes_per_sec,
        }
        self
    }

    /// Same copy rate for all five directions.
    pub fn with_uniform_bandwidth(self, bytes_per_sec: f64) -> Self {
        CopyKind::ALL
            .iter()
            .fold(self, |device, kind| device.with_bandwidth(*kind, bytes_per_sec))
    }

    pub fn with_throughput(mut self, kernel: KernelKind, ops_per_sec: f64) -> Self {
        let t = &mut self.throughput;
        match kernel {
            KernelKind::Float32 => t.float32 = ops_per_sec,
            KernelKind::Float64 => t.float64 = ops_per_sec,
            KernelKind::Int32 => t.int32 = ops_per_sec,
            KernelKind::Int24 => t.int24 = ops_per_sec,
            KernelKind::Int64 => t.int64 = ops_per_sec,
        }
        self
    }

    pub fn failing_prepare(mut self) -> Self {
        self.fail_prepare = true;
        self
    }

    pub fn failing_copy(mut self, kind: CopyKind) -> Self {
        self.failing_copies.insert(kind);
        self
    }

    pub fn failing_kernel(mut self, kernel: KernelKind) -> Self {
        self.failing_kernels.insert(kernel);
        self
    }

    fn copy_rate(&self, kind: CopyKind) -> f64 {
        let b = &self.bandwidth;
        match kind {
            CopyKind::HostPinnedToDevice => b.host_pinned_to_device,
            CopyKind::HostPageableToDevice => b.host_pageable_to_device,
            CopyKind::DeviceToHostPinned => b.device_to_host_pinned,
            CopyKind::DeviceToHostPageable => b.device_to_host_pageable,
            CopyKind::DeviceToDevice => b.device_to_device,
        }
    }

    fn kernel_rate(&self, kernel: KernelKind) -> f64 {
        let t = &self.throughput;
        match kernel {
            KernelKind::Float32 => t.float32,
            KernelKind::Float64 => t.float64,
            KernelKind::Int32 => t.int32,
            KernelKind::Int24 => t.int24,
            KernelKind::Int64 => t.int64,
        }
    }
}

/// Call statistics, for tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedStats {
    pub prepares: usize,
    pub releases: usize,
    pub copies: usize,
    pub launches: usize,
    /// Copies or launches attempted on a device without prepared buffers.
    pub unprepared_calls: usize,
    /// Largest copy size requested.
    pub max_copy_bytes: usize,
    /// Highest number of backend calls observed in flight at once.
    pub max_concurrent_calls: usize,
}

#[derive(Debug, Default)]
struct SimState {
    prepared: HashSet<usize>,
    stats: SimulatedStats,
}

/// In-memory backend over a list of [`SimulatedDevice`]s.
pub struct SimulatedBackend {
    devices: Vec<SimulatedDevice>,
    present: bool,
    thread_safe: bool,
    latency: Duration,
    state: Mutex<SimState>,
    paused: Mutex<bool>,
    resumed: Condvar,
    in_flight: AtomicUsize,
}

struct CallGuard<'a> {
    in_flight: &'a AtomicUsize,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SimulatedBackend {
    pub fn new(devices: Vec<SimulatedDevice>) -> Self {
        Self {
            devices,
            present: true,
            thread_safe: true,
            latency: Duration::ZERO,
            state: Mutex::new(SimState::default()),
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Two usable devices plus one emulator entry that discovery drops.
    pub fn demo() -> Self {
        Self::new(vec![
            SimulatedDevice::preset("Simulated GeForce RTX 3080", 8, 6),
            SimulatedDevice::emulator(),
            SimulatedDevice::preset("Simulated GeForce GTX 280", 1, 2),
        ])
        .with_latency(Duration::from_millis(1))
    }

    /// A backend whose runtime is missing.
    pub fn absent() -> Self {
        let mut backend = Self::new(Vec::new());
        backend.present = false;
        backend
    }

    /// Sleep this long inside every prepare/copy/launch call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_thread_safe(mut self, thread_safe: bool) -> Self {
        self.thread_safe = thread_safe;
        self
    }

    /// Block prepare/copy/launch calls until resumed.
    pub fn set_paused(&self, paused: bool) {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = paused;
        if !paused {
            self.resumed.notify_all();
        }
    }

    pub fn stats(&self) -> SimulatedStats {
        self.lock_state().stats.clone()
    }

    pub fn is_prepared(&self, index: usize) -> bool {
        self.lock_state().prepared.contains(&index)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn device(&self, index: usize) -> Result<&SimulatedDevice, BackendError> {
        self.devices
            .get(index)
            .ok_or(BackendError::DeviceIndex(index))
    }

    fn enter(&self) -> CallGuard<'_> {
        let mut paused = self.paused.lock().unwrap_or_else(PoisonError::into_inner);
        while *paused {
            paused = self
                .resumed
                .wait(paused)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(paused);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.lock_state();
        state.stats.max_concurrent_calls = state.stats.max_concurrent_calls.max(now);
        drop(state);

        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        CallGuard {
            in_flight: &self.in_flight,
        }
    }

    fn check_prepared(&self, index: usize) -> Result<(), BackendError> {
        let mut state = self.lock_state();
        if state.prepared.contains(&index) {
            Ok(())
        } else {
            state.stats.unprepared_calls += 1;
            Err(BackendError::NotPrepared(index))
        }
    }
}

fn elapsed_for(amount: f64, rate: f64) -> Duration {
    Duration::from_secs_f64(amount / rate)
}

impl AcceleratorBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn is_present(&self) -> bool {
        self.present
    }

    fn device_count(&self) -> Result<usize, BackendError> {
        if !self.present {
            return Err(BackendError::Unavailable("simulated runtime absent".into()));
        }
        Ok(self.devices.len())
    }

    fn read_static_descriptor(&self, index: usize) -> Result<StaticDescriptor, BackendError> {
        Ok(self.device(index)?.info.clone())
    }

    fn prepare_device(&self, index: usize, plan: &BufferPlan) -> Result<(), BackendError> {
        let device = self.device(index)?;
        let _call = self.enter();
        if device.fail_prepare {
            return Err(BackendError::Allocation(format!(
                "cannot allocate {} bytes on simulated device {}",
                plan.copy_bytes, index
            )));
        }
        let mut state = self.lock_state();
        state.stats.prepares += 1;
        state.prepared.insert(index);
        Ok(())
    }

    fn copy(&self, index: usize, kind: CopyKind, bytes: usize) -> Result<Duration, BackendError> {
        let device = self.device(index)?;
        let _call = self.enter();
        self.check_prepared(index)?;
        {
            let mut state = self.lock_state();
            state.stats.copies += 1;
            state.stats.max_copy_bytes = state.stats.max_copy_bytes.max(bytes);
        }
        if device.failing_copies.contains(&kind) {
            return Err(BackendError::Driver(format!("simulated {} copy failure", kind)));
        }
        let rate = device.copy_rate(kind);
        if rate <= 0.0 {
            return Err(BackendError::Unsupported(format!("{} copy", kind)));
        }
        Ok(elapsed_for(bytes as f64, rate))
    }

    fn launch_kernel(
        &self,
        index: usize,
        kernel: KernelKind,
        problem: &KernelProblem,
    ) -> Result<Duration, BackendError> {
        let device = self.device(index)?;
        let _call = self.enter();
        self.check_prepared(index)?;
        self.lock_state().stats.launches += 1;
        if device.failing_kernels.contains(&kernel) {
            return Err(BackendError::Driver(format!("simulated {} kernel failure", kernel)));
        }
        let rate = device.kernel_rate(kernel);
        if rate <= 0.0 {
            return Err(BackendError::Unsupported(format!("{} kernel", kernel)));
        }
        Ok(elapsed_for(problem.total_ops() as f64, rate))
    }

    fn release_device(&self, index: usize) -> Result<(), BackendError> {
        self.device(index)?;
        let mut state = self.lock_state();
        if state.prepared.remove(&index) {
            state.stats.releases += 1;
            Ok(())
        } else {
            Err(BackendError::NotPrepared(index))
        }
    }

    fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_capabilities() {
        let device = SimulatedDevice::preset("Test", 8, 6);
        assert_eq!(device.info.arch_name, "Ampere");
        assert_eq!(device.info.core.cores_per_multiprocessor, 128);
        assert!(device.throughput.float32 > device.throughput.float64);
    }

    #[test]
    fn test_emulator_has_major_zero() {
        let device = SimulatedDevice::emulator();
        assert!(!device.info.capability.is_valid());
    }

    #[test]
    fn test_copy_timing_matches_rate() {
        let backend = SimulatedBackend::new(vec![
            SimulatedDevice::preset("Test", 3, 5).with_uniform_bandwidth(1.0e9)
        ]);
        backend.prepare_device(0, &BufferPlan { copy_bytes: 1 << 20 }).unwrap();
        let elapsed = backend
            .copy(0, CopyKind::HostPinnedToDevice, 500_000_000)
            .unwrap();
        assert!((elapsed.as_secs_f64() - 0.5).abs() < 1e-9);
        assert_eq!(backend.stats().max_copy_bytes, 500_000_000);
    }

    #[test]
    fn test_copy_requires_prepare() {
        let backend = SimulatedBackend::new(vec![SimulatedDevice::preset("Test", 3, 5)]);
        let err = backend.copy(0, CopyKind::DeviceToDevice, 1024).unwrap_err();
        assert!(matches!(err, BackendError::NotPrepared(0)));
        assert_eq!(backend.stats().unprepared_calls, 1);
    }

    #[test]
    fn test_failure_injection() {
        let backend = SimulatedBackend::new(vec![SimulatedDevice::preset("Test", 3, 5)
            .failing_copy(CopyKind::DeviceToHostPageable)
            .failing_kernel(KernelKind::Int24)]);
        backend.prepare_device(0, &BufferPlan { copy_bytes: 1024 }).unwrap();
        assert!(backend.copy(0, CopyKind::DeviceToHostPageable, 1024).is_err());
        assert!(backend.copy(0, CopyKind::DeviceToHostPinned, 1024).is_ok());

        let problem = KernelProblem {
            blocks: 1,
            threads_per_block: 32,
            ops_per_thread: 8,
        };
        assert!(backend.launch_kernel(0, KernelKind::Int24, &problem).is_err());
        assert!(backend.launch_kernel(0, KernelKind::Int32, &problem).is_ok());
    }

    #[test]
    fn test_prepare_failure() {
        let backend =
            SimulatedBackend::new(vec![SimulatedDevice::preset("Test", 3, 5).failing_prepare()]);
        let err = backend
            .prepare_device(0, &BufferPlan { copy_bytes: 1024 })
            .unwrap_err();
        assert!(matches!(err, BackendError::Allocation(_)));
        assert!(!backend.is_prepared(0));
    }

    #[test]
    fn test_release_balances_prepare() {
        let backend = SimulatedBackend::new(vec![SimulatedDevice::preset("Test", 3, 5)]);
        backend.prepare_device(0, &BufferPlan { copy_bytes: 1024 }).unwrap();
        backend.release_device(0).unwrap();
        assert!(backend.release_device(0).is_err());
        let stats = backend.stats();
        assert_eq!(stats.prepares, 1);
        assert_eq!(stats.releases, 1);
    }

    #[test]
    fn test_absent_backend() {
        let backend = SimulatedBackend::absent();
        assert!(!backend.is_present());
        assert!(backend.device_count().is_err());
    }
}
