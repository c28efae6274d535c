// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Device descriptor model
//!
//! A [`DeviceDescriptor`] pairs the static capabilities read once at
//! discovery ([`StaticDescriptor`]) with the latest benchmark results.
//! Static attributes are never mutated after discovery. Results are
//! published as a whole struct through [`ResultCell`], so a reader always
//! sees one complete run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Compute capability version (major.minor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ComputeCapability {
    pub major: u32,
    pub minor: u32,
}

impl ComputeCapability {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// A major version of zero marks an invalid or emulated device.
    pub fn is_valid(&self) -> bool {
        self.major != 0
    }

    /// Double-precision arithmetic is available from 1.3 on.
    pub fn supports_double(&self) -> bool {
        *self >= ComputeCapability::new(1, 3)
    }
}

impl fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Device compute mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ComputeMode {
    Default,
    Exclusive,
    Prohibited,
    #[default]
    Unknown,
}

impl fmt::Display for ComputeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "Default"),
            Self::Exclusive => write!(f, "Compute-exclusive"),
            Self::Prohibited => write!(f, "Compute-prohibited"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// PCI location of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PciLocation {
    pub domain: u32,
    pub bus: u32,
    pub device: u32,
}

impl fmt::Display for PciLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.domain, self.bus, self.device)
    }
}

/// Core (execution) attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoreAttributes {
    /// Shader clock in kHz.
    pub clock_rate_khz: u64,
    pub multiprocessors: u32,
    /// Cores per multiprocessor (0 = unknown).
    pub cores_per_multiprocessor: u32,
    pub max_threads_per_multiprocessor: u32,
    pub max_threads_per_block: u32,
    /// Warp (SIMD) width.
    pub warp_size: u32,
    pub regs_per_block: u32,
    pub max_threads_dim: [u32; 3],
    pub max_grid_size: [u32; 3],
    pub pci: PciLocation,
    /// Kernel run-time limit; `None` when the driver does not say.
    pub watchdog_enabled: Option<bool>,
    pub integrated: bool,
    pub concurrent_kernels: bool,
    pub compute_mode: ComputeMode,
    pub stream_priorities: bool,
}

impl CoreAttributes {
    /// Total core count, or 0 when cores per multiprocessor is unknown.
    pub fn total_cores(&self) -> u32 {
        self.multiprocessors
            .saturating_mul(self.cores_per_multiprocessor)
    }
}

/// Memory attributes. Sizes are in bytes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryAttributes {
    pub total_global: u64,
    pub bus_width_bits: u32,
    /// Memory clock in kHz.
    pub clock_rate_khz: u64,
    pub ecc_enabled: bool,
    /// 0 when the device has no L2 cache.
    pub l2_cache_size: u64,
    pub shared_per_block: u64,
    pub max_pitch: u64,
    pub total_constant: u64,
    pub texture_alignment: u64,
    pub texture_1d: u64,
    pub texture_2d: [u64; 2],
    pub texture_3d: [u64; 3],
    /// Copy engine can overlap with kernel execution.
    pub gpu_overlap: bool,
    pub map_host_memory: bool,
    pub unified_addressing: bool,
    /// 0 = none, 1 = unidirectional, 2 = bidirectional.
    pub async_engine_count: u32,
}

/// Driver and runtime library versions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DriverAttributes {
    /// Kernel driver version string; empty when unknown.
    pub driver_version: String,
    /// Tesla Compute Cluster driver model in use.
    pub tcc_driver: bool,
    /// Packed as `1000 * major + minor`; 0 when unknown.
    pub driver_dll_version: u32,
    pub driver_dll_version_str: String,
    /// Packed as `1000 * major + minor`; 0 when unknown.
    pub runtime_dll_version: u32,
    pub runtime_dll_version_str: String,
}

/// Everything read from the backend at discovery time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StaticDescriptor {
    pub name: String,
    pub capability: ComputeCapability,
    /// Architecture name; empty when unknown.
    pub arch_name: String,
    pub core: CoreAttributes,
    pub memory: MemoryAttributes,
    pub driver: DriverAttributes,
}

/// Copy bandwidths in bytes per second. Zero means not measured.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BandwidthResults {
    pub host_pinned_to_device: f64,
    pub host_pageable_to_device: f64,
    pub device_to_host_pinned: f64,
    pub device_to_host_pageable: f64,
    pub device_to_device: f64,
}

/// Arithmetic throughput in operations per second. Zero means not measured.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ThroughputResults {
    pub float32: f64,
    pub float64: f64,
    pub int32: f64,
    pub int24: f64,
    pub int64: f64,
}

/// One complete benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BenchmarkResults {
    pub bandwidth: BandwidthResults,
    pub throughput: ThroughputResults,
    /// Number of runs published for this device; 0 before the first run.
    pub run: u64,
    /// Heavy mode was in effect for this run.
    pub heavy: bool,
}

impl BenchmarkResults {
    pub fn is_measured(&self) -> bool {
        self.run > 0
    }
}

/// Whole-struct publication slot for benchmark results.
///
/// The writer builds a complete [`BenchmarkResults`] off to the side and
/// swaps it in; readers clone the current `Arc` under a short read lock.
#[derive(Debug, Default)]
pub struct ResultCell {
    current: RwLock<Arc<BenchmarkResults>>,
}

impl ResultCell {
    pub fn snapshot(&self) -> Arc<BenchmarkResults> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, results: BenchmarkResults) {
        let next = Arc::new(results);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

/// A discovered device: stable index, static attributes, mutable results.
#[derive(Debug)]
pub struct DeviceDescriptor {
    index: usize,
    backend_index: usize,
    info: StaticDescriptor,
    results: ResultCell,
    heavy_mode: AtomicBool,
}

impl DeviceDescriptor {
    pub fn new(index: usize, backend_index: usize, info: StaticDescriptor) -> Self {
        Self {
            index,
            backend_index,
            info,
            results: ResultCell::default(),
            heavy_mode: AtomicBool::new(false),
        }
    }

    /// Position in the registry (compacted, stable for the process).
    pub fn index(&self) -> usize {
        self.index
    }

    /// Raw index used for backend calls.
    pub fn backend_index(&self) -> usize {
        self.backend_index
    }

    pub fn info(&self) -> &StaticDescriptor {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn capability(&self) -> ComputeCapability {
        self.info.capability
    }

    /// Latest published results.
    pub fn results(&self) -> Arc<BenchmarkResults> {
        self.results.snapshot()
    }

    pub(crate) fn publish(&self, results: BenchmarkResults) {
        self.results.replace(results);
    }

    pub fn heavy_mode(&self) -> bool {
        self.heavy_mode.load(Ordering::Relaxed)
    }

    /// Takes effect on the next run.
    pub fn set_heavy_mode(&self, heavy: bool) {
        self.heavy_mode.store(heavy, Ordering::Relaxed);
    }
}

/// Serializable snapshot of a device (static + latest results).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub index: usize,
    #[serde(flatten)]
    pub info: StaticDescriptor,
    pub results: BenchmarkResults,
}

impl From<&DeviceDescriptor> for DeviceSnapshot {
    fn from(device: &DeviceDescriptor) -> Self {
        Self {
            index: device.index(),
            info: device.info().clone(),
            results: *device.results(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_capability_ordering_and_double_support() {
        assert!(!ComputeCapability::new(1, 2).supports_double());
        assert!(ComputeCapability::new(1, 3).supports_double());
        assert!(ComputeCapability::new(2, 0).supports_double());
        assert!(!ComputeCapability::new(0, 0).is_valid());
        assert_eq!(ComputeCapability::new(8, 6).to_string(), "8.6");
    }

    #[test]
    fn test_compute_mode_display() {
        assert_eq!(ComputeMode::Exclusive.to_string(), "Compute-exclusive");
        assert_eq!(ComputeMode::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn test_total_cores_unknown() {
        let core = CoreAttributes {
            multiprocessors: 40,
            ..Default::default()
        };
        assert_eq!(core.total_cores(), 0);

        let core = CoreAttributes {
            multiprocessors: 40,
            cores_per_multiprocessor: 64,
            ..Default::default()
        };
        assert_eq!(core.total_cores(), 2560);
    }

    #[test]
    fn test_result_cell_replace() {
        let cell = ResultCell::default();
        assert!(!cell.snapshot().is_measured());

        let mut results = BenchmarkResults::default();
        results.run = 1;
        results.bandwidth.device_to_device = 1.0e11;
        cell.replace(results);

        let snap = cell.snapshot();
        assert_eq!(snap.run, 1);
        assert_eq!(snap.bandwidth.device_to_device, 1.0e11);
    }

    #[test]
    fn test_result_cell_snapshot_is_stable_across_replace() {
        let cell = ResultCell::default();
        let before = cell.snapshot();
        cell.replace(BenchmarkResults {
            run: 7,
            ..Default::default()
        });
        // An old snapshot keeps pointing at the old run.
        assert_eq!(before.run, 0);
        assert_eq!(cell.snapshot().run, 7);
    }

    #[test]
    fn test_concurrent_readers_never_see_mixed_runs() {
        let device = Arc::new(DeviceDescriptor::new(0, 0, StaticDescriptor::default()));
        let writer = {
            let device = Arc::clone(&device);
            thread::spawn(move || {
                for run in 1..=500u64 {
                    let v = run as f64;
                    device.publish(BenchmarkResults {
                        bandwidth: BandwidthResults {
                            host_pinned_to_device: v,
                            host_pageable_to_device: v,
                            device_to_host_pinned: v,
                            device_to_host_pageable: v,
                            device_to_device: v,
                        },
                        throughput: ThroughputResults {
                            float32: v,
                            float64: v,
                            int32: v,
                            int24: v,
                            int64: v,
                        },
                        run,
                        heavy: false,
                    });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let device = Arc::clone(&device);
                thread::spawn(move || {
                    for _ in 0..2000 {
                        let r = device.results();
                        let v = r.run as f64;
                        let b = r.bandwidth;
                        let t = r.throughput;
                        for field in [
                            b.host_pinned_to_device,
                            b.host_pageable_to_device,
                            b.device_to_host_pinned,
                            b.device_to_host_pageable,
                            b.device_to_device,
                            t.float32,
                            t.float64,
                            t.int32,
                            t.int24,
                            t.int64,
                        ] {
                            assert_eq!(field, v);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(device.results().run, 500);
    }

    #[test]
    fn test_heavy_mode_flag() {
        let device = DeviceDescriptor::new(1, 3, StaticDescriptor::default());
        assert!(!device.heavy_mode());
        device.set_heavy_mode(true);
        assert!(device.heavy_mode());
        assert_eq!(device.index(), 1);
        assert_eq!(device.backend_index(), 3);
    }

    #[test]
    fn test_snapshot_serializes_flattened() {
        let info = StaticDescriptor {
            name: "Probe Test GPU".to_string(),
            capability: ComputeCapability::new(3, 5),
            ..Default::default()
        };
        let device = DeviceDescriptor::new(0, 0, info);
        let json = serde_json::to_value(DeviceSnapshot::from(&device)).unwrap();
        assert_eq!(json["name"], "Probe Test GPU");
        assert_eq!(json["capability"]["major"], 3);
        assert_eq!(json["results"]["run"], 0);
    }
}
