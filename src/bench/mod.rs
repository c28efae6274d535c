// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Benchmark runner
//!
//! Drives the fixed experiment sequence against one device: five timed
//! copies (pinned/pageable host to device, device to pinned/pageable host,
//! device to device) followed by the arithmetic throughput kernels. Each
//! experiment repeats N times and keeps the best rate. A failed experiment
//! leaves its field at zero ("not measured") and the sequence continues.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{AcceleratorBackend, BackendError, BufferPlan, CopyKind, KernelKind, KernelProblem};
use crate::config::BenchmarkSection;
use crate::device::{BandwidthResults, BenchmarkResults, DeviceDescriptor, ThroughputResults};

const MIB: usize = 1024 * 1024;

/// Threads per block used when the device does not report a limit.
const DEFAULT_THREADS_PER_BLOCK: u32 = 256;

/// Arithmetic operations per thread in one kernel launch.
const OPS_PER_THREAD: u32 = 4096;

/// Iteration counts and payload sizes for one runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkConfig {
    pub copy_bytes: usize,
    pub copy_iterations: u32,
    pub kernel_iterations: u32,
    pub heavy_multiplier: u32,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self::from(&BenchmarkSection::default())
    }
}

impl From<&BenchmarkSection> for BenchmarkConfig {
    fn from(section: &BenchmarkSection) -> Self {
        Self {
            copy_bytes: section.copy_payload_mib as usize * MIB,
            copy_iterations: section.copy_iterations.max(1),
            kernel_iterations: section.kernel_iterations.max(1),
            heavy_multiplier: section.heavy_multiplier.max(1),
        }
    }
}

impl BenchmarkConfig {
    /// (copy, kernel) repetitions for a run.
    pub fn iterations(&self, heavy: bool) -> (u32, u32) {
        if heavy {
            (
                self.copy_iterations.saturating_mul(self.heavy_multiplier),
                self.kernel_iterations.saturating_mul(self.heavy_multiplier),
            )
        } else {
            (self.copy_iterations, self.kernel_iterations)
        }
    }

    pub fn buffer_plan(&self) -> BufferPlan {
        BufferPlan {
            copy_bytes: self.copy_bytes,
        }
    }
}

/// Fixed launch geometry from the device's multiprocessor layout:
/// enough blocks to fill every multiprocessor once.
pub fn kernel_problem(device: &DeviceDescriptor) -> KernelProblem {
    let core = &device.info().core;
    let threads_per_block = match core.max_threads_per_block {
        0 => DEFAULT_THREADS_PER_BLOCK,
        limit => limit.min(DEFAULT_THREADS_PER_BLOCK),
    };
    let blocks_per_mp = (core.max_threads_per_multiprocessor / threads_per_block).max(1);
    KernelProblem {
        blocks: core.multiprocessors.max(1) * blocks_per_mp,
        threads_per_block,
        ops_per_thread: OPS_PER_THREAD,
    }
}

/// Runs the experiment sequence for one device.
pub struct BenchmarkRunner {
    backend: Arc<dyn AcceleratorBackend>,
    config: BenchmarkConfig,
}

impl BenchmarkRunner {
    pub fn new(backend: Arc<dyn AcceleratorBackend>, config: BenchmarkConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// One full pass. The run counter is left at zero for the caller to set.
    pub fn run(&self, device: &DeviceDescriptor, heavy: bool) -> BenchmarkResults {
        let (copy_iterations, kernel_iterations) = self.config.iterations(heavy);
        BenchmarkResults {
            bandwidth: self.run_bandwidth_experiments(device, copy_iterations),
            throughput: self.run_throughput_experiments(device, kernel_iterations),
            run: 0,
            heavy,
        }
    }

    /// Five copy experiments, in bytes/s.
    pub fn run_bandwidth_experiments(
        &self,
        device: &DeviceDescriptor,
        iterations: u32,
    ) -> BandwidthResults {
        let bytes = self.config.copy_bytes;
        let rate = |kind: CopyKind| {
            best_rate(device, &kind.to_string(), bytes as f64, iterations, || {
                self.backend.copy(device.backend_index(), kind, bytes)
            })
        };
        BandwidthResults {
            host_pinned_to_device: rate(CopyKind::HostPinnedToDevice),
            host_pageable_to_device: rate(CopyKind::HostPageableToDevice),
            device_to_host_pinned: rate(CopyKind::DeviceToHostPinned),
            device_to_host_pageable: rate(CopyKind::DeviceToHostPageable),
            device_to_device: rate(CopyKind::DeviceToDevice),
        }
    }

    /// Throughput kernels, in ops/s. Double precision is skipped below 1.3.
    pub fn run_throughput_experiments(
        &self,
        device: &DeviceDescriptor,
        iterations: u32,
    ) -> ThroughputResults {
        let problem = kernel_problem(device);
        let ops = problem.total_ops() as f64;
        let rate = |kernel: KernelKind| {
            best_rate(device, &kernel.to_string(), ops, iterations, || {
                self.backend
                    .launch_kernel(device.backend_index(), kernel, &problem)
            })
        };
        let float32 = rate(KernelKind::Float32);
        let float64 = if device.capability().supports_double() {
            rate(KernelKind::Float64)
        } else {
            0.0
        };
        ThroughputResults {
            float32,
            float64,
            int32: rate(KernelKind::Int32),
            int24: rate(KernelKind::Int24),
            int64: rate(KernelKind::Int64),
        }
    }
}

/// Highest `amount / elapsed` over `iterations` samples; 0 on failure.
fn best_rate(
    device: &DeviceDescriptor,
    what: &str,
    amount: f64,
    iterations: u32,
    mut sample: impl FnMut() -> Result<Duration, BackendError>,
) -> f64 {
    let mut best = 0.0_f64;
    for _ in 0..iterations {
        match sample() {
            Ok(elapsed) if !elapsed.is_zero() => {
                best = best.max(amount / elapsed.as_secs_f64());
            }
            Ok(_) => {}
            Err(BackendError::Unsupported(reason)) => {
                log::debug!("{}: {} skipped: {}", device.name(), what, reason);
                return 0.0;
            }
            Err(e) => {
                log::warn!("{}: {} failed: {}", device.name(), what, e);
                return 0.0;
            }
        }
    }
    best
}
