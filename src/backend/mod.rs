// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Accelerator backend abstraction
//!
//! The backend is the only component that talks to the vendor driver:
//! device enumeration, static capability queries, scratch buffer
//! allocation, timed copies and timed kernel launches. Everything above it
//! (runner, worker, registry) is driver-agnostic.
//!
//! Implementations:
//! - [`nvml::NvmlBackend`] (feature `nvidia`): device descriptors via NVML
//! - [`simulated::SimulatedBackend`]: deterministic in-memory devices
//! - [`SerializedBackend`]: wraps another backend behind one global lock

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

use crate::config::{BackendKind, ProbeConfig};
use crate::device::StaticDescriptor;
use crate::error::ProbeError;

#[cfg(all(feature = "nvidia", any(target_os = "linux", windows)))]
pub mod nvml;
pub mod simulated;

/// Backend error
#[derive(Error, Debug)]
pub enum BackendError {
    /// Runtime/driver not loaded
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Raw device index out of range
    #[error("Invalid device index: {0}")]
    DeviceIndex(usize),

    /// Scratch buffer allocation failed
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// Operation not supported by this backend or device
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// Buffers were not prepared before an experiment
    #[error("Device {0} not prepared")]
    NotPrepared(usize),

    /// Driver call failed
    #[error("Driver error: {0}")]
    Driver(String),

    /// NVML error (NVIDIA GPUs)
    #[cfg(all(feature = "nvidia", any(target_os = "linux", windows)))]
    #[error("NVML error: {0}")]
    Nvml(#[from] nvml_wrapper::error::NvmlError),
}

/// Direction and host memory mode of a timed copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CopyKind {
    HostPinnedToDevice,
    HostPageableToDevice,
    DeviceToHostPinned,
    DeviceToHostPageable,
    DeviceToDevice,
}

impl CopyKind {
    /// Benchmark order.
    pub const ALL: [CopyKind; 5] = [
        CopyKind::HostPinnedToDevice,
        CopyKind::HostPageableToDevice,
        CopyKind::DeviceToHostPinned,
        CopyKind::DeviceToHostPageable,
        CopyKind::DeviceToDevice,
    ];
}

impl fmt::Display for CopyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostPinnedToDevice => write!(f, "host pinned -> device"),
            Self::HostPageableToDevice => write!(f, "host pageable -> device"),
            Self::DeviceToHostPinned => write!(f, "device -> host pinned"),
            Self::DeviceToHostPageable => write!(f, "device -> host pageable"),
            Self::DeviceToDevice => write!(f, "device -> device"),
        }
    }
}

/// Arithmetic throughput kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelKind {
    Float32,
    Float64,
    Int32,
    Int24,
    Int64,
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float32 => write!(f, "float32"),
            Self::Float64 => write!(f, "float64"),
            Self::Int32 => write!(f, "int32"),
            Self::Int24 => write!(f, "int24"),
            Self::Int64 => write!(f, "int64"),
        }
    }
}

/// Launch geometry for a throughput kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelProblem {
    pub blocks: u32,
    pub threads_per_block: u32,
    /// Arithmetic operations executed by each thread.
    pub ops_per_thread: u32,
}

impl KernelProblem {
    pub fn total_ops(&self) -> u64 {
        self.blocks as u64 * self.threads_per_block as u64 * self.ops_per_thread as u64
    }
}

/// Scratch buffers requested by [`AcceleratorBackend::prepare_device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPlan {
    /// Size of each copy buffer in bytes (the largest payload any run uses).
    pub copy_bytes: usize,
}

/// Vendor driver surface used by the benchmark pipeline.
///
/// Indices passed here are raw backend indices, not registry positions.
/// Implementations must be callable from the per-device worker threads;
/// return `false` from [`is_thread_safe`](Self::is_thread_safe) to have the
/// registry serialize all calls through a [`SerializedBackend`].
pub trait AcceleratorBackend: Send + Sync {
    /// Short backend name for logs and reports.
    fn name(&self) -> &str;

    /// Coarse "is the runtime usable at all" check, made once at startup.
    fn is_present(&self) -> bool;

    fn device_count(&self) -> Result<usize, BackendError>;

    fn read_static_descriptor(&self, index: usize) -> Result<StaticDescriptor, BackendError>;

    /// Allocate pinned/pageable host buffers and device buffers.
    fn prepare_device(&self, index: usize, plan: &BufferPlan) -> Result<(), BackendError>;

    /// Run one copy of `bytes` and return the elapsed device time.
    fn copy(&self, index: usize, kind: CopyKind, bytes: usize) -> Result<Duration, BackendError>;

    /// Run one kernel launch and return the elapsed device time.
    fn launch_kernel(
        &self,
        index: usize,
        kernel: KernelKind,
        problem: &KernelProblem,
    ) -> Result<Duration, BackendError>;

    /// Free everything allocated by [`prepare_device`](Self::prepare_device).
    fn release_device(&self, index: usize) -> Result<(), BackendError>;

    /// Safe for concurrent calls on different devices.
    fn is_thread_safe(&self) -> bool {
        true
    }
}

/// Backend wrapper holding one process-wide lock around every call.
///
/// Used when the driver binding cannot take calls for different devices
/// from different threads at the same time.
pub struct SerializedBackend {
    inner: Arc<dyn AcceleratorBackend>,
    lock: Mutex<()>,
}

impl SerializedBackend {
    pub fn new(inner: Arc<dyn AcceleratorBackend>) -> Self {
        Self {
            inner,
            lock: Mutex::new(()),
        }
    }

    fn with_lock<T>(&self, f: impl FnOnce(&dyn AcceleratorBackend) -> T) -> T {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f(self.inner.as_ref())
    }
}

impl AcceleratorBackend for SerializedBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_present(&self) -> bool {
        self.with_lock(|b| b.is_present())
    }

    fn device_count(&self) -> Result<usize, BackendError> {
        self.with_lock(|b| b.device_count())
    }

    fn read_static_descriptor(&self, index: usize) -> Result<StaticDescriptor, BackendError> {
        self.with_lock(|b| b.read_static_descriptor(index))
    }

    fn prepare_device(&self, index: usize, plan: &BufferPlan) -> Result<(), BackendError> {
        self.with_lock(|b| b.prepare_device(index, plan))
    }

    fn copy(&self, index: usize, kind: CopyKind, bytes: usize) -> Result<Duration, BackendError> {
        self.with_lock(|b| b.copy(index, kind, bytes))
    }

    fn launch_kernel(
        &self,
        index: usize,
        kernel: KernelKind,
        problem: &KernelProblem,
    ) -> Result<Duration, BackendError> {
        self.with_lock(|b| b.launch_kernel(index, kernel, problem))
    }

    fn release_device(&self, index: usize) -> Result<(), BackendError> {
        self.with_lock(|b| b.release_device(index))
    }
}

/// Pick the backend named by the configuration.
///
/// `Auto` prefers NVML when compiled in. The returned backend may still
/// report `is_present() == false`; discovery turns that into a fatal error.
pub fn detect(config: &ProbeConfig) -> Result<Arc<dyn AcceleratorBackend>, ProbeError> {
    match config.backend.kind {
        BackendKind::Simulated => {
            log::info!("Using simulated accelerator backend");
            Ok(Arc::new(simulated::SimulatedBackend::demo()))
        }
        BackendKind::Nvml | BackendKind::Auto => open_nvml(config.backend.kind),
    }
}

#[cfg(all(feature = "nvidia", any(target_os = "linux", windows)))]
fn open_nvml(_kind: BackendKind) -> Result<Arc<dyn AcceleratorBackend>, ProbeError> {
    match nvml::NvmlBackend::new() {
        Ok(backend) => Ok(Arc::new(backend)),
        Err(e) => Err(ProbeError::BackendUnavailable(e.to_string())),
    }
}

#[cfg(not(all(feature = "nvidia", any(target_os = "linux", windows))))]
fn open_nvml(kind: BackendKind) -> Result<Arc<dyn AcceleratorBackend>, ProbeError> {
    Err(ProbeError::BackendUnavailable(format!(
        "backend '{}' requires the `nvidia` feature on Linux or Windows",
        kind
    )))
}

#[cfg(test)]
mod tests {
    use super::simulated::{SimulatedBackend, SimulatedDevice};
    use super::*;
    use std::thread;

    #[test]
    fn test_kernel_problem_total_ops() {
        let problem = KernelProblem {
            blocks: 80,
            threads_per_block: 256,
            ops_per_thread: 1024,
        };
        assert_eq!(problem.total_ops(), 80 * 256 * 1024);
    }

    #[test]
    fn test_copy_kind_order() {
        assert_eq!(CopyKind::ALL[0], CopyKind::HostPinnedToDevice);
        assert_eq!(CopyKind::ALL[4], CopyKind::DeviceToDevice);
        assert_eq!(CopyKind::DeviceToHostPageable.to_string(), "device -> host pageable");
    }

    #[test]
    fn test_serialized_backend_never_overlaps_calls() {
        let sim = Arc::new(
            SimulatedBackend::new(vec![
                SimulatedDevice::preset("GPU A", 7, 5),
                SimulatedDevice::preset("GPU B", 8, 6),
            ])
            .with_latency(Duration::from_millis(2)),
        );
        let serialized = Arc::new(SerializedBackend::new(sim.clone()));
        let plan = BufferPlan { copy_bytes: 1 << 20 };
        serialized.prepare_device(0, &plan).unwrap();
        serialized.prepare_device(1, &plan).unwrap();

        let handles: Vec<_> = (0..2)
            .map(|index| {
                let backend = Arc::clone(&serialized);
                thread::spawn(move || {
                    for _ in 0..10 {
                        backend
                            .copy(index, CopyKind::DeviceToDevice, 1 << 20)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(sim.stats().copies, 20);
        assert_eq!(sim.stats().max_concurrent_calls, 1);
    }

    #[test]
    fn test_detect_simulated() {
        let mut config = ProbeConfig::default();
        config.backend.kind = BackendKind::Simulated;
        let backend = detect(&config).unwrap();
        assert!(backend.is_present());
        assert!(backend.device_count().unwrap() > 0);
    }
}
