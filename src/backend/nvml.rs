// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! NVIDIA backend via NVML
//!
//! NVML exposes device identity, memory, clocks, PCI location, ECC and
//! compute mode, which covers most of the static descriptor. It cannot
//! allocate device memory or launch work, so copies and kernel launches
//! report `Unsupported` and the corresponding results stay "not measured".

use std::time::Duration;

use nvml_wrapper::enum_wrappers::device::{Clock, ComputeMode as NvmlComputeMode};
use nvml_wrapper::structs::device::CudaComputeCapability;
use nvml_wrapper::Nvml;

use super::{AcceleratorBackend, BackendError, BufferPlan, CopyKind, KernelKind, KernelProblem};
use crate::device::{
    ComputeCapability, ComputeMode, CoreAttributes, DriverAttributes, MemoryAttributes,
    PciLocation, StaticDescriptor,
};

pub struct NvmlBackend {
    nvml: Nvml,
}

impl NvmlBackend {
    pub fn new() -> Result<Self, BackendError> {
        let nvml = Nvml::init()?;
        log::debug!("NVML initialized");
        Ok(Self { nvml })
    }

    fn device(&self, index: usize) -> Result<nvml_wrapper::Device<'_>, BackendError> {
        let raw = u32::try_from(index).map_err(|_| BackendError::DeviceIndex(index))?;
        Ok(self.nvml.device_by_index(raw)?)
    }

    /// CUDA driver API version packed as `1000 * major + minor`.
    fn cuda_driver_version(&self) -> u32 {
        match self.nvml.sys_cuda_driver_version() {
            // NVML packs as 1000 * major + 10 * minor
            Ok(v) if v > 0 => {
                let v = v as u32;
                (v / 1000) * 1000 + (v % 1000) / 10
            }
            _ => 0,
        }
    }
}

fn arch_name(capability: ComputeCapability) -> &'static str {
    match capability.major {
        1 => "Tesla",
        2 => "Fermi",
        3 => "Kepler",
        5 => "Maxwell",
        6 => "Pascal",
        7 if capability.minor >= 5 => "Turing",
        7 => "Volta",
        8 if capability.minor == 9 => "Ada Lovelace",
        8 => "Ampere",
        9 => "Hopper",
        10 | 12 => "Blackwell",
        _ => "",
    }
}

fn map_compute_mode(mode: NvmlComputeMode) -> ComputeMode {
    match mode {
        NvmlComputeMode::Default => ComputeMode::Default,
        NvmlComputeMode::ExclusiveThread | NvmlComputeMode::ExclusiveProcess => {
            ComputeMode::Exclusive
        }
        NvmlComputeMode::Prohibited => ComputeMode::Prohibited,
    }
}

impl AcceleratorBackend for NvmlBackend {
    fn name(&self) -> &str {
        "nvml"
    }

    fn is_present(&self) -> bool {
        self.nvml.device_count().is_ok()
    }

    fn device_count(&self) -> Result<usize, BackendError> {
        Ok(self.nvml.device_count()? as usize)
    }

    fn read_static_descriptor(&self, index: usize) -> Result<StaticDescriptor, BackendError> {
        let device = self.device(index)?;

        let name = device.name()?;
        // Eligibility depends on the capability, so it must not be guessed
        let capability = capability_from(device.cuda_compute_capability()?);

        // Optional queries fall back to "unknown" rather than failing discovery
        let pci = device
            .pci_info()
            .map(|p| PciLocation {
                domain: p.domain,
                bus: p.bus,
                device: p.device,
            })
            .unwrap_or_default();
        let clock_khz = |clock| {
            device
                .max_clock_info(clock)
                .map(|mhz| mhz as u64 * 1000)
                .unwrap_or(0)
        };

        let core = CoreAttributes {
            clock_rate_khz: clock_khz(Clock::Graphics),
            pci,
            compute_mode: device
                .compute_mode()
                .map(map_compute_mode)
                .unwrap_or_default(),
            ..Default::default()
        };

        let memory = MemoryAttributes {
            total_global: device.memory_info().map(|m| m.total).unwrap_or(0),
            bus_width_bits: device.memory_bus_width().unwrap_or(0),
            clock_rate_khz: clock_khz(Clock::Memory),
            ecc_enabled: device
                .is_ecc_enabled()
                .map(|e| e.currently_enabled)
                .unwrap_or(false),
            ..Default::default()
        };

        let cuda_version = self.cuda_driver_version();
        let driver = DriverAttributes {
            driver_version: self.nvml.sys_driver_version().unwrap_or_default(),
            tcc_driver: false,
            driver_dll_version: cuda_version,
            driver_dll_version_str: String::new(),
            runtime_dll_version: 0,
            runtime_dll_version_str: String::new(),
        };

        Ok(StaticDescriptor {
            name,
            capability,
            arch_name: arch_name(capability).to_string(),
            core,
            memory,
            driver,
        })
    }

    fn prepare_device(&self, index: usize, _plan: &BufferPlan) -> Result<(), BackendError> {
        self.device(index).map(|_| ())
    }

    fn copy(&self, _index: usize, kind: CopyKind, _bytes: usize) -> Result<Duration, BackendError> {
        Err(BackendError::Unsupported(format!("{} copy through NVML", kind)))
    }

    fn launch_kernel(
        &self,
        _index: usize,
        kernel: KernelKind,
        _problem: &KernelProblem,
    ) -> Result<Duration, BackendError> {
        Err(BackendError::Unsupported(format!(
            "{} kernel through NVML",
            kernel
        )))
    }

    fn release_device(&self, _index: usize) -> Result<(), BackendError> {
        Ok(())
    }
}

fn capability_from(cc: CudaComputeCapability) -> ComputeCapability {
    ComputeCapability::new(cc.major.max(0) as u32, cc.minor.max(0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nvml_wrapper::error::NvmlError;

    #[test]
    fn test_arch_names() {
        assert_eq!(arch_name(ComputeCapability::new(7, 0)), "Volta");
        assert_eq!(arch_name(ComputeCapability::new(7, 5)), "Turing");
        assert_eq!(arch_name(ComputeCapability::new(8, 9)), "Ada Lovelace");
        assert_eq!(arch_name(ComputeCapability::new(4, 0)), "");
    }

    #[test]
    fn test_compute_mode_mapping() {
        assert_eq!(
            map_compute_mode(NvmlComputeMode::ExclusiveProcess),
            ComputeMode::Exclusive
        );
        assert_eq!(
            map_compute_mode(NvmlComputeMode::Prohibited),
            ComputeMode::Prohibited
        );
    }

    #[test]
    fn test_capability_conversion() {
        let cc = CudaComputeCapability { major: 8, minor: 6 };
        assert_eq!(capability_from(cc), ComputeCapability::new(8, 6));
        let bogus = CudaComputeCapability { major: -1, minor: 2 };
        assert_eq!(capability_from(bogus), ComputeCapability::new(0, 2));
    }

    #[test]
    fn test_capability_failure_propagates() {
        let failed: Result<CudaComputeCapability, _> = Err(NvmlError::NotSupported);
        let result: Result<ComputeCapability, BackendError> =
            failed.map(capability_from).map_err(BackendError::from);
        assert!(matches!(result, Err(BackendError::Nvml(NvmlError::NotSupported))));
    }

    #[test]
    fn test_nvml_init_does_not_panic() {
        // Passes with or without an NVIDIA driver installed
        if let Ok(backend) = NvmlBackend::new() {
            let _ = backend.device_count();
        }
    }
}
