// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Field table and value formatting
//!
//! A [`Decoder`] projects one device (static attributes plus a results
//! snapshot) onto an ordered list of `(FieldId, label, value)` triples.
//! The GUI and TUI panels and the text/HTML reports all iterate this one
//! table, so they always agree on labels, order and formatting.
//!
//! Rates use SI prefixes (base 1000), sizes use IEC prefixes (base 1024).
//! The value is divided while it is at least 10x the base and a larger
//! prefix exists, then printed with two decimals.

use crate::device::{BenchmarkResults, DeviceDescriptor, DeviceSnapshot, StaticDescriptor};

/// Placeholder for "not measured" and for rows without a value.
pub const NOT_MEASURED: &str = "--";

/// Unit prefix a raw value starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Prefix {
    Nothing = 0,
    Kilo,
    Mega,
    Giga,
    Tera,
    Peta,
    Exa,
    Zetta,
    Yotta,
}

const SI_PREFIXES: [&str; 9] = ["", "k", "M", "G", "T", "P", "E", "Z", "Y"];
const IEC_PREFIXES: [&str; 9] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi", "Yi"];

fn scale(mut value: f64, from: Prefix, base: f64, table: &[&str; 9], unit: &str) -> String {
    let mut prefix = from as usize;
    let max = table.len() - 1;
    while value >= 10.0 * base && prefix < max {
        value /= base;
        prefix += 1;
    }
    format!("{:.2} {}{}", value, table[prefix], unit)
}

/// Base-1000 rendering: `format_si(1_710_000.0, Prefix::Kilo, "Hz")` is
/// `"1710.00 MHz"`.
pub fn format_si(value: f64, from: Prefix, unit: &str) -> String {
    scale(value, from, 1000.0, &SI_PREFIXES, unit)
}

/// Base-1024 rendering: `format_iec(6.0e6, Prefix::Nothing, "B/s")` is
/// `"5859.38 KiB/s"`.
pub fn format_iec(value: f64, from: Prefix, unit: &str) -> String {
    scale(value, from, 1024.0, &IEC_PREFIXES, unit)
}

/// Where a field is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// Tab captions
    Tabs,
    /// Driver lines at the top of reports
    Driver,
    Core,
    Memory,
    Performance,
}

impl Section {
    /// Report heading.
    pub fn title(&self) -> &'static str {
        match self {
            Section::Tabs => "",
            Section::Driver => "Driver Information",
            Section::Core => "Core Information",
            Section::Memory => "Memory Information",
            Section::Performance => "Performance Information",
        }
    }
}

/// Stable identifier of one table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    TabCore,
    TabMemory,
    TabPerformance,

    DriverVersion,
    DriverDllVersion,
    RuntimeDllVersion,

    Name,
    Capability,
    ClockRate,
    PciLocation,
    Multiprocessors,
    ThreadsPerMultiprocessor,
    WarpSize,
    RegsPerBlock,
    ThreadsPerBlock,
    ThreadsDimensions,
    GridDimensions,
    Watchdog,
    Integrated,
    ConcurrentKernels,
    ComputeMode,
    StreamPriorities,

    TotalGlobal,
    BusWidth,
    MemoryClock,
    ErrorCorrection,
    L2CacheSize,
    SharedPerBlock,
    Pitch,
    TotalConstant,
    TextureAlignment,
    Texture1D,
    Texture2D,
    Texture3D,
    GpuOverlap,
    MapHostMemory,
    UnifiedAddressing,
    AsyncEngine,

    MemoryCopy,
    HostPinnedToDevice,
    HostPageableToDevice,
    DeviceToHostPinned,
    DeviceToHostPageable,
    DeviceToDevice,
    CorePerformance,
    FloatRate,
    DoubleRate,
    Int64Rate,
    Int32Rate,
    Int24Rate,
}

type Render = fn(&StaticDescriptor, &BenchmarkResults) -> String;

struct FieldInfo {
    id: FieldId,
    section: Section,
    label: &'static str,
    /// `None` for captions and group headers.
    render: Option<Render>,
}

macro_rules! field {
    ($id:ident, $section:ident, $label:expr) => {
        FieldInfo {
            id: FieldId::$id,
            section: Section::$section,
            label: $label,
            render: None,
        }
    };
    ($id:ident, $section:ident, $label:expr, $render:expr) => {
        FieldInfo {
            id: FieldId::$id,
            section: Section::$section,
            label: $label,
            render: Some($render),
        }
    };
}

fn yes_no(flag: bool) -> String {
    let text = if flag { "Yes" } else { "No" };
    text.to_string()
}

fn library_version(packed: u32, display: &str) -> String {
    let mut version = if packed == 0 {
        "Unknown".to_string()
    } else {
        format!("{}.{}", packed / 1000, packed % 1000)
    };
    if !display.is_empty() {
        version.push_str(&format!(" ({})", display));
    }
    version
}

fn dims<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" x ")
}

fn bytes(value: u64) -> String {
    format_iec(value as f64, Prefix::Nothing, "B")
}

fn bandwidth(value: f64) -> String {
    if value == 0.0 {
        NOT_MEASURED.to_string()
    } else {
        format_iec(value, Prefix::Nothing, "B/s")
    }
}

fn rate(value: f64, unit: &str) -> String {
    if value == 0.0 {
        NOT_MEASURED.to_string()
    } else {
        format_si(value, Prefix::Nothing, unit)
    }
}

static FIELDS: &[FieldInfo] = &[
    field!(TabCore, Tabs, "Core"),
    field!(TabMemory, Tabs, "Memory"),
    field!(TabPerformance, Tabs, "Performance"),
    field!(DriverVersion, Driver, "Driver Version", |i, _| {
        if i.driver.driver_version.is_empty() {
            "Unknown".to_string()
        } else if i.driver.tcc_driver {
            format!("{} (TCC)", i.driver.driver_version)
        } else {
            i.driver.driver_version.clone()
        }
    }),
    field!(DriverDllVersion, Driver, "Driver Dll Version", |i, _| {
        library_version(i.driver.driver_dll_version, &i.driver.driver_dll_version_str)
    }),
    field!(RuntimeDllVersion, Driver, "Runtime Dll Version", |i, _| {
        library_version(i.driver.runtime_dll_version, &i.driver.runtime_dll_version_str)
    }),
    field!(Name, Core, "Name", |i, _| i.name.clone()),
    field!(Capability, Core, "Compute Capability", |i, _| {
        if i.arch_name.is_empty() {
            i.capability.to_string()
        } else {
            format!("{} ({})", i.capability, i.arch_name)
        }
    }),
    field!(ClockRate, Core, "Clock Rate", |i, _| {
        format_si(i.core.clock_rate_khz as f64, Prefix::Kilo, "Hz")
    }),
    field!(PciLocation, Core, "PCI Location", |i, _| i.core.pci.to_string()),
    field!(Multiprocessors, Core, "Multiprocessors", |i, _| {
        match (i.core.multiprocessors, i.core.total_cores()) {
            (0, _) => "Unknown".to_string(),
            (mp, 0) => mp.to_string(),
            (mp, cores) => format!("{} ({} Cores)", mp, cores),
        }
    }),
    field!(ThreadsPerMultiprocessor, Core, "Threads Per Multiproc.", |i, _| {
        i.core.max_threads_per_multiprocessor.to_string()
    }),
    field!(WarpSize, Core, "Warp Size", |i, _| i.core.warp_size.to_string()),
    field!(RegsPerBlock, Core, "Regs Per Block", |i, _| i.core.regs_per_block.to_string()),
    field!(ThreadsPerBlock, Core, "Threads Per Block", |i, _| {
        i.core.max_threads_per_block.to_string()
    }),
    field!(ThreadsDimensions, Core, "Threads Dimensions", |i, _| dims(&i.core.max_threads_dim)),
    field!(GridDimensions, Core, "Grid Dimensions", |i, _| dims(&i.core.max_grid_size)),
    field!(Watchdog, Core, "Watchdog Enabled", |i, _| match i.core.watchdog_enabled {
        Some(flag) => yes_no(flag),
        None => "Unknown".to_string(),
    }),
    field!(Integrated, Core, "Integrated GPU", |i, _| yes_no(i.core.integrated)),
    field!(ConcurrentKernels, Core, "Concurrent Kernels", |i, _| {
        yes_no(i.core.concurrent_kernels)
    }),
    field!(ComputeMode, Core, "Compute Mode", |i, _| i.core.compute_mode.to_string()),
    field!(StreamPriorities, Core, "Stream Priorities", |i, _| {
        yes_no(i.core.stream_priorities)
    }),
    field!(TotalGlobal, Memory, "Total Global", |i, _| bytes(i.memory.total_global)),
    field!(BusWidth, Memory, "Bus Width", |i, _| format!("{} bits", i.memory.bus_width_bits)),
    field!(MemoryClock, Memory, "Clock Rate", |i, _| {
        format_si(i.memory.clock_rate_khz as f64, Prefix::Kilo, "Hz")
    }),
    field!(ErrorCorrection, Memory, "Error Correction", |i, _| yes_no(i.memory.ecc_enabled)),
    field!(L2CacheSize, Memory, "L2 Cache Size", |i, _| match i.memory.l2_cache_size {
        0 => "No".to_string(),
        size => bytes(size),
    }),
    field!(SharedPerBlock, Memory, "Shared Per Block", |i, _| bytes(i.memory.shared_per_block)),
    field!(Pitch, Memory, "Pitch", |i, _| bytes(i.memory.max_pitch)),
    field!(TotalConstant, Memory, "Total Constant", |i, _| bytes(i.memory.total_constant)),
    field!(TextureAlignment, Memory, "Texture Alignment", |i, _| {
        bytes(i.memory.texture_alignment)
    }),
    field!(Texture1D, Memory, "Texture 1D Size", |i, _| i.memory.texture_1d.to_string()),
    field!(Texture2D, Memory, "Texture 2D Size", |i, _| dims(&i.memory.texture_2d)),
    field!(Texture3D, Memory, "Texture 3D Size", |i, _| dims(&i.memory.texture_3d)),
    field!(GpuOverlap, Memory, "GPU Overlap", |i, _| yes_no(i.memory.gpu_overlap)),
    field!(MapHostMemory, Memory, "Map Host Memory", |i, _| yes_no(i.memory.map_host_memory)),
    field!(UnifiedAddressing, Memory, "Unified Addressing", |i, _| {
        yes_no(i.memory.unified_addressing)
    }),
    field!(AsyncEngine, Memory, "Async Engine", |i, _| match i.memory.async_engine_count {
        2 => "Yes, Bidirectional".to_string(),
        1 => "Yes, Unidirectional".to_string(),
        _ => "No".to_string(),
    }),
    field!(MemoryCopy, Performance, "Memory Copy"),
    field!(HostPinnedToDevice, Performance, "Host Pinned to Device", |_, r| {
        bandwidth(r.bandwidth.host_pinned_to_device)
    }),
    field!(HostPageableToDevice, Performance, "Host Pageable to Device", |_, r| {
        bandwidth(r.bandwidth.host_pageable_to_device)
    }),
    field!(DeviceToHostPinned, Performance, "Device to Host Pinned", |_, r| {
        bandwidth(r.bandwidth.device_to_host_pinned)
    }),
    field!(DeviceToHostPageable, Performance, "Device to Host Pageable", |_, r| {
        bandwidth(r.bandwidth.device_to_host_pageable)
    }),
    field!(DeviceToDevice, Performance, "Device to Device", |_, r| {
        bandwidth(r.bandwidth.device_to_device)
    }),
    field!(CorePerformance, Performance, "GPU Core Performance"),
    field!(FloatRate, Performance, "Single-precision Float", |_, r| {
        rate(r.throughput.float32, "flop/s")
    }),
    field!(DoubleRate, Performance, "Double-precision Float", |i, r| {
        if i.capability.supports_double() {
            rate(r.throughput.float64, "flop/s")
        } else {
            "Not Supported".to_string()
        }
    }),
    field!(Int64Rate, Performance, "64-bit Integer", |_, r| rate(r.throughput.int64, "iop/s")),
    field!(Int32Rate, Performance, "32-bit Integer", |_, r| rate(r.throughput.int32, "iop/s")),
    field!(Int24Rate, Performance, "24-bit Integer", |_, r| rate(r.throughput.int24, "iop/s")),
];

fn lookup(id: FieldId) -> &'static FieldInfo {
    // The table holds every FieldId exactly once
    FIELDS
        .iter()
        .find(|f| f.id == id)
        .unwrap_or(&FIELDS[0])
}

impl FieldId {
    pub fn label(self) -> &'static str {
        lookup(self).label
    }

    pub fn section(self) -> Section {
        lookup(self).section
    }

    /// Rows that group other rows and carry no value of their own.
    pub fn is_header(self) -> bool {
        lookup(self).render.is_none()
    }
}

/// One rendered row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedField {
    pub id: FieldId,
    pub label: &'static str,
    pub value: String,
}

impl DecodedField {
    pub fn is_header(&self) -> bool {
        self.id.is_header()
    }
}

/// Read-only projection of one device onto the field table.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    info: &'a StaticDescriptor,
    results: BenchmarkResults,
}

impl<'a> Decoder<'a> {
    /// Uses the device's latest published results.
    pub fn for_device(device: &'a DeviceDescriptor) -> Self {
        Self::from_parts(device.info(), *device.results())
    }

    pub fn from_snapshot(snapshot: &'a DeviceSnapshot) -> Self {
        Self::from_parts(&snapshot.info, snapshot.results)
    }

    pub fn from_parts(info: &'a StaticDescriptor, results: BenchmarkResults) -> Self {
        Self { info, results }
    }

    pub fn info(&self) -> &StaticDescriptor {
        self.info
    }

    pub fn results(&self) -> &BenchmarkResults {
        &self.results
    }

    pub fn value(&self, id: FieldId) -> String {
        match lookup(id).render {
            Some(render) => render(self.info, &self.results),
            None => NOT_MEASURED.to_string(),
        }
    }

    /// Every row in table order.
    pub fn fields(&self) -> Vec<DecodedField> {
        FIELDS.iter().map(|f| self.decode(f)).collect()
    }

    /// Rows of one section in table order.
    pub fn section(&self, section: Section) -> Vec<DecodedField> {
        FIELDS
            .iter()
            .filter(|f| f.section == section)
            .map(|f| self.decode(f))
            .collect()
    }

    fn decode(&self, field: &FieldInfo) -> DecodedField {
        DecodedField {
            id: field.id,
            label: field.label,
            value: self.value(field.id),
        }
    }
}
