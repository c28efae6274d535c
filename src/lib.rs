// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! GPU Probe: compute accelerator information and micro-benchmarks
//!
//! `gprobelib` enumerates GPU compute devices through an
//! [`AcceleratorBackend`], snapshots their static capabilities, and keeps
//! one background [`DeviceWorker`] per device that runs a short, fixed
//! benchmark suite (host/device copy bandwidth, arithmetic throughput) on
//! request. Results are rendered through the [`Decoder`] field table, which
//! also drives the text, HTML and JSON reports.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::{mpsc, Arc};
//! use gprobelib::backend::simulated::SimulatedBackend;
//! use gprobelib::{Decoder, DeviceRegistry, NoProgress, RegistryOptions};
//!
//! let backend = Arc::new(SimulatedBackend::demo());
//! let (events, _rx) = mpsc::channel();
//! let registry = DeviceRegistry::discover(
//!     backend,
//!     RegistryOptions::default(),
//!     events,
//!     &mut NoProgress,
//! )?;
//! registry.run_initial_benchmarks(&mut NoProgress);
//!
//! for field in Decoder::for_device(registry.get(0)).fields() {
//!     println!("{}: {}", field.label, field.value);
//! }
//! # Ok::<(), gprobelib::ProbeError>(())
//! ```

pub mod backend;
pub mod bench;
pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod platform;
pub mod registry;
pub mod report;
pub mod shell;
pub mod worker;

#[cfg(feature = "gui")]
pub mod gui;
#[cfg(feature = "tui")]
pub mod tui;

pub use backend::{AcceleratorBackend, BackendError, CopyKind, KernelKind};
pub use bench::{BenchmarkConfig, BenchmarkRunner};
pub use config::ProbeConfig;
pub use decode::{DecodedField, Decoder, FieldId};
pub use device::{
    BenchmarkResults, ComputeCapability, DeviceDescriptor, DeviceSnapshot, StaticDescriptor,
};
pub use error::{ProbeError, Result};
pub use registry::{DeviceRegistry, DiscoveryProgress, NoProgress, RegistryOptions};
pub use report::{ReportFormat, ReportMeta};
pub use shell::{ShellController, StatusMessage};
pub use worker::{BenchmarkEvent, DeviceWorker, WorkerState};

/// Short application name used in window titles and report headers.
pub const APP_NAME: &str = "GPU Probe";

/// Long application name.
pub const APP_NAME_LONG: &str = "GPU Compute Information Utility";

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
