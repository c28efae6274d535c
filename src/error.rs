// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Error types for GPU Probe

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub use crate::backend::BackendError;

/// Result type alias for probe operations
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Main error type for GPU Probe
///
/// Only discovery, configuration and export failures surface here.
/// Failures inside a benchmark run are recorded as "not measured" result
/// fields and never leave the device worker thread.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The accelerator runtime/driver is not usable at all
    #[error("Accelerator backend not available: {0}")]
    BackendUnavailable(String),

    /// Discovery finished with zero eligible devices
    #[error("No compute devices found")]
    NoDevices,

    /// Backend call failed during discovery
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Worker thread could not be spawned or joined
    #[error("Thread error: {0}")]
    Thread(String),

    /// Report could not be written to its destination
    #[error("Cannot write file {}: {source}", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProbeError {
    /// Whether this error must stop the process before any UI is shown.
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            ProbeError::BackendUnavailable(_) | ProbeError::NoDevices | ProbeError::Backend(_)
        )
    }
}
