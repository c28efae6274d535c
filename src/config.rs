// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Probe configuration
//!
//! Optional TOML file selected with `--config`. Every key has a default, so
//! an empty file (or no file) gives the stock behaviour.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::bench::BenchmarkConfig;
use crate::error::{ProbeError, Result};

/// Log level used when neither `-v` nor `RUST_LOG` is given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Which accelerator backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Auto,
    Nvml,
    Simulated,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Auto => write!(f, "auto"),
            BackendKind::Nvml => write!(f, "nvml"),
            BackendKind::Simulated => write!(f, "simulated"),
        }
    }
}

/// `[benchmark]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkSection {
    /// Payload of each timed copy, in MiB
    pub copy_payload_mib: u32,
    /// Repetitions per copy experiment (best one kept)
    pub copy_iterations: u32,
    /// Repetitions per kernel experiment (best one kept)
    pub kernel_iterations: u32,
    /// Iteration multiplier in heavy mode
    pub heavy_multiplier: u32,
    /// Passes before a batch export; the last one is reported
    pub batch_passes: u32,
}

impl Default for BenchmarkSection {
    fn default() -> Self {
        Self {
            copy_payload_mib: 16,
            copy_iterations: 4,
            kernel_iterations: 2,
            heavy_multiplier: 8,
            batch_passes: 2,
        }
    }
}

/// `[interface]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceSection {
    pub auto_update: bool,
    pub heavy_mode: bool,
    pub update_interval_ms: u64,
}

impl Default for InterfaceSection {
    fn default() -> Self {
        Self {
            auto_update: true,
            heavy_mode: false,
            update_interval_ms: 2000,
        }
    }
}

impl InterfaceSection {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// `[backend]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub kind: BackendKind,
    /// Route every backend call through one global lock
    pub serialize_calls: bool,
}

/// `[logging]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: LogLevel,
}

/// Probe configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub benchmark: BenchmarkSection,
    pub interface: InterfaceSection,
    pub backend: BackendSection,
    pub logging: LoggingSection,
}

const MIN_UPDATE_INTERVAL_MS: u64 = 100;

impl ProbeConfig {
    /// Load from TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProbeError::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ProbeError::Config(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// File if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                Self::from_toml_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let b = &self.benchmark;
        let checks = [
            (b.copy_payload_mib, "benchmark.copy_payload_mib"),
            (b.copy_iterations, "benchmark.copy_iterations"),
            (b.kernel_iterations, "benchmark.kernel_iterations"),
            (b.heavy_multiplier, "benchmark.heavy_multiplier"),
            (b.batch_passes, "benchmark.batch_passes"),
        ];
        for (value, key) in checks {
            if value == 0 {
                return Err(ProbeError::Config(format!("{} must be > 0", key)));
            }
        }
        if self.interface.update_interval_ms < MIN_UPDATE_INTERVAL_MS {
            return Err(ProbeError::Config(format!(
                "interface.update_interval_ms must be >= {}",
                MIN_UPDATE_INTERVAL_MS
            )));
        }
        Ok(())
    }

    pub fn benchmark_config(&self) -> BenchmarkConfig {
        BenchmarkConfig::from(&self.benchmark)
    }

    /// Generate sample config
    pub fn sample_toml() -> String {
        r#"# GPU Probe configuration

[benchmark]
copy_payload_mib = 16
copy_iterations = 4
kernel_iterations = 2
heavy_multiplier = 8
batch_passes = 2

[interface]
auto_update = true
heavy_mode = false
update_interval_ms = 2000

[backend]
# auto | nvml | simulated
kind = "auto"
serialize_calls = false

[logging]
# error | warn | info | debug | trace
level = "warn"
"#
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_toml_parses_to_defaults() {
        let config = ProbeConfig::from_toml(&ProbeConfig::sample_toml()).unwrap();
        assert_eq!(config, ProbeConfig::default());
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = ProbeConfig::from_toml("").unwrap();
        assert_eq!(config.benchmark.batch_passes, 2);
        assert!(config.interface.auto_update);
        assert_eq!(config.interface.update_interval(), Duration::from_secs(2));
        assert_eq!(config.backend.kind, BackendKind::Auto);
    }

    #[test]
    fn test_partial_section() {
        let config = ProbeConfig::from_toml(
            r#"
[backend]
kind = "simulated"

[benchmark]
copy_iterations = 10
"#,
        )
        .unwrap();
        assert_eq!(config.backend.kind, BackendKind::Simulated);
        assert_eq!(config.benchmark.copy_iterations, 10);
        assert_eq!(config.benchmark.kernel_iterations, 2);
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let err = ProbeConfig::from_toml("[benchmark]\ncopy_iterations = 0\n").unwrap_err();
        assert!(err.to_string().contains("copy_iterations"));
    }

    #[test]
    fn test_rejects_short_interval() {
        let err = ProbeConfig::from_toml("[interface]\nupdate_interval_ms = 10\n").unwrap_err();
        assert!(matches!(err, ProbeError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_toml() {
        assert!(ProbeConfig::from_toml("[benchmark").is_err());
        assert!(ProbeConfig::from_toml("[backend]\nkind = \"opencl\"\n").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = ProbeConfig::load(Some(Path::new("/nonexistent/gprobe.toml"))).unwrap_err();
        assert!(err.to_string().contains("Cannot read"));
    }

    #[test]
    fn test_log_level_filter() {
        assert_eq!(LogLevel::default().as_filter(), log::LevelFilter::Warn);
        assert_eq!(LogLevel::Trace.as_filter(), log::LevelFilter::Trace);
    }
}
