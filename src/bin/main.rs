// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! CLI tool for GPU Probe (gprobe)

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{mpsc, Arc};

use gprobelib::backend;
use gprobelib::config::BackendKind;
use gprobelib::decode::{format_iec, Prefix};
use gprobelib::report::{self, ReportFormat, ReportMeta};
use gprobelib::{
    AcceleratorBackend, DeviceRegistry, DeviceSnapshot, ProbeConfig, ProbeError, RegistryOptions,
};

#[derive(Parser)]
#[command(name = "gprobe")]
#[command(about = "GPU Probe: compute accelerator information and micro-benchmarks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the simulated backend instead of real hardware
    #[arg(long, global = true)]
    simulate: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch Graphical User Interface (GUI) - desktop application
    #[cfg(feature = "gui")]
    Gui,
    /// Launch Terminal User Interface (TUI)
    #[cfg(feature = "tui")]
    Tui,
    /// List compute devices
    List,
    /// Benchmark one device and print or save its report
    Report {
        /// Device index as shown by `gprobe list`
        #[arg(short, long, default_value_t = 0)]
        device: usize,

        /// Save a plain text report
        #[arg(long, value_name = "PATH")]
        text: Option<PathBuf>,

        /// Save an HTML report
        #[arg(long, value_name = "PATH")]
        html: Option<PathBuf>,

        /// Save a JSON report
        #[arg(long, value_name = "PATH")]
        json: Option<PathBuf>,

        /// Format for stdout when no file is given (text, html or json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print a sample configuration file
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match ProbeConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return fatal(&e),
    };
    if cli.simulate {
        config.backend.kind = BackendKind::Simulated;
    }
    init_logging(cli.verbose, &config);

    match run(&cli, &config) {
        Ok(code) => code,
        Err(e) => fatal(&e),
    }
}

fn run(cli: &Cli, config: &ProbeConfig) -> Result<ExitCode, ProbeError> {
    match &cli.command {
        #[cfg(feature = "gui")]
        Some(Commands::Gui) | None => {
            let shell = match start_shell(config) {
                Ok(shell) => shell,
                Err(e) if e.is_fatal_startup() => {
                    eprintln!("{} {}", "[ERROR]".red(), e);
                    if let Err(dialog) = gprobelib::gui::show_fatal(&e) {
                        log::warn!("Cannot show error window: {}", dialog);
                    }
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e),
            };
            gprobelib::gui::run(shell)
                .map_err(|e| ProbeError::Thread(format!("GUI error: {}", e)))?;
        }

        #[cfg(not(feature = "gui"))]
        None => {
            eprintln!(
                "{} GUI support not compiled in; try `gprobe list` or `gprobe report`",
                "[WARN]".yellow()
            );
        }

        #[cfg(feature = "tui")]
        Some(Commands::Tui) => {
            let shell = start_shell(config)?;
            gprobelib::tui::run(shell)?;
        }

        Some(Commands::List) => handle_list(config)?,

        Some(Commands::Report {
            device,
            text,
            html,
            json,
            format,
        }) => {
            let targets = [
                (text, ReportFormat::Text),
                (html, ReportFormat::Html),
                (json, ReportFormat::Json),
            ];
            let exports: Vec<(&Path, ReportFormat)> = targets
                .iter()
                .filter_map(|(path, format)| path.as_deref().map(|p| (p, *format)))
                .collect();
            let stdout_format = format.parse::<ReportFormat>()?;
            return handle_report(config, *device, &exports, stdout_format);
        }

        Some(Commands::Config) => print!("{}", ProbeConfig::sample_toml()),
    }
    Ok(ExitCode::SUCCESS)
}

/// `-v` flags win over the config file; `RUST_LOG` wins over both.
fn init_logging(verbose: u8, config: &ProbeConfig) {
    let level = match verbose {
        0 => config.logging.level.as_filter(),
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .init();
}

fn fatal(error: &ProbeError) -> ExitCode {
    eprintln!("{} {}", "Error:".red().bold(), error);
    ExitCode::FAILURE
}

fn progress_line(message: &str) {
    eprintln!("{}", message.dimmed());
}

fn open_backend(config: &ProbeConfig) -> Result<Arc<dyn AcceleratorBackend>, ProbeError> {
    backend::detect(config)
}

#[cfg(any(feature = "gui", feature = "tui"))]
fn start_shell(config: &ProbeConfig) -> Result<gprobelib::ShellController, ProbeError> {
    let backend = open_backend(config)?;
    let mut progress = |m: &str| progress_line(m);
    gprobelib::ShellController::startup(backend, config, &mut progress)
}

fn discover(config: &ProbeConfig) -> Result<DeviceRegistry, ProbeError> {
    let backend = open_backend(config)?;
    // Nothing listens for completion events in batch mode
    let (events, _) = mpsc::channel();
    let mut progress = |m: &str| log::info!("{}", m);
    DeviceRegistry::discover(backend, RegistryOptions::from(config), events, &mut progress)
}

fn handle_list(config: &ProbeConfig) -> Result<(), ProbeError> {
    let registry = discover(config)?;
    println!(
        "{} ({} backend)",
        "Compute devices".bold(),
        registry.backend_name()
    );
    for device in registry.devices() {
        let info = device.info();
        println!(
            "  {} {}  compute {}  {}",
            format!("[{}]", device.index()).cyan(),
            info.name.bold(),
            info.capability,
            format_iec(info.memory.total_global as f64, Prefix::Nothing, "B")
        );
    }
    Ok(())
}

fn handle_report(
    config: &ProbeConfig,
    device: usize,
    exports: &[(&Path, ReportFormat)],
    stdout_format: ReportFormat,
) -> Result<ExitCode, ProbeError> {
    let registry = discover(config)?;
    if device >= registry.count() {
        return Err(ProbeError::Config(format!(
            "Device index {} out of range ({} device(s) found)",
            device,
            registry.count()
        )));
    }

    let mut progress = |m: &str| progress_line(m);
    registry.run_batch_on(device, config.benchmark.batch_passes, &mut progress);
    let snapshot = DeviceSnapshot::from(registry.get(device));
    registry.shutdown();

    let meta = ReportMeta::current();
    if exports.is_empty() {
        print!("{}", report::render(stdout_format, &snapshot, &meta)?);
        return Ok(ExitCode::SUCCESS);
    }

    let mut failed = false;
    for (path, format) in exports {
        match report::export(path, *format, &snapshot, &meta) {
            Ok(()) => eprintln!("{} {}", "Saved".green(), path.display()),
            Err(e) => {
                eprintln!("{} {}", "Error:".red().bold(), e);
                failed = true;
            }
        }
    }
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
