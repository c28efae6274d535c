// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Text, HTML and JSON reports
//!
//! Reports iterate the decoder's field table, so every export shows the
//! same rows the interface shows. Output is fully determined by the device
//! snapshot and the [`ReportMeta`] (title, version, OS line, timestamp).

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::decode::{Decoder, Section};
use crate::device::DeviceSnapshot;
use crate::error::{ProbeError, Result};

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Html,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
        }
    }

    /// Guess from a file extension; text otherwise.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("html") | Some("htm") => ReportFormat::Html,
            Some("json") => ReportFormat::Json,
            _ => ReportFormat::Text,
        }
    }
}

impl FromStr for ReportFormat {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "html" | "htm" => Ok(ReportFormat::Html),
            "json" => Ok(ReportFormat::Json),
            other => Err(ProbeError::Config(format!("Unknown report format: {}", other))),
        }
    }
}

/// Report header data
#[derive(Debug, Clone, PartialEq)]
pub struct ReportMeta {
    pub title: String,
    pub version: String,
    pub os_version: String,
    pub generated: DateTime<Local>,
}

impl ReportMeta {
    /// Header for a report generated now on this host.
    pub fn current() -> Self {
        Self {
            title: format!("{} Report", crate::APP_NAME),
            version: crate::VERSION.to_string(),
            os_version: crate::platform::os_version(),
            generated: Local::now(),
        }
    }

    fn timestamp(&self) -> String {
        self.generated.format("%a %b %e %H:%M:%S %Y").to_string()
    }
}

const REPORT_SECTIONS: [Section; 3] = [Section::Core, Section::Memory, Section::Performance];

/// Plain text report
pub fn text_report(snapshot: &DeviceSnapshot, meta: &ReportMeta) -> String {
    let decoder = Decoder::from_snapshot(snapshot);
    let mut out = String::new();

    let _ = writeln!(out, "{}", meta.title);
    let _ = writeln!(out, "{}", "=".repeat(meta.title.chars().count()));
    let _ = writeln!(out, "Version: {}", meta.version);
    let _ = writeln!(out, "OS Version: {}", meta.os_version);
    for field in decoder.section(Section::Driver) {
        let _ = writeln!(out, "{}: {}", field.label, field.value);
    }
    out.push('\n');

    for section in REPORT_SECTIONS {
        let title = section.title();
        let _ = writeln!(out, "{}", title);
        let _ = writeln!(out, "{}", "-".repeat(title.chars().count()));
        for field in decoder.section(section) {
            if field.is_header() {
                let _ = writeln!(out, "{}", field.label);
            } else {
                let _ = writeln!(out, "\t{}: {}", field.label, field.value);
            }
        }
        out.push('\n');
    }

    let _ = writeln!(out, "Generated: {}", meta.timestamp());
    out
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

const HTML_STYLE: &str = "\
body { font-size: 12px; font-family: Verdana, Arial, Helvetica, sans-serif; }
h1 { font-size: 15px; color: #690; }
h2 { font-size: 13px; color: #690; }
table { border-collapse: collapse; border: 1px solid #000; width: 500px; }
th { background-color: #deb; text-align: left; }
td { width: 50%; }
";

/// Standalone XHTML report
pub fn html_report(snapshot: &DeviceSnapshot, meta: &ReportMeta) -> String {
    let decoder = Decoder::from_snapshot(snapshot);
    let title = escape_html(&meta.title);
    let mut out = String::new();

    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    out.push_str(
        "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \
         \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">\n",
    );
    out.push_str("<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"en\">\n<head>\n");
    let _ = writeln!(out, "<title>{}</title>", title);
    out.push_str("<meta http-equiv=\"Content-Type\" content=\"text/html; charset=utf-8\" />\n");
    let _ = write!(out, "<style type=\"text/css\">\n{}</style>\n", HTML_STYLE);
    out.push_str("</head>\n<body>\n");

    let _ = writeln!(out, "<h1>{}</h1>", title);
    out.push_str("<p><small>");
    let _ = writeln!(out, "<b>Version:</b> {}<br/>", escape_html(&meta.version));
    let _ = writeln!(out, "<b>OS Version:</b> {}<br/>", escape_html(&meta.os_version));
    for field in decoder.section(Section::Driver) {
        let _ = writeln!(
            out,
            "<b>{}</b>: {}<br/>",
            escape_html(field.label),
            escape_html(&field.value)
        );
    }
    out.push_str("</small></p>\n");

    for section in REPORT_SECTIONS {
        let _ = writeln!(out, "<h2>{}</h2>", section.title());
        out.push_str("<table border=\"1\">\n");
        for field in decoder.section(section) {
            if field.is_header() {
                let _ = writeln!(
                    out,
                    "<tr><th colspan=\"2\">{}</th></tr>",
                    escape_html(field.label)
                );
            } else {
                let _ = writeln!(
                    out,
                    "<tr><th>{}</th><td>{}</td></tr>",
                    escape_html(field.label),
                    escape_html(&field.value)
                );
            }
        }
        out.push_str("</table>\n");
    }

    let _ = writeln!(
        out,
        "<p><small><b>Generated:</b> {}</small></p>",
        meta.timestamp()
    );
    out.push_str("</body>\n</html>\n");
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    title: &'a str,
    version: &'a str,
    os_version: &'a str,
    generated: String,
    device: &'a DeviceSnapshot,
}

/// Pretty-printed JSON of the full descriptor and latest results
pub fn json_report(snapshot: &DeviceSnapshot, meta: &ReportMeta) -> Result<String> {
    let report = JsonReport {
        title: &meta.title,
        version: &meta.version,
        os_version: &meta.os_version,
        generated: meta.generated.to_rfc3339(),
        device: snapshot,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

pub fn render(format: ReportFormat, snapshot: &DeviceSnapshot, meta: &ReportMeta) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(text_report(snapshot, meta)),
        ReportFormat::Html => Ok(html_report(snapshot, meta)),
        ReportFormat::Json => json_report(snapshot, meta),
    }
}

/// Render and write to `path`; I/O failures carry the path and reason.
pub fn export(
    path: &Path,
    format: ReportFormat,
    snapshot: &DeviceSnapshot,
    meta: &ReportMeta,
) -> Result<()> {
    let content = render(format, snapshot, meta)?;
    fs::write(path, content).map_err(|source| ProbeError::Export {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("Exported {:?} report to {}", format, path.display());
    Ok(())
}
