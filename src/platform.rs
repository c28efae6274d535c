// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2026 nervosys

//! Host operating system description for report headers

/// One-line OS description, e.g. `Linux 6.8.0-45-generic #45-Ubuntu SMP x86_64`.
///
/// Never fails; falls back to `"<family> (unknown)"`.
pub fn os_version() -> String {
    imp::os_version().unwrap_or_else(|| format!("{} (unknown)", os_family()))
}

/// Short platform tag: `linux64`, `macosx64`, `win64`, ...
pub fn platform_string() -> String {
    let base = match std::env::consts::OS {
        "linux" => "linux",
        "macos" => "macosx",
        "windows" => "win",
        other => other,
    };
    let bits = if cfg!(target_pointer_width = "64") {
        "64"
    } else if base == "win" {
        "32"
    } else {
        ""
    };
    format!("{}{}", base, bits)
}

fn os_family() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Mac OS X",
        "windows" => "Windows",
        _ => "Unknown OS",
    }
}

#[cfg(all(unix, not(all(target_os = "macos", feature = "apple"))))]
mod imp {
    use std::ffi::CStr;

    /// `uname -srvm` equivalent.
    pub fn os_version() -> Option<String> {
        // SAFETY: utsname is plain old data; uname fills it on success.
        let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
        if unsafe { libc::uname(&mut uts) } != 0 {
            return None;
        }
        let field = |raw: &[libc::c_char]| {
            // SAFETY: uname NUL-terminates every field.
            unsafe { CStr::from_ptr(raw.as_ptr()) }
                .to_string_lossy()
                .trim()
                .to_string()
        };
        let parts = [
            field(&uts.sysname),
            field(&uts.release),
            field(&uts.version),
            field(&uts.machine),
        ];
        Some(parts.join(" "))
    }
}

#[cfg(all(target_os = "macos", feature = "apple"))]
mod imp {
    const SYSTEM_VERSION_PLIST: &str = "/System/Library/CoreServices/SystemVersion.plist";

    /// Product name, visible version and build from SystemVersion.plist.
    pub fn os_version() -> Option<String> {
        let value = plist::Value::from_file(SYSTEM_VERSION_PLIST).ok()?;
        let dict = value.as_dictionary()?;
        let get = |key: &str| dict.get(key).and_then(|v| v.as_string()).map(str::to_string);
        Some(format!(
            "{} {} {}",
            get("ProductName")?,
            get("ProductUserVisibleVersion").or_else(|| get("ProductVersion"))?,
            get("ProductBuildVersion")?
        ))
    }
}

#[cfg(windows)]
mod imp {
    use std::process::Command;

    /// Output of `ver`, plus the pointer width.
    pub fn os_version() -> Option<String> {
        let output = Command::new("cmd").args(["/C", "ver"]).output().ok()?;
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return None;
        }
        let arch = if cfg!(target_pointer_width = "64") {
            "AMD64"
        } else {
            "x86"
        };
        Some(format!("{} {}", text, arch))
    }
}

#[cfg(not(any(unix, windows)))]
mod imp {
    pub fn os_version() -> Option<String> {
        None
    }
}
