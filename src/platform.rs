//! Platform resolution for release asset matching.
//!
//! Maps the running (architecture, operating system) pair to the canonical
//! target triple used in release asset names. On x86_64 Linux the C library
//! is probed so musl systems pick up the statically-linked build instead of
//! the glibc one.

use std::process::Command;

use crate::error::{Result, UpdateError};

/// Canonical identifier for the running platform.
///
/// Exactly one `PlatformId` is resolved per process and it never changes
/// for the process lifetime; the coordinator resolves it once at
/// construction and threads it through asset selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformId(&'static str);

impl PlatformId {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for PlatformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// C runtime library flavor on Linux.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibcFlavor {
    Glibc,
    Musl,
    /// Probe could not run or its output was inconclusive. Treated as glibc.
    Unknown,
}

/// Resolve the platform identifier for the running machine.
///
/// Fails with [`UpdateError::UnsupportedPlatform`] when no release artifact
/// exists for this (arch, os) pair; callers must treat that as terminal for
/// automatic installs.
pub fn resolve() -> Result<PlatformId> {
    resolve_with(std::env::consts::ARCH, std::env::consts::OS, probe_libc)
}

/// Resolve from an explicit pair, with an injectable libc probe.
///
/// The probe is only consulted for the x86_64 Linux entry; every other
/// supported pair maps directly from the table.
pub fn resolve_with(
    arch: &str,
    os: &str,
    probe: impl FnOnce() -> LibcFlavor,
) -> Result<PlatformId> {
    let id = lookup(arch, os).ok_or_else(|| UpdateError::UnsupportedPlatform {
        arch: arch.to_string(),
        os: os.to_string(),
    })?;

    if id.0 == "x86_64-unknown-linux-gnu" && probe() == LibcFlavor::Musl {
        return Ok(PlatformId("x86_64-unknown-linux-musl"));
    }

    Ok(id)
}

fn lookup(arch: &str, os: &str) -> Option<PlatformId> {
    let id = match (arch, os) {
        ("x86_64", "linux") => "x86_64-unknown-linux-gnu",
        ("aarch64", "linux") => "aarch64-unknown-linux-gnu",
        ("x86_64", "windows") => "x86_64-pc-windows-msvc",
        ("aarch64", "windows") => "aarch64-pc-windows-msvc",
        ("x86_64", "macos") => "x86_64-apple-darwin",
        ("aarch64", "macos") => "aarch64-apple-darwin",
        _ => return None,
    };
    Some(PlatformId(id))
}

/// Probe the system C library by running `ldd --version`.
///
/// musl's ldd prints "musl libc" (to stderr on some distributions). A
/// missing or failing `ldd` is not an error; the probe reports `Unknown`
/// and resolution defaults to glibc.
pub fn probe_libc() -> LibcFlavor {
    let output = match Command::new("ldd").arg("--version").output() {
        Ok(output) => output,
        Err(err) => {
            tracing::debug!("ldd probe unavailable: {err}");
            return LibcFlavor::Unknown;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if stdout.contains("musl") || stderr.contains("musl") {
        LibcFlavor::Musl
    } else if stdout.contains("GNU") || stdout.contains("glibc") {
        LibcFlavor::Glibc
    } else {
        LibcFlavor::Unknown
    }
}
