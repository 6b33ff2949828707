//! Error types for release resolution and install operations.
//!
//! This module defines [`UpdateError`], the primary error type used throughout
//! the crate, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Use `UpdateError` for failures the coordinator handles distinctly
//!   (busy install target vs. generic download failure, for example)
//! - Use `anyhow::Error` at collaborator boundaries (`ProcessHooks`,
//!   `EditorHost::open_external`) where the concrete cause is irrelevant
//! - Nothing in this crate may panic through to the host editor

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for update and install operations.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// No release artifact is published for the running machine.
    #[error("No prebuilt binaries for this platform: {arch} {os}")]
    UnsupportedPlatform { arch: String, os: String },

    /// Transport-level failure talking to the release registry.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The registry answered with a non-success status.
    #[error("Release not found: HTTP {status} for {url}")]
    ReleaseNotFound { url: String, status: u16 },

    /// The registry answered 2xx but the body was not a release document.
    #[error("Malformed release metadata: {message}")]
    MalformedRelease { message: String },

    /// The release carries no asset for the resolved platform.
    #[error("Release {tag} has no asset matching '{suffix}'")]
    NoMatchingAsset { tag: String, suffix: String },

    /// The asset download itself failed (bad status on the asset URL).
    #[error("Download failed: HTTP {status} for {url}")]
    Download { url: String, status: u16 },

    /// The install target is held open by another running instance.
    #[error("Install target is busy: {path}")]
    ResourceBusy { path: PathBuf },

    /// Rewriting the binary's ELF interpreter failed. Never fatal; the
    /// installer logs and swallows this at the call site.
    #[error("Interpreter patch failed: {message}")]
    PatchFailed { message: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for update operations.
pub type Result<T> = std::result::Result<T, UpdateError>;

impl UpdateError {
    /// Whether this failure means the target file is locked by another
    /// running instance, which gets a distinct user-facing message.
    pub fn is_busy(&self) -> bool {
        matches!(self, UpdateError::ResourceBusy { .. })
    }
}
