//! Artifact families and release asset selection.
//!
//! A release carries one asset per platform for the server binary plus a
//! single dictionary asset shared by every platform. Selection scans the
//! release's asset list in order and takes the first name that ends with
//! the expected suffix; ties cannot occur in practice, and if they do the
//! first-listed asset wins deterministically.

use std::path::{Path, PathBuf};

use crate::config::{Packaging, ServerSpec};
use crate::error::{Result, UpdateError};
use crate::platform::PlatformId;
use crate::registry::ReleaseMetadata;

/// The two artifact families this crate manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactFamily {
    /// The language server executable.
    Server,
    /// The auxiliary dictionary data asset.
    Dictionary,
}

impl ArtifactFamily {
    /// Key under which the last-installed tag is persisted.
    pub fn state_key(&self) -> &'static str {
        match self {
            ArtifactFamily::Server => "release",
            ArtifactFamily::Dictionary => "release-db",
        }
    }

    /// Short label for log lines and user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactFamily::Server => "server",
            ArtifactFamily::Dictionary => "dictionary",
        }
    }

    /// Filename the artifact installs under.
    pub fn install_name(&self, spec: &ServerSpec) -> String {
        match self {
            ArtifactFamily::Server if cfg!(windows) => format!("{}.exe", spec.server_name),
            ArtifactFamily::Server => spec.server_name.clone(),
            ArtifactFamily::Dictionary => spec.dictionary_name.clone(),
        }
    }

    /// Path of the live artifact inside the plugin's install directory.
    pub fn install_path(&self, spec: &ServerSpec, install_dir: &Path) -> PathBuf {
        install_dir.join(self.install_name(spec))
    }

    /// Packaging format of this family's release assets. Fixed per family
    /// by the release pipeline.
    pub fn packaging(&self, spec: &ServerSpec) -> Packaging {
        match self {
            ArtifactFamily::Server => spec.server_packaging,
            ArtifactFamily::Dictionary => spec.dictionary_packaging,
        }
    }

    /// Only the server family is an executable program.
    pub fn is_executable(&self) -> bool {
        matches!(self, ArtifactFamily::Server)
    }
}

/// The one asset in a release that matches the current platform and family,
/// narrowed and ready for the installer.
#[derive(Debug, Clone)]
pub struct SelectedAsset {
    /// Asset filename as published.
    pub name: String,
    /// Direct download URL.
    pub download_url: String,
    /// Tag of the release the asset came from.
    pub tag: String,
    /// Filename the payload installs under.
    pub install_name: String,
    /// Family the asset belongs to.
    pub family: ArtifactFamily,
    /// How the payload is packaged.
    pub packaging: Packaging,
}

/// Expected asset-name suffix for a family on a platform.
///
/// The dictionary is platform-independent; only the server family needs a
/// resolved platform.
fn expected_suffix(
    family: ArtifactFamily,
    platform: Option<PlatformId>,
    spec: &ServerSpec,
) -> Result<String> {
    let ext = family.packaging(spec).extension();
    match family {
        ArtifactFamily::Server => {
            let platform = platform.ok_or_else(|| UpdateError::UnsupportedPlatform {
                arch: std::env::consts::ARCH.to_string(),
                os: std::env::consts::OS.to_string(),
            })?;
            Ok(format!("{}.{}", platform, ext))
        }
        ArtifactFamily::Dictionary => Ok(format!("{}.{}", spec.dictionary_name, ext)),
    }
}

/// Pick the asset matching `platform` and `family` out of a release.
///
/// No match is recoverable: the caller logs and abandons the current update
/// attempt without touching anything on disk.
pub fn select_asset(
    release: &ReleaseMetadata,
    platform: Option<PlatformId>,
    family: ArtifactFamily,
    spec: &ServerSpec,
) -> Result<SelectedAsset> {
    let suffix = expected_suffix(family, platform, spec)?;

    let asset = release
        .assets
        .iter()
        .find(|asset| asset.name.ends_with(&suffix))
        .ok_or_else(|| UpdateError::NoMatchingAsset {
            tag: release.tag_name.clone(),
            suffix: suffix.clone(),
        })?;

    Ok(SelectedAsset {
        name: asset.name.clone(),
        download_url: asset.browser_download_url.clone(),
        tag: release.tag_name.clone(),
        install_name: family.install_name(spec),
        family,
        packaging: family.packaging(spec),
    })
}
