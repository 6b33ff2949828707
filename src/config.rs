//! Typed configuration for the update subsystem.
//!
//! Two structures: [`ServerSpec`] is the static description of the managed
//! artifacts (supplied once by the plugin), [`UpdaterConfig`] is the user's
//! editor configuration, resolved by the host into a plain struct once per
//! operation instead of being re-read key by key.

use std::env;
use std::path::{Path, PathBuf};

/// Packaging format of a release asset.
///
/// Fixed per artifact family by the release pipeline; it is never inferred
/// from asset names at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packaging {
    Zip,
    Gzip,
}

impl Packaging {
    /// File extension used in asset names.
    pub fn extension(&self) -> &'static str {
        match self {
            Packaging::Zip => "zip",
            Packaging::Gzip => "gz",
        }
    }
}

/// Static description of the server and its dictionary asset.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    /// Release repository owner.
    pub owner: String,
    /// Release repository name.
    pub repo: String,
    /// Server binary base name (without the Windows `.exe`).
    pub server_name: String,
    /// Arguments passed to the server when the supervisor starts it.
    pub server_args: Vec<String>,
    /// Literal dictionary filename as installed and as it appears in
    /// release asset names (e.g. `dict.db3`).
    pub dictionary_name: String,
    /// The dictionary is published under a pinned release tag rather than
    /// whatever release is latest.
    pub dictionary_tag: Option<String>,
    /// Packaging of the server assets.
    pub server_packaging: Packaging,
    /// Packaging of the dictionary asset.
    pub dictionary_packaging: Packaging,
}

impl ServerSpec {
    /// A spec with zip packaging for both families and no pinned
    /// dictionary tag.
    pub fn new(owner: &str, repo: &str, server_name: &str, dictionary_name: &str) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            server_name: server_name.to_string(),
            server_args: Vec::new(),
            dictionary_name: dictionary_name.to_string(),
            dictionary_tag: None,
            server_packaging: Packaging::Zip,
            dictionary_packaging: Packaging::Zip,
        }
    }

    /// Web page listing the repository's releases, used for the
    /// "open release page" consent choice.
    pub fn releases_page(&self) -> String {
        format!("https://github.com/{}/{}/releases", self.owner, self.repo)
    }
}

/// User-facing options recognized by the update subsystem.
///
/// The host resolves its configuration store into this struct before each
/// operation; defaults match the plugin's documented behavior.
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Custom, unmanaged server path. When set, the whole install is the
    /// user's responsibility: no bootstrap and no update checks for either
    /// family.
    pub server_path: Option<String>,
    /// Custom dictionary path. When set, the dictionary is never
    /// bootstrapped.
    pub dictionary_path: Option<String>,
    /// Run the silent update check when the editor starts.
    pub check_on_startup: bool,
    /// Ask before downloading; when false, updates are applied without a
    /// consent prompt.
    pub prompt: bool,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            server_path: None,
            dictionary_path: None,
            check_on_startup: true,
            prompt: true,
        }
    }
}

impl UpdaterConfig {
    /// Whether the server install path is managed by this crate.
    pub fn uses_custom_server_path(&self) -> bool {
        self.server_path.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Whether the dictionary lives at a user-supplied path.
    pub fn uses_custom_dictionary_path(&self) -> bool {
        self.dictionary_path.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Resolve the configured custom server path, if any: `~` is expanded
    /// and bare command names are looked up on `PATH`.
    pub fn resolved_server_path(&self) -> Option<PathBuf> {
        let raw = self.server_path.as_deref().filter(|p| !p.is_empty())?;
        let expanded = expand_tilde(raw);
        if expanded.exists() {
            return Some(expanded);
        }
        search_path(&expanded)
    }
}

fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
        #[cfg(windows)]
        if let Some(profile) = env::var_os("USERPROFILE") {
            return PathBuf::from(profile).join(rest);
        }
    }
    PathBuf::from(raw)
}

/// Look a bare command name up on `PATH`.
fn search_path(name: &Path) -> Option<PathBuf> {
    // Only bare names get the PATH treatment; anything with a separator is
    // taken literally.
    if name.components().count() > 1 {
        return None;
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_checks_and_prompting() {
        let config = UpdaterConfig::default();
        assert!(config.check_on_startup);
        assert!(config.prompt);
        assert!(config.server_path.is_none());
        assert!(!config.uses_custom_server_path());
    }

    #[test]
    fn empty_server_path_is_not_custom() {
        let config = UpdaterConfig {
            server_path: Some(String::new()),
            ..Default::default()
        };
        assert!(!config.uses_custom_server_path());
        assert!(config.resolved_server_path().is_none());
    }

    #[test]
    fn empty_dictionary_path_is_not_custom() {
        assert!(!UpdaterConfig::default().uses_custom_dictionary_path());

        let config = UpdaterConfig {
            dictionary_path: Some(String::new()),
            ..Default::default()
        };
        assert!(!config.uses_custom_dictionary_path());

        let config = UpdaterConfig {
            dictionary_path: Some("/data/dict.db3".into()),
            ..Default::default()
        };
        assert!(config.uses_custom_dictionary_path());
    }

    #[test]
    fn packaging_extensions() {
        assert_eq!(Packaging::Zip.extension(), "zip");
        assert_eq!(Packaging::Gzip.extension(), "gz");
    }

    #[test]
    fn releases_page_points_at_repo() {
        let spec = ServerSpec::new("iamcco", "ds-pinyin-lsp", "ds-pinyin-lsp", "dict.db3");
        assert_eq!(
            spec.releases_page(),
            "https://github.com/iamcco/ds-pinyin-lsp/releases"
        );
    }

    #[cfg(unix)]
    #[test]
    fn tilde_expands_against_home() {
        let expanded = expand_tilde("~/bin/server");
        if let Some(home) = env::var_os("HOME") {
            assert!(expanded.starts_with(home));
            assert!(expanded.ends_with("bin/server"));
        }
    }

    #[test]
    fn absolute_missing_path_resolves_to_none() {
        let config = UpdaterConfig {
            server_path: Some("/definitely/not/a/real/server/binary".into()),
            ..Default::default()
        };
        assert!(config.uses_custom_server_path());
        assert!(config.resolved_server_path().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn bare_name_is_searched_on_path() {
        let config = UpdaterConfig {
            server_path: Some("sh".into()),
            ..Default::default()
        };
        // `sh` exists on every Unix test machine.
        assert!(config.resolved_server_path().is_some());
    }
}
