//! lskeeper - Release resolution and self-update for editor-hosted
//! language servers.
//!
//! lskeeper keeps a language server binary and its auxiliary dictionary
//! asset installed and current from GitHub releases: it detects the host
//! platform, resolves the matching release asset, downloads and installs
//! it atomically, persists the installed tag, and coordinates stopping and
//! restarting the supervised server process around installs.
//!
//! # Modules
//!
//! - [`assets`] - Artifact families and release asset selection
//! - [`config`] - Server specification and updater configuration
//! - [`error`] - Error types and result aliases
//! - [`host`] - Editor-facing callbacks (messages, consent, progress)
//! - [`installer`] - Atomic download, extraction, and install
//! - [`platform`] - Host platform detection and identifier mapping
//! - [`registry`] - GitHub release registry client
//! - [`state`] - Persistence of installed release tags
//! - [`supervisor`] - Server child-process lifecycle
//! - [`updater`] - Update coordination across all of the above
//!
//! # Example
//!
//! ```no_run
//! use lskeeper::config::{ServerSpec, UpdaterConfig};
//! use lskeeper::host::MockHost;
//! use lskeeper::state::FileVersionStore;
//! use lskeeper::supervisor::NoopHooks;
//! use lskeeper::updater::{CheckTrigger, UpdateCoordinator};
//! use lskeeper::ArtifactFamily;
//!
//! # fn main() -> anyhow::Result<()> {
//! let spec = ServerSpec::new("iamcco", "ds-pinyin-lsp", "ds-pinyin-lsp", "dict.db3");
//! let store = FileVersionStore::open("/opt/plugin/releases.json");
//! let mut coordinator = UpdateCoordinator::new(
//!     spec,
//!     UpdaterConfig::default(),
//!     "/opt/plugin",
//!     MockHost::new(),
//!     store,
//!     NoopHooks,
//! )?;
//!
//! coordinator.ensure_installed(ArtifactFamily::Server);
//! coordinator.check_update(ArtifactFamily::Server, CheckTrigger::Startup);
//! # Ok(())
//! # }
//! ```
//!
//! Real plugins implement [`host::EditorHost`] against their editor's API
//! and hand the coordinator a [`supervisor::ProcessSupervisor`] as hooks.

pub mod assets;
pub mod config;
pub mod error;
pub mod host;
pub mod installer;
pub mod platform;
pub mod registry;
pub mod state;
pub mod supervisor;
pub mod updater;

pub use assets::ArtifactFamily;
pub use error::{Result, UpdateError};
pub use updater::{CheckTrigger, UpdateCoordinator, UpdateOutcome};
