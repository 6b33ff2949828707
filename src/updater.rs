//! Update coordination.
//!
//! Drives a full check/consent/install cycle per artifact family: compare
//! the registry's tag against the persisted record, ask the user, stop the
//! server where the OS demands it, delegate to the installer, record the
//! new tag, restart. Every failure degrades to "no update performed" — a
//! broken update path must never take the editor down with it.

use std::path::PathBuf;

use crate::assets::{select_asset, ArtifactFamily, SelectedAsset};
use crate::config::{ServerSpec, UpdaterConfig};
use crate::error::{Result, UpdateError};
use crate::host::{ConsentChoice, EditorHost, Severity};
use crate::installer;
use crate::platform::{self, PlatformId};
use crate::registry::{RegistryClient, ReleaseMetadata};
use crate::state::VersionStore;
use crate::supervisor::ProcessHooks;

/// Who asked for this check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTrigger {
    /// Silent check when the editor starts. Failures degrade without any
    /// user-facing message.
    Startup,
    /// Explicit user command. Results and failures are reported.
    Manual,
}

/// Terminal result of one update or bootstrap cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A custom, unmanaged path is configured for the artifact; never
    /// auto-install or auto-update.
    CustomPath,
    /// Startup checks are disabled by configuration.
    ChecksDisabled,
    /// Installed tag equals the registry's tag; nothing to do.
    UpToDate,
    /// A new release was downloaded and installed.
    Installed { tag: String },
    /// The user declined (or chose the release page instead).
    Declined,
    /// The cycle failed; the previous install and record are untouched.
    Failed,
}

/// Orchestrates release checks and installs for both artifact families.
pub struct UpdateCoordinator<H, S, P> {
    spec: ServerSpec,
    config: UpdaterConfig,
    install_dir: PathBuf,
    registry: RegistryClient,
    platform: Option<PlatformId>,
    host: H,
    store: S,
    hooks: P,
}

impl<H, S, P> UpdateCoordinator<H, S, P>
where
    H: EditorHost,
    S: VersionStore,
    P: ProcessHooks,
{
    /// Build a coordinator.
    ///
    /// The platform is resolved once here; an unsupported platform is not
    /// an error at construction (dictionary updates still work, and manual
    /// server installs remain possible) but server selection will fail.
    pub fn new(
        spec: ServerSpec,
        config: UpdaterConfig,
        install_dir: impl Into<PathBuf>,
        host: H,
        store: S,
        hooks: P,
    ) -> Result<Self> {
        let registry = RegistryClient::new(&spec)?;
        let platform = match platform::resolve() {
            Ok(platform) => Some(platform),
            Err(err) => {
                tracing::warn!("platform resolution failed: {err}");
                None
            }
        };

        Ok(Self {
            spec,
            config,
            install_dir: install_dir.into(),
            registry,
            platform,
            host,
            store,
            hooks,
        })
    }

    /// Override the resolved platform (tests).
    pub fn with_platform(mut self, platform: PlatformId) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Point the registry client at a different host (tests).
    pub fn with_registry_base(mut self, base_url: &str) -> Self {
        self.registry = self.registry.with_base_url(base_url);
        self
    }

    /// Replace the configuration for subsequent operations.
    pub fn set_config(&mut self, config: UpdaterConfig) {
        self.config = config;
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hooks_mut(&mut self) -> &mut P {
        &mut self.hooks
    }

    /// Path the family's artifact installs to.
    pub fn artifact_path(&self, family: ArtifactFamily) -> PathBuf {
        family.install_path(&self.spec, &self.install_dir)
    }

    /// Resolve the server binary to launch: the configured custom path when
    /// set, otherwise the managed install path. `None` when neither exists
    /// on disk.
    pub fn server_binary(&self) -> Option<PathBuf> {
        if self.config.uses_custom_server_path() {
            return self.config.resolved_server_path();
        }
        let managed = self.artifact_path(ArtifactFamily::Server);
        managed.exists().then_some(managed)
    }

    /// Run one update cycle for `family`.
    ///
    /// Infallible toward the host: every failure is logged, optionally
    /// reported for manual checks, and folded into the outcome.
    pub fn check_update(&mut self, family: ArtifactFamily, trigger: CheckTrigger) -> UpdateOutcome {
        // A custom server path means the whole install is the user's;
        // neither family gets update checks.
        if self.config.uses_custom_server_path() {
            tracing::debug!("custom server path configured; skipping update check");
            return UpdateOutcome::CustomPath;
        }
        if trigger == CheckTrigger::Startup && !self.config.check_on_startup {
            return UpdateOutcome::ChecksDisabled;
        }

        match self.try_update(family, trigger) {
            Ok(outcome) => outcome,
            Err(err) => self.report_failure(family, trigger, err),
        }
    }

    /// First-run bootstrap: offer to install `family` when its artifact is
    /// missing. Does nothing when the artifact already exists.
    pub fn ensure_installed(&mut self, family: ArtifactFamily) -> UpdateOutcome {
        let unmanaged = match family {
            ArtifactFamily::Server => self.config.uses_custom_server_path(),
            ArtifactFamily::Dictionary => self.config.uses_custom_dictionary_path(),
        };
        if unmanaged {
            return UpdateOutcome::CustomPath;
        }
        if self.artifact_path(family).exists() {
            return UpdateOutcome::UpToDate;
        }

        if self.config.prompt {
            let name = family.install_name(&self.spec);
            let message = format!("{name} is not found, download from GitHub release?");
            if !self.host.confirm(&message) {
                return UpdateOutcome::Declined;
            }
        }

        match self.fetch_and_install(family, false) {
            Ok(outcome) => outcome,
            Err(err) => {
                // Bootstrap failures are always user-visible; without the
                // artifact the plugin cannot work at all.
                self.report_failure(family, CheckTrigger::Manual, err)
            }
        }
    }

    fn try_update(&mut self, family: ArtifactFamily, trigger: CheckTrigger) -> Result<UpdateOutcome> {
        let release = self.fetch_release(family)?;
        let installed = self.store.installed_tag(family);

        if installed.as_deref() == Some(release.tag_name.as_str()) {
            if trigger == CheckTrigger::Manual {
                self.host.show_message(
                    Severity::Info,
                    &format!("Your {} is up to date ({})", family.label(), release.tag_name),
                );
            }
            return Ok(UpdateOutcome::UpToDate);
        }

        let consent = if self.config.prompt {
            let old = installed.as_deref().unwrap_or("unknown release");
            let message = format!(
                "{} has a new release: {}, you're using {}. Download from GitHub?",
                family.label(),
                release.tag_name,
                old
            );
            self.host.confirm_update(&message)
        } else {
            ConsentChoice::Install
        };

        match consent {
            ConsentChoice::Install => {
                let asset = select_asset(&release, self.platform, family, &self.spec)?;
                self.apply(family, &asset, true)
            }
            ConsentChoice::OpenReleasePage => {
                if let Err(err) = self.host.open_external(&self.spec.releases_page()) {
                    tracing::debug!("could not open release page: {err}");
                }
                Ok(UpdateOutcome::Declined)
            }
            ConsentChoice::Dismiss => Ok(UpdateOutcome::Declined),
        }
    }

    fn fetch_release(&self, family: ArtifactFamily) -> Result<ReleaseMetadata> {
        let tag = match family {
            ArtifactFamily::Server => None,
            ArtifactFamily::Dictionary => self.spec.dictionary_tag.as_deref(),
        };
        self.registry.fetch_release(tag)
    }

    fn fetch_and_install(&mut self, family: ArtifactFamily, restart: bool) -> Result<UpdateOutcome> {
        let release = self.fetch_release(family)?;
        let asset = select_asset(&release, self.platform, family, &self.spec)?;
        self.apply(family, &asset, restart)
    }

    /// Stop-install-record-restart around one selected asset.
    fn apply(
        &mut self,
        family: ArtifactFamily,
        asset: &SelectedAsset,
        restart: bool,
    ) -> Result<UpdateOutcome> {
        // Windows locks running executable images against replacement; the
        // supervised process has to go down before the rename.
        if cfg!(windows) && family == ArtifactFamily::Server {
            if let Err(err) = self.hooks.before_install(family) {
                tracing::warn!("before-install hook failed: {err}");
            }
        }

        let host = &mut self.host;
        let label = family.label();
        let tag = asset.tag.clone();
        installer::install(&self.registry, asset, &self.install_dir, &mut |cur, total| {
            host.show_progress(&progress_text(label, &tag, cur, total));
        })?;

        if let Err(err) = self.store.record_tag(family, &asset.tag) {
            // The artifact is installed and working; a failed record only
            // costs one redundant check next time.
            tracing::warn!("could not persist installed tag {}: {err}", asset.tag);
        }

        if restart && family == ArtifactFamily::Server {
            if let Err(err) = self.hooks.after_install(family) {
                tracing::warn!("after-install hook failed: {err}");
            }
        }

        Ok(UpdateOutcome::Installed {
            tag: asset.tag.clone(),
        })
    }

    fn report_failure(
        &mut self,
        family: ArtifactFamily,
        trigger: CheckTrigger,
        err: UpdateError,
    ) -> UpdateOutcome {
        tracing::warn!("{} update failed: {err}", family.label());
        if trigger == CheckTrigger::Manual {
            let text = failure_message(family, &err);
            self.host.show_message(Severity::Error, &text);
        }
        UpdateOutcome::Failed
    }
}

fn progress_text(label: &str, tag: &str, received: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => {
            let percent = (received as f64 / total as f64) * 100.0;
            format!("{percent:.2}% Downloading {label} {tag}")
        }
        _ => format!("Downloading {label} {tag} ({received} bytes)"),
    }
}

fn failure_message(family: ArtifactFamily, err: &UpdateError) -> String {
    if err.is_busy() {
        format!(
            "Upgrade {} failed, other editor instances might be using it; close them and try again",
            family.label()
        )
    } else {
        format!("Upgrade {} failed, please try again: {err}", family.label())
    }
}
