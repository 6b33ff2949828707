//! Supervision of the long-running server process.
//!
//! A single optional child handle behind a narrow start/stop/restart
//! interface. Restart is strictly sequential stop-then-start — the two
//! never overlap. The editor↔server protocol runs over the child's piped
//! stdio and is entirely the host's concern.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::assets::ArtifactFamily;

/// Hooks the coordinator invokes around installs so the supervised process
/// is stopped before its binary is replaced and restarted afterwards.
pub trait ProcessHooks {
    /// Called before the installer touches the family's artifact. Only
    /// invoked for the server family on platforms that lock running
    /// executables.
    fn before_install(&mut self, family: ArtifactFamily) -> anyhow::Result<()>;

    /// Called after a successful install of the family's artifact.
    fn after_install(&mut self, family: ArtifactFamily) -> anyhow::Result<()>;
}

/// Hooks for hosts with no supervised process (or tests).
pub struct NoopHooks;

impl ProcessHooks for NoopHooks {
    fn before_install(&mut self, _family: ArtifactFamily) -> anyhow::Result<()> {
        Ok(())
    }

    fn after_install(&mut self, _family: ArtifactFamily) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Owns the server child process.
#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    command: Option<PathBuf>,
    args: Vec<String>,
    child: Option<Child>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the binary and arguments used by subsequent starts. Takes
    /// effect on the next start; a running child is left alone.
    pub fn configure(&mut self, binary: impl Into<PathBuf>, args: &[String]) {
        self.command = Some(binary.into());
        self.args = args.to_vec();
    }

    /// Launch path currently configured, if any.
    pub fn command(&self) -> Option<&Path> {
        self.command.as_deref()
    }

    /// Whether a child is currently alive.
    ///
    /// Reaps the handle as a side effect when the child has already
    /// exited on its own.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!("server exited on its own: {status}");
                    self.child = None;
                    false
                }
                Ok(None) => true,
                Err(err) => {
                    tracing::warn!("could not poll server process: {err}");
                    false
                }
            },
            None => false,
        }
    }

    /// Start the server if it is not already running.
    pub fn start(&mut self) -> anyhow::Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let command = self
            .command
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no server binary configured"))?;

        let child = Command::new(&command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| anyhow::anyhow!("failed to start {}: {err}", command.display()))?;

        tracing::info!("started server: {} (pid {})", command.display(), child.id());
        self.child = Some(child);
        Ok(())
    }

    /// Stop the server if running. Errors while killing an already-dead
    /// process are logged, not surfaced.
    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                tracing::debug!("server already gone on kill: {err}");
            }
            match child.wait() {
                Ok(status) => tracing::info!("stopped server: {status}"),
                Err(err) => tracing::warn!("could not reap server process: {err}"),
            }
        }
    }

    /// Sequential stop-then-start.
    pub fn restart(&mut self) -> anyhow::Result<()> {
        self.stop();
        self.start()
    }

    /// Access the running child for protocol wiring (stdio handles).
    pub fn child_mut(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }
}

impl ProcessHooks for ProcessSupervisor {
    fn before_install(&mut self, family: ArtifactFamily) -> anyhow::Result<()> {
        if family == ArtifactFamily::Server {
            self.stop();
        }
        Ok(())
    }

    fn after_install(&mut self, family: ArtifactFamily) -> anyhow::Result<()> {
        if family == ArtifactFamily::Server {
            return self.restart();
        }
        Ok(())
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
