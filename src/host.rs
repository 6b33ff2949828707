//! Collaborator boundary toward the host editor.
//!
//! The core never talks to a UI directly; consent prompts, messages,
//! progress text, and external links all go through [`EditorHost`]. The
//! plugin glue implements this against the editor's real API; tests use
//! [`MockHost`], which records every interaction and replays pre-seeded
//! responses.

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Outcome of the three-way update consent prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentChoice {
    /// Download and install the new release.
    Install,
    /// Open the releases page in an external browser instead.
    OpenReleasePage,
    /// Do nothing.
    Dismiss,
}

/// Callbacks the update core consumes from the host editor.
pub trait EditorHost {
    /// Show a one-line message to the user.
    fn show_message(&mut self, severity: Severity, text: &str);

    /// Update transient progress text (status bar or equivalent).
    fn show_progress(&mut self, text: &str);

    /// Yes/cancel confirmation, used for first-run install offers.
    fn confirm(&mut self, message: &str) -> bool;

    /// Three-way consent prompt for applying an update.
    fn confirm_update(&mut self, message: &str) -> ConsentChoice;

    /// Open a URL in the user's browser. Failures are the caller's to
    /// swallow; declining an update must never error out.
    fn open_external(&mut self, url: &str) -> anyhow::Result<()>;
}

/// Recording [`EditorHost`] for tests.
///
/// # Example
///
/// ```
/// use lskeeper::host::{ConsentChoice, EditorHost, MockHost, Severity};
///
/// let mut host = MockHost::new();
/// host.set_consent(ConsentChoice::Install);
///
/// host.show_message(Severity::Info, "server installed");
/// assert!(host.has_message("installed"));
/// assert_eq!(host.confirm_update("update?"), ConsentChoice::Install);
/// ```
#[derive(Debug)]
pub struct MockHost {
    messages: Vec<(Severity, String)>,
    progress: Vec<String>,
    prompts: Vec<String>,
    opened_urls: Vec<String>,
    confirm_response: bool,
    consent_response: ConsentChoice,
    open_external_fails: bool,
}

impl Default for MockHost {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            progress: Vec::new(),
            prompts: Vec::new(),
            opened_urls: Vec::new(),
            confirm_response: true,
            consent_response: ConsentChoice::Install,
            open_external_fails: false,
        }
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response returned by `confirm`.
    pub fn set_confirm(&mut self, response: bool) {
        self.confirm_response = response;
    }

    /// Response returned by `confirm_update`.
    pub fn set_consent(&mut self, response: ConsentChoice) {
        self.consent_response = response;
    }

    /// Make `open_external` fail, for exercising the swallow path.
    pub fn fail_open_external(&mut self) {
        self.open_external_fails = true;
    }

    /// All messages shown, in order.
    pub fn messages(&self) -> Vec<String> {
        self.messages.iter().map(|(_, text)| text.clone()).collect()
    }

    /// Whether any shown message contains `needle`.
    pub fn has_message(&self, needle: &str) -> bool {
        self.messages.iter().any(|(_, text)| text.contains(needle))
    }

    /// Whether any message of the given severity contains `needle`.
    pub fn has_message_at(&self, severity: Severity, needle: &str) -> bool {
        self.messages
            .iter()
            .any(|(s, text)| *s == severity && text.contains(needle))
    }

    /// Progress lines pushed during downloads.
    pub fn progress_lines(&self) -> &[String] {
        &self.progress
    }

    /// Prompt messages shown (confirm and consent alike).
    pub fn prompts_shown(&self) -> &[String] {
        &self.prompts
    }

    /// URLs passed to `open_external`.
    pub fn opened_urls(&self) -> &[String] {
        &self.opened_urls
    }
}

impl EditorHost for MockHost {
    fn show_message(&mut self, severity: Severity, text: &str) {
        self.messages.push((severity, text.to_string()));
    }

    fn show_progress(&mut self, text: &str) {
        self.progress.push(text.to_string());
    }

    fn confirm(&mut self, message: &str) -> bool {
        self.prompts.push(message.to_string());
        self.confirm_response
    }

    fn confirm_update(&mut self, message: &str) -> ConsentChoice {
        self.prompts.push(message.to_string());
        self.consent_response
    }

    fn open_external(&mut self, url: &str) -> anyhow::Result<()> {
        self.opened_urls.push(url.to_string());
        if self.open_external_fails {
            anyhow::bail!("no browser available");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_records_messages_with_severity() {
        let mut host = MockHost::new();
        host.show_message(Severity::Error, "download failed");
        host.show_message(Severity::Info, "up to date");

        assert!(host.has_message_at(Severity::Error, "failed"));
        assert!(host.has_message_at(Severity::Info, "up to date"));
        assert!(!host.has_message_at(Severity::Warning, "failed"));
    }

    #[test]
    fn mock_replays_seeded_consent() {
        let mut host = MockHost::new();
        host.set_consent(ConsentChoice::OpenReleasePage);
        assert_eq!(host.confirm_update("new release"), ConsentChoice::OpenReleasePage);
        assert_eq!(host.prompts_shown(), ["new release"]);
    }

    #[test]
    fn mock_confirm_defaults_to_yes() {
        let mut host = MockHost::new();
        assert!(host.confirm("install?"));
        host.set_confirm(false);
        assert!(!host.confirm("install?"));
    }

    #[test]
    fn mock_open_external_can_fail() {
        let mut host = MockHost::new();
        assert!(host.open_external("https://example.com").is_ok());

        host.fail_open_external();
        assert!(host.open_external("https://example.com").is_err());
        assert_eq!(host.opened_urls().len(), 2);
    }
}
