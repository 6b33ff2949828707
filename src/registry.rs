//! Release registry client.
//!
//! Queries the GitHub releases API for the latest (or a pinned) release of
//! the managed repository and streams asset downloads. All failures come
//! back typed so the coordinator can degrade gracefully instead of crashing
//! a startup check.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::config::ServerSpec;
use crate::error::{Result, UpdateError};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// One published release, as returned by the registry.
///
/// Read-only after creation; discarded at the end of the check that
/// fetched it.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseMetadata {
    /// Release tag (e.g. `"v1.2.0"`). Opaque — compared only for equality.
    pub tag_name: String,
    /// Publication timestamp.
    pub published_at: Option<DateTime<Utc>>,
    /// Attached downloadable artifacts, in upload order.
    #[serde(default)]
    pub assets: Vec<AssetDescriptor>,
}

/// One downloadable artifact inside a release.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetDescriptor {
    pub name: String,
    pub browser_download_url: String,
}

/// Blocking client for the release registry.
pub struct RegistryClient {
    client: reqwest::blocking::Client,
    base_url: String,
    owner: String,
    repo: String,
}

impl RegistryClient {
    /// Build a client for the given repository.
    ///
    /// An `https_proxy`/`HTTPS_PROXY` environment variable, when present,
    /// configures outbound requests; a malformed proxy URL is ignored with
    /// a warning rather than failing construction.
    pub fn new(spec: &ServerSpec) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(concat!("lskeeper/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy_url) = proxy_from_env() {
            match reqwest::Proxy::all(&proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(err) => tracing::warn!("ignoring invalid https_proxy '{proxy_url}': {err}"),
            }
        }

        Ok(Self {
            client: builder.build()?,
            base_url: DEFAULT_API_BASE.to_string(),
            owner: spec.owner.clone(),
            repo: spec.repo.clone(),
        })
    }

    /// Point the client at a different registry host (tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Fetch release metadata: the latest release, or the release published
    /// under `tag` when one is given.
    pub fn fetch_release(&self, tag: Option<&str>) -> Result<ReleaseMetadata> {
        let url = match tag {
            Some(tag) => format!(
                "{}/repos/{}/{}/releases/tags/{}",
                self.base_url, self.owner, self.repo, tag
            ),
            None => format!(
                "{}/repos/{}/{}/releases/latest",
                self.base_url, self.owner, self.repo
            ),
        };

        tracing::debug!("querying release registry: {url}");
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .timeout(QUERY_TIMEOUT)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            tracing::warn!("registry returned {status} for {url}: {body}");
            return Err(UpdateError::ReleaseNotFound {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<ReleaseMetadata>()
            .map_err(|err| UpdateError::MalformedRelease {
                message: err.to_string(),
            })
    }

    /// Open a streaming response for an asset download.
    ///
    /// The installer consumes the body chunk by chunk; no deadline is set
    /// here because download time is unbounded by design.
    pub fn download(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Download {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

fn proxy_from_env() -> Option<String> {
    std::env::var("https_proxy")
        .or_else(|_| std::env::var("HTTPS_PROXY"))
        .ok()
        .filter(|v| !v.is_empty())
}
