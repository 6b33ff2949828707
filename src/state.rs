//! Persisted install records.
//!
//! One tag per artifact family, written only after a successful install and
//! surviving across editor sessions. The file store uses the
//! write-to-temp-then-rename pattern so a crash mid-save never corrupts the
//! record.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assets::ArtifactFamily;
use crate::error::Result;

/// Store of last-installed release tags, keyed by artifact family.
///
/// Written through only by the update coordinator.
pub trait VersionStore {
    /// Tag recorded for the family's last successful install, if any.
    fn installed_tag(&self, family: ArtifactFamily) -> Option<String>;

    /// Overwrite the family's record with a newly installed tag.
    fn record_tag(&mut self, family: ArtifactFamily, tag: &str) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordFile {
    #[serde(default)]
    releases: HashMap<String, String>,
}

/// JSON-file-backed [`VersionStore`].
#[derive(Debug)]
pub struct FileVersionStore {
    path: PathBuf,
    records: RecordFile,
}

impl FileVersionStore {
    /// Open the record file, treating a missing or unreadable file as an
    /// empty store. A corrupt record only costs one redundant re-install,
    /// so lenient loading beats failing the whole update subsystem.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self { path, records }
    }

    /// Record file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.records)
            .expect("version records serialize to JSON");

        // Atomic write: temp file in the same directory, then rename.
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl VersionStore for FileVersionStore {
    fn installed_tag(&self, family: ArtifactFamily) -> Option<String> {
        self.records.releases.get(family.state_key()).cloned()
    }

    fn record_tag(&mut self, family: ArtifactFamily, tag: &str) -> Result<()> {
        self.records
            .releases
            .insert(family.state_key().to_string(), tag.to_string());
        self.save()
    }
}
