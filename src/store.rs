use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::camera::cache::CacheSnapshot;
use crate::camera::CameraConfig;

/// Everything that survives a restart.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PersistedState {
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub capability_cache: CacheSnapshot,
    #[serde(default)]
    pub accept_self_signed_tls: bool,
}

/// YAML state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when no state has been saved yet.
    pub fn load(&self) -> Result<Option<PersistedState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file {}", self.path.display()))?;
        let state: PersistedState = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse state file {}", self.path.display()))?;
        Ok(Some(state))
    }

    /// Writes to a sibling temp file first so a crash never leaves a truncated file.
    pub async fn save(&self, state: &PersistedState) -> Result<()> {
        let yaml = serde_yaml::to_string(state).context("Failed to serialize state")?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, yaml)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        tracing::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}
