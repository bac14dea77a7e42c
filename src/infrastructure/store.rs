//! Persisted deployment config and director assets
//!
//! One store instance is scoped to one deployment.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::config::{deployment_id, DeploymentConfig};

/// Director state asset
pub const DIRECTOR_STATE_ASSET: &str = "director-state.json";
/// Director credentials asset
pub const DIRECTOR_CREDS_ASSET: &str = "director-creds.yml";

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The stored snapshot, or `None` if this deployment has never been created
    async fn load(&self) -> Result<Option<DeploymentConfig>>;
    async fn update(&self, config: &DeploymentConfig) -> Result<()>;
    /// Remove the snapshot and every asset
    async fn delete_all(&self, config: &DeploymentConfig) -> Result<()>;
    async fn config_exists(&self) -> Result<bool>;
    async fn store_asset(&self, name: &str, contents: &[u8]) -> Result<()>;
    async fn load_asset(&self, name: &str) -> Result<Vec<u8>>;
    async fn has_asset(&self, name: &str) -> Result<bool>;
}

/// Filesystem store: `<root>/<deployment>/config.json` plus `assets/`
pub struct FileConfigStore {
    dir: PathBuf,
}

impl FileConfigStore {
    pub fn new(root: impl AsRef<Path>, name: &str) -> Self {
        Self {
            dir: root.as_ref().join(deployment_id(name)),
        }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.join("config.json")
    }

    fn asset_path(&self, name: &str) -> PathBuf {
        self.dir.join("assets").join(name)
    }

    /// Write through a temp file in the same directory so readers never see a partial file
    async fn write_atomic(path: PathBuf, contents: Vec<u8>) -> Result<()> {
        tokio::task::spawn_blocking(move || -> Result<()> {
            let parent = path
                .parent()
                .with_context(|| format!("{} has no parent directory", path.display()))?;
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
            let mut tmp = tempfile::NamedTempFile::new_in(parent)
                .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
            tmp.write_all(&contents)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(())
        })
        .await
        .context("Store write task panicked")?
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<Option<DeploymentConfig>> {
        let path = self.config_path();
        let exists = tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to check {}", path.display()))?;
        if !exists {
            debug!(path = %path.display(), "No stored config");
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(config))
    }

    async fn update(&self, config: &DeploymentConfig) -> Result<()> {
        let json = serde_json::to_vec_pretty(config).context("Failed to serialize config")?;
        Self::write_atomic(self.config_path(), json).await?;
        info!(deployment = %config.deployment, "Config updated");
        Ok(())
    }

    async fn delete_all(&self, config: &DeploymentConfig) -> Result<()> {
        let exists = tokio::fs::try_exists(&self.dir)
            .await
            .with_context(|| format!("Failed to check {}", self.dir.display()))?;
        if exists {
            tokio::fs::remove_dir_all(&self.dir)
                .await
                .with_context(|| format!("Failed to delete {}", self.dir.display()))?;
        }
        info!(deployment = %config.deployment, "Config and assets deleted");
        Ok(())
    }

    async fn config_exists(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.config_path()).await?)
    }

    async fn store_asset(&self, name: &str, contents: &[u8]) -> Result<()> {
        Self::write_atomic(self.asset_path(name), contents.to_vec()).await?;
        debug!(asset = name, bytes = contents.len(), "Asset stored");
        Ok(())
    }

    async fn load_asset(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.asset_path(name);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read asset {}", path.display()))
    }

    async fn has_asset(&self, name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.asset_path(name)).await?)
    }
}
