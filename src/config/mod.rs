//! # Tool Configuration
//!
//! Settings for spire itself, as opposed to the per-deployment snapshot
//! kept by the config store.
//!
//! ## Configuration File
//!
//! `spire.yaml`, looked up at `--config` / `SPIRE_CONFIG`, falling back to
//! `<state_dir>/spire.yaml`. The file is optional and every field has a default.
//!
//! ```yaml
//! state_dir: /var/lib/spire
//! templates_dir: /opt/spire/templates
//! ci_manifest: /opt/spire/templates/concourse.yml
//! binaries:
//!   terraform: /usr/local/bin/terraform
//! acme:
//!   server_url: https://acme-v02.api.letsencrypt.org/directory
//!   email: ops@example.com
//! ```

mod acme;
mod binaries;

pub use acme::AcmeConfig;
pub use binaries::BinariesConfig;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up inside the state directory
pub const CONFIG_FILE_NAME: &str = "spire.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolConfig {
    /// Root of the per-deployment config store
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Provisioning templates, one subdirectory per IAAS (`aws/`, `gcp/`)
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,

    /// Director environment manifest
    #[serde(default)]
    pub director_manifest: Option<PathBuf>,

    /// CI deployment manifest rolled out onto the director
    #[serde(default)]
    pub ci_manifest: Option<PathBuf>,

    /// Default self-update pipeline template
    #[serde(default)]
    pub pipeline_template: Option<PathBuf>,

    #[serde(default)]
    pub binaries: BinariesConfig,

    /// Echo endpoint that returns the caller's public IP as plain text
    #[serde(default = "default_ip_echo_url")]
    pub ip_echo_url: String,

    #[serde(default)]
    pub acme: AcmeConfig,
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".spire")
}

fn default_ip_echo_url() -> String {
    "https://api.ipify.org".to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            templates_dir: None,
            director_manifest: None,
            ci_manifest: None,
            pipeline_template: None,
            binaries: BinariesConfig::default(),
            ip_echo_url: default_ip_echo_url(),
            acme: AcmeConfig::default(),
        }
    }
}

impl ToolConfig {
    /// Load the tool config.
    ///
    /// An explicit `path` must exist. Without one, `<state_dir>/spire.yaml`
    /// is read if present and defaults are used otherwise. `state_dir`
    /// overrides whatever the file says.
    pub fn load(path: Option<&Path>, state_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let dir = state_dir.clone().unwrap_or_else(default_state_dir);
                let candidate = dir.join(CONFIG_FILE_NAME);
                if candidate.exists() {
                    Self::from_file(&candidate)?
                } else {
                    tracing::debug!(path = %candidate.display(), "No tool config found, using defaults");
                    Self::default()
                }
            }
        };
        if let Some(dir) = state_dir {
            config.state_dir = dir;
        }
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.state_dir.as_os_str().is_empty() {
            bail!("state_dir cannot be empty");
        }
        if !self.ip_echo_url.starts_with("http://") && !self.ip_echo_url.starts_with("https://") {
            bail!(
                "ip_echo_url must start with http:// or https:// (got: '{}')",
                self.ip_echo_url
            );
        }
        self.binaries.validate()?;
        self.acme.validate()?;
        Ok(())
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.templates_dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join("templates"))
    }

    pub fn director_manifest(&self) -> PathBuf {
        self.director_manifest
            .clone()
            .unwrap_or_else(|| self.templates_dir().join("director.yml"))
    }

    pub fn ci_manifest(&self) -> PathBuf {
        self.ci_manifest
            .clone()
            .unwrap_or_else(|| self.templates_dir().join("concourse.yml"))
    }

    pub fn pipeline_template(&self) -> PathBuf {
        self.pipeline_template
            .clone()
            .unwrap_or_else(|| self.templates_dir().join("pipeline.yml"))
    }

    /// Per-deployment store directory
    pub fn deployments_dir(&self) -> PathBuf {
        self.state_dir.join("deployments")
    }

    /// Terraform working directories, one per deployment
    pub fn terraform_dir(&self) -> PathBuf {
        self.state_dir.join("terraform")
    }
}
