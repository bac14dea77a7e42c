//! External tools spire drives, and how to find them.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Names (or absolute paths) of collaborator binaries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinariesConfig {
    #[serde(default = "default_terraform")]
    pub terraform: String,

    #[serde(default = "default_bosh")]
    pub bosh: String,

    #[serde(default = "default_fly")]
    pub fly: String,

    #[serde(default = "default_aws")]
    pub aws: String,

    #[serde(default = "default_gcloud")]
    pub gcloud: String,

    #[serde(default = "default_openssl")]
    pub openssl: String,

    /// ACME client, only needed when ACME is configured
    #[serde(default = "default_lego")]
    pub lego: String,

    #[serde(default = "default_ssh_keygen")]
    pub ssh_keygen: String,
}

fn default_terraform() -> String {
    "terraform".to_string()
}

fn default_bosh() -> String {
    "bosh".to_string()
}

fn default_fly() -> String {
    "fly".to_string()
}

fn default_aws() -> String {
    "aws".to_string()
}

fn default_gcloud() -> String {
    "gcloud".to_string()
}

fn default_openssl() -> String {
    "openssl".to_string()
}

fn default_lego() -> String {
    "lego".to_string()
}

fn default_ssh_keygen() -> String {
    "ssh-keygen".to_string()
}

impl Default for BinariesConfig {
    fn default() -> Self {
        Self {
            terraform: default_terraform(),
            bosh: default_bosh(),
            fly: default_fly(),
            aws: default_aws(),
            gcloud: default_gcloud(),
            openssl: default_openssl(),
            lego: default_lego(),
            ssh_keygen: default_ssh_keygen(),
        }
    }
}

impl BinariesConfig {
    fn entries(&self) -> [(&'static str, &str); 8] {
        [
            ("terraform", self.terraform.as_str()),
            ("bosh", self.bosh.as_str()),
            ("fly", self.fly.as_str()),
            ("aws", self.aws.as_str()),
            ("gcloud", self.gcloud.as_str()),
            ("openssl", self.openssl.as_str()),
            ("lego", self.lego.as_str()),
            ("ssh_keygen", self.ssh_keygen.as_str()),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value) in self.entries() {
            if value.trim().is_empty() {
                bail!("binaries.{} cannot be empty", key);
            }
        }
        Ok(())
    }

    /// Locate a configured binary on PATH
    pub fn resolve(name: &str) -> Result<PathBuf> {
        which::which(name).with_context(|| format!("`{}` not found on PATH", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_plain_names() {
        let bins = BinariesConfig::default();
        assert_eq!(bins.terraform, "terraform");
        assert_eq!(bins.ssh_keygen, "ssh-keygen");
        assert!(bins.validate().is_ok());
    }

    #[test]
    fn test_empty_binary_rejected() {
        let bins = BinariesConfig {
            bosh: "  ".to_string(),
            ..Default::default()
        };
        let err = bins.validate().unwrap_err();
        assert!(err.to_string().contains("binaries.bosh"));
    }

    #[test]
    fn test_missing_binary_is_an_error() {
        assert!(BinariesConfig::resolve("spire-definitely-not-installed").is_err());
    }
}
