//! ACME certificate settings for custom domains.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::infrastructure::AcmeAccount;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcmeConfig {
    /// Directory URL of the ACME server (e.g., Let's Encrypt production)
    #[serde(default)]
    pub server_url: Option<String>,

    /// Account email registered with the ACME server
    #[serde(default)]
    pub email: Option<String>,
}

impl AcmeConfig {
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.email.is_some()
    }

    /// The account to issue through, when both fields are set
    pub fn account(&self) -> Option<AcmeAccount> {
        match (&self.server_url, &self.email) {
            (Some(server_url), Some(email)) => Some(AcmeAccount {
                server_url: server_url.clone(),
                email: email.clone(),
            }),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_url.is_some() != self.email.is_some() {
            bail!("acme.server_url and acme.email must be set together");
        }
        if let Some(ref url) = self.server_url {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                bail!("acme.server_url must start with http:// or https:// (got: '{}')", url);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_is_valid_and_unconfigured() {
        let acme = AcmeConfig::default();
        assert!(!acme.is_configured());
        assert!(acme.validate().is_ok());
    }

    #[test]
    fn test_half_configured_rejected() {
        let acme = AcmeConfig {
            email: Some("ops@example.com".to_string()),
            ..Default::default()
        };
        assert!(acme.validate().is_err());
    }

    #[test]
    fn test_account_needs_both_fields() {
        let acme = AcmeConfig {
            server_url: Some("https://acme.example.com/directory".to_string()),
            email: Some("ops@example.com".to_string()),
        };
        assert!(acme.is_configured());
        assert_eq!(acme.account().map(|a| a.email), Some("ops@example.com".to_string()));
        assert!(AcmeConfig::default().account().is_none());
    }
}
