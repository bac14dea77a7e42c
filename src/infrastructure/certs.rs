//! Certificate issuance
//!
//! Self-signed material comes from openssl: a fresh CA per request and a
//! leaf signed by it. ACME certificates come from lego using the DNS
//! challenge of the deployment's provider.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use std::path::Path;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::info;

use super::process::run;
use crate::domain::iaas::IaasKind;

const VALIDITY_DAYS: &str = "365";

/// ACME account to issue through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcmeAccount {
    pub server_url: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertRequest {
    pub ca_name: String,
    pub iaas: IaasKind,
    /// IPs and DNS names; the first one is the common name
    pub subjects: Vec<String>,
    pub acme: Option<AcmeAccount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuedCert {
    pub ca_cert: String,
    pub cert: String,
    pub key: String,
}

#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn issue(&self, request: &CertRequest) -> Result<IssuedCert>;
}

pub struct OpensslIssuer {
    openssl: String,
    lego: String,
}

impl OpensslIssuer {
    pub fn new(openssl: impl Into<String>, lego: impl Into<String>) -> Self {
        Self {
            openssl: openssl.into(),
            lego: lego.into(),
        }
    }

    async fn self_signed(&self, request: &CertRequest, common_name: &str) -> Result<IssuedCert> {
        let dir = TempDir::new().context("Failed to create certificate workspace")?;
        let p = |name: &str| dir.path().join(name).to_string_lossy().to_string();
        let (ca_key, ca_crt, key, csr, crt, ext) =
            (p("ca.key"), p("ca.crt"), p("leaf.key"), p("leaf.csr"), p("leaf.crt"), p("san.cnf"));

        let ca_subject = format!("/CN={}", request.ca_name);
        run(
            Command::new(&self.openssl).args([
                "req", "-x509", "-newkey", "rsa:2048", "-nodes", "-days", VALIDITY_DAYS, "-subj",
                ca_subject.as_str(), "-keyout", ca_key.as_str(), "-out", ca_crt.as_str(),
            ]),
            "openssl CA",
        )
        .await?;

        let subject = format!("/CN={}", common_name);
        run(
            Command::new(&self.openssl).args([
                "req", "-newkey", "rsa:2048", "-nodes", "-subj", subject.as_str(), "-keyout", key.as_str(), "-out",
                csr.as_str(),
            ]),
            "openssl CSR",
        )
        .await?;

        tokio::fs::write(&ext, san_extension(&request.subjects))
            .await
            .context("Failed to write SAN extension")?;
        run(
            Command::new(&self.openssl).args([
                "x509", "-req", "-in", csr.as_str(), "-CA", ca_crt.as_str(), "-CAkey", ca_key.as_str(),
                "-CAcreateserial", "-days", VALIDITY_DAYS, "-extfile", ext.as_str(), "-out", crt.as_str(),
            ]),
            "openssl sign",
        )
        .await?;

        Ok(IssuedCert {
            ca_cert: read(&ca_crt).await?,
            cert: read(&crt).await?,
            key: read(&key).await?,
        })
    }

    async fn acme(&self, request: &CertRequest, account: &AcmeAccount, domain: &str) -> Result<IssuedCert> {
        let dir = TempDir::new().context("Failed to create ACME workspace")?;
        let path = dir.path().to_string_lossy().to_string();
        run(
            Command::new(&self.lego).args([
                "--accept-tos",
                "--email",
                account.email.as_str(),
                "--server",
                account.server_url.as_str(),
                "--dns",
                dns_provider(request.iaas),
                "--domains",
                domain,
                "--path",
                path.as_str(),
                "run",
            ]),
            "lego",
        )
        .await?;

        let certs = dir.path().join("certificates");
        Ok(IssuedCert {
            ca_cert: read(&certs.join(format!("{}.issuer.crt", domain))).await?,
            cert: read(&certs.join(format!("{}.crt", domain))).await?,
            key: read(&certs.join(format!("{}.key", domain))).await?,
        })
    }
}

async fn read(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

fn dns_provider(iaas: IaasKind) -> &'static str {
    match iaas {
        IaasKind::Aws => "route53",
        IaasKind::Gcp => "gcloud",
    }
}

/// `subjectAltName` covering every subject, IPs as `IP:` and names as `DNS:`
pub fn san_extension(subjects: &[String]) -> String {
    let entries: Vec<String> = subjects
        .iter()
        .map(|s| {
            if s.parse::<IpAddr>().is_ok() {
                format!("IP:{}", s)
            } else {
                format!("DNS:{}", s)
            }
        })
        .collect();
    format!("subjectAltName={}\n", entries.join(","))
}

#[async_trait]
impl CertificateIssuer for OpensslIssuer {
    async fn issue(&self, request: &CertRequest) -> Result<IssuedCert> {
        let Some(common_name) = request.subjects.first() else {
            bail!("certificate request for {} has no subjects", request.ca_name);
        };
        let is_dns_name = common_name.parse::<IpAddr>().is_err();

        match &request.acme {
            Some(account) if is_dns_name => {
                info!(domain = %common_name, "Requesting ACME certificate");
                self.acme(request, account, common_name).await
            }
            _ => {
                info!(subject = %common_name, ca = %request.ca_name, "Issuing self-signed certificate");
                self.self_signed(request, common_name).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_san_extension_types_subjects() {
        let ext = san_extension(&["99.99.99.99".to_string(), "ci.example.com".to_string()]);
        assert_eq!(ext, "subjectAltName=IP:99.99.99.99,DNS:ci.example.com\n");
    }

    #[test]
    fn test_dns_challenge_follows_provider() {
        assert_eq!(dns_provider(IaasKind::Aws), "route53");
        assert_eq!(dns_provider(IaasKind::Gcp), "gcloud");
    }

    #[tokio::test]
    async fn test_request_without_subjects_rejected() {
        let issuer = OpensslIssuer::new("openssl", "lego");
        let request = CertRequest {
            ca_name: "spire-foo".to_string(),
            iaas: IaasKind::Aws,
            subjects: vec![],
            acme: None,
        };
        let err = issuer.issue(&request).await.unwrap_err();
        assert!(err.to_string().contains("no subjects"));
    }
}
