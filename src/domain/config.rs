//! Durable configuration snapshot for one named deployment

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use super::iaas::IaasKind;
use super::network::NetworkRanges;

/// Prefix applied to every deployment's resource names
pub const DEPLOYMENT_PREFIX: &str = "spire-";

pub fn deployment_id(name: &str) -> String {
    format!("{}{}", DEPLOYMENT_PREFIX, name)
}

/// OAuth application credentials for one auth provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClient {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

impl OAuthClient {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProviders {
    #[serde(default)]
    pub github: OAuthClient,
    #[serde(default)]
    pub bitbucket: OAuthClient,
    #[serde(default)]
    pub microsoft: OAuthClient,
    #[serde(default)]
    pub microsoft_tenant: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sizing {
    pub worker_count: u32,
    pub worker_size: String,
    /// AWS instance family (m4, m5, m5a)
    pub worker_type: String,
    pub web_size: String,
    pub db_size: String,
}

impl Default for Sizing {
    fn default() -> Self {
        Self {
            worker_count: 1,
            worker_size: "xlarge".to_string(),
            worker_type: "m4".to_string(),
            web_size: "small".to_string(),
            db_size: "small".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    /// Spot (AWS) or preemptible (GCP) workers
    pub spot: bool,
    pub enable_global_resources: bool,
    pub enable_pipeline_instances: bool,
    pub influxdb_retention: String,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            spot: true,
            enable_global_resources: false,
            enable_pipeline_instances: false,
            influxdb_retention: "28d".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    /// Allow-list rendered for the provisioning tool: `"a/32", "b/24"`
    #[serde(default)]
    pub allow_ips: String,
    /// Allow-list exactly as the operator supplied it
    #[serde(default)]
    pub allow_ips_unformatted: String,
    /// Operator IP captured on the last deploy, used for reachability checks
    #[serde(default)]
    pub source_access_ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsMaterial {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub concourse_cert: String,
    #[serde(default)]
    pub concourse_key: String,
    #[serde(default)]
    pub concourse_ca_cert: String,
    /// Cert/key came from the operator rather than from issuance
    #[serde(default)]
    pub concourse_user_provided_cert: bool,
    #[serde(default)]
    pub director_ca_cert: String,
    #[serde(default)]
    pub director_cert: String,
    #[serde(default)]
    pub director_key: String,
    #[serde(default)]
    pub director_public_ip: String,
    /// CA of the managed database, when the provider reports one
    #[serde(default)]
    pub db_ca_cert: String,
}

impl TlsMaterial {
    /// A DNS name chosen by the operator, as opposed to the derived public IP
    pub fn has_custom_domain(&self) -> bool {
        !self.domain.is_empty() && self.domain.parse::<IpAddr>().is_err()
    }

    pub fn has_director_certs(&self) -> bool {
        !self.director_cert.is_empty() && !self.director_key.is_empty()
    }

    pub fn has_concourse_certs(&self) -> bool {
        !self.concourse_cert.is_empty() && !self.concourse_key.is_empty()
    }
}

/// Generated secrets. Never regenerated once persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secrets {
    pub concourse_username: String,
    pub concourse_password: String,
    pub director_username: String,
    pub director_password: String,
    pub director_hm_user_password: String,
    pub director_mbus_password: String,
    pub director_nats_password: String,
    pub director_registry_password: String,
    pub encryption_key: String,
    pub grafana_password: String,
    pub rds_username: String,
    pub rds_password: String,
    pub rds_default_database_name: String,
    pub private_key: String,
    pub public_key: String,
    #[serde(default)]
    pub public_key_fingerprint: String,
    #[serde(default)]
    pub credhub_username: String,
    #[serde(default)]
    pub credhub_password: String,
    #[serde(default)]
    pub credhub_admin_client_secret: String,
    #[serde(default)]
    pub credhub_ca_cert: String,
}

/// The persisted snapshot for one deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub name: String,
    /// Prefixed id used for cloud resource names
    pub deployment: String,
    pub iaas: IaasKind,
    pub region: String,
    pub availability_zone: String,
    #[serde(default)]
    pub namespace: String,
    /// GCP project the deployment lives in
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub network: NetworkRanges,
    #[serde(default)]
    pub sizing: Sizing,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub auth: AuthProviders,
    #[serde(default)]
    pub access: AccessControl,
    #[serde(default)]
    pub tls: TlsMaterial,
    pub secrets: Secrets,
}

impl DeploymentConfig {
    /// Public endpoint of the CI web UI
    pub fn concourse_url(&self) -> String {
        format!("https://{}", self.tls.domain)
    }

    /// Scope the director firewall check runs against on GCP
    pub fn director_firewall_name(&self) -> String {
        format!("{}-director", self.deployment)
    }

    /// Label describing how worker VMs are provisioned
    pub fn vm_provisioning_type(&self) -> &'static str {
        if self.features.spot {
            self.iaas.capabilities().discounted_vm_label
        } else {
            "on-demand"
        }
    }

    /// Replace any existing `key=` tag with the new value
    pub fn set_tag(&mut self, key: &str, value: &str) {
        let prefix = format!("{}=", key);
        self.tags.retain(|t| !t.starts_with(&prefix));
        self.tags.push(format!("{}{}", prefix, value));
    }
}
