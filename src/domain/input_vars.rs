//! Provider-specific input variables handed to the provisioning tool
//!
//! Serialized as a JSON var-file, so field names are the template's
//! variable names.

use serde::Serialize;
use std::collections::BTreeMap;

use super::config::DeploymentConfig;
use super::iaas::{validate_size, IaasKind, DB_SIZES};
use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AwsInputVars {
    pub deployment: String,
    pub namespace: String,
    pub region: String,
    pub availability_zone: String,
    pub allow_ips: Vec<String>,
    pub source_access_ip: String,
    pub public_key: String,
    pub rds_instance_class: String,
    pub rds_username: String,
    pub rds_password: String,
    pub rds_default_database_name: String,
    pub vpc_network_cidr: String,
    pub public_subnet_cidr: String,
    pub private_subnet_cidr: String,
    pub rds1_cidr: String,
    pub rds2_cidr: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GcpInputVars {
    pub deployment: String,
    pub namespace: String,
    pub project: String,
    pub region: String,
    pub zone: String,
    pub allow_ips: Vec<String>,
    pub source_access_ip: String,
    pub db_tier: String,
    pub db_username: String,
    pub db_password: String,
    pub db_name: String,
    pub public_cidr: String,
    pub private_cidr: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum InputVars {
    Aws(AwsInputVars),
    Gcp(GcpInputVars),
}

/// `"a/32", "b/24"` back into a list of ranges
fn allow_list(formatted: &str) -> Vec<String> {
    formatted
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn tag_map(tags: &[String]) -> BTreeMap<String, String> {
    tags.iter()
        .filter_map(|t| t.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl InputVars {
    /// Build the variables for a reconciled config
    pub fn from_config(config: &DeploymentConfig) -> Result<Self, ValidationError> {
        validate_size("DB size", &config.sizing.db_size, DB_SIZES)?;
        let caps = config.iaas.capabilities();
        let db_class = caps
            .db_instance_class(&config.sizing.db_size)
            .unwrap_or_default()
            .to_string();
        let namespace = if config.namespace.is_empty() {
            config.region.clone()
        } else {
            config.namespace.clone()
        };
        let secrets = &config.secrets;
        let network = &config.network;

        Ok(match config.iaas {
            IaasKind::Aws => Self::Aws(AwsInputVars {
                deployment: config.deployment.clone(),
                namespace,
                region: config.region.clone(),
                availability_zone: config.availability_zone.clone(),
                allow_ips: allow_list(&config.access.allow_ips),
                source_access_ip: config.access.source_access_ip.clone(),
                public_key: secrets.public_key.clone(),
                rds_instance_class: db_class,
                rds_username: secrets.rds_username.clone(),
                rds_password: secrets.rds_password.clone(),
                rds_default_database_name: secrets.rds_default_database_name.clone(),
                vpc_network_cidr: network.network_cidr.clone(),
                public_subnet_cidr: network.public_cidr.clone(),
                private_subnet_cidr: network.private_cidr.clone(),
                rds1_cidr: network.rds1_cidr.clone(),
                rds2_cidr: network.rds2_cidr.clone(),
                tags: tag_map(&config.tags),
            }),
            IaasKind::Gcp => Self::Gcp(GcpInputVars {
                deployment: config.deployment.clone(),
                namespace,
                project: config.project.clone(),
                region: config.region.clone(),
                zone: config.availability_zone.clone(),
                allow_ips: allow_list(&config.access.allow_ips),
                source_access_ip: config.access.source_access_ip.clone(),
                db_tier: db_class,
                db_username: secrets.rds_username.clone(),
                db_password: secrets.rds_password.clone(),
                db_name: secrets.rds_default_database_name.clone(),
                public_cidr: network.public_cidr.clone(),
                private_cidr: network.private_cidr.clone(),
                tags: tag_map(&config.tags),
            }),
        })
    }

    pub fn iaas(&self) -> IaasKind {
        match self {
            Self::Aws(_) => IaasKind::Aws,
            Self::Gcp(_) => IaasKind::Gcp,
        }
    }

    pub fn deployment(&self) -> &str {
        match self {
            Self::Aws(v) => &v.deployment,
            Self::Gcp(v) => &v.deployment,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
