//! Typed view of the provisioning tool's outputs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::iaas::IaasKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsOutputs {
    pub atc_public_ip: String,
    #[serde(default)]
    pub atc_security_group_id: String,
    #[serde(default)]
    pub blobstore_bucket: String,
    #[serde(default)]
    pub blobstore_user_access_key_id: String,
    #[serde(default)]
    pub blobstore_secret_access_key: String,
    #[serde(default)]
    pub bosh_db_address: String,
    #[serde(default)]
    pub bosh_db_port: String,
    #[serde(default)]
    pub bosh_user_access_key_id: String,
    #[serde(default)]
    pub bosh_secret_access_key: String,
    #[serde(default)]
    pub director_key_pair: String,
    pub director_public_ip: String,
    pub director_security_group_id: String,
    #[serde(default)]
    pub nat_gateway_ip: String,
    #[serde(default)]
    pub private_subnet_id: String,
    #[serde(default)]
    pub public_subnet_id: String,
    #[serde(default)]
    pub vms_security_group_id: String,
    pub vpc_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpOutputs {
    pub atc_public_ip: String,
    #[serde(default)]
    pub bosh_db_address: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub director_account_creds: String,
    pub director_public_ip: String,
    #[serde(default)]
    pub director_firewall_name: String,
    #[serde(default)]
    pub nat_gateway_ip: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub private_subnetwork_internal_gw: String,
    #[serde(default)]
    pub private_subnetwork_name: String,
    #[serde(default)]
    pub public_subnetwork_internal_gw: String,
    #[serde(default)]
    pub public_subnetwork_name: String,
    /// CA of the managed SQL instance
    #[serde(default)]
    pub sql_server_cert: String,
}

/// Outputs read back after a successful apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ProvisioningOutputs {
    Aws(AwsOutputs),
    Gcp(GcpOutputs),
}

#[derive(Deserialize)]
struct OutputEntry {
    value: serde_json::Value,
}

impl ProvisioningOutputs {
    /// Parse `terraform output -json`, which nests each value under `value`
    pub fn from_terraform_json(iaas: IaasKind, raw: &str) -> Result<Self> {
        let entries: HashMap<String, OutputEntry> =
            serde_json::from_str(raw).context("Failed to parse terraform outputs")?;
        let flat: serde_json::Map<String, serde_json::Value> = entries
            .into_iter()
            .map(|(k, v)| (k, stringify(v.value)))
            .collect();
        let flat = serde_json::Value::Object(flat);

        let outputs = match iaas {
            IaasKind::Aws => Self::Aws(serde_json::from_value(flat).context("Missing AWS terraform output")?),
            IaasKind::Gcp => Self::Gcp(serde_json::from_value(flat).context("Missing GCP terraform output")?),
        };
        Ok(outputs)
    }

    pub fn iaas(&self) -> IaasKind {
        match self {
            Self::Aws(_) => IaasKind::Aws,
            Self::Gcp(_) => IaasKind::Gcp,
        }
    }

    pub fn atc_public_ip(&self) -> &str {
        match self {
            Self::Aws(o) => &o.atc_public_ip,
            Self::Gcp(o) => &o.atc_public_ip,
        }
    }

    pub fn director_public_ip(&self) -> &str {
        match self {
            Self::Aws(o) => &o.director_public_ip,
            Self::Gcp(o) => &o.director_public_ip,
        }
    }

    pub fn nat_gateway_ip(&self) -> &str {
        match self {
            Self::Aws(o) => &o.nat_gateway_ip,
            Self::Gcp(o) => &o.nat_gateway_ip,
        }
    }

    pub fn bosh_db_address(&self) -> &str {
        match self {
            Self::Aws(o) => &o.bosh_db_address,
            Self::Gcp(o) => &o.bosh_db_address,
        }
    }

    /// Database CA reported by the provider, when it reports one
    pub fn db_ca_cert(&self) -> Option<&str> {
        match self {
            Self::Gcp(o) if !o.sql_server_cert.is_empty() => Some(&o.sql_server_cert),
            _ => None,
        }
    }

    /// AWS security group guarding the director
    pub fn director_security_group_id(&self) -> Option<&str> {
        match self {
            Self::Aws(o) => Some(&o.director_security_group_id),
            Self::Gcp(_) => None,
        }
    }

    pub fn vpc_id(&self) -> Option<&str> {
        match self {
            Self::Aws(o) => Some(&o.vpc_id),
            Self::Gcp(_) => None,
        }
    }
}

fn stringify(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(_) => value,
        serde_json::Value::Null => serde_json::Value::String(String::new()),
        other => serde_json::Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_aws_outputs() {
        let raw = r#"{
            "atc_public_ip": {"sensitive": false, "type": "string", "value": "77.77.77.77"},
            "director_public_ip": {"value": "99.99.99.99"},
            "director_security_group_id": {"value": "sg-123"},
            "vpc_id": {"value": "vpc-112233"},
            "bosh_db_port": {"value": 5432}
        }"#;
        let outputs = ProvisioningOutputs::from_terraform_json(IaasKind::Aws, raw).unwrap();
        assert_eq!(outputs.iaas(), IaasKind::Aws);
        assert_eq!(outputs.atc_public_ip(), "77.77.77.77");
        assert_eq!(outputs.director_security_group_id(), Some("sg-123"));
        assert_eq!(outputs.vpc_id(), Some("vpc-112233"));
        assert_eq!(outputs.db_ca_cert(), None);
        if let ProvisioningOutputs::Aws(aws) = &outputs {
            assert_eq!(aws.bosh_db_port, "5432");
        }
    }

    #[test]
    fn test_parses_gcp_outputs() {
        let raw = r#"{
            "atc_public_ip": {"value": "77.77.77.77"},
            "director_public_ip": {"value": "99.99.99.99"},
            "network": {"value": "spire-foo"},
            "sql_server_cert": {"value": "----EXAMPLE CERT----"}
        }"#;
        let outputs = ProvisioningOutputs::from_terraform_json(IaasKind::Gcp, raw).unwrap();
        assert_eq!(outputs.director_public_ip(), "99.99.99.99");
        assert_eq!(outputs.db_ca_cert(), Some("----EXAMPLE CERT----"));
        assert_eq!(outputs.director_security_group_id(), None);
    }

    #[test]
    fn test_missing_required_output_is_an_error() {
        let raw = r#"{"atc_public_ip": {"value": "77.77.77.77"}}"#;
        let err = ProvisioningOutputs::from_terraform_json(IaasKind::Aws, raw).unwrap_err();
        assert!(format!("{:#}", err).contains("Missing AWS terraform output"));
    }
}
