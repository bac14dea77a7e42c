//! Arguments supplied to a single deploy invocation
//!
//! Every field is `Some` only when the operator passed it in this invocation,
//! by flag or by environment variable. `None` never overwrites stored state.

/// Partially-populated deploy arguments with per-field provenance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentArguments {
    pub iaas: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub namespace: Option<String>,
    pub domain: Option<String>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub worker_count: Option<u32>,
    pub worker_size: Option<String>,
    pub worker_type: Option<String>,
    pub web_size: Option<String>,
    pub db_size: Option<String>,
    pub spot: Option<bool>,
    pub enable_global_resources: Option<bool>,
    pub enable_pipeline_instances: Option<bool>,
    pub influxdb_retention: Option<String>,
    pub allow_ips: Option<String>,
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
    pub bitbucket_client_id: Option<String>,
    pub bitbucket_client_secret: Option<String>,
    pub microsoft_client_id: Option<String>,
    pub microsoft_client_secret: Option<String>,
    pub microsoft_tenant: Option<String>,
    pub tags: Option<Vec<String>>,
    pub network_cidr: Option<String>,
    pub public_cidr: Option<String>,
    pub private_cidr: Option<String>,
    pub rds1_cidr: Option<String>,
    pub rds2_cidr: Option<String>,
    /// Dispatch the director deploy detached and return immediately.
    /// Applies to this invocation only.
    pub self_update: bool,
}

impl DeploymentArguments {
    /// Arguments with only the IAAS set
    pub fn for_iaas(iaas: impl Into<String>) -> Self {
        Self {
            iaas: Some(iaas.into()),
            ..Default::default()
        }
    }

    /// True when no configurable field was supplied
    pub fn is_empty(&self) -> bool {
        *self
            == Self {
                self_update: self.self_update,
                ..Default::default()
            }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_arguments_are_empty() {
        assert!(DeploymentArguments::default().is_empty());
    }

    #[test]
    fn test_self_update_alone_is_still_empty() {
        let args = DeploymentArguments {
            self_update: true,
            ..Default::default()
        };
        assert!(args.is_empty());
    }

    #[test]
    fn test_any_field_makes_arguments_non_empty() {
        let args = DeploymentArguments {
            worker_count: Some(3),
            ..Default::default()
        };
        assert!(!args.is_empty());
        assert!(!DeploymentArguments::for_iaas("AWS").is_empty());
    }
}
