//! Centralized error types for spire
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.
//! Every top-level variant renders as a single line prefixed with
//! the phase that failed.

use thiserror::Error;

/// Top-level error type for deploy, destroy and info
#[derive(Error, Debug)]
pub enum SpireError {
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),

    #[error("provisioning: {message}")]
    Provisioning { message: String },

    #[error("director: {message}")]
    Director { message: String },

    #[error("access: {0}")]
    AccessDenied(#[from] AccessDeniedError),

    #[error("store: {message}")]
    Store { message: String },

    #[error("certificates: {message}")]
    Certificate { message: String },

    #[error("pipeline: {message}")]
    Pipeline { message: String },

    #[error("provider: {message}")]
    Provider { message: String },

    #[error("secrets: {message}")]
    Secrets { message: String },

    #[error("destroy: deployment {0} not found, nothing to destroy")]
    NothingToDestroy(String),

    #[error("info: deployment {0} not found")]
    NotDeployed(String),
}

impl SpireError {
    pub fn provisioning(err: anyhow::Error) -> Self {
        Self::Provisioning {
            message: format!("{:#}", err),
        }
    }

    pub fn director(err: anyhow::Error) -> Self {
        Self::Director {
            message: format!("{:#}", err),
        }
    }

    pub fn store(err: anyhow::Error) -> Self {
        Self::Store {
            message: format!("{:#}", err),
        }
    }

    pub fn certificate(err: anyhow::Error) -> Self {
        Self::Certificate {
            message: format!("{:#}", err),
        }
    }

    pub fn pipeline(err: anyhow::Error) -> Self {
        Self::Pipeline {
            message: format!("{:#}", err),
        }
    }

    pub fn provider(err: anyhow::Error) -> Self {
        Self::Provider {
            message: format!("{:#}", err),
        }
    }

    pub fn secrets(err: anyhow::Error) -> Self {
        Self::Secrets {
            message: format!("{:#}", err),
        }
    }
}

/// Operator IP missing from the director access list
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Do you need to add your IP {ip} to the {scope} security group/source range entry for director firewall (for ports 22, 6868, and 25555)?"
)]
pub struct AccessDeniedError {
    pub ip: String,
    pub scope: String,
}

/// Bad, missing or conflicting deployment arguments
///
/// Always raised before any cloud resource is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("deployment name is required, usage is `spire deploy <name>`")]
    MissingName,

    #[error("deployment name {name} is too long. {limit} character limit")]
    NameTooLong { name: String, limit: usize },

    #[error("--iaas flag not set")]
    MissingIaas,

    #[error("unknown IAAS `{0}`, must be AWS or GCP")]
    UnknownIaas(String),

    #[error("deployment was created on {existing} and cannot be moved to {requested}")]
    IaasChanged { existing: String, requested: String },

    #[error("--self-update may only be used when upgrading an existing deployment")]
    SelfUpdateWithoutDeployment,

    #[error("--tls-key requires --tls-cert to also be provided")]
    TlsKeyWithoutCert,

    #[error("--tls-cert requires --tls-key to also be provided")]
    TlsCertWithoutKey,

    #[error("custom certificates require --domain to be provided")]
    CustomCertWithoutDomain,

    #[error("--{provider}-auth-{present} requires --{provider}-auth-{missing} to also be provided")]
    OAuthPair {
        provider: &'static str,
        present: &'static str,
        missing: &'static str,
    },

    #[error("minimum number of workers is 1")]
    WorkerCount,

    #[error("worker-type is only defined on AWS")]
    WorkerTypeUnsupported,

    #[error("worker-type {0} is invalid: must be one of m4, m5, or m5a")]
    InvalidWorkerType(String),

    #[error("unknown {field}: `{value}`. Valid sizes are: {allowed}")]
    InvalidSize {
        field: &'static str,
        value: String,
        allowed: String,
    },

    #[error("`{0}` is not in the format `key=value`")]
    InvalidTag(String),

    #[error("allow-ips entry `{0}` is not a valid IP address or CIDR range")]
    InvalidAllowIp(String),

    #[error("the region and the zones provided do not match. Please note that the zone {zone} needs to be within a {region} region")]
    ZoneRegionMismatch { zone: String, region: String },

    #[error("error validating CIDR ranges - {field} is not a valid CIDR")]
    InvalidCidr { field: &'static str },

    #[error("error validating CIDR ranges - {field} is not big enough, more than {min_addresses} addresses needed")]
    RangeTooSmall {
        field: &'static str,
        min_addresses: u32,
    },

    #[error("error validating CIDR ranges - {field} must be provided")]
    MissingRange { field: &'static str },

    #[error("error validating CIDR ranges - both {first} and {second} must be provided")]
    RangePair {
        first: &'static str,
        second: &'static str,
    },

    #[error("error validating CIDR ranges - {field} must be within vpc-network-range")]
    NotContained { field: &'static str },

    #[error("error validating CIDR ranges - public-subnet-range must not overlap private-subnet-range")]
    SubnetOverlap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_is_phase_prefixed() {
        let err: SpireError = ValidationError::MissingIaas.into();
        assert_eq!(err.to_string(), "validation: --iaas flag not set");
    }

    #[test]
    fn test_access_denied_names_ports_and_scope() {
        let err = AccessDeniedError {
            ip: "1.2.3.4".to_string(),
            scope: "sg-123".to_string(),
        };
        let msg = SpireError::from(err).to_string();
        assert!(msg.starts_with("access: "));
        assert!(msg.contains("sg-123"));
        assert!(msg.contains("22, 6868, and 25555"));
    }

    #[test]
    fn test_collaborator_message_is_single_line() {
        let inner = anyhow::anyhow!("exit status 1").context("terraform apply failed");
        let err = SpireError::provisioning(inner);
        assert_eq!(
            err.to_string(),
            "provisioning: terraform apply failed: exit status 1"
        );
    }

    #[test]
    fn test_oauth_pair_message() {
        let err = ValidationError::OAuthPair {
            provider: "github",
            present: "client-id",
            missing: "client-secret",
        };
        assert_eq!(
            err.to_string(),
            "--github-auth-client-id requires --github-auth-client-secret to also be provided"
        );
    }
}
