//! Provider kinds and their declared capabilities
//!
//! Validation and input-variable building read from these tables instead
//! of branching on the provider everywhere.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Supported cloud backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IaasKind {
    #[default]
    #[serde(rename = "AWS")]
    Aws,
    #[serde(rename = "GCP")]
    Gcp,
}

/// Default network plan a provider falls back to when no range is given
#[derive(Debug, Clone, Copy)]
pub struct DefaultNetwork {
    pub network: &'static str,
    pub public: &'static str,
    pub private: &'static str,
    pub db1: &'static str,
    pub db2: &'static str,
}

/// Everything spire needs to know about a provider to validate and plan
#[derive(Debug)]
pub struct Capabilities {
    /// VPC + public/private + two database subnets must be fully described
    pub requires_full_topology: bool,
    /// Longest deployment name the provider's resource naming allows
    pub max_name_length: Option<usize>,
    pub default_region: &'static str,
    /// Appended to the region to form the default zone
    pub default_zone_suffix: &'static str,
    pub default_network: DefaultNetwork,
    /// Whether the worker instance family can be chosen
    pub supports_worker_type: bool,
    /// Label for discounted worker VMs
    pub discounted_vm_label: &'static str,
    pub worker_sizes: &'static [(&'static str, &'static str)],
    pub web_sizes: &'static [(&'static str, &'static str)],
    pub db_sizes: &'static [(&'static str, &'static str)],
}

/// Permitted worker sizes
pub const WORKER_SIZES: &[&str] = &[
    "medium", "large", "xlarge", "2xlarge", "4xlarge", "12xlarge", "24xlarge",
];

/// Permitted web sizes
pub const WEB_SIZES: &[&str] = &["small", "medium", "large", "xlarge", "2xlarge"];

/// Permitted database sizes
pub const DB_SIZES: &[&str] = &["small", "medium", "large", "xlarge", "2xlarge", "4xlarge"];

/// Worker instance families available on AWS
pub const WORKER_TYPES: &[&str] = &["m4", "m5", "m5a"];

static AWS: Capabilities = Capabilities {
    requires_full_topology: true,
    max_name_length: None,
    default_region: "eu-west-1",
    default_zone_suffix: "a",
    default_network: DefaultNetwork {
        network: "10.0.0.0/16",
        public: "10.0.0.0/24",
        private: "10.0.1.0/24",
        db1: "10.0.4.0/24",
        db2: "10.0.5.0/24",
    },
    supports_worker_type: true,
    discounted_vm_label: "spot",
    // Family prefix is substituted from the configured worker type
    worker_sizes: &[
        ("medium", "t3.medium"),
        ("large", "{type}.large"),
        ("xlarge", "{type}.xlarge"),
        ("2xlarge", "{type}.2xlarge"),
        ("4xlarge", "{type}.4xlarge"),
        ("12xlarge", "{type}.12xlarge"),
        ("24xlarge", "{type}.24xlarge"),
    ],
    web_sizes: &[
        ("small", "t3.small"),
        ("medium", "t3.medium"),
        ("large", "t3.large"),
        ("xlarge", "t3.xlarge"),
        ("2xlarge", "t3.2xlarge"),
    ],
    db_sizes: &[
        ("small", "db.t3.small"),
        ("medium", "db.t3.medium"),
        ("large", "db.m5.large"),
        ("xlarge", "db.m5.xlarge"),
        ("2xlarge", "db.m5.2xlarge"),
        ("4xlarge", "db.m5.4xlarge"),
    ],
};

static GCP: Capabilities = Capabilities {
    requires_full_topology: false,
    max_name_length: Some(11),
    default_region: "europe-west1",
    default_zone_suffix: "-b",
    default_network: DefaultNetwork {
        network: "",
        public: "10.0.0.0/24",
        private: "10.0.1.0/24",
        db1: "",
        db2: "",
    },
    supports_worker_type: false,
    discounted_vm_label: "preemptible",
    worker_sizes: &[
        ("medium", "n1-standard-1"),
        ("large", "n1-standard-2"),
        ("xlarge", "n1-standard-4"),
        ("2xlarge", "n1-standard-8"),
        ("4xlarge", "n1-standard-16"),
        ("12xlarge", "n1-standard-32"),
        ("24xlarge", "n1-standard-64"),
    ],
    web_sizes: &[
        ("small", "n1-standard-1"),
        ("medium", "n1-standard-2"),
        ("large", "n1-standard-4"),
        ("xlarge", "n1-standard-8"),
        ("2xlarge", "n1-standard-16"),
    ],
    db_sizes: &[
        ("small", "db-g1-small"),
        ("medium", "db-custom-2-4096"),
        ("large", "db-custom-2-8192"),
        ("xlarge", "db-custom-4-16384"),
        ("2xlarge", "db-custom-8-32768"),
        ("4xlarge", "db-custom-16-65536"),
    ],
};

impl IaasKind {
    /// Parse from a flag value, case-insensitively
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "gcp" => Ok(Self::Gcp),
            _ => Err(ValidationError::UnknownIaas(s.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Aws => "AWS",
            Self::Gcp => "GCP",
        }
    }

    pub fn capabilities(&self) -> &'static Capabilities {
        match self {
            Self::Aws => &AWS,
            Self::Gcp => &GCP,
        }
    }

    /// Default zone for a region, e.g. `eu-west-1a` or `europe-west1-b`
    pub fn default_zone(&self, region: &str) -> String {
        format!("{}{}", region, self.capabilities().default_zone_suffix)
    }
}

impl fmt::Display for IaasKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn lookup(table: &[(&str, &'static str)], size: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == size).map(|(_, v)| *v)
}

impl Capabilities {
    /// Worker VM type for a logical size
    pub fn worker_instance_type(&self, size: &str, worker_type: &str) -> Option<String> {
        lookup(self.worker_sizes, size).map(|t| t.replace("{type}", worker_type))
    }

    pub fn web_instance_type(&self, size: &str) -> Option<&'static str> {
        lookup(self.web_sizes, size)
    }

    pub fn db_instance_class(&self, size: &str) -> Option<&'static str> {
        lookup(self.db_sizes, size)
    }
}

/// Check a value against an enumerated set of sizes
pub fn validate_size(field: &'static str, value: &str, allowed: &[&str]) -> Result<(), ValidationError> {
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSize {
            field,
            value: value.to_string(),
            allowed: format!("[{}]", allowed.join(" ")),
        })
    }
}
