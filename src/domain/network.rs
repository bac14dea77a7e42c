//! Network range planning
//!
//! Validates the VPC, public/private and database subnet ranges before any
//! cloud resource is touched.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use super::iaas::IaasKind;
use crate::error::ValidationError;

pub const NETWORK_FIELD: &str = "vpc-network-range";
pub const PUBLIC_FIELD: &str = "public-subnet-range";
pub const PRIVATE_FIELD: &str = "private-subnet-range";
pub const DB1_FIELD: &str = "rds-subnet-range1";
pub const DB2_FIELD: &str = "rds-subnet-range2";

const MIN_NETWORK_ADDRESSES: u32 = 16;
const MIN_SUBNET_ADDRESSES: u32 = 8;
const MIN_DB_SUBNET_ADDRESSES: u32 = 4;

/// Persisted form of the network plan. Empty strings mean "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRanges {
    #[serde(default)]
    pub network_cidr: String,
    #[serde(default)]
    pub public_cidr: String,
    #[serde(default)]
    pub private_cidr: String,
    #[serde(default)]
    pub rds1_cidr: String,
    #[serde(default)]
    pub rds2_cidr: String,
}

impl NetworkRanges {
    pub fn is_empty(&self) -> bool {
        self.network_cidr.is_empty()
            && self.public_cidr.is_empty()
            && self.private_cidr.is_empty()
            && self.rds1_cidr.is_empty()
            && self.rds2_cidr.is_empty()
    }

    /// The provider's default ranges
    pub fn defaults_for(iaas: IaasKind) -> Self {
        let d = iaas.capabilities().default_network;
        Self {
            network_cidr: d.network.to_string(),
            public_cidr: d.public.to_string(),
            private_cidr: d.private.to_string(),
            rds1_cidr: d.db1.to_string(),
            rds2_cidr: d.db2.to_string(),
        }
    }
}

/// Parsed and validated network plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkPlan {
    pub network: Option<IpNet>,
    pub public: Option<IpNet>,
    pub private: Option<IpNet>,
    pub db1: Option<IpNet>,
    pub db2: Option<IpNet>,
}

impl NetworkPlan {
    pub fn is_empty(&self) -> bool {
        self.network.is_none()
            && self.public.is_none()
            && self.private.is_none()
            && self.db1.is_none()
            && self.db2.is_none()
    }

    /// Persisted ranges for this plan, or the provider defaults when the plan is empty
    pub fn into_ranges(self, iaas: IaasKind) -> NetworkRanges {
        if self.is_empty() {
            return NetworkRanges::defaults_for(iaas);
        }
        let fmt = |n: Option<IpNet>| n.map(|n| n.to_string()).unwrap_or_default();
        NetworkRanges {
            network_cidr: fmt(self.network),
            public_cidr: fmt(self.public),
            private_cidr: fmt(self.private),
            rds1_cidr: fmt(self.db1),
            rds2_cidr: fmt(self.db2),
        }
    }
}

/// Number of addresses a range covers, saturating for very large IPv6 ranges
fn address_count(net: &IpNet) -> u128 {
    let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
    1u128.checked_shl(host_bits).unwrap_or(u128::MAX)
}

fn parse_range(field: &'static str, value: &str) -> Result<Option<IpNet>, ValidationError> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .trim()
        .parse::<IpNet>()
        .map(|n| Some(n.trunc()))
        .map_err(|_| ValidationError::InvalidCidr { field })
}

fn check_size(field: &'static str, net: &IpNet, min: u32) -> Result<(), ValidationError> {
    if address_count(net) > u128::from(min) {
        Ok(())
    } else {
        Err(ValidationError::RangeTooSmall {
            field,
            min_addresses: min,
        })
    }
}

fn require(field: &'static str, net: Option<IpNet>) -> Result<IpNet, ValidationError> {
    net.ok_or(ValidationError::MissingRange { field })
}

/// Validate the raw ranges for a provider and derive the network plan.
///
/// All-empty input yields an empty plan so the provider defaults apply.
pub fn validate_and_derive(
    iaas: IaasKind,
    network: &str,
    public: &str,
    private: &str,
    db1: &str,
    db2: &str,
) -> Result<NetworkPlan, ValidationError> {
    let plan = NetworkPlan {
        network: parse_range(NETWORK_FIELD, network)?,
        public: parse_range(PUBLIC_FIELD, public)?,
        private: parse_range(PRIVATE_FIELD, private)?,
        db1: parse_range(DB1_FIELD, db1)?,
        db2: parse_range(DB2_FIELD, db2)?,
    };

    if plan.is_empty() {
        return Ok(plan);
    }

    if let Some(n) = &plan.network {
        check_size(NETWORK_FIELD, n, MIN_NETWORK_ADDRESSES)?;
    }
    for (field, net) in [(PUBLIC_FIELD, &plan.public), (PRIVATE_FIELD, &plan.private)] {
        if let Some(n) = net {
            check_size(field, n, MIN_SUBNET_ADDRESSES)?;
        }
    }
    for (field, net) in [(DB1_FIELD, &plan.db1), (DB2_FIELD, &plan.db2)] {
        if let Some(n) = net {
            check_size(field, n, MIN_DB_SUBNET_ADDRESSES)?;
        }
    }

    if plan.public.is_some() != plan.private.is_some() {
        return Err(ValidationError::RangePair {
            first: PUBLIC_FIELD,
            second: PRIVATE_FIELD,
        });
    }

    if iaas.capabilities().requires_full_topology {
        validate_full_topology(&plan)?;
    }

    Ok(plan)
}

fn validate_full_topology(plan: &NetworkPlan) -> Result<(), ValidationError> {
    let network = require(NETWORK_FIELD, plan.network)?;
    if plan.db1.is_none() || plan.db2.is_none() {
        return Err(ValidationError::RangePair {
            first: DB1_FIELD,
            second: DB2_FIELD,
        });
    }
    let public = require(PUBLIC_FIELD, plan.public)?;
    let private = require(PRIVATE_FIELD, plan.private)?;

    for (field, subnet) in [
        (PUBLIC_FIELD, Some(public)),
        (PRIVATE_FIELD, Some(private)),
        (DB1_FIELD, plan.db1),
        (DB2_FIELD, plan.db2),
    ] {
        if let Some(subnet) = subnet {
            if !network.contains(&subnet.network()) {
                return Err(ValidationError::NotContained { field });
            }
        }
    }

    // First-address containment only; see DESIGN.md
    if public.contains(&private.network()) || private.contains(&public.network()) {
        return Err(ValidationError::SubnetOverlap);
    }

    Ok(())
}
