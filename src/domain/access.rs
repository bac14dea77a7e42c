//! Access-list formatting
//!
//! The operator supplies a comma separated list of IPs and CIDR ranges.
//! The provisioning tool consumes it as a list of quoted CIDRs.

use ipnet::IpNet;
use std::net::IpAddr;

use crate::error::ValidationError;

/// Default allow-list for a fresh deployment
pub const OPEN_ACCESS: &str = "0.0.0.0/0";

/// Parse one entry, widening a bare address to a single-host range
fn parse_entry(entry: &str) -> Result<IpNet, ValidationError> {
    if entry.contains('/') {
        entry
            .parse::<IpNet>()
            .map_err(|_| ValidationError::InvalidAllowIp(entry.to_string()))
    } else {
        entry
            .parse::<IpAddr>()
            .ok()
            .and_then(|addr| {
                let host_prefix = if addr.is_ipv4() { 32 } else { 128 };
                IpNet::new(addr, host_prefix).ok()
            })
            .ok_or_else(|| ValidationError::InvalidAllowIp(entry.to_string()))
    }
}

/// Parse an allow-list into CIDR ranges
pub fn parse_allow_list(raw: &str) -> Result<Vec<IpNet>, ValidationError> {
    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(parse_entry)
        .collect()
}

/// Render an allow-list as `"a/32", "b/24"`
pub fn format_allow_list(raw: &str) -> Result<String, ValidationError> {
    let ranges = parse_allow_list(raw)?;
    if ranges.is_empty() {
        return Err(ValidationError::InvalidAllowIp(raw.to_string()));
    }
    Ok(ranges
        .iter()
        .map(|r| format!("\"{}\"", r))
        .collect::<Vec<_>>()
        .join(", "))
}

/// Whether an address falls inside any of the given ranges
pub fn ip_in_ranges<'a>(ip: &str, ranges: impl IntoIterator<Item = &'a str>) -> bool {
    let Ok(addr) = ip.trim().parse::<IpAddr>() else {
        return false;
    };
    ranges
        .into_iter()
        .filter_map(|r| parse_entry(r.trim()).ok())
        .any(|net| net.contains(&addr))
}
