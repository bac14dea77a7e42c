//! Zone/region pairing and deployment naming rules

use regex::Regex;
use std::sync::OnceLock;

use super::iaas::IaasKind;
use crate::error::ValidationError;

fn region_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\w+-\w+-\d").expect("static regex"))
}

/// Infer a region from a zone name, e.g. `europe-west1-b` -> `europe-west1`
pub fn region_from_zone(zone: &str) -> Option<String> {
    region_prefix().find(zone).map(|m| m.as_str().to_string())
}

pub fn zone_belongs_to_region(zone: &str, region: &str) -> Result<(), ValidationError> {
    if zone.contains(region) {
        Ok(())
    } else {
        Err(ValidationError::ZoneRegionMismatch {
            zone: zone.to_string(),
            region: region.to_string(),
        })
    }
}

/// Region and zone chosen for a deploy, plus any note for the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub region: String,
    pub zone: Option<String>,
    pub note: Option<String>,
}

/// Resolve region and zone from explicit flags and a fallback region.
///
/// `fallback_region` is the stored region for an existing deployment, or the
/// provider default for a new one.
pub fn resolve_placement(
    region: Option<&str>,
    zone: Option<&str>,
    fallback_region: &str,
) -> Result<Placement, ValidationError> {
    match (region, zone) {
        (Some(region), Some(zone)) => {
            zone_belongs_to_region(zone, region)?;
            Ok(Placement {
                region: region.to_string(),
                zone: Some(zone.to_string()),
                note: None,
            })
        }
        (None, Some(zone)) => match region_from_zone(zone) {
            Some(inferred) => Ok(Placement {
                note: Some(format!(
                    "No region provided, please note that your zone will be paired with a matching region. This region: {} is used for deployment.",
                    inferred
                )),
                region: inferred,
                zone: Some(zone.to_string()),
            }),
            None => Ok(Placement {
                region: fallback_region.to_string(),
                zone: Some(zone.to_string()),
                note: None,
            }),
        },
        (Some(region), None) => Ok(Placement {
            region: region.to_string(),
            zone: None,
            note: None,
        }),
        (None, None) => Ok(Placement {
            region: fallback_region.to_string(),
            zone: None,
            note: None,
        }),
    }
}

pub fn validate_name(name: &str, iaas: IaasKind) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    if let Some(limit) = iaas.capabilities().max_name_length {
        if name.chars().count() > limit {
            return Err(ValidationError::NameTooLong {
                name: name.to_string(),
                limit,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_from_zone() {
        assert_eq!(region_from_zone("europe-west1-b").as_deref(), Some("europe-west1"));
        assert_eq!(region_from_zone("eu-west-1a").as_deref(), Some("eu-west-1"));
        assert_eq!(region_from_zone("nonsense"), None);
    }

    #[test]
    fn test_zone_without_region_infers_and_notes() {
        let placement = resolve_placement(None, Some("us-east1-c"), "europe-west1").unwrap();
        assert_eq!(placement.region, "us-east1");
        assert!(placement.note.unwrap().contains("us-east1"));
    }

    #[test]
    fn test_mismatched_zone_and_region() {
        let err = resolve_placement(Some("eu-west-1"), Some("us-east-1a"), "eu-west-1").unwrap_err();
        assert!(matches!(err, ValidationError::ZoneRegionMismatch { .. }));
    }

    #[test]
    fn test_fallback_region_used_when_unset() {
        let placement = resolve_placement(None, None, "europe-west1").unwrap();
        assert_eq!(placement.region, "europe-west1");
        assert!(placement.zone.is_none());
        assert!(placement.note.is_none());
    }

    #[test]
    fn test_gcp_name_limit() {
        assert!(validate_name("abcdefghijk", IaasKind::Gcp).is_ok());
        let err = validate_name("abcdefghijkl", IaasKind::Gcp).unwrap_err();
        assert!(err.to_string().contains("11 character limit"));
    }

    #[test]
    fn test_aws_names_are_unlimited() {
        assert!(validate_name(&"a".repeat(64), IaasKind::Aws).is_ok());
        assert_eq!(validate_name("", IaasKind::Aws), Err(ValidationError::MissingName));
    }
}
