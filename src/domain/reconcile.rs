//! Merge of deploy arguments with the persisted configuration
//!
//! A field supplied in this invocation replaces the stored value. A field
//! left out keeps the stored value verbatim, generated secrets included.

use regex::Regex;
use std::sync::OnceLock;

use super::access::{format_allow_list, OPEN_ACCESS};
use super::args::DeploymentArguments;
use super::config::{deployment_id, DeploymentConfig, OAuthClient, Secrets};
use super::iaas::{validate_size, IaasKind, DB_SIZES, WEB_SIZES, WORKER_SIZES, WORKER_TYPES};
use super::region::{resolve_placement, validate_name};
use crate::error::ValidationError;

/// What the arguments are merged onto
#[derive(Debug, Clone)]
pub enum Baseline {
    /// Snapshot loaded from the store
    Existing(DeploymentConfig),
    /// No snapshot yet; carries the secrets a first deploy needs
    Fresh(Secrets),
}

/// Values from outside the argument set that the merge needs
#[derive(Debug, Clone)]
pub struct ReconcileEnv<'a> {
    pub name: &'a str,
    /// Provider default region, used for a fresh deployment
    pub provider_region: &'a str,
    /// Operator's current public IP
    pub operator_ip: &'a str,
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub config: DeploymentConfig,
    /// Informational messages for the operator
    pub notes: Vec<String>,
    pub first_deploy: bool,
}

fn tag_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+=\w+").expect("static regex"))
}

fn apply<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

/// Merge `args` onto `baseline` and validate the result
pub fn reconcile(
    baseline: Baseline,
    args: &DeploymentArguments,
    env: &ReconcileEnv<'_>,
) -> Result<Reconciled, ValidationError> {
    let requested_iaas = args.iaas.as_deref().map(IaasKind::parse).transpose()?;

    let (mut config, fallback_region, first_deploy) = match baseline {
        Baseline::Existing(existing) => {
            if let Some(requested) = requested_iaas {
                if requested != existing.iaas {
                    return Err(ValidationError::IaasChanged {
                        existing: existing.iaas.to_string(),
                        requested: requested.to_string(),
                    });
                }
            }
            let region = existing.region.clone();
            (existing, region, false)
        }
        Baseline::Fresh(secrets) => {
            let iaas = requested_iaas.ok_or(ValidationError::MissingIaas)?;
            if args.self_update {
                return Err(ValidationError::SelfUpdateWithoutDeployment);
            }
            (
                fresh_config(env.name, iaas, secrets)?,
                env.provider_region.to_string(),
                true,
            )
        }
    };

    validate_name(env.name, config.iaas)?;

    let mut notes = Vec::new();
    let placement = resolve_placement(args.region.as_deref(), args.zone.as_deref(), &fallback_region)?;
    config.region = placement.region;
    if let Some(zone) = placement.zone {
        config.availability_zone = zone;
    } else if config.availability_zone.is_empty() || !config.availability_zone.contains(&config.region) {
        config.availability_zone = config.iaas.default_zone(&config.region);
    }
    notes.extend(placement.note);

    apply_arguments(&mut config, args)?;
    config.access.source_access_ip = env.operator_ip.to_string();

    validate_merged(&config)?;

    Ok(Reconciled {
        config,
        notes,
        first_deploy,
    })
}

fn fresh_config(name: &str, iaas: IaasKind, secrets: Secrets) -> Result<DeploymentConfig, ValidationError> {
    let mut config = DeploymentConfig {
        name: name.to_string(),
        deployment: deployment_id(name),
        iaas,
        secrets,
        ..Default::default()
    };
    config.access.allow_ips = format_allow_list(OPEN_ACCESS)?;
    config.access.allow_ips_unformatted = OPEN_ACCESS.to_string();
    Ok(config)
}

fn apply_arguments(config: &mut DeploymentConfig, args: &DeploymentArguments) -> Result<(), ValidationError> {
    apply(&mut config.namespace, &args.namespace);
    apply(&mut config.tls.domain, &args.domain);

    match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => {
            config.tls.concourse_cert = cert.clone();
            config.tls.concourse_key = key.clone();
            config.tls.concourse_user_provided_cert = !cert.is_empty();
        }
        (None, Some(key)) if !key.is_empty() => return Err(ValidationError::TlsKeyWithoutCert),
        (Some(cert), None) if !cert.is_empty() => return Err(ValidationError::TlsCertWithoutKey),
        _ => {}
    }

    apply(&mut config.sizing.worker_count, &args.worker_count);
    apply(&mut config.sizing.worker_size, &args.worker_size);
    if let Some(worker_type) = &args.worker_type {
        if !config.iaas.capabilities().supports_worker_type {
            return Err(ValidationError::WorkerTypeUnsupported);
        }
        if !WORKER_TYPES.contains(&worker_type.as_str()) {
            return Err(ValidationError::InvalidWorkerType(worker_type.clone()));
        }
        config.sizing.worker_type = worker_type.clone();
    }
    apply(&mut config.sizing.web_size, &args.web_size);
    apply(&mut config.sizing.db_size, &args.db_size);

    apply(&mut config.features.spot, &args.spot);
    apply(&mut config.features.enable_global_resources, &args.enable_global_resources);
    apply(&mut config.features.enable_pipeline_instances, &args.enable_pipeline_instances);
    apply(&mut config.features.influxdb_retention, &args.influxdb_retention);

    if let Some(raw) = &args.allow_ips {
        config.access.allow_ips = format_allow_list(raw)?;
        config.access.allow_ips_unformatted = raw.clone();
    }

    apply(&mut config.auth.github.client_id, &args.github_client_id);
    apply(&mut config.auth.github.client_secret, &args.github_client_secret);
    apply(&mut config.auth.bitbucket.client_id, &args.bitbucket_client_id);
    apply(&mut config.auth.bitbucket.client_secret, &args.bitbucket_client_secret);
    apply(&mut config.auth.microsoft.client_id, &args.microsoft_client_id);
    apply(&mut config.auth.microsoft.client_secret, &args.microsoft_client_secret);
    apply(&mut config.auth.microsoft_tenant, &args.microsoft_tenant);

    if let Some(tags) = &args.tags {
        for tag in tags {
            if !tag_shape().is_match(tag) {
                return Err(ValidationError::InvalidTag(tag.clone()));
            }
        }
        config.tags = tags.clone();
    }

    apply(&mut config.network.network_cidr, &args.network_cidr);
    apply(&mut config.network.public_cidr, &args.public_cidr);
    apply(&mut config.network.private_cidr, &args.private_cidr);
    apply(&mut config.network.rds1_cidr, &args.rds1_cidr);
    apply(&mut config.network.rds2_cidr, &args.rds2_cidr);

    Ok(())
}

fn validate_oauth(provider: &'static str, client: &OAuthClient) -> Result<(), ValidationError> {
    match (client.client_id.is_empty(), client.client_secret.is_empty()) {
        (false, true) => Err(ValidationError::OAuthPair {
            provider,
            present: "client-id",
            missing: "client-secret",
        }),
        (true, false) => Err(ValidationError::OAuthPair {
            provider,
            present: "client-secret",
            missing: "client-id",
        }),
        _ => Ok(()),
    }
}

/// Invariants that must hold on every merged config
pub fn validate_merged(config: &DeploymentConfig) -> Result<(), ValidationError> {
    let tls = &config.tls;
    match (tls.concourse_cert.is_empty(), tls.concourse_key.is_empty()) {
        (true, false) => return Err(ValidationError::TlsKeyWithoutCert),
        (false, true) => return Err(ValidationError::TlsCertWithoutKey),
        _ => {}
    }
    if tls.concourse_user_provided_cert && !tls.has_custom_domain() {
        return Err(ValidationError::CustomCertWithoutDomain);
    }

    validate_oauth("github", &config.auth.github)?;
    validate_oauth("bitbucket", &config.auth.bitbucket)?;
    validate_oauth("microsoft", &config.auth.microsoft)?;

    if config.sizing.worker_count < 1 {
        return Err(ValidationError::WorkerCount);
    }
    validate_size("worker size", &config.sizing.worker_size, WORKER_SIZES)?;
    validate_size("web node size", &config.sizing.web_size, WEB_SIZES)?;
    validate_size("DB size", &config.sizing.db_size, DB_SIZES)?;

    Ok(())
}
