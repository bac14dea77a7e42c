//! Command implementations
//!
//! Each command wires the CLI adapters into a [`DeploymentOrchestrator`]
//! for one named deployment and renders the result.

pub mod deploy;
pub mod destroy;
pub mod info;

use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

use crate::config::{BinariesConfig, ToolConfig};
use crate::domain::iaas::IaasKind;
use crate::domain::region::region_from_zone;
use crate::error::{SpireError, ValidationError};
use crate::infrastructure::{
    BoshFactory, CliCloudProvider, ConfigStore, FileConfigStore, FlyClient, HttpIpResolver, OpensslIssuer,
    RandomSecrets, TerraformClient,
};
use crate::services::{Collaborators, DeploymentOrchestrator};

/// The deployment a command acts on, as given on the command line
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub name: &'a str,
    pub iaas: Option<&'a str>,
    pub region: Option<&'a str>,
    pub zone: Option<&'a str>,
}

/// Provider and region to talk to: flags first, then the stored config,
/// then the provider default
async fn resolve_placement(store: &dyn ConfigStore, target: &Target<'_>) -> Result<(IaasKind, String)> {
    let stored = store.load().await.map_err(SpireError::store)?;

    let iaas = match (target.iaas, &stored) {
        (Some(flag), _) => IaasKind::parse(flag).map_err(SpireError::from)?,
        (None, Some(config)) => config.iaas,
        (None, None) => return Err(SpireError::from(ValidationError::MissingIaas).into()),
    };

    let region = target
        .region
        .map(str::to_string)
        .or_else(|| target.zone.and_then(region_from_zone))
        .or_else(|| stored.as_ref().map(|c| c.region.clone()))
        .unwrap_or_else(|| iaas.capabilities().default_region.to_string());

    Ok((iaas, region))
}

/// Fail early when a collaborator CLI is missing
fn require_binaries(tool: &ToolConfig, iaas: IaasKind) -> Result<()> {
    let bins = &tool.binaries;
    let provider_cli = match iaas {
        IaasKind::Aws => bins.aws.as_str(),
        IaasKind::Gcp => bins.gcloud.as_str(),
    };
    for binary in [bins.terraform.as_str(), bins.bosh.as_str(), provider_cli] {
        let path = BinariesConfig::resolve(binary)?;
        debug!(binary, path = %path.display(), "Found collaborator");
    }
    Ok(())
}

/// Build the orchestrator for one deployment
pub async fn build_orchestrator(
    tool: &ToolConfig,
    target: Target<'_>,
    version: &str,
) -> Result<DeploymentOrchestrator> {
    let store = Arc::new(FileConfigStore::new(tool.deployments_dir(), target.name));
    let (iaas, region) = resolve_placement(store.as_ref(), &target).await?;
    require_binaries(tool, iaas)?;
    debug!(name = target.name, iaas = %iaas, region = %region, "Resolved deployment placement");

    let bins = &tool.binaries;
    let deps = Collaborators {
        provider: Arc::new(CliCloudProvider::new(iaas, region, &bins.aws, &bins.gcloud)),
        provisioner: Arc::new(TerraformClient::new(
            &bins.terraform,
            tool.templates_dir(),
            tool.terraform_dir(),
        )),
        director: Arc::new(BoshFactory::new(
            &bins.bosh,
            tool.director_manifest(),
            tool.ci_manifest(),
        )),
        pipeline: Arc::new(FlyClient::new(&bins.fly, Some(tool.pipeline_template()))),
        certs: Arc::new(OpensslIssuer::new(&bins.openssl, &bins.lego)),
        store,
        ip_resolver: Arc::new(HttpIpResolver::new(&tool.ip_echo_url)?),
        secrets: Arc::new(RandomSecrets::new(&bins.ssh_keygen)),
    };

    Ok(DeploymentOrchestrator::new(deps, tool.acme.account(), version))
}
