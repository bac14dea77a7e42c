//! Deploy command

use anyhow::Result;

use super::{build_orchestrator, Target};
use crate::cli::DeployArgs;
use crate::config::ToolConfig;
use crate::domain::args::DeploymentArguments;
use crate::ui;

pub async fn execute(tool: &ToolConfig, args: DeployArgs, version: &str) -> Result<()> {
    let name = args.name.clone();
    let arguments = DeploymentArguments::from(args);

    ui::print_header(&format!("Deploying {}", name));

    let orchestrator = build_orchestrator(
        tool,
        Target {
            name: &name,
            iaas: arguments.iaas.as_deref(),
            region: arguments.region.as_deref(),
            zone: arguments.zone.as_deref(),
        },
        version,
    )
    .await?;

    let summary = orchestrator.deploy(&name, &arguments).await?;
    ui::print_deploy_summary(&summary);
    Ok(())
}
