//! Destroy command

use anyhow::Result;
use tracing::info;

use super::{build_orchestrator, Target};
use crate::cli::TargetArgs;
use crate::config::ToolConfig;
use crate::ui;

pub async fn execute(tool: &ToolConfig, target: TargetArgs, version: &str) -> Result<()> {
    ui::print_header(&format!("Destroying {}", target.name));

    let orchestrator = build_orchestrator(
        tool,
        Target {
            name: &target.name,
            iaas: target.iaas.as_deref(),
            region: target.region.as_deref(),
            zone: None,
        },
        version,
    )
    .await?;

    orchestrator.destroy(&target.name).await?;

    info!(name = %target.name, "Deployment destroyed");
    ui::print_success("DESTROY SUCCESSFUL");
    Ok(())
}
