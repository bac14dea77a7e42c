//! Info command for showing a deployment's endpoints, credentials and VMs

use anyhow::{Context, Result};
use colored::Colorize;

use super::{build_orchestrator, Target};
use crate::cli::TargetArgs;
use crate::config::ToolConfig;
use crate::domain::deploy::DeploymentInfo;
use crate::ui;

/// Output format for info command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    /// Shell exports for the director and credhub CLIs
    Env,
}

impl OutputFormat {
    pub fn from_flags(json: bool, env: bool) -> Self {
        match (json, env) {
            (true, _) => Self::Json,
            (_, true) => Self::Env,
            _ => Self::Text,
        }
    }
}

pub async fn execute(tool: &ToolConfig, target: TargetArgs, format: OutputFormat, version: &str) -> Result<()> {
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

    let spinner = ui::spinner(&format!("Fetching info for {}...", target.name));
    let result = orchestrator.fetch_info(&target.name).await;
    spinner.finish_and_clear();
    let info = result?;

    match format {
        OutputFormat::Text => print_text_info(&info),
        OutputFormat::Json => print_json_info(&info)?,
        OutputFormat::Env => print!("{}", info.env_exports()),
    }
    Ok(())
}

fn print_json_info(info: &DeploymentInfo) -> Result<()> {
    let json = serde_json::to_string_pretty(info).context("Failed to serialize deployment info")?;
    println!("{}", json);
    Ok(())
}

fn print_text_info(info: &DeploymentInfo) {
    ui::print_header(&format!("Deployment: {}", info.name));

    println!("{}", "Overview".bright_white().bold());
    println!("  IAAS:            {}", info.iaas.to_string().bright_yellow());
    println!("  Region:          {}", info.region.bright_yellow());
    println!("  Zone:            {}", info.availability_zone);
    println!("  Version:         {}", info.version);
    println!();

    println!("{}", "Workers".bright_white().bold());
    println!("  Count:           {}", info.worker_count);
    println!("  Size:            {}", info.worker_size);
    if !info.worker_type.is_empty() {
        println!("  Type:            {}", info.worker_type);
    }
    println!("  Provisioning:    {}", info.vm_provisioning_type);
    println!("  Outbound IP:     {}", info.nat_gateway_ip);
    println!();

    println!("{}", "Web".bright_white().bold());
    println!("  URL:             {}", info.url.bright_green());
    println!("  Username:        {}", info.username);
    println!("  Password:        {}", info.password);
    println!("  Grafana:         {}", info.grafana_url);
    println!("  Grafana pass:    {}", info.grafana_password);
    println!();

    println!("{}", "Director".bright_white().bold());
    println!("  URL:             {}", info.director.url);
    println!("  Username:        {}", info.director.username);
    println!("  Password:        {}", info.director.password);
    println!();

    println!("{}", "Credhub".bright_white().bold());
    println!("  URL:             {}", info.credhub.url);
    println!("  Username:        {}", info.credhub.username);
    println!("  Password:        {}", info.credhub.password);
    println!();

    println!("{}", "Instances".bright_white().bold());
    if info.instances.is_empty() {
        println!("  {}", "none".dimmed());
    }
    for instance in &info.instances {
        let state = if instance.state == "running" {
            instance.state.bright_green()
        } else {
            instance.state.bright_red()
        };
        println!("  {:<40} {:<16} {:<10} {}", instance.name, instance.ips, state, instance.vm_type.dimmed());
    }
    println!();

    ui::print_info(&format!(
        "Run `spire info {} --env` and eval the output to use the director and credhub CLIs",
        info.name
    ));
}
