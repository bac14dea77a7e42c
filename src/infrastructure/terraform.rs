//! Infrastructure provisioning through terraform
//!
//! Each deployment gets its own working directory holding a copy of the
//! IAAS templates, the var-file and the local state.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

use super::process::{run, run_streaming};
use crate::domain::iaas::IaasKind;
use crate::domain::input_vars::InputVars;
use crate::domain::outputs::ProvisioningOutputs;

const VAR_FILE: &str = "terraform.tfvars.json";

#[async_trait]
pub trait InfraProvisioner: Send + Sync {
    async fn apply(&self, vars: &InputVars) -> Result<()>;
    async fn destroy(&self, vars: &InputVars) -> Result<()>;
    async fn build_outputs(&self, vars: &InputVars) -> Result<ProvisioningOutputs>;
}

pub struct TerraformClient {
    binary: String,
    templates_dir: PathBuf,
    workspaces_dir: PathBuf,
}

impl TerraformClient {
    pub fn new(binary: impl Into<String>, templates_dir: impl Into<PathBuf>, workspaces_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            templates_dir: templates_dir.into(),
            workspaces_dir: workspaces_dir.into(),
        }
    }

    fn template_dir(&self, iaas: IaasKind) -> PathBuf {
        self.templates_dir.join(iaas.name().to_lowercase())
    }

    fn workspace(&self, vars: &InputVars) -> PathBuf {
        self.workspaces_dir.join(vars.deployment())
    }

    /// Refresh templates and var-file in the workspace, then `init`
    async fn prepare(&self, vars: &InputVars) -> Result<PathBuf> {
        let templates = self.template_dir(vars.iaas());
        if !templates.is_dir() {
            bail!("terraform templates not found at {}", templates.display());
        }
        let workspace = self.workspace(vars);
        tokio::fs::create_dir_all(&workspace)
            .await
            .with_context(|| format!("Failed to create {}", workspace.display()))?;
        copy_templates(&templates, &workspace).await?;

        let json = vars.to_json().context("Failed to serialize input vars")?;
        tokio::fs::write(workspace.join(VAR_FILE), json)
            .await
            .context("Failed to write terraform var-file")?;

        run(
            Command::new(&self.binary)
                .args(["init", "-input=false", "-no-color"])
                .current_dir(&workspace),
            "terraform init",
        )
        .await?;
        Ok(workspace)
    }
}

async fn copy_templates(from: &Path, to: &Path) -> Result<()> {
    let mut entries = tokio::fs::read_dir(from)
        .await
        .with_context(|| format!("Failed to read {}", from.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("tf") {
            let target = to.join(entry.file_name());
            tokio::fs::copy(&path, &target)
                .await
                .with_context(|| format!("Failed to copy {}", path.display()))?;
        }
    }
    Ok(())
}

#[async_trait]
impl InfraProvisioner for TerraformClient {
    async fn apply(&self, vars: &InputVars) -> Result<()> {
        let workspace = self.prepare(vars).await?;
        info!(deployment = vars.deployment(), "Applying infrastructure");
        run_streaming(
            Command::new(&self.binary)
                .args(["apply", "-auto-approve", "-input=false", "-no-color"])
                .current_dir(&workspace),
            "terraform apply",
        )
        .await
    }

    async fn destroy(&self, vars: &InputVars) -> Result<()> {
        let workspace = self.prepare(vars).await?;
        info!(deployment = vars.deployment(), "Destroying infrastructure");
        run_streaming(
            Command::new(&self.binary)
                .args(["destroy", "-auto-approve", "-input=false", "-no-color"])
                .current_dir(&workspace),
            "terraform destroy",
        )
        .await?;
        tokio::fs::remove_dir_all(&workspace)
            .await
            .with_context(|| format!("Failed to remove {}", workspace.display()))?;
        Ok(())
    }

    async fn build_outputs(&self, vars: &InputVars) -> Result<ProvisioningOutputs> {
        let workspace = self.workspace(vars);
        if !workspace.is_dir() {
            bail!("no terraform workspace for {}", vars.deployment());
        }
        let raw = run(
            Command::new(&self.binary)
                .args(["output", "-json", "-no-color"])
                .current_dir(&workspace),
            "terraform output",
        )
        .await?;
        ProvisioningOutputs::from_terraform_json(vars.iaas(), &raw)
    }
}
