//! Default pipeline management through the fly CLI
//!
//! After every deploy a self-update pipeline is set on the new CI so the
//! deployment can redeploy itself on new spire releases.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::info;

use super::process::run;
use crate::domain::config::DeploymentConfig;

pub const SELF_UPDATE_PIPELINE: &str = "spire-self-update";

const DEFAULT_PIPELINE: &str = r#"---
resources:
- name: spire-release
  type: github-release
  source:
    owner: spire-ci
    repository: spire

jobs:
- name: self-update
  serial: true
  plan:
  - get: spire-release
    trigger: true
  - task: update
    params:
      DEPLOYMENT: ((deployment_name))
      IAAS: ((iaas))
      REGION: ((region))
      SELF_UPDATE: true
    config:
      platform: linux
      image_resource:
        type: registry-image
        source: {repository: debian, tag: stable-slim}
      inputs:
      - name: spire-release
      run:
        path: bash
        args:
        - -c
        - |
          set -eu
          chmod +x spire-release/spire-linux-amd64
          spire-release/spire-linux-amd64 deploy "$DEPLOYMENT" --iaas "$IAAS" --region "$REGION"
"#;

#[async_trait]
pub trait PipelineRunner: Send + Sync {
    /// With `allow_version_mismatch` false the local fly is synced to the
    /// server version first
    async fn set_default_pipeline(&self, config: &DeploymentConfig, allow_version_mismatch: bool) -> Result<()>;
}

pub struct FlyClient {
    binary: String,
    template: Option<PathBuf>,
}

impl FlyClient {
    pub fn new(binary: impl Into<String>, template: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            template,
        }
    }

    async fn pipeline_yaml(&self) -> Result<String> {
        match &self.template {
            Some(path) if path.exists() => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display())),
            _ => Ok(DEFAULT_PIPELINE.to_string()),
        }
    }
}

/// `((var))` interpolation for the pipeline template
pub fn render_pipeline(template: &str, config: &DeploymentConfig) -> String {
    template
        .replace("((deployment_name))", &config.name)
        .replace("((iaas))", config.iaas.name())
        .replace("((region))", &config.region)
        .replace("((version))", &config.version)
}

#[async_trait]
impl PipelineRunner for FlyClient {
    async fn set_default_pipeline(&self, config: &DeploymentConfig, allow_version_mismatch: bool) -> Result<()> {
        // fly keeps targets in $HOME/.flyrc; keep ours out of the operator's
        let home = TempDir::new().context("Failed to create fly home")?;
        let target = config.deployment.as_str();
        let fly = |args: &[&str]| {
            let mut cmd = Command::new(&self.binary);
            cmd.env("HOME", home.path()).args(["--target", target]).args(args);
            cmd
        };

        let ca_path = home.path().join("ca.pem");
        let url = config.concourse_url();
        let mut login = fly(&[
            "login",
            "--concourse-url",
            url.as_str(),
            "--username",
            config.secrets.concourse_username.as_str(),
            "--password",
            config.secrets.concourse_password.as_str(),
        ]);
        if config.tls.concourse_ca_cert.is_empty() {
            login.arg("--insecure");
        } else {
            tokio::fs::write(&ca_path, &config.tls.concourse_ca_cert)
                .await
                .context("Failed to write CI CA")?;
            login.arg("--ca-cert").arg(&ca_path);
        }
        run(&mut login, "fly login").await?;

        if !allow_version_mismatch {
            run(&mut fly(&["sync"]), "fly sync").await?;
        }

        let pipeline_path = home.path().join("pipeline.yml");
        let rendered = render_pipeline(&self.pipeline_yaml().await?, config);
        tokio::fs::write(&pipeline_path, rendered)
            .await
            .context("Failed to write pipeline")?;
        let pipeline_arg = pipeline_path.to_string_lossy().to_string();

        run(
            &mut fly(&[
                "set-pipeline",
                "--non-interactive",
                "--pipeline",
                SELF_UPDATE_PIPELINE,
                "--config",
                pipeline_arg.as_str(),
            ]),
            "fly set-pipeline",
        )
        .await?;
        run(
            &mut fly(&["unpause-pipeline", "--pipeline", SELF_UPDATE_PIPELINE]),
            "fly unpause-pipeline",
        )
        .await?;

        info!(pipeline = SELF_UPDATE_PIPELINE, fly_target = target, "Default pipeline set");
        Ok(())
    }
}
