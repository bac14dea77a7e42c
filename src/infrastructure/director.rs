//! Director operations through the bosh CLI
//!
//! `create-env` brings up the director from the stored state and
//! credentials, then the CI deployment is rolled out onto it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{info, warn};

use super::process::{run, run_streaming};
use crate::domain::config::DeploymentConfig;
use crate::domain::deploy::Instance;
use crate::domain::outputs::ProvisioningOutputs;

const STATE_FILE: &str = "state.json";
const CREDS_FILE: &str = "creds.yml";
const VARS_FILE: &str = "vars.yml";
const CA_FILE: &str = "ca.pem";
const CI_DEPLOYMENT: &str = "concourse";

/// Director state and credentials after a deploy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorArtifacts {
    pub state: Vec<u8>,
    pub creds: Vec<u8>,
}

/// A finished deploy attempt. The artifacts are whatever the director
/// wrote, which after a failure may be a partial state worth keeping.
#[derive(Debug)]
pub struct DeployAttempt {
    pub artifacts: DirectorArtifacts,
    pub outcome: Result<()>,
}

#[async_trait]
pub trait Director: Send + Sync {
    /// Deploy from prior state and creds (empty on first deploy).
    /// With `detach` the CI rollout is dispatched and not awaited.
    /// `Err` means nothing was attempted.
    async fn deploy(&self, state: Vec<u8>, creds: Vec<u8>, detach: bool) -> Result<DeployAttempt>;
    async fn cleanup(&self) -> Result<()>;
    async fn instances(&self) -> Result<Vec<Instance>>;
}

pub trait DirectorFactory: Send + Sync {
    /// `creds` are the stored director credentials, when there are any
    fn build(
        &self,
        config: &DeploymentConfig,
        outputs: &ProvisioningOutputs,
        creds: Option<&[u8]>,
    ) -> Result<Box<dyn Director>>;
}

/// Credhub values read from the director credentials
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredhubValues {
    pub username: String,
    pub password: String,
    pub admin_client_secret: String,
    pub ca_cert: String,
}

#[derive(Deserialize, Default)]
struct CertVar {
    #[serde(default)]
    ca: String,
}

#[derive(Deserialize, Default)]
struct CredsFile {
    #[serde(default)]
    admin_password: String,
    #[serde(default)]
    credhub_cli_password: String,
    #[serde(default)]
    credhub_admin_client_secret: String,
    #[serde(default)]
    credhub_tls: CertVar,
    #[serde(default)]
    director_ssl: CertVar,
}

impl CredhubValues {
    pub fn from_creds(creds: &[u8]) -> Result<Self> {
        let file: CredsFile = serde_yaml::from_slice(creds).context("Failed to parse director credentials")?;
        Ok(Self {
            username: "credhub-cli".to_string(),
            password: file.credhub_cli_password,
            admin_client_secret: file.credhub_admin_client_secret,
            ca_cert: file.credhub_tls.ca,
        })
    }
}

/// Provider-specific director variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
enum IaasVars {
    Aws {
        region: String,
        az: String,
        default_key_name: String,
        default_security_groups: Vec<String>,
        subnet_id: String,
        access_key_id: String,
        secret_access_key: String,
        blobstore_bucket: String,
        spot_instances: bool,
    },
    Gcp {
        project_id: String,
        zone: String,
        network: String,
        subnetwork: String,
        gcp_credentials_json: String,
        preemptible: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct TlsVar {
    ca: String,
    certificate: String,
    private_key: String,
}

/// Everything the director and CI manifests interpolate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct DirectorVars {
    director_name: String,
    external_ip: String,
    admin_password: String,
    hm_password: String,
    mbus_bootstrap_password: String,
    nats_password: String,
    registry_password: String,
    private_key: String,
    director_ssl: TlsVar,
    domain: String,
    atc_tls: TlsVar,
    concourse_username: String,
    concourse_password: String,
    encryption_key: String,
    grafana_password: String,
    influxdb_retention: String,
    enable_global_resources: bool,
    enable_pipeline_instances: bool,
    worker_count: u32,
    worker_vm_type: String,
    web_vm_type: String,
    db_address: String,
    db_name: String,
    db_username: String,
    db_password: String,
    db_ca_cert: String,
    github_client_id: String,
    github_client_secret: String,
    bitbucket_client_id: String,
    bitbucket_client_secret: String,
    microsoft_client_id: String,
    microsoft_client_secret: String,
    microsoft_tenant: String,
    tags: BTreeMap<String, String>,
    #[serde(flatten)]
    iaas: IaasVars,
}

impl DirectorVars {
    fn new(config: &DeploymentConfig, outputs: &ProvisioningOutputs) -> Self {
        let caps = config.iaas.capabilities();
        let secrets = &config.secrets;
        let tls = &config.tls;
        let auth = &config.auth;
        let iaas = match outputs {
            ProvisioningOutputs::Aws(o) => IaasVars::Aws {
                region: config.region.clone(),
                az: config.availability_zone.clone(),
                default_key_name: o.director_key_pair.clone(),
                default_security_groups: vec![o.vms_security_group_id.clone()],
                subnet_id: o.private_subnet_id.clone(),
                access_key_id: o.bosh_user_access_key_id.clone(),
                secret_access_key: o.bosh_secret_access_key.clone(),
                blobstore_bucket: o.blobstore_bucket.clone(),
                spot_instances: config.features.spot,
            },
            ProvisioningOutputs::Gcp(o) => IaasVars::Gcp {
                project_id: config.project.clone(),
                zone: config.availability_zone.clone(),
                network: o.network.clone(),
                subnetwork: o.private_subnetwork_name.clone(),
                gcp_credentials_json: o.director_account_creds.clone(),
                preemptible: config.features.spot,
            },
        };

        Self {
            director_name: config.deployment.clone(),
            external_ip: outputs.director_public_ip().to_string(),
            admin_password: secrets.director_password.clone(),
            hm_password: secrets.director_hm_user_password.clone(),
            mbus_bootstrap_password: secrets.director_mbus_password.clone(),
            nats_password: secrets.director_nats_password.clone(),
            registry_password: secrets.director_registry_password.clone(),
            private_key: secrets.private_key.clone(),
            director_ssl: TlsVar {
                ca: tls.director_ca_cert.clone(),
                certificate: tls.director_cert.clone(),
                private_key: tls.director_key.clone(),
            },
            domain: tls.domain.clone(),
            atc_tls: TlsVar {
                ca: tls.concourse_ca_cert.clone(),
                certificate: tls.concourse_cert.clone(),
                private_key: tls.concourse_key.clone(),
            },
            concourse_username: secrets.concourse_username.clone(),
            concourse_password: secrets.concourse_password.clone(),
            encryption_key: secrets.encryption_key.clone(),
            grafana_password: secrets.grafana_password.clone(),
            influxdb_retention: config.features.influxdb_retention.clone(),
            enable_global_resources: config.features.enable_global_resources,
            enable_pipeline_instances: config.features.enable_pipeline_instances,
            worker_count: config.sizing.worker_count,
            worker_vm_type: caps
                .worker_instance_type(&config.sizing.worker_size, &config.sizing.worker_type)
                .unwrap_or_default(),
            web_vm_type: caps
                .web_instance_type(&config.sizing.web_size)
                .unwrap_or_default()
                .to_string(),
            db_address: outputs.bosh_db_address().to_string(),
            db_name: secrets.rds_default_database_name.clone(),
            db_username: secrets.rds_username.clone(),
            db_password: secrets.rds_password.clone(),
            db_ca_cert: tls.db_ca_cert.clone(),
            github_client_id: auth.github.client_id.clone(),
            github_client_secret: auth.github.client_secret.clone(),
            bitbucket_client_id: auth.bitbucket.client_id.clone(),
            bitbucket_client_secret: auth.bitbucket.client_secret.clone(),
            microsoft_client_id: auth.microsoft.client_id.clone(),
            microsoft_client_secret: auth.microsoft.client_secret.clone(),
            microsoft_tenant: auth.microsoft_tenant.clone(),
            tags: config
                .tags
                .iter()
                .filter_map(|t| t.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            iaas,
        }
    }
}

/// Director login, preferring stored credentials over the config
#[derive(Debug, Clone, PartialEq, Eq)]
struct DirectorAuth {
    client_secret: String,
    ca_cert: String,
}

impl DirectorAuth {
    fn resolve(config: &DeploymentConfig, creds: Option<&[u8]>) -> Result<Self> {
        let mut auth = Self {
            client_secret: config.secrets.director_password.clone(),
            ca_cert: config.tls.director_ca_cert.clone(),
        };
        if let Some(creds) = creds {
            let file: CredsFile = serde_yaml::from_slice(creds).context("Failed to parse director credentials")?;
            if !file.admin_password.is_empty() {
                auth.client_secret = file.admin_password;
            }
            if !file.director_ssl.ca.is_empty() {
                auth.ca_cert = file.director_ssl.ca;
            }
        }
        Ok(auth)
    }
}

/// Builds a [`BoshClient`] per deploy
pub struct BoshFactory {
    binary: String,
    director_manifest: PathBuf,
    ci_manifest: PathBuf,
}

impl BoshFactory {
    pub fn new(binary: impl Into<String>, director_manifest: impl Into<PathBuf>, ci_manifest: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            director_manifest: director_manifest.into(),
            ci_manifest: ci_manifest.into(),
        }
    }
}

impl DirectorFactory for BoshFactory {
    fn build(
        &self,
        config: &DeploymentConfig,
        outputs: &ProvisioningOutputs,
        creds: Option<&[u8]>,
    ) -> Result<Box<dyn Director>> {
        let auth = DirectorAuth::resolve(config, creds)?;

        let workdir = TempDir::new().context("Failed to create director workspace")?;
        let vars = serde_yaml::to_string(&DirectorVars::new(config, outputs)).context("Failed to render director vars")?;
        std::fs::write(workdir.path().join(VARS_FILE), vars).context("Failed to write director vars")?;
        std::fs::write(workdir.path().join(CA_FILE), &auth.ca_cert).context("Failed to write director CA")?;

        Ok(Box::new(BoshClient {
            binary: self.binary.clone(),
            director_manifest: self.director_manifest.clone(),
            ci_manifest: self.ci_manifest.clone(),
            environment: outputs.director_public_ip().to_string(),
            client: config.secrets.director_username.clone(),
            client_secret: auth.client_secret,
            workdir,
        }))
    }
}

pub struct BoshClient {
    binary: String,
    director_manifest: PathBuf,
    ci_manifest: PathBuf,
    environment: String,
    client: String,
    client_secret: String,
    workdir: TempDir,
}

impl BoshClient {
    fn path(&self, name: &str) -> PathBuf {
        self.workdir.path().join(name)
    }

    /// A bosh command pointed at this director
    fn command(&self) -> Command {
        self.command_in(self.workdir.path())
    }

    fn command_in(&self, dir: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(dir)
            .env("BOSH_ENVIRONMENT", &self.environment)
            .env("BOSH_CLIENT", &self.client)
            .env("BOSH_CLIENT_SECRET", &self.client_secret)
            .env("BOSH_CA_CERT", dir.join(CA_FILE))
            .env("BOSH_NON_INTERACTIVE", "true");
        cmd
    }

    /// CI rollout reading its vars and vars-store from `dir`
    fn ci_deploy(&self, dir: &Path) -> Command {
        let mut cmd = self.command_in(dir);
        cmd.args(["-d", CI_DEPLOYMENT, "deploy"])
            .arg(&self.ci_manifest)
            .arg("--vars-file")
            .arg(dir.join(VARS_FILE))
            .arg("--vars-store")
            .arg(dir.join(CREDS_FILE));
        cmd
    }

    /// Copy the rollout inputs into a directory that is not removed with
    /// this client, so a detached `bosh deploy` keeps its files.
    async fn detached_workspace(&self) -> Result<PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("spire-self-update-")
            .tempdir()
            .context("Failed to create self-update workspace")?
            .keep();
        for name in [VARS_FILE, CA_FILE, CREDS_FILE] {
            let from = self.path(name);
            if tokio::fs::try_exists(&from).await? {
                tokio::fs::copy(&from, dir.join(name))
                    .await
                    .with_context(|| format!("Failed to copy {} to {}", name, dir.display()))?;
            }
        }
        Ok(dir)
    }

    async fn write_if_present(path: &Path, contents: &[u8]) -> Result<()> {
        if !contents.is_empty() {
            tokio::fs::write(path, contents)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }

    async fn read_or_empty(path: &Path) -> Result<Vec<u8>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

#[async_trait]
impl Director for BoshClient {
    async fn deploy(&self, state: Vec<u8>, creds: Vec<u8>, detach: bool) -> Result<DeployAttempt> {
        let state_path = self.path(STATE_FILE);
        let creds_path = self.path(CREDS_FILE);
        Self::write_if_present(&state_path, &state).await?;
        Self::write_if_present(&creds_path, &creds).await?;

        info!(director = %self.environment, "Creating director environment");
        let mut create_env = Command::new(&self.binary);
        create_env
            .current_dir(self.workdir.path())
            .arg("create-env")
            .arg(&self.director_manifest)
            .arg("--state")
            .arg(&state_path)
            .arg("--vars-store")
            .arg(&creds_path)
            .arg("--vars-file")
            .arg(self.path(VARS_FILE));
        let created = run_streaming(&mut create_env, "bosh create-env").await;

        // State must be read back even when create-env fails part way
        let mut artifacts = DirectorArtifacts {
            state: Self::read_or_empty(&state_path).await?,
            creds: Self::read_or_empty(&creds_path).await?,
        };
        if let Err(e) = created {
            return Ok(DeployAttempt {
                artifacts,
                outcome: Err(e),
            });
        }

        if detach {
            let dir = self.detached_workspace().await?;
            info!(workspace = %dir.display(), "Dispatching CI deployment without waiting");
            let outcome = self
                .ci_deploy(&dir)
                .spawn()
                .map(|_| ())
                .context("Failed to dispatch bosh deploy");
            return Ok(DeployAttempt { artifacts, outcome });
        }

        info!(deployment = CI_DEPLOYMENT, "Deploying CI");
        let outcome = run_streaming(&mut self.ci_deploy(self.workdir.path()), "bosh deploy").await;
        // The CI rollout adds its generated variables to the same vars-store
        artifacts.creds = Self::read_or_empty(&creds_path).await?;

        Ok(DeployAttempt { artifacts, outcome })
    }

    async fn cleanup(&self) -> Result<()> {
        if let Err(e) = run(self.command().args(["clean-up", "--all"]), "bosh clean-up").await {
            warn!("Director clean-up failed: {:#}", e);
            return Err(e);
        }
        Ok(())
    }

    async fn instances(&self) -> Result<Vec<Instance>> {
        let out = run(
            self.command().args(["-d", CI_DEPLOYMENT, "instances", "--json"]),
            "bosh instances",
        )
        .await?;
        parse_instances(&out)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BoshJson {
    tables: Vec<BoshTable>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BoshTable {
    rows: Vec<BTreeMap<String, String>>,
}

fn parse_instances(raw: &str) -> Result<Vec<Instance>> {
    let json: BoshJson = serde_json::from_str(raw).context("Failed to parse bosh instances output")?;
    let field = |row: &BTreeMap<String, String>, key: &str| row.get(key).cloned().unwrap_or_default();
    Ok(json
        .tables
        .into_iter()
        .flat_map(|t| t.rows)
        .map(|row| Instance {
            name: field(&row, "instance"),
            ips: field(&row, "ips"),
            state: field(&row, "process_state"),
            vm_type: field(&row, "vm_type"),
        })
        .collect())
}
