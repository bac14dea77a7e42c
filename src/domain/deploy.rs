//! Deployment lifecycle types
//!
//! Deploy, destroy and info are modelled as state machines with explicit
//! steps so a failure always names where it happened.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::config::DeploymentConfig;
use super::iaas::IaasKind;

/// Individual steps of a deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeployStep {
    /// Merge arguments and validate the network plan
    Reconcile,
    /// Apply the infrastructure templates
    Provision,
    /// Issue or reuse director and web certificates
    Certificates,
    /// Create or update the director and its deployment
    DirectorDeploy,
    /// Persist director assets and the config snapshot
    Persist,
    /// Confirm the operator can reach the director
    AccessCheck,
    /// Set the default self-update pipeline
    Pipeline,
}

impl DeployStep {
    /// Every step, in execution order
    pub const ALL: [DeployStep; 7] = [
        Self::Reconcile,
        Self::Provision,
        Self::Certificates,
        Self::DirectorDeploy,
        Self::Persist,
        Self::AccessCheck,
        Self::Pipeline,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Reconcile => "Reconcile",
            Self::Provision => "Provision",
            Self::Certificates => "Certificates",
            Self::DirectorDeploy => "Director Deploy",
            Self::Persist => "Persist",
            Self::AccessCheck => "Access Check",
            Self::Pipeline => "Pipeline",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Reconcile => "🧮",
            Self::Provision => "🏗️",
            Self::Certificates => "🔐",
            Self::DirectorDeploy => "🚀",
            Self::Persist => "💾",
            Self::AccessCheck => "🛡️",
            Self::Pipeline => "🔁",
        }
    }
}

/// Where a deployment is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    Absent,
    Provisioning,
    DirectorDeploying,
    AccessVerifying,
    PipelineConfiguring,
    Deployed,
    Failed(DeployStep),
    Destroying,
    Destroyed,
}

impl DeploymentState {
    /// State entered when a step starts
    pub fn entering(step: DeployStep) -> Self {
        match step {
            DeployStep::Reconcile => Self::Absent,
            DeployStep::Provision | DeployStep::Certificates => Self::Provisioning,
            DeployStep::DirectorDeploy | DeployStep::Persist => Self::DirectorDeploying,
            DeployStep::AccessCheck => Self::AccessVerifying,
            DeployStep::Pipeline => Self::PipelineConfiguring,
        }
    }
}

/// Result of one deploy step
#[derive(Debug)]
pub struct StepResult {
    pub step: DeployStep,
    pub success: bool,
    pub duration: Duration,
    pub message: Option<String>,
}

impl StepResult {
    pub fn success(step: DeployStep, duration: Duration) -> Self {
        Self {
            step,
            success: true,
            duration,
            message: None,
        }
    }

    pub fn failure(step: DeployStep, duration: Duration, message: impl Into<String>) -> Self {
        Self {
            step,
            success: false,
            duration,
            message: Some(message.into()),
        }
    }
}

/// What the operator needs after a successful deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySummary {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Where the director and credhub credentials live
    pub credentials_hint: String,
    /// The director deploy was dispatched detached
    pub self_update: bool,
    pub notes: Vec<String>,
}

impl DeploySummary {
    pub fn from_config(config: &DeploymentConfig, self_update: bool, notes: Vec<String>) -> Self {
        Self {
            url: config.concourse_url(),
            username: config.secrets.concourse_username.clone(),
            password: config.secrets.concourse_password.clone(),
            credentials_hint: format!(
                "Run `spire info {} --iaas {} --region {} --env` to export director and credhub credentials",
                config.name, config.iaas, config.region
            ),
            self_update,
            notes,
        }
    }
}

/// A director-managed VM
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub ips: String,
    pub state: String,
    #[serde(default)]
    pub vm_type: String,
}

/// Director endpoint and login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectorInfo {
    pub url: String,
    pub username: String,
    pub password: String,
    pub ca_cert: String,
}

/// Credhub endpoint and login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CredhubInfo {
    pub url: String,
    pub username: String,
    pub password: String,
    pub admin_client_secret: String,
    pub ca_cert: String,
}

/// Read-only status of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentInfo {
    pub name: String,
    pub deployment: String,
    pub iaas: IaasKind,
    pub region: String,
    pub availability_zone: String,
    pub version: String,
    pub url: String,
    pub username: String,
    pub password: String,
    pub grafana_url: String,
    pub grafana_password: String,
    pub worker_count: u32,
    pub worker_size: String,
    pub worker_type: String,
    pub vm_provisioning_type: String,
    pub nat_gateway_ip: String,
    pub director: DirectorInfo,
    pub credhub: CredhubInfo,
    pub instances: Vec<Instance>,
}

impl DeploymentInfo {
    pub fn new(config: &DeploymentConfig, director_ip: &str, nat_gateway_ip: &str, instances: Vec<Instance>) -> Self {
        let secrets = &config.secrets;
        Self {
            name: config.name.clone(),
            deployment: config.deployment.clone(),
            iaas: config.iaas,
            region: config.region.clone(),
            availability_zone: config.availability_zone.clone(),
            version: config.version.clone(),
            url: config.concourse_url(),
            username: secrets.concourse_username.clone(),
            password: secrets.concourse_password.clone(),
            grafana_url: format!("https://{}:3000", config.tls.domain),
            grafana_password: secrets.grafana_password.clone(),
            worker_count: config.sizing.worker_count,
            worker_size: config.sizing.worker_size.clone(),
            worker_type: if config.iaas.capabilities().supports_worker_type {
                config.sizing.worker_type.clone()
            } else {
                String::new()
            },
            vm_provisioning_type: config.vm_provisioning_type().to_string(),
            nat_gateway_ip: nat_gateway_ip.to_string(),
            director: DirectorInfo {
                url: format!("https://{}:25555", director_ip),
                username: secrets.director_username.clone(),
                password: secrets.director_password.clone(),
                ca_cert: config.tls.director_ca_cert.clone(),
            },
            credhub: CredhubInfo {
                url: format!("https://{}:8844", config.tls.domain),
                username: secrets.credhub_username.clone(),
                password: secrets.credhub_password.clone(),
                admin_client_secret: secrets.credhub_admin_client_secret.clone(),
                ca_cert: secrets.credhub_ca_cert.clone(),
            },
            instances,
        }
    }

    /// Shell exports that point the director and credhub CLIs at this deployment
    pub fn env_exports(&self) -> String {
        let pairs = [
            ("BOSH_ENVIRONMENT", self.director.url.as_str()),
            ("BOSH_CA_CERT", self.director.ca_cert.as_str()),
            ("BOSH_CLIENT", self.director.username.as_str()),
            ("BOSH_CLIENT_SECRET", self.director.password.as_str()),
            ("BOSH_DEPLOYMENT", "concourse"),
            ("CREDHUB_SERVER", self.credhub.url.as_str()),
            ("CREDHUB_CA_CERT", self.credhub.ca_cert.as_str()),
            ("CREDHUB_CLIENT", "credhub_admin"),
            ("CREDHUB_SECRET", self.credhub.admin_client_secret.as_str()),
        ];
        pairs
            .iter()
            .map(|(k, v)| format!("export {}='{}'\n", k, v.replace('\'', r"'\''")))
            .collect()
    }
}
