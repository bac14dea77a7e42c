//! Deployment orchestrator - deploy, destroy and info workflows
//!
//! Deploy runs a fixed sequence of steps over the collaborators and stops
//! at the first failure. The config value is threaded through the steps and
//! checkpointed to the store once the director has been deployed, so every
//! later failure leaves the director assets behind.

use colored::Colorize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::domain::args::DeploymentArguments;
use crate::domain::config::{deployment_id, DeploymentConfig};
use crate::domain::deploy::{DeployStep, DeploySummary, DeploymentInfo, DeploymentState, StepResult};
use crate::domain::iaas::IaasKind;
use crate::domain::input_vars::InputVars;
use crate::domain::network::validate_and_derive;
use crate::domain::outputs::ProvisioningOutputs;
use crate::domain::reconcile::{reconcile, Baseline, ReconcileEnv};
use crate::error::{AccessDeniedError, SpireError};
use crate::infrastructure::{
    generate_secrets, AcmeAccount, CertRequest, CertificateIssuer, CloudProvider, ConfigStore, CredhubValues,
    DeployAttempt, DirectorArtifacts, DirectorFactory, InfraProvisioner, IpResolver, PipelineRunner,
    SecretGenerator, VmScope, DIRECTOR_CREDS_ASSET, DIRECTOR_STATE_ASSET,
};

/// Tag carrying the version that last deployed a deployment
const VERSION_TAG: &str = "spire-version";

/// Everything the orchestrator talks to
pub struct Collaborators {
    pub provider: Arc<dyn CloudProvider>,
    pub provisioner: Arc<dyn InfraProvisioner>,
    pub director: Arc<dyn DirectorFactory>,
    pub pipeline: Arc<dyn PipelineRunner>,
    pub certs: Arc<dyn CertificateIssuer>,
    pub store: Arc<dyn ConfigStore>,
    pub ip_resolver: Arc<dyn IpResolver>,
    pub secrets: Arc<dyn SecretGenerator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Finish,
}

/// State threaded through one deploy
struct DeployRun {
    name: String,
    args: DeploymentArguments,
    config: DeploymentConfig,
    notes: Vec<String>,
    outputs: Option<ProvisioningOutputs>,
    artifacts: DirectorArtifacts,
    previous_director_ip: String,
    previous_domain: String,
}

impl DeployRun {
    fn outputs(&self) -> Result<&ProvisioningOutputs, SpireError> {
        self.outputs.as_ref().ok_or_else(|| SpireError::Provisioning {
            message: "no provisioning outputs available".to_string(),
        })
    }
}

pub struct DeploymentOrchestrator {
    deps: Collaborators,
    acme: Option<AcmeAccount>,
    version: String,
}

impl DeploymentOrchestrator {
    pub fn new(deps: Collaborators, acme: Option<AcmeAccount>, version: impl Into<String>) -> Self {
        Self {
            deps,
            acme,
            version: version.into(),
        }
    }

    /// Create or update the named deployment
    pub async fn deploy(&self, name: &str, args: &DeploymentArguments) -> Result<DeploySummary, SpireError> {
        let mut run = DeployRun {
            name: name.to_string(),
            args: args.clone(),
            config: DeploymentConfig::default(),
            notes: Vec::new(),
            outputs: None,
            artifacts: DirectorArtifacts::default(),
            previous_director_ip: String::new(),
            previous_domain: String::new(),
        };

        let mut results = Vec::new();
        let mut state = DeploymentState::Absent;

        for step in DeployStep::ALL {
            let entered = DeploymentState::entering(step);
            if entered != state {
                debug!(from = ?state, to = ?entered, "Deployment state changed");
                state = entered;
            }
            info!("{} Starting: {}", step.emoji(), step.name());

            let start = Instant::now();
            let result = self.execute_step(&mut run, step).await;
            let duration = start.elapsed();

            match result {
                Ok(flow) => {
                    info!(
                        "{} {} completed in {:.1}s",
                        "✅".green(),
                        step.name(),
                        duration.as_secs_f64()
                    );
                    results.push(StepResult::success(step, duration));
                    if flow == Flow::Finish {
                        break;
                    }
                }
                Err(e) => {
                    let msg = e.to_string();
                    warn!("{} {} failed: {}", "❌".red(), step.name(), msg);
                    results.push(StepResult::failure(step, duration, msg));
                    state = DeploymentState::Failed(step);
                    log_results(&results, state);
                    return Err(e);
                }
            }
        }

        state = DeploymentState::Deployed;
        log_results(&results, state);
        Ok(DeploySummary::from_config(&run.config, run.args.self_update, run.notes))
    }

    async fn execute_step(&self, run: &mut DeployRun, step: DeployStep) -> Result<Flow, SpireError> {
        match step {
            DeployStep::Reconcile => self.step_reconcile(run).await,
            DeployStep::Provision => self.step_provision(run).await,
            DeployStep::Certificates => self.step_certificates(run).await,
            DeployStep::DirectorDeploy => self.step_director_deploy(run).await,
            DeployStep::Persist => self.step_persist(run).await,
            DeployStep::AccessCheck => self.step_access_check(run).await,
            DeployStep::Pipeline => self.step_pipeline(run).await,
        }
    }

    async fn step_reconcile(&self, run: &mut DeployRun) -> Result<Flow, SpireError> {
        let existing = self.deps.store.load().await.map_err(SpireError::store)?;
        let operator_ip = self
            .deps
            .ip_resolver
            .operator_ip()
            .await
            .map_err(SpireError::provider)?;

        let baseline = match existing {
            Some(config) => {
                if run.args.is_empty() {
                    info!(deployment = %config.deployment, "No configuration changes, redeploying stored config");
                }
                run.previous_domain = config.tls.domain.clone();
                Baseline::Existing(config)
            }
            None => {
                let secrets = generate_secrets(self.deps.secrets.as_ref(), &deployment_id(&run.name))
                    .await
                    .map_err(SpireError::secrets)?;
                Baseline::Fresh(secrets)
            }
        };

        let env = ReconcileEnv {
            name: &run.name,
            provider_region: self.deps.provider.region(),
            operator_ip: &operator_ip,
        };
        let reconciled = reconcile(baseline, &run.args, &env)?;
        let mut config = reconciled.config;

        let ranges = &config.network;
        let plan = validate_and_derive(
            config.iaas,
            &ranges.network_cidr,
            &ranges.public_cidr,
            &ranges.private_cidr,
            &ranges.rds1_cidr,
            &ranges.rds2_cidr,
        )?;
        config.network = plan.into_ranges(config.iaas);

        if config.iaas == IaasKind::Gcp && config.project.is_empty() {
            config.project = self
                .deps
                .provider
                .attribute("project")
                .await
                .map_err(SpireError::provider)?;
        }

        for note in &reconciled.notes {
            info!("{}", note);
        }
        info!(
            deployment = %config.deployment,
            iaas = %config.iaas,
            region = %config.region,
            first_deploy = reconciled.first_deploy,
            "Configuration reconciled"
        );

        run.notes = reconciled.notes;
        run.config = config;
        Ok(Flow::Continue)
    }

    async fn step_provision(&self, run: &mut DeployRun) -> Result<Flow, SpireError> {
        let vars = InputVars::from_config(&run.config)?;
        self.deps
            .provisioner
            .apply(&vars)
            .await
            .map_err(SpireError::provisioning)?;
        let outputs = self
            .deps
            .provisioner
            .build_outputs(&vars)
            .await
            .map_err(SpireError::provisioning)?;

        let tls = &mut run.config.tls;
        run.previous_director_ip = std::mem::replace(&mut tls.director_public_ip, outputs.director_public_ip().to_string());
        if let Some(ca) = outputs.db_ca_cert() {
            tls.db_ca_cert = ca.to_string();
        }
        if !tls.has_custom_domain() {
            tls.domain = outputs.atc_public_ip().to_string();
        }

        run.outputs = Some(outputs);
        Ok(Flow::Continue)
    }

    async fn step_certificates(&self, run: &mut DeployRun) -> Result<Flow, SpireError> {
        let config = &mut run.config;

        if !config.tls.has_director_certs() || config.tls.director_public_ip != run.previous_director_ip {
            let request = CertRequest {
                ca_name: config.deployment.clone(),
                iaas: config.iaas,
                subjects: vec![config.tls.director_public_ip.clone()],
                acme: None,
            };
            let issued = self
                .deps
                .certs
                .issue(&request)
                .await
                .map_err(SpireError::certificate)?;
            config.tls.director_ca_cert = issued.ca_cert;
            config.tls.director_cert = issued.cert;
            config.tls.director_key = issued.key;
        }

        if config.tls.concourse_user_provided_cert {
            debug!(domain = %config.tls.domain, "Using operator-provided certificate");
        } else if !config.tls.has_concourse_certs() || config.tls.domain != run.previous_domain {
            let acme = if config.tls.has_custom_domain() {
                self.acme.clone()
            } else {
                None
            };
            let request = CertRequest {
                ca_name: config.deployment.clone(),
                iaas: config.iaas,
                subjects: vec![config.tls.domain.clone()],
                acme,
            };
            let issued = self
                .deps
                .certs
                .issue(&request)
                .await
                .map_err(SpireError::certificate)?;
            config.tls.concourse_ca_cert = issued.ca_cert;
            config.tls.concourse_cert = issued.cert;
            config.tls.concourse_key = issued.key;
        }

        Ok(Flow::Continue)
    }

    async fn step_director_deploy(&self, run: &mut DeployRun) -> Result<Flow, SpireError> {
        let state = self.load_asset_or_empty(DIRECTOR_STATE_ASSET).await?;
        let creds = self.load_asset_or_empty(DIRECTOR_CREDS_ASSET).await?;

        let director = self
            .deps
            .director
            .build(&run.config, run.outputs()?, (!creds.is_empty()).then_some(creds.as_slice()))
            .map_err(SpireError::director)?;

        let detach = run.args.self_update;
        let attempt = director.deploy(state, creds, detach).await;
        // A detached rollout is still running against the director
        if !detach {
            if let Err(e) = director.cleanup().await {
                warn!("Director clean-up failed: {:#}", e);
            }
        }

        let DeployAttempt { artifacts, outcome } = attempt.map_err(SpireError::director)?;
        if let Err(e) = outcome {
            self.store_artifacts(&artifacts).await?;
            return Err(SpireError::director(e));
        }

        run.artifacts = artifacts;
        Ok(Flow::Continue)
    }

    async fn step_persist(&self, run: &mut DeployRun) -> Result<Flow, SpireError> {
        self.store_artifacts(&run.artifacts).await?;

        let config = &mut run.config;
        if !run.artifacts.creds.is_empty() {
            let credhub = CredhubValues::from_creds(&run.artifacts.creds).map_err(SpireError::director)?;
            config.secrets.credhub_username = credhub.username;
            config.secrets.credhub_password = credhub.password;
            config.secrets.credhub_admin_client_secret = credhub.admin_client_secret;
            config.secrets.credhub_ca_cert = credhub.ca_cert;
        }
        config.version = self.version.clone();
        config.set_tag(VERSION_TAG, &self.version);

        self.deps.store.update(config).await.map_err(SpireError::store)?;

        if run.args.self_update {
            info!(deployment = %config.deployment, "Self-update dispatched");
            return Ok(Flow::Finish);
        }
        Ok(Flow::Continue)
    }

    async fn step_access_check(&self, run: &mut DeployRun) -> Result<Flow, SpireError> {
        self.verify_access(&run.config, run.outputs()?).await?;
        Ok(Flow::Continue)
    }

    async fn step_pipeline(&self, run: &mut DeployRun) -> Result<Flow, SpireError> {
        self.deps
            .pipeline
            .set_default_pipeline(&run.config, false)
            .await
            .map_err(SpireError::pipeline)?;
        Ok(Flow::Continue)
    }

    /// Tear down the named deployment. Forward-only, never rolls back.
    pub async fn destroy(&self, name: &str) -> Result<(), SpireError> {
        let store = &self.deps.store;
        if !store.config_exists().await.map_err(SpireError::store)? {
            return Err(SpireError::NothingToDestroy(name.to_string()));
        }
        let config = store
            .load()
            .await
            .map_err(SpireError::store)?
            .ok_or_else(|| SpireError::NothingToDestroy(name.to_string()))?;
        info!(deployment = %config.deployment, state = ?DeploymentState::Destroying, "Destroying deployment");

        let vars = InputVars::from_config(&config)?;
        let scope = match config.iaas {
            IaasKind::Gcp => VmScope::Gcp {
                zone: config.availability_zone.clone(),
                project: config.project.clone(),
                deployment: config.deployment.clone(),
            },
            IaasKind::Aws => {
                let outputs = self
                    .deps
                    .provisioner
                    .build_outputs(&vars)
                    .await
                    .map_err(SpireError::provisioning)?;
                let vpc_id = outputs
                    .vpc_id()
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| SpireError::Provisioning {
                        message: "terraform outputs have no vpc_id, refusing to delete VMs without a VPC scope"
                            .to_string(),
                    })?;
                VmScope::Aws {
                    region: config.region.clone(),
                    vpc_id: vpc_id.to_string(),
                }
            }
        };

        self.deps
            .provider
            .delete_vms_in_scope(&scope)
            .await
            .map_err(SpireError::provider)?;
        self.deps
            .provisioner
            .destroy(&vars)
            .await
            .map_err(SpireError::provisioning)?;
        store.delete_all(&config).await.map_err(SpireError::store)?;

        info!(deployment = %config.deployment, state = ?DeploymentState::Destroyed, "DESTROY SUCCESSFUL");
        Ok(())
    }

    /// Read-only view of the named deployment. Never writes to the store.
    pub async fn fetch_info(&self, name: &str) -> Result<DeploymentInfo, SpireError> {
        let mut config = self
            .deps
            .store
            .load()
            .await
            .map_err(SpireError::store)?
            .ok_or_else(|| SpireError::NotDeployed(name.to_string()))?;
        config.access.source_access_ip = self
            .deps
            .ip_resolver
            .operator_ip()
            .await
            .map_err(SpireError::provider)?;

        let vars = InputVars::from_config(&config)?;
        let outputs = self
            .deps
            .provisioner
            .build_outputs(&vars)
            .await
            .map_err(SpireError::provisioning)?;

        self.verify_access(&config, &outputs).await?;

        let creds = if self
            .deps
            .store
            .has_asset(DIRECTOR_CREDS_ASSET)
            .await
            .map_err(SpireError::store)?
        {
            Some(
                self.deps
                    .store
                    .load_asset(DIRECTOR_CREDS_ASSET)
                    .await
                    .map_err(SpireError::store)?,
            )
        } else {
            None
        };
        let director = self
            .deps
            .director
            .build(&config, &outputs, creds.as_deref())
            .map_err(SpireError::director)?;
        let instances = director.instances().await.map_err(SpireError::director)?;

        Ok(DeploymentInfo::new(
            &config,
            outputs.director_public_ip(),
            outputs.nat_gateway_ip(),
            instances,
        ))
    }

    /// The operator's IP must be on the director access list
    async fn verify_access(&self, config: &DeploymentConfig, outputs: &ProvisioningOutputs) -> Result<(), SpireError> {
        let scope = access_scope(config, outputs);
        let ip = &config.access.source_access_ip;
        let allowed = self
            .deps
            .provider
            .check_ip_in_access_list(ip, &scope)
            .await
            .map_err(SpireError::provider)?;
        if !allowed {
            return Err(AccessDeniedError {
                ip: ip.clone(),
                scope,
            }
            .into());
        }
        debug!(ip = %ip, scope = %scope, "Operator IP is allowed");
        Ok(())
    }

    async fn load_asset_or_empty(&self, name: &str) -> Result<Vec<u8>, SpireError> {
        let store = &self.deps.store;
        if !store.has_asset(name).await.map_err(SpireError::store)? {
            return Ok(Vec::new());
        }
        store.load_asset(name).await.map_err(SpireError::store)
    }

    async fn store_artifacts(&self, artifacts: &DirectorArtifacts) -> Result<(), SpireError> {
        for (name, contents) in [
            (DIRECTOR_STATE_ASSET, &artifacts.state),
            (DIRECTOR_CREDS_ASSET, &artifacts.creds),
        ] {
            if !contents.is_empty() {
                self.deps
                    .store
                    .store_asset(name, contents)
                    .await
                    .map_err(SpireError::store)?;
            }
        }
        Ok(())
    }
}

/// Security group id on AWS, director firewall rule on GCP
fn access_scope(config: &DeploymentConfig, outputs: &ProvisioningOutputs) -> String {
    match outputs.director_security_group_id() {
        Some(group) => group.to_string(),
        None => config.director_firewall_name(),
    }
}

fn log_results(results: &[StepResult], state: DeploymentState) {
    let total: Duration = results.iter().map(|r| r.duration).sum();
    for r in results {
        debug!(
            step = r.step.name(),
            success = r.success,
            seconds = r.duration.as_secs_f64(),
            message = r.message.as_deref().unwrap_or(""),
            "Step result"
        );
    }
    info!(state = ?state, steps = results.len(), seconds = total.as_secs_f64(), "Deploy finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::deploy::Instance;
    use crate::domain::outputs::{AwsOutputs, GcpOutputs};
    use crate::infrastructure::secrets::KeyPair;
    use crate::infrastructure::{Director, IssuedCert};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, action: impl Into<String>) {
        log.lock().unwrap().push(action.into());
    }

    const DENIED_IP: &str = "1.2.3.4";
    const CREDS_YAML: &[u8] = b"admin_password: director-secret\ncredhub_cli_password: credhub-pass\ncredhub_admin_client_secret: credhub-admin\ncredhub_tls:\n  ca: CREDHUB CA\n";

    struct FakeProvider {
        log: Log,
        iaas: IaasKind,
    }

    #[async_trait]
    impl CloudProvider for FakeProvider {
        fn region(&self) -> &str {
            match self.iaas {
                IaasKind::Aws => "eu-west-1",
                IaasKind::Gcp => "europe-west1",
            }
        }

        fn iaas(&self) -> IaasKind {
            self.iaas
        }

        async fn check_ip_in_access_list(&self, ip: &str, scope_id: &str) -> Result<bool> {
            record(&self.log, format!("checking access for {} in {}", ip, scope_id));
            Ok(ip != DENIED_IP)
        }

        async fn delete_vms_in_scope(&self, scope: &VmScope) -> Result<()> {
            match scope {
                VmScope::Gcp {
                    zone,
                    project,
                    deployment,
                } => record(
                    &self.log,
                    format!("deleting vms in zone: {} project: {} deployment: {}", zone, project, deployment),
                ),
                VmScope::Aws { region, vpc_id } => {
                    record(&self.log, format!("deleting vms in region: {} vpc: {}", region, vpc_id))
                }
            }
            Ok(())
        }

        async fn attribute(&self, name: &str) -> Result<String> {
            match name {
                "project" => Ok("happymeal".to_string()),
                other => bail!("unknown attribute {}", other),
            }
        }
    }

    struct FakeProvisioner {
        log: Log,
        outputs: ProvisioningOutputs,
        fail_apply: bool,
    }

    #[async_trait]
    impl InfraProvisioner for FakeProvisioner {
        async fn apply(&self, _vars: &InputVars) -> Result<()> {
            record(&self.log, "applying terraform");
            if self.fail_apply {
                bail!("terraform apply failed (exit status: 1)");
            }
            Ok(())
        }

        async fn destroy(&self, _vars: &InputVars) -> Result<()> {
            record(&self.log, "destroying terraform");
            Ok(())
        }

        async fn build_outputs(&self, _vars: &InputVars) -> Result<ProvisioningOutputs> {
            record(&self.log, "reading terraform outputs");
            Ok(self.outputs.clone())
        }
    }

    struct FakeDirector {
        log: Log,
        fail: bool,
    }

    #[async_trait]
    impl Director for FakeDirector {
        async fn deploy(&self, state: Vec<u8>, _creds: Vec<u8>, detach: bool) -> Result<DeployAttempt> {
            record(
                &self.log,
                format!("deploying director (prior state: {}, detach: {})", !state.is_empty(), detach),
            );
            let outcome = if self.fail {
                Err(anyhow::anyhow!("bosh deploy failed (exit status: 1)"))
            } else {
                Ok(())
            };
            Ok(DeployAttempt {
                artifacts: DirectorArtifacts {
                    state: b"{\"director\": \"state\"}".to_vec(),
                    creds: CREDS_YAML.to_vec(),
                },
                outcome,
            })
        }

        async fn cleanup(&self) -> Result<()> {
            record(&self.log, "cleaning up director");
            Ok(())
        }

        async fn instances(&self) -> Result<Vec<Instance>> {
            record(&self.log, "listing instances");
            Ok(vec![Instance {
                name: "web/0".to_string(),
                ips: "10.0.1.4".to_string(),
                state: "running".to_string(),
                vm_type: "small".to_string(),
            }])
        }
    }

    struct FakeDirectorFactory {
        log: Log,
        fail: bool,
    }

    impl DirectorFactory for FakeDirectorFactory {
        fn build(
            &self,
            _config: &DeploymentConfig,
            _outputs: &ProvisioningOutputs,
            creds: Option<&[u8]>,
        ) -> Result<Box<dyn Director>> {
            record(&self.log, format!("building director (stored creds: {})", creds.is_some()));
            Ok(Box::new(FakeDirector {
                log: self.log.clone(),
                fail: self.fail,
            }))
        }
    }

    struct FakePipeline {
        log: Log,
    }

    #[async_trait]
    impl PipelineRunner for FakePipeline {
        async fn set_default_pipeline(&self, _config: &DeploymentConfig, allow_version_mismatch: bool) -> Result<()> {
            record(
                &self.log,
                format!("setting default pipeline (allow mismatch: {})", allow_version_mismatch),
            );
            Ok(())
        }
    }

    struct FakeCerts {
        log: Log,
    }

    #[async_trait]
    impl CertificateIssuer for FakeCerts {
        async fn issue(&self, request: &CertRequest) -> Result<IssuedCert> {
            let subject = request.subjects.join(",");
            record(
                &self.log,
                format!("issuing certificate for {} (acme: {})", subject, request.acme.is_some()),
            );
            Ok(IssuedCert {
                ca_cert: format!("CA {}", subject),
                cert: format!("CERT {}", subject),
                key: format!("KEY {}", subject),
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        log: Log,
        config: Mutex<Option<DeploymentConfig>>,
        assets: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl ConfigStore for MemoryStore {
        async fn load(&self) -> Result<Option<DeploymentConfig>> {
            record(&self.log, "loading config file");
            Ok(self.config.lock().unwrap().clone())
        }

        async fn update(&self, config: &DeploymentConfig) -> Result<()> {
            record(&self.log, "updating config file");
            *self.config.lock().unwrap() = Some(config.clone());
            Ok(())
        }

        async fn delete_all(&self, _config: &DeploymentConfig) -> Result<()> {
            record(&self.log, "deleting config");
            *self.config.lock().unwrap() = None;
            self.assets.lock().unwrap().clear();
            Ok(())
        }

        async fn config_exists(&self) -> Result<bool> {
            record(&self.log, "checking to see if config exists");
            Ok(self.config.lock().unwrap().is_some())
        }

        async fn store_asset(&self, name: &str, contents: &[u8]) -> Result<()> {
            record(&self.log, format!("storing config asset: {}", name));
            self.assets
                .lock()
                .unwrap()
                .insert(name.to_string(), contents.to_vec());
            Ok(())
        }

        async fn load_asset(&self, name: &str) -> Result<Vec<u8>> {
            match self.assets.lock().unwrap().get(name) {
                Some(contents) => Ok(contents.clone()),
                None => bail!("no asset {}", name),
            }
        }

        async fn has_asset(&self, name: &str) -> Result<bool> {
            Ok(self.assets.lock().unwrap().contains_key(name))
        }
    }

    struct FixedIp(String);

    #[async_trait]
    impl IpResolver for FixedIp {
        async fn operator_ip(&self) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FixedSecrets;

    #[async_trait]
    impl SecretGenerator for FixedSecrets {
        fn password(&self, length: usize) -> String {
            "s".repeat(length)
        }

        fn suffix(&self) -> String {
            "abcdefgh".to_string()
        }

        async fn ssh_keypair(&self, _comment: &str) -> Result<KeyPair> {
            Ok(KeyPair {
                private_key: "private".to_string(),
                public_key: "ssh-rsa AAAA".to_string(),
                fingerprint: "aa:bb".to_string(),
            })
        }
    }

    struct Setup {
        iaas: IaasKind,
        stored: Option<DeploymentConfig>,
        operator_ip: &'static str,
        fail_apply: bool,
        fail_director: bool,
        acme: Option<AcmeAccount>,
        outputs: Option<ProvisioningOutputs>,
    }

    impl Default for Setup {
        fn default() -> Self {
            Self {
                iaas: IaasKind::Gcp,
                stored: None,
                operator_ip: "192.0.2.10",
                fail_apply: false,
                fail_director: false,
                acme: None,
                outputs: None,
            }
        }
    }

    struct Harness {
        log: Log,
        store: Arc<MemoryStore>,
        orchestrator: DeploymentOrchestrator,
    }

    impl Harness {
        fn actions(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn stored(&self) -> Option<DeploymentConfig> {
            self.store.config.lock().unwrap().clone()
        }

        fn position(&self, action: &str) -> usize {
            self.actions()
                .iter()
                .position(|a| a == action)
                .unwrap_or_else(|| panic!("action `{}` not recorded in {:?}", action, self.actions()))
        }
    }

    fn outputs(iaas: IaasKind) -> ProvisioningOutputs {
        match iaas {
            IaasKind::Aws => ProvisioningOutputs::Aws(AwsOutputs {
                atc_public_ip: "77.77.77.77".to_string(),
                director_public_ip: "99.99.99.99".to_string(),
                director_security_group_id: "sg-123".to_string(),
                nat_gateway_ip: "88.88.88.88".to_string(),
                vpc_id: "vpc-112233".to_string(),
                ..Default::default()
            }),
            IaasKind::Gcp => ProvisioningOutputs::Gcp(GcpOutputs {
                atc_public_ip: "77.77.77.77".to_string(),
                director_public_ip: "99.99.99.99".to_string(),
                nat_gateway_ip: "88.88.88.88".to_string(),
                sql_server_cert: "SQL CA".to_string(),
                ..Default::default()
            }),
        }
    }

    fn harness(setup: Setup) -> Harness {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::new(MemoryStore {
            log: log.clone(),
            config: Mutex::new(setup.stored),
            assets: Mutex::new(BTreeMap::new()),
        });
        let deps = Collaborators {
            provider: Arc::new(FakeProvider {
                log: log.clone(),
                iaas: setup.iaas,
            }),
            provisioner: Arc::new(FakeProvisioner {
                log: log.clone(),
                outputs: setup.outputs.unwrap_or_else(|| outputs(setup.iaas)),
                fail_apply: setup.fail_apply,
            }),
            director: Arc::new(FakeDirectorFactory {
                log: log.clone(),
                fail: setup.fail_director,
            }),
            pipeline: Arc::new(FakePipeline { log: log.clone() }),
            certs: Arc::new(FakeCerts { log: log.clone() }),
            store: store.clone(),
            ip_resolver: Arc::new(FixedIp(setup.operator_ip.to_string())),
            secrets: Arc::new(FixedSecrets),
        };
        Harness {
            log,
            store,
            orchestrator: DeploymentOrchestrator::new(deps, setup.acme, "0.3.0"),
        }
    }

    /// A deployment as a previous successful deploy would have left it
    async fn deployed(iaas: IaasKind) -> DeploymentConfig {
        let h = harness(Setup {
            iaas,
            ..Default::default()
        });
        h.orchestrator
            .deploy("foo", &DeploymentArguments::for_iaas(iaas.name()))
            .await
            .unwrap();
        h.stored().unwrap()
    }

    #[tokio::test]
    async fn test_fresh_gcp_deploy_runs_every_step_in_order() {
        let h = harness(Setup::default());
        let summary = h
            .orchestrator
            .deploy("foo", &DeploymentArguments::for_iaas("GCP"))
            .await
            .unwrap();

        assert_eq!(
            h.actions(),
            vec![
                "loading config file",
                "applying terraform",
                "reading terraform outputs",
                "issuing certificate for 99.99.99.99 (acme: false)",
                "issuing certificate for 77.77.77.77 (acme: false)",
                "building director (stored creds: false)",
                "deploying director (prior state: false, detach: false)",
                "cleaning up director",
                "storing config asset: director-state.json",
                "storing config asset: director-creds.yml",
                "updating config file",
                "checking access for 192.0.2.10 in spire-foo-director",
                "setting default pipeline (allow mismatch: false)",
            ]
        );
        assert_eq!(summary.url, "https://77.77.77.77");
        assert_eq!(summary.username, "admin");
        assert!(!summary.self_update);
    }

    #[tokio::test]
    async fn test_fresh_deploy_persists_reconciled_config() {
        let config = deployed(IaasKind::Gcp).await;
        assert_eq!(config.deployment, "spire-foo");
        assert_eq!(config.region, "europe-west1");
        assert_eq!(config.availability_zone, "europe-west1-b");
        assert_eq!(config.project, "happymeal");
        assert_eq!(config.network.public_cidr, "10.0.0.0/24");
        assert_eq!(config.access.source_access_ip, "192.0.2.10");
        assert_eq!(config.tls.domain, "77.77.77.77");
        assert_eq!(config.tls.director_public_ip, "99.99.99.99");
        assert_eq!(config.tls.db_ca_cert, "SQL CA");
        assert_eq!(config.tls.director_cert, "CERT 99.99.99.99");
        assert_eq!(config.secrets.credhub_password, "credhub-pass");
        assert_eq!(config.secrets.credhub_ca_cert, "CREDHUB CA");
        assert_eq!(config.version, "0.3.0");
        assert!(config.tags.contains(&"spire-version=0.3.0".to_string()));
    }

    #[tokio::test]
    async fn test_redeploy_reuses_certs_and_stored_assets() {
        let stored = deployed(IaasKind::Gcp).await;
        let h = harness(Setup {
            stored: Some(stored.clone()),
            ..Default::default()
        });
        h.store.assets.lock().unwrap().insert(DIRECTOR_STATE_ASSET.to_string(), b"{}".to_vec());
        h.store
            .assets
            .lock()
            .unwrap()
            .insert(DIRECTOR_CREDS_ASSET.to_string(), CREDS_YAML.to_vec());

        h.orchestrator
            .deploy("foo", &DeploymentArguments::default())
            .await
            .unwrap();

        let actions = h.actions();
        assert!(!actions.iter().any(|a| a.starts_with("issuing certificate")));
        assert!(actions.contains(&"building director (stored creds: true)".to_string()));
        assert!(actions.contains(&"deploying director (prior state: true, detach: false)".to_string()));
        assert_eq!(h.stored().unwrap().secrets, stored.secrets);
    }

    #[tokio::test]
    async fn test_redeploy_with_new_domain_reissues_concourse_cert() {
        let stored = deployed(IaasKind::Gcp).await;
        let h = harness(Setup {
            stored: Some(stored),
            ..Default::default()
        });
        let args = DeploymentArguments {
            domain: Some("ci.example.com".to_string()),
            ..Default::default()
        };
        h.orchestrator.deploy("foo", &args).await.unwrap();

        let actions = h.actions();
        assert!(actions.contains(&"issuing certificate for ci.example.com (acme: false)".to_string()));
        assert!(!actions.contains(&"issuing certificate for 99.99.99.99 (acme: false)".to_string()));
        let config = h.stored().unwrap();
        assert_eq!(config.tls.domain, "ci.example.com");
        assert_eq!(config.tls.concourse_cert, "CERT ci.example.com");
    }

    #[tokio::test]
    async fn test_redeploy_with_moved_director_reissues_director_cert() {
        let mut stored = deployed(IaasKind::Gcp).await;
        stored.tls.director_public_ip = "11.11.11.11".to_string();
        let h = harness(Setup {
            stored: Some(stored),
            ..Default::default()
        });
        h.orchestrator
            .deploy("foo", &DeploymentArguments::default())
            .await
            .unwrap();

        let actions = h.actions();
        assert!(actions.contains(&"issuing certificate for 99.99.99.99 (acme: false)".to_string()));
        assert!(!actions.contains(&"issuing certificate for 77.77.77.77 (acme: false)".to_string()));
        assert_eq!(h.stored().unwrap().tls.director_cert, "CERT 99.99.99.99");
    }

    #[tokio::test]
    async fn test_custom_domain_with_acme_configured_requests_acme() {
        let h = harness(Setup {
            acme: Some(AcmeAccount {
                server_url: "https://acme.example.com/directory".to_string(),
                email: "ops@example.com".to_string(),
            }),
            ..Default::default()
        });
        let args = DeploymentArguments {
            domain: Some("ci.example.com".to_string()),
            ..DeploymentArguments::for_iaas("GCP")
        };
        let summary = h.orchestrator.deploy("foo", &args).await.unwrap();

        assert!(h
            .actions()
            .contains(&"issuing certificate for ci.example.com (acme: true)".to_string()));
        assert!(h
            .actions()
            .contains(&"issuing certificate for 99.99.99.99 (acme: false)".to_string()));
        assert_eq!(summary.url, "https://ci.example.com");
    }

    #[tokio::test]
    async fn test_user_provided_cert_is_not_reissued() {
        let h = harness(Setup::default());
        let args = DeploymentArguments {
            domain: Some("ci.example.com".to_string()),
            tls_cert: Some("USER CERT".to_string()),
            tls_key: Some("USER KEY".to_string()),
            ..DeploymentArguments::for_iaas("GCP")
        };
        h.orchestrator.deploy("foo", &args).await.unwrap();

        assert!(!h.actions().iter().any(|a| a.contains("ci.example.com")));
        let config = h.stored().unwrap();
        assert_eq!(config.tls.concourse_cert, "USER CERT");
        assert!(config.tls.concourse_user_provided_cert);
    }

    #[tokio::test]
    async fn test_validation_failure_touches_no_cloud_resource() {
        let h = harness(Setup::default());
        let args = DeploymentArguments {
            public_cidr: Some("10.0.0.0/29".to_string()),
            private_cidr: Some("10.0.1.0/24".to_string()),
            ..DeploymentArguments::for_iaas("GCP")
        };
        let err = h.orchestrator.deploy("foo", &args).await.unwrap_err();

        assert!(matches!(err, SpireError::Validation(_)));
        assert!(err.to_string().contains("public-subnet-range"));
        assert_eq!(h.actions(), vec!["loading config file"]);
        assert!(h.stored().is_none());
    }

    #[tokio::test]
    async fn test_provisioning_failure_persists_nothing() {
        let h = harness(Setup {
            fail_apply: true,
            ..Default::default()
        });
        let err = h
            .orchestrator
            .deploy("foo", &DeploymentArguments::for_iaas("GCP"))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("provisioning: "));
        assert_eq!(h.actions(), vec!["loading config file", "applying terraform"]);
        assert!(h.stored().is_none());
    }

    #[tokio::test]
    async fn test_ip_not_allowed_fails_after_checkpoint() {
        let h = harness(Setup {
            iaas: IaasKind::Aws,
            operator_ip: DENIED_IP,
            ..Default::default()
        });
        let err = h
            .orchestrator
            .deploy("foo", &DeploymentArguments::for_iaas("AWS"))
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("1.2.3.4"), "{}", msg);
        assert!(msg.contains("sg-123"), "{}", msg);
        assert!(matches!(err, SpireError::AccessDenied(_)));

        assert!(h.position("storing config asset: director-state.json") < h.position("checking access for 1.2.3.4 in sg-123"));
        assert!(h.position("updating config file") < h.position("checking access for 1.2.3.4 in sg-123"));
        assert!(h.store.assets.lock().unwrap().contains_key(DIRECTOR_CREDS_ASSET));
        assert!(h.stored().is_some());
        assert!(!h.actions().iter().any(|a| a.starts_with("setting default pipeline")));
    }

    #[tokio::test]
    async fn test_director_failure_still_keeps_partial_state() {
        let h = harness(Setup {
            fail_director: true,
            ..Default::default()
        });
        let err = h
            .orchestrator
            .deploy("foo", &DeploymentArguments::for_iaas("GCP"))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("director: "));
        assert!(h.position("cleaning up director") < h.position("storing config asset: director-state.json"));
        assert!(h.stored().is_none());
    }

    #[tokio::test]
    async fn test_self_update_returns_after_dispatch() {
        let stored = deployed(IaasKind::Gcp).await;
        let h = harness(Setup {
            stored: Some(stored),
            ..Default::default()
        });
        let args = DeploymentArguments {
            self_update: true,
            ..Default::default()
        };
        let summary = h.orchestrator.deploy("foo", &args).await.unwrap();

        assert!(summary.self_update);
        let actions = h.actions();
        assert!(actions.contains(&"deploying director (prior state: false, detach: true)".to_string()));
        assert!(!actions.contains(&"cleaning up director".to_string()));
        assert_eq!(actions.last().map(String::as_str), Some("updating config file"));
    }

    #[tokio::test]
    async fn test_self_update_on_fresh_deployment_rejected() {
        let h = harness(Setup::default());
        let args = DeploymentArguments {
            self_update: true,
            ..DeploymentArguments::for_iaas("GCP")
        };
        let err = h.orchestrator.deploy("foo", &args).await.unwrap_err();
        assert!(matches!(err, SpireError::Validation(_)));
        assert_eq!(h.actions(), vec!["loading config file"]);
    }

    #[tokio::test]
    async fn test_destroy_gcp_deployment() {
        let stored = deployed(IaasKind::Gcp).await;
        let h = harness(Setup {
            stored: Some(stored),
            ..Default::default()
        });
        h.orchestrator.destroy("foo").await.unwrap();

        assert_eq!(
            h.actions(),
            vec![
                "checking to see if config exists",
                "loading config file",
                "deleting vms in zone: europe-west1-b project: happymeal deployment: spire-foo",
                "destroying terraform",
                "deleting config",
            ]
        );
        assert!(h.stored().is_none());
    }

    #[tokio::test]
    async fn test_destroy_aws_deletes_vms_in_vpc() {
        let stored = deployed(IaasKind::Aws).await;
        let h = harness(Setup {
            iaas: IaasKind::Aws,
            stored: Some(stored),
            ..Default::default()
        });
        h.orchestrator.destroy("foo").await.unwrap();
        assert!(h
            .actions()
            .contains(&"deleting vms in region: eu-west-1 vpc: vpc-112233".to_string()));
    }

    #[tokio::test]
    async fn test_destroy_aws_without_vpc_output_deletes_nothing() {
        let stored = deployed(IaasKind::Aws).await;
        let h = harness(Setup {
            iaas: IaasKind::Aws,
            stored: Some(stored),
            outputs: Some(ProvisioningOutputs::Aws(AwsOutputs::default())),
            ..Default::default()
        });
        let err = h.orchestrator.destroy("foo").await.unwrap_err();

        assert!(err.to_string().starts_with("provisioning: "), "{}", err);
        assert!(!h.actions().iter().any(|a| a.starts_with("deleting vms")));
        assert!(!h.actions().contains(&"destroying terraform".to_string()));
        assert!(h.stored().is_some());
    }

    #[tokio::test]
    async fn test_destroy_without_config_makes_no_provider_calls() {
        let h = harness(Setup::default());
        let err = h.orchestrator.destroy("foo").await.unwrap_err();

        assert!(err.to_string().contains("nothing to destroy"));
        assert_eq!(h.actions(), vec!["checking to see if config exists"]);
    }

    #[tokio::test]
    async fn test_fetch_info_checks_access_and_lists_instances() {
        let stored = deployed(IaasKind::Gcp).await;
        let h = harness(Setup {
            stored: Some(stored.clone()),
            operator_ip: "203.0.113.7",
            ..Default::default()
        });
        h.store
            .assets
            .lock()
            .unwrap()
            .insert(DIRECTOR_CREDS_ASSET.to_string(), CREDS_YAML.to_vec());

        let info = h.orchestrator.fetch_info("foo").await.unwrap();

        assert_eq!(
            h.actions(),
            vec![
                "loading config file",
                "reading terraform outputs",
                "checking access for 203.0.113.7 in spire-foo-director",
                "building director (stored creds: true)",
                "listing instances",
            ]
        );
        assert_eq!(info.director.url, "https://99.99.99.99:25555");
        assert_eq!(info.nat_gateway_ip, "88.88.88.88");
        assert_eq!(info.instances.len(), 1);
        assert_eq!(h.stored().unwrap(), stored);
    }

    #[tokio::test]
    async fn test_fetch_info_with_ip_not_allowed() {
        let stored = deployed(IaasKind::Aws).await;
        let h = harness(Setup {
            iaas: IaasKind::Aws,
            stored: Some(stored),
            operator_ip: DENIED_IP,
            ..Default::default()
        });
        let err = h.orchestrator.fetch_info("foo").await.unwrap_err();

        assert!(err.to_string().contains("Do you need to add your IP 1.2.3.4 to the sg-123"));
        assert!(!h.actions().iter().any(|a| a == "listing instances"));
    }

    #[tokio::test]
    async fn test_fetch_info_without_config() {
        let h = harness(Setup::default());
        let err = h.orchestrator.fetch_info("foo").await.unwrap_err();
        assert!(matches!(err, SpireError::NotDeployed(_)));
    }
}
