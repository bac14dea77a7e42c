//! Cloud provider operations
//!
//! Access-list checks, VM cleanup and account attributes, driven through
//! the `aws` and `gcloud` CLIs with JSON output.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::info;

use super::process::run;
use crate::domain::access::ip_in_ranges;
use crate::domain::iaas::IaasKind;

/// Ports the operator must be able to reach on the director
pub const DIRECTOR_PORTS: [u16; 3] = [22, 6868, 25555];

/// VMs to remove before the infrastructure is torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmScope {
    Gcp {
        zone: String,
        project: String,
        deployment: String,
    },
    Aws {
        region: String,
        vpc_id: String,
    },
}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn region(&self) -> &str;
    fn iaas(&self) -> IaasKind;
    /// Whether `ip` may reach the director ports through `scope_id`
    /// (AWS security group id, GCP firewall rule name)
    async fn check_ip_in_access_list(&self, ip: &str, scope_id: &str) -> Result<bool>;
    async fn delete_vms_in_scope(&self, scope: &VmScope) -> Result<()>;
    /// Account attribute such as `project`
    async fn attribute(&self, name: &str) -> Result<String>;
}

pub struct CliCloudProvider {
    iaas: IaasKind,
    region: String,
    aws: String,
    gcloud: String,
}

impl CliCloudProvider {
    pub fn new(iaas: IaasKind, region: impl Into<String>, aws: impl Into<String>, gcloud: impl Into<String>) -> Self {
        Self {
            iaas,
            region: region.into(),
            aws: aws.into(),
            gcloud: gcloud.into(),
        }
    }

    async fn aws_json<T: for<'de> Deserialize<'de>>(&self, args: &[&str], what: &str) -> Result<T> {
        let out = run(
            Command::new(&self.aws)
                .args(args)
                .args(["--region", self.region.as_str(), "--output", "json"]),
            what,
        )
        .await?;
        serde_json::from_str(&out).with_context(|| format!("Failed to parse {} output", what))
    }

    async fn gcloud_json<T: for<'de> Deserialize<'de>>(&self, args: &[&str], what: &str) -> Result<T> {
        let out = run(Command::new(&self.gcloud).args(args).arg("--format=json"), what).await?;
        serde_json::from_str(&out).with_context(|| format!("Failed to parse {} output", what))
    }

    async fn aws_security_group_allows(&self, ip: &str, group_id: &str) -> Result<bool> {
        let groups: SecurityGroups = self
            .aws_json(
                &["ec2", "describe-security-groups", "--group-ids", group_id],
                "aws ec2 describe-security-groups",
            )
            .await?;
        let group = groups
            .security_groups
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("security group {} not found", group_id))?;
        Ok(group.allows(ip, &DIRECTOR_PORTS))
    }

    async fn gcp_firewall_allows(&self, ip: &str, rule: &str) -> Result<bool> {
        let project = self.attribute("project").await?;
        let firewall: FirewallRule = self
            .gcloud_json(
                &["compute", "firewall-rules", "describe", rule, "--project", project.as_str()],
                "gcloud compute firewall-rules describe",
            )
            .await?;
        Ok(ip_in_ranges(ip, firewall.source_ranges.iter().map(String::as_str)))
    }
}

#[async_trait]
impl CloudProvider for CliCloudProvider {
    fn region(&self) -> &str {
        &self.region
    }

    fn iaas(&self) -> IaasKind {
        self.iaas
    }

    async fn check_ip_in_access_list(&self, ip: &str, scope_id: &str) -> Result<bool> {
        match self.iaas {
            IaasKind::Aws => self.aws_security_group_allows(ip, scope_id).await,
            IaasKind::Gcp => self.gcp_firewall_allows(ip, scope_id).await,
        }
    }

    async fn delete_vms_in_scope(&self, scope: &VmScope) -> Result<()> {
        match scope {
            VmScope::Aws { region, vpc_id } => {
                let filter = format!("Name=vpc-id,Values={}", vpc_id);
                let out = run(
                    Command::new(&self.aws).args([
                        "ec2",
                        "describe-instances",
                        "--region",
                        region.as_str(),
                        "--filters",
                        filter.as_str(),
                        "Name=instance-state-name,Values=pending,running,stopping,stopped",
                        "--query",
                        "Reservations[].Instances[].InstanceId",
                        "--output",
                        "json",
                    ]),
                    "aws ec2 describe-instances",
                )
                .await?;
                let ids: Vec<String> = serde_json::from_str(&out).context("Failed to parse instance ids")?;
                if ids.is_empty() {
                    info!(vpc_id = %vpc_id, "No VMs to delete");
                    return Ok(());
                }
                info!(vpc_id = %vpc_id, count = ids.len(), "Terminating VMs");
                run(
                    Command::new(&self.aws)
                        .args(["ec2", "terminate-instances", "--region", region.as_str(), "--instance-ids"])
                        .args(&ids),
                    "aws ec2 terminate-instances",
                )
                .await?;
                run(
                    Command::new(&self.aws)
                        .args(["ec2", "wait", "instance-terminated", "--region", region.as_str(), "--instance-ids"])
                        .args(&ids),
                    "aws ec2 wait instance-terminated",
                )
                .await?;
            }
            VmScope::Gcp {
                zone,
                project,
                deployment,
            } => {
                let filter = format!("labels.director={}", deployment);
                let names: Vec<GcpInstance> = self
                    .gcloud_json(
                        &[
                            "compute",
                            "instances",
                            "list",
                            "--project",
                            project.as_str(),
                            "--zones",
                            zone.as_str(),
                            "--filter",
                            filter.as_str(),
                        ],
                        "gcloud compute instances list",
                    )
                    .await?;
                if names.is_empty() {
                    info!(deployment = %deployment, "No VMs to delete");
                    return Ok(());
                }
                info!(deployment = %deployment, count = names.len(), "Deleting VMs");
                run(
                    Command::new(&self.gcloud)
                        .args(["compute", "instances", "delete", "--quiet", "--project", project.as_str(), "--zone", zone.as_str()])
                        .args(names.iter().map(|i| i.name.as_str())),
                    "gcloud compute instances delete",
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn attribute(&self, name: &str) -> Result<String> {
        match (self.iaas, name) {
            (IaasKind::Gcp, "project") => {
                if let Ok(project) = std::env::var("CLOUDSDK_CORE_PROJECT") {
                    if !project.is_empty() {
                        return Ok(project);
                    }
                }
                let out = run(
                    Command::new(&self.gcloud).args(["config", "get-value", "project"]),
                    "gcloud config get-value project",
                )
                .await?;
                let project = out.trim().to_string();
                if project.is_empty() {
                    bail!("no GCP project configured; set CLOUDSDK_CORE_PROJECT or run `gcloud config set project`");
                }
                Ok(project)
            }
            (iaas, attr) => bail!("attribute `{}` is not available on {}", attr, iaas),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroups {
    security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroup {
    #[serde(default)]
    ip_permissions: Vec<IpPermission>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IpPermission {
    #[serde(default)]
    from_port: Option<i64>,
    #[serde(default)]
    to_port: Option<i64>,
    #[serde(default)]
    ip_ranges: Vec<IpRange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IpRange {
    cidr_ip: String,
}

impl IpPermission {
    /// A rule without ports (protocol -1) covers every port
    fn covers(&self, port: u16) -> bool {
        match (self.from_port, self.to_port) {
            (Some(from), Some(to)) if from >= 0 => (from..=to).contains(&i64::from(port)),
            _ => true,
        }
    }
}

impl SecurityGroup {
    fn allows(&self, ip: &str, ports: &[u16]) -> bool {
        ports.iter().all(|port| {
            self.ip_permissions
                .iter()
                .filter(|p| p.covers(*port))
                .any(|p| ip_in_ranges(ip, p.ip_ranges.iter().map(|r| r.cidr_ip.as_str())))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirewallRule {
    #[serde(default)]
    source_ranges: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GcpInstance {
    name: String,
}
