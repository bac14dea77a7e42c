//! CLI definitions for spire
//!
//! This module contains all CLI argument parsing structures using clap.
//! Every deploy flag has an equivalently named environment variable.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::args::DeploymentArguments;

#[derive(Parser)]
#[command(
    name = "spire",
    version,
    about = "Deploys and manages a CI stack on AWS or GCP",
    long_about = "Provisions the network, a director and a CI deployment on AWS or GCP,\nthen keeps them up to date on every re-deploy."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Tool config file (defaults to <state-dir>/spire.yaml)
    #[arg(long, global = true, env = "SPIRE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding deployment state
    #[arg(long, global = true, env = "SPIRE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create or update a deployment
    Deploy(DeployArgs),

    /// Tear down a deployment and everything it created
    Destroy(TargetArgs),

    /// Show URLs, credentials and instances of a deployment
    Info {
        #[command(flatten)]
        target: TargetArgs,

        /// Print as JSON
        #[arg(long, conflicts_with = "env")]
        json: bool,

        /// Print shell exports for the director and credhub CLIs
        #[arg(long)]
        env: bool,
    },
}

/// Selects an existing deployment
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Deployment name
    pub name: String,

    /// IAAS the deployment lives on (AWS or GCP)
    #[arg(long, env = "IAAS")]
    pub iaas: Option<String>,

    /// Region the deployment lives in
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DeployArgs {
    /// Deployment name
    pub name: String,

    /// IAAS to deploy to (AWS or GCP)
    #[arg(long, env = "IAAS")]
    pub iaas: Option<String>,

    /// Region to deploy into
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Availability zone; the region is inferred from it when not set
    #[arg(long, env = "ZONE")]
    pub zone: Option<String>,

    /// Namespace used to tell deployments apart in shared accounts
    #[arg(long, env = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Domain for the CI web UI (defaults to its public IP)
    #[arg(long, env = "DOMAIN")]
    pub domain: Option<String>,

    /// TLS certificate for the domain
    #[arg(long, env = "TLS_CERT")]
    pub tls_cert: Option<String>,

    /// TLS private key for the domain
    #[arg(long, env = "TLS_KEY")]
    pub tls_key: Option<String>,

    /// Number of workers
    #[arg(long = "workers", env = "WORKERS")]
    pub worker_count: Option<u32>,

    /// Worker size: medium, large, xlarge, 2xlarge, 4xlarge, 12xlarge or 24xlarge
    #[arg(long, env = "WORKER_SIZE")]
    pub worker_size: Option<String>,

    /// AWS worker instance family: m4, m5 or m5a
    #[arg(long, env = "WORKER_TYPE")]
    pub worker_type: Option<String>,

    /// Web node size: small, medium, large, xlarge or 2xlarge
    #[arg(long, env = "WEB_SIZE")]
    pub web_size: Option<String>,

    /// Database size
    #[arg(long, env = "DB_SIZE")]
    pub db_size: Option<String>,

    /// Use spot instances for workers (AWS)
    #[arg(long, env = "SPOT", num_args = 0..=1, default_missing_value = "true")]
    pub spot: Option<bool>,

    /// Use preemptible instances for workers (GCP)
    #[arg(long, env = "PREEMPTIBLE", num_args = 0..=1, default_missing_value = "true")]
    pub preemptible: Option<bool>,

    /// Enable global resources in the CI
    #[arg(long, env = "ENABLE_GLOBAL_RESOURCES", num_args = 0..=1, default_missing_value = "true")]
    pub enable_global_resources: Option<bool>,

    /// Enable pipeline instances in the CI
    #[arg(long, env = "ENABLE_PIPELINE_INSTANCES", num_args = 0..=1, default_missing_value = "true")]
    pub enable_pipeline_instances: Option<bool>,

    /// Metrics retention period
    #[arg(long = "influxdb-retention-period", env = "INFLUXDB_RETENTION_PERIOD")]
    pub influxdb_retention: Option<String>,

    /// Comma-separated IPs or CIDRs allowed to reach the web UI and director
    #[arg(long, env = "ALLOW_IPS")]
    pub allow_ips: Option<String>,

    #[arg(long, env = "GITHUB_AUTH_CLIENT_ID")]
    pub github_auth_client_id: Option<String>,

    #[arg(long, env = "GITHUB_AUTH_CLIENT_SECRET")]
    pub github_auth_client_secret: Option<String>,

    #[arg(long, env = "BITBUCKET_AUTH_CLIENT_ID")]
    pub bitbucket_auth_client_id: Option<String>,

    #[arg(long, env = "BITBUCKET_AUTH_CLIENT_SECRET")]
    pub bitbucket_auth_client_secret: Option<String>,

    #[arg(long, env = "MICROSOFT_AUTH_CLIENT_ID")]
    pub microsoft_auth_client_id: Option<String>,

    #[arg(long, env = "MICROSOFT_AUTH_CLIENT_SECRET")]
    pub microsoft_auth_client_secret: Option<String>,

    #[arg(long, env = "MICROSOFT_AUTH_TENANT")]
    pub microsoft_auth_tenant: Option<String>,

    /// Tag applied to every cloud resource (repeatable)
    #[arg(long = "add-tag", value_name = "KEY=VALUE")]
    pub tags: Vec<String>,

    #[arg(long, env = "VPC_NETWORK_RANGE")]
    pub vpc_network_range: Option<String>,

    #[arg(long, env = "PUBLIC_SUBNET_RANGE")]
    pub public_subnet_range: Option<String>,

    #[arg(long, env = "PRIVATE_SUBNET_RANGE")]
    pub private_subnet_range: Option<String>,

    #[arg(long = "rds-subnet-range1", env = "RDS_SUBNET_RANGE1")]
    pub rds_subnet_range1: Option<String>,

    #[arg(long = "rds-subnet-range2", env = "RDS_SUBNET_RANGE2")]
    pub rds_subnet_range2: Option<String>,

    /// Redeploy from inside the CI itself without waiting for the rollout
    #[arg(long, env = "SELF_UPDATE", hide = true)]
    pub self_update: bool,
}

impl From<DeployArgs> for DeploymentArguments {
    fn from(a: DeployArgs) -> Self {
        Self {
            iaas: a.iaas,
            region: a.region,
            zone: a.zone,
            namespace: a.namespace,
            domain: a.domain,
            tls_cert: a.tls_cert,
            tls_key: a.tls_key,
            worker_count: a.worker_count,
            worker_size: a.worker_size,
            worker_type: a.worker_type,
            web_size: a.web_size,
            db_size: a.db_size,
            spot: a.spot.or(a.preemptible),
            enable_global_resources: a.enable_global_resources,
            enable_pipeline_instances: a.enable_pipeline_instances,
            influxdb_retention: a.influxdb_retention,
            allow_ips: a.allow_ips,
            github_client_id: a.github_auth_client_id,
            github_client_secret: a.github_auth_client_secret,
            bitbucket_client_id: a.bitbucket_auth_client_id,
            bitbucket_client_secret: a.bitbucket_auth_client_secret,
            microsoft_client_id: a.microsoft_auth_client_id,
            microsoft_client_secret: a.microsoft_auth_client_secret,
            microsoft_tenant: a.microsoft_auth_tenant,
            tags: (!a.tags.is_empty()).then_some(a.tags),
            network_cidr: a.vpc_network_range,
            public_cidr: a.public_subnet_range,
            private_cidr: a.private_subnet_range,
            rds1_cidr: a.rds_subnet_range1,
            rds2_cidr: a.rds_subnet_range2,
            self_update: a.self_update,
        }
    }
}
