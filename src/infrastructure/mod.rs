//! Infrastructure layer - external I/O adapters
//!
//! This module contains all code that interacts with external systems:
//! - Cloud provider APIs (aws / gcloud CLIs)
//! - Terraform
//! - The director (bosh) and the pipeline runner (fly)
//! - Certificate issuance (openssl, lego)
//! - The persisted config store

pub mod certs;
pub mod director;
pub mod operator_ip;
pub mod pipeline;
pub mod process;
pub mod provider;
pub mod secrets;
pub mod store;
pub mod terraform;

// Re-export commonly used types
pub use certs::{AcmeAccount, CertRequest, CertificateIssuer, IssuedCert, OpensslIssuer};
pub use director::{BoshFactory, CredhubValues, DeployAttempt, Director, DirectorArtifacts, DirectorFactory};
pub use operator_ip::{HttpIpResolver, IpResolver};
pub use pipeline::{FlyClient, PipelineRunner};
pub use provider::{CliCloudProvider, CloudProvider, VmScope};
pub use secrets::{generate_secrets, RandomSecrets, SecretGenerator};
pub use store::{ConfigStore, FileConfigStore, DIRECTOR_CREDS_ASSET, DIRECTOR_STATE_ASSET};
pub use terraform::{InfraProvisioner, TerraformClient};
