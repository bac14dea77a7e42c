//! Domain layer - pure business logic
//!
//! This module contains business logic with no external I/O.
//! Types and functions here can be unit tested without mocking.

pub mod access;
pub mod args;
pub mod config;
pub mod deploy;
pub mod iaas;
pub mod input_vars;
pub mod network;
pub mod outputs;
pub mod reconcile;
pub mod region;

// Re-export commonly used types
pub use args::DeploymentArguments;
pub use config::{DeploymentConfig, Secrets};
pub use deploy::{DeployStep, DeploySummary, DeploymentInfo, DeploymentState, Instance, StepResult};
pub use iaas::IaasKind;
pub use input_vars::InputVars;
pub use outputs::ProvisioningOutputs;
pub use reconcile::{reconcile, Baseline, ReconcileEnv, Reconciled};
