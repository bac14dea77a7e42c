//! Services layer - orchestration logic
//!
//! This module coordinates between domain logic and infrastructure.
//! Services reach infrastructure only through the collaborator traits.

pub mod orchestrator;

// Re-export commonly used types
pub use orchestrator::{Collaborators, DeploymentOrchestrator};
