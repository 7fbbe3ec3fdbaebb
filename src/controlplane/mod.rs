//! Control Plane Module
//!
//! Plans, authorizes and executes the lifecycle workflows of simulator
//! topologies against a resource backend.

pub mod backends;
pub mod guard;
pub mod inventory;
pub mod manifests;
pub mod naming;
pub mod orchestrator;
pub mod planner;
pub mod runner;

pub use backends::{BackendConfig, BackendFactory, InMemoryBackend, KubeBackend, KubeBackendConfig};
pub use guard::{ManagedNamespace, OwnershipGuard};
pub use inventory::{DeploymentSummary, InventoryScope, PodCounts, SimulatorStatus};
pub use naming::ResourceNames;
pub use orchestrator::*;
pub use planner::{ScalePlan, Step, StepAction, TopologyPlanner};
pub use runner::{FailurePolicy, RunReport, StepRunner};
