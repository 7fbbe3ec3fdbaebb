//! OcpAppSim - Application Simulator Orchestration
//!
//! Provisions, scales, inspects and tears down application simulator
//! workloads on OpenShift. One simulation lives in its own namespace and is
//! made of shared objects plus one unit (Deployment, Service, Route and an
//! optional dedicated PVC) per deployment index.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          Lifecycle Orchestrator                              │
//! │              create / modify / rescale / remove / inventory                  │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │    Topology     │  │    Ownership    │  │        Step Runner          │  │
//! │  │    Planner      │  │      Guard      │  │  StopOnFirstFailure /       │  │
//! │  │                 │  │                 │  │  ContinueAndCount           │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────┬───────────────┘  │
//! │           │                    │                         │                   │
//! │           └────────────────────┼─────────────────────────┘                   │
//! │                                │                                             │
//! │                    ┌───────────┴───────────┐                                │
//! │                    │   ResourceBackend     │                                │
//! │                    │        (port)         │                                │
//! │                    └───────────────────────┘                                │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                           Backend Adapters                                   │
//! │  ┌─────────────────────────────┐  ┌─────────────────────────────────────┐   │
//! │  │   Cluster (kube-rs)         │  │   In-memory cluster                 │   │
//! │  └─────────────────────────────┘  └─────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Orchestrator, planner, guard, runner and backends
//! - [`crd`]: OpenShift Route resource
//! - [`domain`]: Settings and the resource backend port
//! - [`error`]: Error types and handling

pub mod controlplane;
pub mod crd;
pub mod domain;
pub mod error;

// Re-export commonly used types
pub use controlplane::{
    BackendConfig, BackendFactory, InMemoryBackend, KubeBackend, KubeBackendConfig,
    Orchestrator, OrchestratorConfig, InventoryScope, DeploymentSummary,
    CreateReport, ModifyReport, RemoveReport, RenewReport, RescaleOutcome,
    FailurePolicy, TopologyPlanner,
};

pub use crd::{Route, RouteSpec, RouteStatus};

pub use domain::ports::{Resource, ResourceBackend, ResourceBackendRef, ResourceKind, Operation};
pub use domain::settings::{
    AccessMode, RawSettings, SessionContext, Settings, SimulatorAction, SimulatorTuning, Tunable,
};

pub use error::{ChangedSetting, Error, Result, Warning};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
