//! Topology Planner
//!
//! Turns validated settings into ordered lists of steps. Planning is pure:
//! nothing here talks to the cluster, so plans can be inspected and tested
//! without a backend.

use crate::controlplane::manifests::ManifestBuilder;
use crate::controlplane::naming::ResourceNames;
use crate::controlplane::orchestrator::OrchestratorConfig;
use crate::domain::ports::{Resource, ResourceKind};
use crate::domain::settings::Settings;

// =============================================================================
// Steps
// =============================================================================

/// What a single step does to the cluster
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// Create one object
    Create(Resource),
    /// Delete one object by name
    Delete { kind: ResourceKind, name: String },
    /// Delete every object of a kind carrying the membership label
    DeleteAll { kind: ResourceKind },
}

/// One backend-facing unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Namespace the step targets (the namespace itself for namespace steps)
    pub namespace: String,
    pub action: StepAction,
    /// Topology unit the step belongs to, `None` for shared objects
    pub unit: Option<u32>,
}

impl Step {
    fn create(namespace: &str, resource: Resource, unit: Option<u32>) -> Self {
        Self {
            namespace: namespace.to_string(),
            action: StepAction::Create(resource),
            unit,
        }
    }

    fn delete(namespace: &str, kind: ResourceKind, name: String, unit: Option<u32>) -> Self {
        Self {
            namespace: namespace.to_string(),
            action: StepAction::Delete { kind, name },
            unit,
        }
    }

    fn delete_all(namespace: &str, kind: ResourceKind) -> Self {
        Self {
            namespace: namespace.to_string(),
            action: StepAction::DeleteAll { kind },
            unit: None,
        }
    }

    /// Kind of object the step touches
    pub fn kind(&self) -> ResourceKind {
        match &self.action {
            StepAction::Create(resource) => resource.kind(),
            StepAction::Delete { kind, .. } | StepAction::DeleteAll { kind } => *kind,
        }
    }

    /// Name of the object, `None` for bulk deletes
    pub fn resource_name(&self) -> Option<&str> {
        match &self.action {
            StepAction::Create(resource) => Some(resource.name()),
            StepAction::Delete { name, .. } => Some(name),
            StepAction::DeleteAll { .. } => None,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self.action, StepAction::Create(_))
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.action {
            StepAction::Create(resource) => {
                write!(f, "create {} {}", resource.kind(), resource.name())
            }
            StepAction::Delete { kind, name } => write!(f, "delete {} {}", kind, name),
            StepAction::DeleteAll { kind } => {
                write!(f, "delete all {} in {}", kind.plural(), self.namespace)
            }
        }
    }
}

/// Direction of a rescale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDirection {
    Up,
    Down,
}

/// Steps of one unit during a rescale
#[derive(Debug, Clone, PartialEq)]
pub struct UnitPlan {
    pub unit: u32,
    pub steps: Vec<Step>,
}

/// Rescale plan grouped by unit, in execution order
#[derive(Debug, Clone, PartialEq)]
pub struct ScalePlan {
    pub current: u32,
    pub requested: u32,
    pub units: Vec<UnitPlan>,
}

impl ScalePlan {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn direction(&self) -> Option<ScaleDirection> {
        match self.requested.cmp(&self.current) {
            std::cmp::Ordering::Greater => Some(ScaleDirection::Up),
            std::cmp::Ordering::Less => Some(ScaleDirection::Down),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Indices of the units added or removed
    pub fn unit_indices(&self) -> Vec<u32> {
        self.units.iter().map(|u| u.unit).collect()
    }

    /// All steps flattened in execution order
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.units.iter().flat_map(|u| u.steps.iter())
    }
}

// =============================================================================
// Planner
// =============================================================================

/// Computes creation, scale and removal plans
pub struct TopologyPlanner<'a> {
    names: ResourceNames,
    config: &'a OrchestratorConfig,
}

impl<'a> TopologyPlanner<'a> {
    pub fn new(config: &'a OrchestratorConfig) -> Self {
        Self {
            names: config.names(),
            config,
        }
    }

    pub fn names(&self) -> &ResourceNames {
        &self.names
    }

    fn builder(&self) -> ManifestBuilder<'_> {
        ManifestBuilder::new(self.config, &self.names)
    }

    /// Number of PVCs a topology uses
    pub fn pvc_count(settings: &Settings) -> u32 {
        if settings.pvc_shared {
            1
        } else {
            settings.pod_count
        }
    }

    /// Full creation plan in its fixed order
    pub fn plan_create(&self, settings: &Settings) -> Vec<Step> {
        let ns = settings.namespace.as_str();
        let builder = self.builder();
        let mut steps = Vec::with_capacity(
            (5 + Self::pvc_count(settings) + 3 * settings.pod_count) as usize,
        );

        steps.push(Step::create(ns, Resource::Namespace(builder.namespace(settings)), None));
        steps.push(Step::create(
            ns,
            Resource::ServiceAccount(builder.service_account(ns)),
            None,
        ));
        steps.push(Step::create(ns, Resource::RoleBinding(builder.role_binding(ns)), None));

        if settings.pvc_shared {
            steps.push(Step::create(
                ns,
                Resource::PersistentVolumeClaim(builder.pvc(self.names.shared_pvc(), settings)),
                None,
            ));
        } else {
            for unit in 0..settings.pod_count {
                steps.push(Step::create(
                    ns,
                    Resource::PersistentVolumeClaim(builder.pvc(self.names.unit_pvc(unit), settings)),
                    Some(unit),
                ));
            }
        }

        steps.push(Step::create(
            ns,
            Resource::ConfigMap(builder.config_map(settings, settings.action_or_create())),
            None,
        ));
        steps.push(Step::create(ns, Resource::Secret(builder.pull_secret(ns)), None));

        for unit in 0..settings.pod_count {
            steps.extend(self.unit_workload(unit, settings));
        }

        steps
    }

    fn unit_workload(&self, unit: u32, settings: &Settings) -> Vec<Step> {
        let ns = settings.namespace.as_str();
        let builder = self.builder();
        vec![
            Step::create(ns, Resource::Deployment(builder.deployment(unit, settings)), Some(unit)),
            Step::create(ns, Resource::Service(builder.service(unit, ns)), Some(unit)),
            Step::create(ns, Resource::Route(builder.route(unit, ns)), Some(unit)),
        ]
    }

    /// Plan to move from `current` units to `requested` units
    ///
    /// Units are always added or removed at the tail. An equal count yields an
    /// empty plan.
    pub fn plan_scale(&self, current: u32, requested: u32, settings: &Settings) -> ScalePlan {
        let ns = settings.namespace.as_str();
        let mut units = Vec::new();

        if requested > current {
            let builder = self.builder();
            for unit in current..requested {
                let mut steps = Vec::with_capacity(4);
                if !settings.pvc_shared {
                    steps.push(Step::create(
                        ns,
                        Resource::PersistentVolumeClaim(
                            builder.pvc(self.names.unit_pvc(unit), settings),
                        ),
                        Some(unit),
                    ));
                }
                steps.extend(self.unit_workload(unit, settings));
                units.push(UnitPlan { unit, steps });
            }
        } else if requested < current {
            for unit in requested..current {
                let mut steps = vec![
                    Step::delete(ns, ResourceKind::Route, self.names.route(unit), Some(unit)),
                    Step::delete(ns, ResourceKind::Service, self.names.service(unit), Some(unit)),
                    Step::delete(
                        ns,
                        ResourceKind::Deployment,
                        self.names.deployment(unit),
                        Some(unit),
                    ),
                ];
                if !settings.pvc_shared {
                    steps.push(Step::delete(
                        ns,
                        ResourceKind::PersistentVolumeClaim,
                        self.names.unit_pvc(unit),
                        Some(unit),
                    ));
                }
                units.push(UnitPlan { unit, steps });
            }
        }

        ScalePlan {
            current,
            requested,
            units,
        }
    }

    /// Removal plan, one step per resource group, namespace last
    pub fn plan_remove(&self, namespace: &str) -> Vec<Step> {
        vec![
            Step::delete_all(namespace, ResourceKind::Route),
            Step::delete_all(namespace, ResourceKind::Service),
            Step::delete_all(namespace, ResourceKind::Deployment),
            Step::delete(namespace, ResourceKind::ConfigMap, self.names.config_map(), None),
            Step::delete(
                namespace,
                ResourceKind::Secret,
                self.names.pull_secret().to_string(),
                None,
            ),
            Step::delete_all(namespace, ResourceKind::PersistentVolumeClaim),
            Step::delete(namespace, ResourceKind::RoleBinding, self.names.role_binding(), None),
            Step::delete(
                namespace,
                ResourceKind::ServiceAccount,
                self.names.service_account(),
                None,
            ),
            Step::delete(namespace, ResourceKind::Namespace, namespace.to_string(), None),
        ]
    }
}
