//! Lifecycle Orchestrator
//!
//! Drives the create, modify, rescale and remove workflows:
//! - Planning through the topology planner
//! - Authorization through the ownership guard
//! - Execution through the step runner against an injected backend
//!
//! The orchestrator holds configuration only. Every workflow receives the
//! backend as an argument and keeps no state between invocations, so
//! re-running a workflow is the recovery path after a failure.

use crate::controlplane::guard::{ManagedNamespace, OwnershipGuard};
use crate::controlplane::inventory::{DeploymentSummary, InventoryReporter, InventoryScope};
use crate::controlplane::manifests::ManifestBuilder;
use crate::controlplane::naming::ResourceNames;
use crate::controlplane::planner::TopologyPlanner;
use crate::controlplane::runner::{FailurePolicy, StepRunner};
use crate::domain::ports::{Resource, ResourceBackend, ResourceKind};
use crate::domain::settings::{Settings, SimulatorAction};
use crate::error::{ChangedSetting, Error, Result, Warning};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// =============================================================================
// Orchestrator Configuration
// =============================================================================

/// System-wide settings shared by every workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Application name; drives object names and the membership label
    pub app_name: String,
    /// Image used when the settings do not name one
    pub default_container_image: String,
    /// Name of the registry pull secret
    pub pull_secret_name: String,
    /// Docker config JSON stored in the pull secret
    pub pull_secret_config: String,
    /// Cluster role granting the elevated security context constraint
    pub scc_cluster_role: String,
    pub container_name: String,
    pub container_port: i32,
    /// Where the PVC is mounted in the simulator container
    pub data_mount_path: String,
    /// Where the ConfigMap is mounted in the simulator container
    pub config_mount_path: String,
    /// Path of the simulator log, served by the container
    pub log_path: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            app_name: "ocpappsim".to_string(),
            default_container_image: "quay.io/ibm-ocp-appsim/ocpappsim:latest".to_string(),
            pull_secret_name: "regcred".to_string(),
            pull_secret_config: r#"{"auths":{}}"#.to_string(),
            scc_cluster_role: "system:openshift:scc:anyuid".to_string(),
            container_name: "ocpappsim-container".to_string(),
            container_port: 80,
            data_mount_path: "/srv".to_string(),
            config_mount_path: "/etc/config".to_string(),
            log_path: "/appsim.log".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Name generator for this application
    pub fn names(&self) -> ResourceNames {
        ResourceNames::new(&self.app_name, &self.pull_secret_name)
    }

    /// Label selector matching every object of the application
    pub fn membership_selector(&self) -> String {
        format!("app={}", self.app_name)
    }
}

// =============================================================================
// Workflow Reports
// =============================================================================

/// Result of a successful create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReport {
    pub namespace: String,
    pub steps: usize,
    pub units: u32,
}

/// Result of a rescale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescaleOutcome {
    AlreadyAtScale { units: u32 },
    ScaledUp { from: u32, to: u32 },
    ScaledDown { from: u32, to: u32 },
}

impl std::fmt::Display for RescaleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RescaleOutcome::AlreadyAtScale { units } => {
                write!(f, "already at desired scale ({} deployments)", units)
            }
            RescaleOutcome::ScaledUp { from, to } => {
                write!(f, "scaled up from {} to {} deployments", from, to)
            }
            RescaleOutcome::ScaledDown { from, to } => {
                write!(f, "scaled down from {} to {} deployments", from, to)
            }
        }
    }
}

/// Result of a successful modify
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyReport {
    pub namespace: String,
    pub action: SimulatorAction,
    pub warnings: Vec<Warning>,
    pub rescale: RescaleOutcome,
}

/// Result of a remove; completes even when some deletions failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveReport {
    pub namespace: String,
    pub owner: String,
    pub succeeded: usize,
    pub failures: usize,
    pub warnings: Vec<Warning>,
}

impl RemoveReport {
    pub fn needs_manual_cleanup(&self) -> bool {
        self.failures > 0
    }
}

/// Result of renewing pull secrets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewReport {
    pub renewed: Vec<String>,
    pub failed: Vec<String>,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Coordinates all lifecycle workflows of simulator topologies
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    names: ResourceNames,
    guard: OwnershipGuard,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            names: config.names(),
            guard: OwnershipGuard::new(&config.app_name),
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn names(&self) -> &ResourceNames {
        &self.names
    }

    pub fn planner(&self) -> TopologyPlanner<'_> {
        TopologyPlanner::new(&self.config)
    }

    fn runner<'b>(
        &self,
        backend: &'b dyn ResourceBackend,
        policy: FailurePolicy,
    ) -> StepRunner<'b> {
        StepRunner::new(backend, policy, self.config.membership_selector())
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Names of the storage classes on the cluster
    pub async fn storage_classes(&self, backend: &dyn ResourceBackend) -> Result<Vec<String>> {
        let mut names: Vec<String> = backend
            .list(ResourceKind::StorageClass, None, None)
            .await?
            .iter()
            .map(|sc| sc.name().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Fail with the available classes when `name` does not exist
    pub async fn ensure_storage_class(
        &self,
        backend: &dyn ResourceBackend,
        name: &str,
    ) -> Result<()> {
        if backend
            .get(ResourceKind::StorageClass, None, name)
            .await?
            .is_some()
        {
            return Ok(());
        }
        let available = self.storage_classes(backend).await?;
        Err(Error::StorageClassNotFound {
            name: name.to_string(),
            available,
        })
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Build a complete topology, aborting on the first failed step
    ///
    /// Objects created before a failure are left in place.
    pub async fn create(
        &self,
        backend: &dyn ResourceBackend,
        settings: &Settings,
    ) -> Result<CreateReport> {
        settings.validate()?;
        self.ensure_storage_class(backend, &settings.storage_class).await?;

        let steps = self.planner().plan_create(settings);
        info!(
            "Creating {} in namespace {} ({} steps, {} deployments)",
            self.config.app_name,
            settings.namespace,
            steps.len(),
            settings.pod_count
        );

        let report = self
            .runner(backend, FailurePolicy::StopOnFirstFailure)
            .run(&steps)
            .await;
        let completed = report.into_result()?;

        info!("Deployment in namespace {} created", settings.namespace);
        Ok(CreateReport {
            namespace: settings.namespace.clone(),
            steps: completed,
            units: settings.pod_count,
        })
    }

    // =========================================================================
    // Modify
    // =========================================================================

    /// Update the simulator configuration and reconcile the unit count
    pub async fn modify(
        &self,
        backend: &dyn ResourceBackend,
        settings: &Settings,
    ) -> Result<ModifyReport> {
        settings.validate()?;
        let action = settings.action.ok_or_else(|| {
            Error::Validation("An action (create, stop or verify) is required".into())
        })?;
        self.ensure_storage_class(backend, &settings.storage_class).await?;

        let managed = self
            .guard
            .check(backend, &settings.namespace, &settings.user_name, settings.force)
            .await?;
        info!(
            "Modifying deployment in namespace {} owned by {}",
            managed.name, managed.owner
        );

        let warnings = self.detect_unsupported_changes(backend, settings).await?;
        for warning in &warnings {
            warn!("{}", warning);
        }

        let config_map = ManifestBuilder::new(&self.config, &self.names).config_map(settings, action);
        backend
            .patch(&Resource::ConfigMap(config_map))
            .await
            .map_err(|e| {
                Error::step(
                    format!("patch {} {}", ResourceKind::ConfigMap, self.names.config_map()),
                    e,
                )
            })?;
        info!("Simulator action set to {}", action.as_str());

        let rescale = self.rescale_authorized(backend, settings).await?;

        Ok(ModifyReport {
            namespace: settings.namespace.clone(),
            action,
            warnings,
            rescale,
        })
    }

    /// Compare the primary PVC with the requested storage class and size
    async fn detect_unsupported_changes(
        &self,
        backend: &dyn ResourceBackend,
        settings: &Settings,
    ) -> Result<Vec<Warning>> {
        let name = self.names.pvc_for(0, settings.pvc_shared);
        let pvc = match backend
            .get(ResourceKind::PersistentVolumeClaim, Some(&settings.namespace), &name)
            .await
            .map_err(|e| Error::step(format!("get {} {}", ResourceKind::PersistentVolumeClaim, name), e))?
        {
            Some(Resource::PersistentVolumeClaim(pvc)) => pvc,
            _ => {
                return Err(Error::ResourceNotFound {
                    kind: ResourceKind::PersistentVolumeClaim.to_string(),
                    name,
                })
            }
        };

        let current_class = pvc
            .spec
            .as_ref()
            .and_then(|s| s.storage_class_name.clone())
            .unwrap_or_default();
        let current_capacity = pvc
            .status
            .as_ref()
            .and_then(|s| s.capacity.as_ref())
            .or_else(|| {
                pvc.spec
                    .as_ref()
                    .and_then(|s| s.resources.as_ref())
                    .and_then(|r| r.requests.as_ref())
            })
            .and_then(|c| c.get("storage"))
            .map(|q| q.0.clone())
            .unwrap_or_default();

        let mut warnings = Vec::new();
        if current_class != settings.storage_class {
            warnings.push(Warning::UnsupportedChange {
                setting: ChangedSetting::StorageClass,
                current: current_class,
                requested: settings.storage_class.clone(),
            });
        }
        if current_capacity != settings.pvc_size {
            warnings.push(Warning::UnsupportedChange {
                setting: ChangedSetting::Capacity,
                current: current_capacity,
                requested: settings.pvc_size.clone(),
            });
        }
        Ok(warnings)
    }

    // =========================================================================
    // Rescale
    // =========================================================================

    /// Reconcile the number of deployment units with `settings.pod_count`
    pub async fn rescale(
        &self,
        backend: &dyn ResourceBackend,
        settings: &Settings,
    ) -> Result<RescaleOutcome> {
        settings.validate()?;
        self.guard
            .check(backend, &settings.namespace, &settings.user_name, settings.force)
            .await?;
        self.rescale_authorized(backend, settings).await
    }

    /// Current number of units, derived from the pods in the namespace
    pub async fn observed_units(
        &self,
        backend: &dyn ResourceBackend,
        settings: &Settings,
    ) -> Result<u32> {
        let pods = backend
            .list(ResourceKind::Pod, Some(&settings.namespace), None)
            .await?
            .len();
        let replicas = settings.replicas.max(1);
        if pods % replicas as usize != 0 {
            return Err(Error::InconsistentTopology { pods, replicas });
        }
        Ok((pods / replicas as usize) as u32)
    }

    async fn rescale_authorized(
        &self,
        backend: &dyn ResourceBackend,
        settings: &Settings,
    ) -> Result<RescaleOutcome> {
        let current = self.observed_units(backend, settings).await?;
        let requested = settings.pod_count;
        let plan = self.planner().plan_scale(current, requested, settings);

        if plan.is_empty() {
            info!("Deployment already at desired scale of {} units", current);
            return Ok(RescaleOutcome::AlreadyAtScale { units: current });
        }

        info!(
            "Rescaling namespace {} from {} to {} units",
            settings.namespace, current, requested
        );
        let runner = self.runner(backend, FailurePolicy::StopOnFirstFailure);
        for unit in &plan.units {
            debug!("Rescaling unit {}", unit.unit);
            runner.run(&unit.steps).await.into_result()?;
        }

        Ok(if requested > current {
            RescaleOutcome::ScaledUp {
                from: current,
                to: requested,
            }
        } else {
            RescaleOutcome::ScaledDown {
                from: current,
                to: requested,
            }
        })
    }

    // =========================================================================
    // Remove
    // =========================================================================

    /// Delete the whole topology, attempting every deletion
    pub async fn remove(
        &self,
        backend: &dyn ResourceBackend,
        namespace: &str,
        user: &str,
        force: bool,
    ) -> Result<RemoveReport> {
        let managed = self.guard.check(backend, namespace, user, force).await?;
        info!("Removing deployment in namespace {} owned by {}", managed.name, managed.owner);

        let steps = self.planner().plan_remove(namespace);
        let report = self
            .runner(backend, FailurePolicy::ContinueAndCount)
            .run(&steps)
            .await;

        let mut warnings = Vec::new();
        if !report.is_success() {
            let warning = Warning::ManualCleanup {
                failures: report.failure_count(),
            };
            warn!("{}", warning);
            warnings.push(warning);
        }

        Ok(RemoveReport {
            namespace: managed.name,
            owner: managed.owner,
            succeeded: report.succeeded,
            failures: report.failure_count(),
            warnings,
        })
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Summaries of the managed namespaces in scope
    pub async fn inventory(
        &self,
        backend: &dyn ResourceBackend,
        scope: &InventoryScope,
    ) -> Result<Vec<DeploymentSummary>> {
        InventoryReporter::new(&self.names).collect(backend, scope).await
    }

    /// Check that the namespace is managed; ownership is not enforced for reads
    async fn recognize(
        &self,
        backend: &dyn ResourceBackend,
        namespace: &str,
        user: &str,
    ) -> Result<ManagedNamespace> {
        self.guard.check(backend, namespace, user, true).await
    }

    /// Names of the simulator pods in a managed namespace
    pub async fn pods(
        &self,
        backend: &dyn ResourceBackend,
        namespace: &str,
        user: &str,
    ) -> Result<Vec<String>> {
        self.recognize(backend, namespace, user).await?;
        let mut names: Vec<String> = backend
            .list(ResourceKind::Pod, Some(namespace), None)
            .await?
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Host name of a unit's route, used to reach its simulator log
    pub async fn route_host(
        &self,
        backend: &dyn ResourceBackend,
        namespace: &str,
        user: &str,
        unit: u32,
    ) -> Result<String> {
        self.recognize(backend, namespace, user).await?;
        let name = self.names.route(unit);
        let not_found = || Error::ResourceNotFound {
            kind: ResourceKind::Route.to_string(),
            name: name.clone(),
        };

        match backend.get(ResourceKind::Route, Some(namespace), &name).await? {
            Some(Resource::Route(route)) => route.host().map(str::to_string).ok_or_else(not_found),
            _ => Err(not_found()),
        }
    }

    /// URL path of the simulator log behind a route
    pub fn log_url(&self, ingress: &str) -> String {
        format!("http://{}:{}{}", ingress, self.config.container_port, self.config.log_path)
    }

    // =========================================================================
    // Pull Secret
    // =========================================================================

    /// Recreate the pull secret in every managed namespace in scope
    ///
    /// Deletion failures are ignored since the secret may be missing already.
    pub async fn renew_pull_secret(
        &self,
        backend: &dyn ResourceBackend,
        scope: &InventoryScope,
    ) -> Result<RenewReport> {
        let selector = InventoryReporter::new(&self.names).selector(scope);
        let namespaces = backend
            .list(ResourceKind::Namespace, None, Some(&selector))
            .await?;
        let builder = ManifestBuilder::new(&self.config, &self.names);

        let mut report = RenewReport::default();
        for ns in &namespaces {
            let namespace = ns.name();
            if let Err(e) = backend
                .delete(ResourceKind::Secret, Some(namespace), self.names.pull_secret())
                .await
            {
                debug!("Pull secret in {} not deleted: {}", namespace, e);
            }

            match backend
                .create(&Resource::Secret(builder.pull_secret(namespace)))
                .await
            {
                Ok(_) => {
                    info!("Pull secret renewed in {}", namespace);
                    report.renewed.push(namespace.to_string());
                }
                Err(e) => {
                    warn!("Pull secret in {} could not be created: {}", namespace, e);
                    report.failed.push(namespace.to_string());
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::memory::InMemoryBackend;
    use crate::crd::{Route, RouteSpec};
    use crate::domain::ports::Operation;
    use crate::domain::settings::{AccessMode, SimulatorTuning};
    use assert_matches::assert_matches;

    fn settings(pod_count: u32, shared: bool) -> Settings {
        Settings {
            namespace: "sim-a".into(),
            user_name: "alice".into(),
            storage_class: "gold".into(),
            access_mode: AccessMode::ReadWriteMany,
            pvc_size: "1Gi".into(),
            pod_count,
            pvc_shared: shared,
            replicas: if shared { 2 } else { 1 },
            container_image: "quay.io/appsim/ocpappsim:1.0".into(),
            app_name: "appsim".into(),
            fs_used: "80".into(),
            tuning: SimulatorTuning::default(),
            action: None,
            force: false,
        }
    }

    fn with_action(mut s: Settings, action: SimulatorAction) -> Settings {
        s.action = Some(action);
        s
    }

    async fn deployed(s: &Settings) -> (Orchestrator, InMemoryBackend) {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        let backend = InMemoryBackend::with_storage_classes(&["gold", "silver"]);
        orchestrator.create(&backend, s).await.unwrap();
        backend.clear_calls();
        (orchestrator, backend)
    }

    #[tokio::test]
    async fn test_create_shared_topology() {
        let (_, backend) = deployed(&settings(2, true)).await;

        assert_eq!(backend.count(ResourceKind::Namespace), 1);
        assert_eq!(backend.count(ResourceKind::ServiceAccount), 1);
        assert_eq!(backend.count(ResourceKind::RoleBinding), 1);
        assert_eq!(backend.count(ResourceKind::ConfigMap), 1);
        assert_eq!(backend.count(ResourceKind::Secret), 1);
        assert_eq!(backend.count(ResourceKind::PersistentVolumeClaim), 1);
        assert_eq!(backend.count(ResourceKind::Deployment), 2);
        assert_eq!(backend.count(ResourceKind::Service), 2);
        assert_eq!(backend.count(ResourceKind::Route), 2);
        assert_eq!(backend.count(ResourceKind::Pod), 4);
    }

    #[tokio::test]
    async fn test_create_reports_steps() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        let backend = InMemoryBackend::with_storage_classes(&["gold"]);
        let report = orchestrator.create(&backend, &settings(3, false)).await.unwrap();

        assert_eq!(report.steps, 1 + 2 + 3 + 2 + 9);
        assert_eq!(report.units, 3);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_settings_without_calls() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        let backend = InMemoryBackend::with_storage_classes(&["gold"]);

        let mut s = settings(2, true);
        s.pod_count = 100;
        assert_matches!(orchestrator.create(&backend, &s).await, Err(Error::Validation(_)));

        let mut s = settings(2, true);
        s.access_mode = AccessMode::ReadWriteOnce;
        assert_matches!(orchestrator.create(&backend, &s).await, Err(Error::Validation(_)));

        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_missing_storage_class() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        let backend = InMemoryBackend::with_storage_classes(&["silver", "bronze"]);

        let err = orchestrator.create(&backend, &settings(1, true)).await.unwrap_err();
        assert_matches!(
            err,
            Error::StorageClassNotFound { name, available }
                if name == "gold" && available == vec!["bronze".to_string(), "silver".to_string()]
        );
        assert_eq!(backend.count_calls(Operation::Create), 0);
    }

    #[tokio::test]
    async fn test_create_stops_at_first_failure() {
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        let backend = InMemoryBackend::with_storage_classes(&["gold"]);
        backend.fail_on(Operation::Create, ResourceKind::Service, Some("ocpappsim0-svc"));

        let err = orchestrator.create(&backend, &settings(2, true)).await.unwrap_err();
        assert_matches!(&err, Error::StepFailed { step, .. } if step == "create Service ocpappsim0-svc");
        assert!(err.to_string().contains("ocpappsim0-svc"));

        // earlier objects stay, later ones are never attempted
        assert_eq!(backend.count(ResourceKind::Deployment), 1);
        assert_eq!(backend.count(ResourceKind::Route), 0);
        assert_eq!(backend.count(ResourceKind::Secret), 1);
    }

    #[tokio::test]
    async fn test_create_twice_fails_cleanly() {
        let s = settings(1, true);
        let (orchestrator, backend) = deployed(&s).await;

        let err = orchestrator.create(&backend, &s).await.unwrap_err();
        let Error::StepFailed { source, .. } = err else {
            panic!("expected a step failure");
        };
        assert_matches!(*source, Error::ResourceExists { .. });
        assert_eq!(backend.count(ResourceKind::Deployment), 1);
    }

    #[tokio::test]
    async fn test_modify_storage_class_change_warns() {
        let (orchestrator, backend) = deployed(&settings(2, true)).await;

        let mut s = with_action(settings(2, true), SimulatorAction::Verify);
        s.storage_class = "silver".into();
        let report = orchestrator.modify(&backend, &s).await.unwrap();

        assert_eq!(
            report.warnings,
            vec![Warning::UnsupportedChange {
                setting: ChangedSetting::StorageClass,
                current: "gold".into(),
                requested: "silver".into(),
            }]
        );
        assert_eq!(report.rescale, RescaleOutcome::AlreadyAtScale { units: 2 });

        let cm = backend
            .get(ResourceKind::ConfigMap, Some("sim-a"), "ocpappsim-cfg")
            .await
            .unwrap();
        let Some(Resource::ConfigMap(cm)) = cm else {
            panic!("config map missing");
        };
        assert_eq!(cm.data.unwrap()["action"], "verify");
    }

    #[tokio::test]
    async fn test_modify_capacity_change_warns() {
        let (orchestrator, backend) = deployed(&settings(1, false)).await;

        let mut s = with_action(settings(1, false), SimulatorAction::Stop);
        s.pvc_size = "5Gi".into();
        let report = orchestrator.modify(&backend, &s).await.unwrap();

        assert_eq!(report.warnings.len(), 1);
        assert_matches!(
            &report.warnings[0],
            Warning::UnsupportedChange { setting: ChangedSetting::Capacity, current, .. } if current == "1Gi"
        );
    }

    #[tokio::test]
    async fn test_modify_requires_action() {
        let (orchestrator, backend) = deployed(&settings(1, true)).await;
        assert_matches!(
            orchestrator.modify(&backend, &settings(1, true)).await,
            Err(Error::Validation(_))
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_modify_denied_for_other_user() {
        let (orchestrator, backend) = deployed(&settings(1, true)).await;

        let mut s = with_action(settings(1, true), SimulatorAction::Stop);
        s.user_name = "bob".into();
        let err = orchestrator.modify(&backend, &s).await.unwrap_err();
        assert_matches!(err, Error::OwnershipDenied { owner, .. } if owner == "alice");
        assert_eq!(backend.count_calls(Operation::Patch), 0);

        s.force = true;
        assert!(orchestrator.modify(&backend, &s).await.is_ok());
    }

    #[tokio::test]
    async fn test_modify_scales_up() {
        let (orchestrator, backend) = deployed(&settings(2, true)).await;

        let s = with_action(settings(4, true), SimulatorAction::Create);
        let report = orchestrator.modify(&backend, &s).await.unwrap();

        assert_eq!(report.rescale, RescaleOutcome::ScaledUp { from: 2, to: 4 });
        assert_eq!(backend.count(ResourceKind::Deployment), 4);
        assert_eq!(backend.count(ResourceKind::Route), 4);
        assert_eq!(backend.count(ResourceKind::Pod), 8);
        assert_eq!(backend.count(ResourceKind::PersistentVolumeClaim), 1);
    }

    #[tokio::test]
    async fn test_modify_replaces_config_map_data() {
        let (orchestrator, backend) = deployed(&settings(1, true)).await;
        let Some(Resource::ConfigMap(mut cm)) = backend
            .get(ResourceKind::ConfigMap, Some("sim-a"), "ocpappsim-cfg")
            .await
            .unwrap()
        else {
            panic!("config map missing");
        };
        cm.data
            .get_or_insert_with(Default::default)
            .insert("stale".into(), "1".into());
        backend.seed(Resource::ConfigMap(cm));

        let s = with_action(settings(1, true), SimulatorAction::Stop);
        orchestrator.modify(&backend, &s).await.unwrap();

        let Some(Resource::ConfigMap(cm)) = backend
            .get(ResourceKind::ConfigMap, Some("sim-a"), "ocpappsim-cfg")
            .await
            .unwrap()
        else {
            panic!("config map missing");
        };
        let data = cm.data.unwrap();
        let keys: Vec<String> = data.keys().cloned().collect();
        assert_eq!(keys, vec!["action", "settings.properties"]);
        assert_eq!(data["action"], "stop");
    }

    #[tokio::test]
    async fn test_modify_patch_failure_skips_rescale() {
        let (orchestrator, backend) = deployed(&settings(2, true)).await;
        backend.fail_on(Operation::Patch, ResourceKind::ConfigMap, Some("ocpappsim-cfg"));

        let s = with_action(settings(4, true), SimulatorAction::Create);
        let err = orchestrator.modify(&backend, &s).await.unwrap_err();
        assert_matches!(&err, Error::StepFailed { step, .. } if step == "patch ConfigMap ocpappsim-cfg");

        assert_eq!(backend.count_calls(Operation::List), 0);
        assert_eq!(backend.count_calls(Operation::Create), 0);
        assert_eq!(backend.count_calls(Operation::Delete), 0);
        assert_eq!(backend.count(ResourceKind::Deployment), 2);
    }

    #[tokio::test]
    async fn test_rescale_down_removes_tail_units() {
        let (orchestrator, backend) = deployed(&settings(3, false)).await;

        let outcome = orchestrator.rescale(&backend, &settings(1, false)).await.unwrap();
        assert_eq!(outcome, RescaleOutcome::ScaledDown { from: 3, to: 1 });

        assert_eq!(backend.count(ResourceKind::Deployment), 1);
        assert_eq!(backend.count(ResourceKind::PersistentVolumeClaim), 1);
        assert!(backend
            .get(ResourceKind::Deployment, Some("sim-a"), "ocpappsim-0")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_rescale_at_scale_mutates_nothing() {
        let (orchestrator, backend) = deployed(&settings(2, false)).await;

        let outcome = orchestrator.rescale(&backend, &settings(2, false)).await.unwrap();
        assert_eq!(outcome, RescaleOutcome::AlreadyAtScale { units: 2 });
        assert_eq!(backend.count_calls(Operation::Create), 0);
        assert_eq!(backend.count_calls(Operation::Delete), 0);
    }

    #[tokio::test]
    async fn test_rescale_stops_at_failed_unit() {
        let (orchestrator, backend) = deployed(&settings(1, false)).await;
        backend.fail_on(Operation::Create, ResourceKind::Deployment, Some("ocpappsim-2"));

        let err = orchestrator.rescale(&backend, &settings(4, false)).await.unwrap_err();
        assert_matches!(&err, Error::StepFailed { step, .. } if step == "create Deployment ocpappsim-2");

        // unit 1 complete, unit 2 stopped after its PVC, unit 3 untouched
        assert_eq!(backend.count(ResourceKind::Deployment), 2);
        assert_eq!(backend.count(ResourceKind::PersistentVolumeClaim), 3);
    }

    #[tokio::test]
    async fn test_rescale_down_stops_at_failed_unit() {
        let (orchestrator, backend) = deployed(&settings(3, false)).await;
        backend.fail_on(Operation::Delete, ResourceKind::Service, Some("ocpappsim1-svc"));

        let err = orchestrator.rescale(&backend, &settings(1, false)).await.unwrap_err();
        assert_matches!(&err, Error::StepFailed { step, .. } if step == "delete Service ocpappsim1-svc");

        // unit 1 lost its route only, unit 2 untouched
        assert_eq!(backend.count(ResourceKind::Route), 2);
        assert_eq!(backend.count(ResourceKind::Service), 3);
        assert_eq!(backend.count(ResourceKind::Deployment), 3);
        assert_eq!(backend.count(ResourceKind::PersistentVolumeClaim), 3);
        assert!(backend
            .calls()
            .iter()
            .filter(|c| c.operation == Operation::Delete)
            .all(|c| !c.name.as_deref().unwrap_or_default().contains('2')));
    }

    #[tokio::test]
    async fn test_rescale_inconsistent_topology() {
        let (orchestrator, backend) = deployed(&settings(2, true)).await;
        backend
            .delete(ResourceKind::Pod, Some("sim-a"), "ocpappsim-1-00001")
            .await
            .unwrap();

        let err = orchestrator.rescale(&backend, &settings(3, true)).await.unwrap_err();
        assert_matches!(err, Error::InconsistentTopology { pods: 3, replicas: 2 });
        assert_eq!(backend.count(ResourceKind::Deployment), 2);
    }

    #[tokio::test]
    async fn test_remove_with_failed_secret_deletion() {
        let (orchestrator, backend) = deployed(&settings(2, true)).await;
        backend.fail_on(Operation::Delete, ResourceKind::Secret, None);

        let report = orchestrator.remove(&backend, "sim-a", "alice", false).await.unwrap();
        assert_eq!(report.failures, 1);
        assert_eq!(report.succeeded, 8);
        assert!(report.needs_manual_cleanup());
        assert_eq!(report.warnings, vec![Warning::ManualCleanup { failures: 1 }]);

        // namespace deletion still ran
        assert_eq!(backend.count(ResourceKind::Namespace), 0);
    }

    #[tokio::test]
    async fn test_remove_clean() {
        let (orchestrator, backend) = deployed(&settings(2, false)).await;

        let report = orchestrator.remove(&backend, "sim-a", "alice", false).await.unwrap();
        assert_eq!(report.failures, 0);
        assert!(report.warnings.is_empty());
        assert_eq!(backend.count(ResourceKind::PersistentVolumeClaim), 0);
        assert_eq!(backend.count(ResourceKind::Pod), 0);
    }

    #[tokio::test]
    async fn test_remove_guarded() {
        let (orchestrator, backend) = deployed(&settings(1, true)).await;

        assert_matches!(
            orchestrator.remove(&backend, "sim-x", "alice", true).await,
            Err(Error::NotManagedNamespace { .. })
        );
        assert_matches!(
            orchestrator.remove(&backend, "sim-a", "bob", false).await,
            Err(Error::OwnershipDenied { .. })
        );
        assert_eq!(backend.count_calls(Operation::Delete), 0);

        let report = orchestrator.remove(&backend, "sim-a", "bob", true).await.unwrap();
        assert_eq!(report.owner, "alice");
    }

    #[tokio::test]
    async fn test_pods_and_route_host() {
        let (orchestrator, backend) = deployed(&settings(2, true)).await;

        let pods = orchestrator.pods(&backend, "sim-a", "bob").await.unwrap();
        assert_eq!(pods.len(), 4);
        assert_eq!(pods[0], "ocpappsim-0-00000");

        assert_matches!(
            orchestrator.route_host(&backend, "sim-a", "bob", 1).await,
            Err(Error::ResourceNotFound { .. })
        );

        let mut route = Route::new("ocpappsim1-route", RouteSpec::default());
        route.metadata.namespace = Some("sim-a".into());
        route.spec.host = Some("ocpappsim1-route-sim-a.apps.example.com".into());
        backend.patch(&Resource::Route(route)).await.unwrap();

        let host = orchestrator.route_host(&backend, "sim-a", "bob", 1).await.unwrap();
        assert_eq!(host, "ocpappsim1-route-sim-a.apps.example.com");
        assert_eq!(
            orchestrator.log_url("10.0.0.1"),
            "http://10.0.0.1:80/appsim.log"
        );
    }

    #[tokio::test]
    async fn test_renew_pull_secret_scoped() {
        let (orchestrator, backend) = deployed(&settings(1, true)).await;
        let mut other = settings(1, true);
        other.namespace = "sim-b".into();
        other.user_name = "bob".into();
        orchestrator.create(&backend, &other).await.unwrap();

        let report = orchestrator
            .renew_pull_secret(&backend, &InventoryScope::OwnedBy("alice".into()))
            .await
            .unwrap();
        assert_eq!(report.renewed, vec!["sim-a".to_string()]);
        assert!(report.failed.is_empty());

        backend.fail_on(Operation::Create, ResourceKind::Secret, Some("regcred"));
        let report = orchestrator
            .renew_pull_secret(&backend, &InventoryScope::All)
            .await
            .unwrap();
        assert_eq!(report.failed.len(), 2);
    }
}
