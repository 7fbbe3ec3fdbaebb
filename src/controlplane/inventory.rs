//! Inventory Reporter
//!
//! Read-only projection of every managed namespace into a summary row. Each
//! sub-lookup fails on its own: a broken pod listing never blanks out the
//! PVC columns and vice versa.

use crate::controlplane::guard::{OWNER_LABEL, UNKNOWN_OWNER};
use crate::controlplane::manifests::ACTION_KEY;
use crate::controlplane::naming::ResourceNames;
use crate::domain::ports::{Resource, ResourceBackend, ResourceKind};
use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use serde::Serialize;
use tracing::{debug, warn};

/// Placeholder for values that could not be read
pub const UNKNOWN: &str = "Unknown";

/// Which managed namespaces to report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryScope {
    All,
    OwnedBy(String),
}

/// Simulator state derived from the configured action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SimulatorStatus {
    Creating,
    Verifying,
    Stopped,
    Unknown,
}

impl SimulatorStatus {
    pub fn from_action(action: Option<&str>) -> Self {
        match action {
            Some("create") | Some("start") => SimulatorStatus::Creating,
            Some("verify") => SimulatorStatus::Verifying,
            Some("stop") => SimulatorStatus::Stopped,
            _ => SimulatorStatus::Unknown,
        }
    }
}

impl std::fmt::Display for SimulatorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimulatorStatus::Creating => write!(f, "CREATING"),
            SimulatorStatus::Verifying => write!(f, "VERIFYING"),
            SimulatorStatus::Stopped => write!(f, "STOPPED"),
            SimulatorStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Running and total pods of a namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PodCounts {
    pub running: usize,
    pub total: usize,
}

/// One row of the inventory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentSummary {
    pub namespace: String,
    pub owner: String,
    /// `None` when the pods could not be listed
    pub pods: Option<PodCounts>,
    pub pvc_capacity: String,
    pub pvc_phase: String,
    pub storage_class: String,
    pub status: SimulatorStatus,
    pub created: Option<DateTime<Utc>>,
}

impl DeploymentSummary {
    /// Pod column as `running/total`, `?/?` when unknown
    pub fn pod_column(&self) -> String {
        match self.pods {
            Some(PodCounts { running, total }) => format!("{}/{}", running, total),
            None => "?/?".to_string(),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.created.map(|created| now - created)
    }
}

/// Short human age such as `3d4h`, `5h12m` or `42s`
pub fn format_age(age: Duration) -> String {
    let secs = age.num_seconds().max(0);
    let (days, hours, minutes) = (secs / 86_400, (secs % 86_400) / 3_600, (secs % 3_600) / 60);
    if days > 0 {
        format!("{}d{}h", days, hours)
    } else if hours > 0 {
        format!("{}h{}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", secs)
    }
}

/// PVC used for capacity reporting: the shared one, else unit 0's
pub async fn primary_pvc(
    backend: &dyn ResourceBackend,
    names: &ResourceNames,
    namespace: &str,
) -> Result<Option<PersistentVolumeClaim>> {
    for name in [names.shared_pvc(), names.unit_pvc(0)] {
        if let Some(Resource::PersistentVolumeClaim(pvc)) = backend
            .get(ResourceKind::PersistentVolumeClaim, Some(namespace), &name)
            .await?
        {
            return Ok(Some(pvc));
        }
    }
    Ok(None)
}

/// Builds inventory rows from cluster state
pub struct InventoryReporter<'a> {
    names: &'a ResourceNames,
}

impl<'a> InventoryReporter<'a> {
    pub fn new(names: &'a ResourceNames) -> Self {
        Self { names }
    }

    /// Namespace label selector for a scope
    pub fn selector(&self, scope: &InventoryScope) -> String {
        match scope {
            InventoryScope::All => format!("app={}", self.names.app()),
            InventoryScope::OwnedBy(user) => {
                format!("app={},{}={}", self.names.app(), OWNER_LABEL, user)
            }
        }
    }

    /// Summarize every managed namespace in scope
    pub async fn collect(
        &self,
        backend: &dyn ResourceBackend,
        scope: &InventoryScope,
    ) -> Result<Vec<DeploymentSummary>> {
        let selector = self.selector(scope);
        let namespaces = backend
            .list(ResourceKind::Namespace, None, Some(&selector))
            .await?;
        debug!("Found {} namespaces matching {}", namespaces.len(), selector);

        let mut rows = Vec::with_capacity(namespaces.len());
        for ns in &namespaces {
            rows.push(self.summarize(backend, ns).await);
        }
        Ok(rows)
    }

    async fn summarize(&self, backend: &dyn ResourceBackend, ns: &Resource) -> DeploymentSummary {
        let namespace = ns.name().to_string();
        let owner = ns.label(OWNER_LABEL).unwrap_or(UNKNOWN_OWNER).to_string();

        let pods = match backend.list(ResourceKind::Pod, Some(&namespace), None).await {
            Ok(pods) => Some(PodCounts {
                running: pods.iter().filter(|p| pod_phase(p) == Some("Running")).count(),
                total: pods.len(),
            }),
            Err(e) => {
                warn!("Pods of {} could not be listed: {}", namespace, e);
                None
            }
        };

        let status = match backend
            .get(ResourceKind::ConfigMap, Some(&namespace), &self.names.config_map())
            .await
        {
            Ok(Some(Resource::ConfigMap(cm))) => SimulatorStatus::from_action(
                cm.data
                    .as_ref()
                    .and_then(|d| d.get(ACTION_KEY))
                    .map(String::as_str),
            ),
            Ok(_) => SimulatorStatus::Unknown,
            Err(e) => {
                warn!("Configuration of {} could not be read: {}", namespace, e);
                SimulatorStatus::Unknown
            }
        };

        let (mut pvc_capacity, mut pvc_phase, mut storage_class) =
            (UNKNOWN.to_string(), UNKNOWN.to_string(), UNKNOWN.to_string());
        match primary_pvc(backend, self.names, &namespace).await {
            Ok(Some(pvc)) => {
                if let Some(status) = &pvc.status {
                    if let Some(phase) = &status.phase {
                        pvc_phase = phase.clone();
                    }
                    if let Some(storage) = status.capacity.as_ref().and_then(|c| c.get("storage")) {
                        pvc_capacity = storage.0.clone();
                    }
                }
                if let Some(class) = pvc.spec.as_ref().and_then(|s| s.storage_class_name.clone()) {
                    storage_class = class;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("PVC of {} could not be read: {}", namespace, e),
        }

        DeploymentSummary {
            namespace,
            owner,
            pods,
            pvc_capacity,
            pvc_phase,
            storage_class,
            status,
            created: ns.metadata().creation_timestamp.as_ref().map(|t| t.0),
        }
    }
}

fn pod_phase(resource: &Resource) -> Option<&str> {
    match resource {
        Resource::Pod(pod) => pod.status.as_ref().and_then(|s| s.phase.as_deref()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlplane::backends::memory::InMemoryBackend;
    use crate::controlplane::orchestrator::{Orchestrator, OrchestratorConfig};
    use crate::domain::ports::Operation;
    use crate::domain::settings::{AccessMode, Settings, SimulatorTuning};

    fn settings(namespace: &str, user: &str) -> Settings {
        Settings {
            namespace: namespace.into(),
            user_name: user.into(),
            storage_class: "gold".into(),
            access_mode: AccessMode::ReadWriteMany,
            pvc_size: "2Gi".into(),
            pod_count: 2,
            pvc_shared: true,
            replicas: 2,
            container_image: "quay.io/appsim/ocpappsim:1.0".into(),
            app_name: "appsim".into(),
            fs_used: "80".into(),
            tuning: SimulatorTuning::default(),
            action: None,
            force: false,
        }
    }

    async fn cluster() -> InMemoryBackend {
        let backend = InMemoryBackend::with_storage_classes(&["gold"]);
        let orchestrator = Orchestrator::new(OrchestratorConfig::default());
        orchestrator.create(&backend, &settings("sim-a", "alice")).await.unwrap();
        orchestrator.create(&backend, &settings("sim-b", "bob")).await.unwrap();
        backend
    }

    #[test]
    fn test_status_from_action() {
        assert_eq!(SimulatorStatus::from_action(Some("create")), SimulatorStatus::Creating);
        assert_eq!(SimulatorStatus::from_action(Some("start")), SimulatorStatus::Creating);
        assert_eq!(SimulatorStatus::from_action(Some("verify")), SimulatorStatus::Verifying);
        assert_eq!(SimulatorStatus::from_action(Some("stop")), SimulatorStatus::Stopped);
        assert_eq!(SimulatorStatus::from_action(Some("pause")), SimulatorStatus::Unknown);
        assert_eq!(SimulatorStatus::from_action(None), SimulatorStatus::Unknown);
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(Duration::seconds(42)), "42s");
        assert_eq!(format_age(Duration::minutes(7)), "7m");
        assert_eq!(format_age(Duration::minutes(312)), "5h12m");
        assert_eq!(format_age(Duration::hours(76)), "3d4h");
    }

    #[tokio::test]
    async fn test_collect_scopes() {
        let backend = cluster().await;
        let config = OrchestratorConfig::default();
        let names = config.names();
        let reporter = InventoryReporter::new(&names);

        let all = reporter.collect(&backend, &InventoryScope::All).await.unwrap();
        assert_eq!(all.len(), 2);

        let mine = reporter
            .collect(&backend, &InventoryScope::OwnedBy("alice".into()))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);

        let row = &mine[0];
        assert_eq!(row.namespace, "sim-a");
        assert_eq!(row.owner, "alice");
        assert_eq!(row.pod_column(), "4/4");
        assert_eq!(row.pvc_capacity, "2Gi");
        assert_eq!(row.pvc_phase, "Bound");
        assert_eq!(row.storage_class, "gold");
        assert_eq!(row.status, SimulatorStatus::Creating);
        assert!(row.created.is_some());
    }

    #[tokio::test]
    async fn test_sub_lookup_failures_are_independent() {
        let backend = cluster().await;
        backend.fail_on(Operation::List, ResourceKind::Pod, None);
        backend.fail_on(Operation::Get, ResourceKind::ConfigMap, None);

        let config = OrchestratorConfig::default();
        let names = config.names();
        let rows = InventoryReporter::new(&names)
            .collect(&backend, &InventoryScope::OwnedBy("bob".into()))
            .await
            .unwrap();

        let row = &rows[0];
        assert_eq!(row.pod_column(), "?/?");
        assert_eq!(row.status, SimulatorStatus::Unknown);
        assert_eq!(row.pvc_capacity, "2Gi");
        assert_eq!(row.storage_class, "gold");
    }

    #[tokio::test]
    async fn test_pvc_lookup_failure_defaults_to_unknown() {
        let backend = cluster().await;
        backend.fail_on(Operation::Get, ResourceKind::PersistentVolumeClaim, None);

        let config = OrchestratorConfig::default();
        let names = config.names();
        let rows = InventoryReporter::new(&names)
            .collect(&backend, &InventoryScope::OwnedBy("alice".into()))
            .await
            .unwrap();

        let row = &rows[0];
        assert_eq!(row.pvc_capacity, UNKNOWN);
        assert_eq!(row.pvc_phase, UNKNOWN);
        assert_eq!(row.storage_class, UNKNOWN);
        assert_eq!(row.pod_column(), "4/4");
    }
}
