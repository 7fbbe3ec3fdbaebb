//! Domain Ports - Core trait definitions for the orchestration engine
//!
//! These types define the boundary between the orchestration logic and the
//! cluster. Cluster objects travel through the port as typed descriptors and
//! are only serialized by the backend adapter that talks to the API server.

use crate::crd::Route;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Resource Kinds
// =============================================================================

/// Kinds of cluster objects the orchestrator touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Namespace,
    ServiceAccount,
    RoleBinding,
    PersistentVolumeClaim,
    ConfigMap,
    Secret,
    Deployment,
    Service,
    Route,
    Pod,
    StorageClass,
}

impl ResourceKind {
    /// Whether objects of this kind live inside a namespace
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, ResourceKind::Namespace | ResourceKind::StorageClass)
    }

    /// Plural form used in progress messages
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespaces",
            ResourceKind::ServiceAccount => "service accounts",
            ResourceKind::RoleBinding => "role bindings",
            ResourceKind::PersistentVolumeClaim => "persistent volume claims",
            ResourceKind::ConfigMap => "config maps",
            ResourceKind::Secret => "secrets",
            ResourceKind::Deployment => "deployments",
            ResourceKind::Service => "services",
            ResourceKind::Route => "routes",
            ResourceKind::Pod => "pods",
            ResourceKind::StorageClass => "storage classes",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::RoleBinding => "RoleBinding",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Service => "Service",
            ResourceKind::Route => "Route",
            ResourceKind::Pod => "Pod",
            ResourceKind::StorageClass => "StorageClass",
        };
        write!(f, "{}", name)
    }
}

/// Backend operations, used for diagnostics and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Get,
    List,
    Patch,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Get => write!(f, "get"),
            Operation::List => write!(f, "list"),
            Operation::Patch => write!(f, "patch"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

// =============================================================================
// Resource Descriptors
// =============================================================================

/// A typed cluster object
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Namespace(Namespace),
    ServiceAccount(ServiceAccount),
    RoleBinding(RoleBinding),
    PersistentVolumeClaim(PersistentVolumeClaim),
    ConfigMap(ConfigMap),
    Secret(Secret),
    Deployment(Deployment),
    Service(Service),
    Route(Route),
    Pod(Pod),
    StorageClass(StorageClass),
}

impl Resource {
    /// Kind of this object
    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Namespace(_) => ResourceKind::Namespace,
            Resource::ServiceAccount(_) => ResourceKind::ServiceAccount,
            Resource::RoleBinding(_) => ResourceKind::RoleBinding,
            Resource::PersistentVolumeClaim(_) => ResourceKind::PersistentVolumeClaim,
            Resource::ConfigMap(_) => ResourceKind::ConfigMap,
            Resource::Secret(_) => ResourceKind::Secret,
            Resource::Deployment(_) => ResourceKind::Deployment,
            Resource::Service(_) => ResourceKind::Service,
            Resource::Route(_) => ResourceKind::Route,
            Resource::Pod(_) => ResourceKind::Pod,
            Resource::StorageClass(_) => ResourceKind::StorageClass,
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Resource::Namespace(r) => &r.metadata,
            Resource::ServiceAccount(r) => &r.metadata,
            Resource::RoleBinding(r) => &r.metadata,
            Resource::PersistentVolumeClaim(r) => &r.metadata,
            Resource::ConfigMap(r) => &r.metadata,
            Resource::Secret(r) => &r.metadata,
            Resource::Deployment(r) => &r.metadata,
            Resource::Service(r) => &r.metadata,
            Resource::Route(r) => &r.metadata,
            Resource::Pod(r) => &r.metadata,
            Resource::StorageClass(r) => &r.metadata,
        }
    }

    /// Mutable object metadata
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Resource::Namespace(r) => &mut r.metadata,
            Resource::ServiceAccount(r) => &mut r.metadata,
            Resource::RoleBinding(r) => &mut r.metadata,
            Resource::PersistentVolumeClaim(r) => &mut r.metadata,
            Resource::ConfigMap(r) => &mut r.metadata,
            Resource::Secret(r) => &mut r.metadata,
            Resource::Deployment(r) => &mut r.metadata,
            Resource::Service(r) => &mut r.metadata,
            Resource::Route(r) => &mut r.metadata,
            Resource::Pod(r) => &mut r.metadata,
            Resource::StorageClass(r) => &mut r.metadata,
        }
    }

    /// Object name, empty if unset
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Namespace of the object, `None` for cluster-scoped kinds
    pub fn namespace(&self) -> Option<&str> {
        if self.kind().is_namespaced() {
            self.metadata().namespace.as_deref()
        } else {
            None
        }
    }

    /// Value of a metadata label
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata()
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }

    /// Whether every `key=value` pair of the selector matches this object's labels
    pub fn matches_selector(&self, selector: &BTreeMap<String, String>) -> bool {
        selector
            .iter()
            .all(|(key, value)| self.label(key) == Some(value.as_str()))
    }
}

/// Parse a `k1=v1,k2=v2` equality label selector
pub fn parse_label_selector(selector: &str) -> BTreeMap<String, String> {
    selector
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Render labels as a `k1=v1,k2=v2` selector
pub fn format_label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// Resource Backend Port
// =============================================================================

/// Port for single typed operations against the cluster
///
/// Every call is independent and may fail on its own. Absent objects are
/// reported as `Ok(None)` by `get`, never as an error.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    /// Create an object; fails with a conflict if it already exists
    async fn create(&self, resource: &Resource) -> Result<Resource>;

    /// Get one object by name
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Resource>>;

    /// List objects, optionally filtered by an equality label selector
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Resource>>;

    /// Update an existing object: metadata is merged, every other field of
    /// the body replaces the stored one
    async fn patch(&self, resource: &Resource) -> Result<Resource>;

    /// Delete an object by name
    async fn delete(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> Result<()>;

    /// Get backend name
    fn backend_name(&self) -> &str;
}

pub type ResourceBackendRef = Arc<dyn ResourceBackend>;
