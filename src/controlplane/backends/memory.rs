//! In-memory cluster
//!
//! A small stand-in for the API server. It keeps typed objects in a map and
//! mimics the cluster behavior the orchestrator relies on: conflicts on
//! duplicate creates, PVC binding, deployment pods, and namespace cascade.
//! Every call is recorded and failures can be injected per call.

use super::{decode, encode, overlay};
use crate::domain::ports::{
    parse_label_selector, Operation, Resource, ResourceBackend, ResourceKind,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::DeploymentStatus;
use k8s_openapi::api::core::v1::{
    ContainerStatus, NamespaceStatus, PersistentVolumeClaimStatus, Pod, PodSpec, PodStatus,
};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use tracing::debug;

type ObjectKey = (ResourceKind, Option<String>, String);

fn object_key(kind: ResourceKind, namespace: Option<&str>, name: &str) -> ObjectKey {
    let namespace = if kind.is_namespaced() {
        namespace.map(str::to_string)
    } else {
        None
    };
    (kind, namespace, name.to_string())
}

/// One recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCall {
    pub operation: Operation,
    pub kind: ResourceKind,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
struct FailureRule {
    operation: Operation,
    kind: ResourceKind,
    name: Option<String>,
}

impl FailureRule {
    fn matches(&self, call: &BackendCall) -> bool {
        self.operation == call.operation
            && self.kind == call.kind
            && match (&self.name, &call.name) {
                (None, _) => true,
                (Some(rule), Some(name)) => rule == name,
                (Some(_), None) => false,
            }
    }
}

/// In-process resource backend
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    objects: RwLock<BTreeMap<ObjectKey, Resource>>,
    failures: Mutex<Vec<FailureRule>>,
    calls: Mutex<Vec<BackendCall>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend preloaded with the given storage classes
    pub fn with_storage_classes(names: &[&str]) -> Self {
        let backend = Self::new();
        for name in names {
            backend.seed(Resource::StorageClass(StorageClass {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                provisioner: "kubernetes.io/no-provisioner".to_string(),
                ..Default::default()
            }));
        }
        backend
    }

    /// Store an object as-is, bypassing checks, failures and call recording
    pub fn seed(&self, resource: Resource) {
        let key = object_key(resource.kind(), resource.namespace(), resource.name());
        self.objects.write().insert(key, resource);
    }

    /// Make every matching call fail; `None` matches any name
    pub fn fail_on(&self, operation: Operation, kind: ResourceKind, name: Option<&str>) {
        self.failures.lock().push(FailureRule {
            operation,
            kind,
            name: name.map(str::to_string),
        });
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Calls made so far, in order
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Number of calls of one operation
    pub fn count_calls(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Number of stored objects of a kind, across namespaces
    pub fn count(&self, kind: ResourceKind) -> usize {
        self.objects.read().keys().filter(|(k, _, _)| *k == kind).count()
    }

    fn record(
        &self,
        operation: Operation,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: Option<&str>,
    ) -> Result<()> {
        let call = BackendCall {
            operation,
            kind,
            namespace: namespace.map(str::to_string),
            name: name.map(str::to_string),
        };
        let injected = self.failures.lock().iter().any(|rule| rule.matches(&call));
        self.calls.lock().push(call);

        if injected {
            return Err(Error::BackendOperationFailed {
                backend: self.backend_name().to_string(),
                operation: operation.to_string(),
                reason: format!("injected failure on {} {}", kind, name.unwrap_or("*")),
            });
        }
        Ok(())
    }

    /// Fill in the fields the cluster would set on admission
    fn admit(&self, resource: &mut Resource) -> Vec<Resource> {
        let meta = resource.metadata_mut();
        meta.creation_timestamp = Some(Time(Utc::now()));
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{}", self.objects.read().len() + 1));
        }

        match resource {
            Resource::Namespace(ns) => {
                ns.status = Some(NamespaceStatus {
                    phase: Some("Active".to_string()),
                    ..Default::default()
                });
                Vec::new()
            }
            Resource::PersistentVolumeClaim(pvc) => {
                let capacity = pvc
                    .spec
                    .as_ref()
                    .and_then(|s| s.resources.as_ref())
                    .and_then(|r| r.requests.clone());
                pvc.status = Some(PersistentVolumeClaimStatus {
                    phase: Some("Bound".to_string()),
                    capacity,
                    access_modes: pvc.spec.as_ref().and_then(|s| s.access_modes.clone()),
                    ..Default::default()
                });
                Vec::new()
            }
            Resource::Deployment(deploy) => {
                let replicas = deploy.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                let labels = deploy
                    .spec
                    .as_ref()
                    .and_then(|s| s.template.metadata.as_ref())
                    .and_then(|m| m.labels.clone());
                let name = deploy.metadata.name.clone().unwrap_or_default();
                let namespace = deploy.metadata.namespace.clone();

                deploy.status = Some(DeploymentStatus {
                    replicas: Some(replicas),
                    ready_replicas: Some(replicas),
                    available_replicas: Some(replicas),
                    ..Default::default()
                });

                (0..replicas)
                    .map(|i| {
                        Resource::Pod(Pod {
                            metadata: ObjectMeta {
                                name: Some(format!("{}-{:05}", name, i)),
                                namespace: namespace.clone(),
                                labels: labels.clone(),
                                creation_timestamp: Some(Time(Utc::now())),
                                ..Default::default()
                            },
                            spec: Some(PodSpec::default()),
                            status: Some(PodStatus {
                                phase: Some("Running".to_string()),
                                container_statuses: Some(vec![ContainerStatus {
                                    name: "simulator".to_string(),
                                    ready: true,
                                    ..Default::default()
                                }]),
                                ..Default::default()
                            }),
                        })
                    })
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl ResourceBackend for InMemoryBackend {
    async fn create(&self, resource: &Resource) -> Result<Resource> {
        let kind = resource.kind();
        let namespace = resource.namespace();
        self.record(Operation::Create, kind, namespace, Some(resource.name()))?;

        if kind.is_namespaced() {
            let ns = namespace.ok_or_else(|| Error::BackendOperationFailed {
                backend: self.backend_name().to_string(),
                operation: Operation::Create.to_string(),
                reason: format!("{} {} has no namespace", kind, resource.name()),
            })?;
            if !self
                .objects
                .read()
                .contains_key(&object_key(ResourceKind::Namespace, None, ns))
            {
                return Err(Error::ResourceNotFound {
                    kind: ResourceKind::Namespace.to_string(),
                    name: ns.to_string(),
                });
            }
        }

        let key = object_key(kind, namespace, resource.name());
        if self.objects.read().contains_key(&key) {
            return Err(Error::ResourceExists {
                kind: kind.to_string(),
                name: resource.name().to_string(),
            });
        }

        let mut stored = resource.clone();
        let children = self.admit(&mut stored);

        let mut objects = self.objects.write();
        objects.insert(key, stored.clone());
        for child in children {
            let child_key = object_key(child.kind(), child.namespace(), child.name());
            objects.insert(child_key, child);
        }
        debug!("memory: created {} {}", kind, resource.name());

        Ok(stored)
    }

    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Resource>> {
        self.record(Operation::Get, kind, namespace, Some(name))?;
        Ok(self
            .objects
            .read()
            .get(&object_key(kind, namespace, name))
            .cloned())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Resource>> {
        self.record(Operation::List, kind, namespace, None)?;
        let selector = label_selector.map(parse_label_selector).unwrap_or_default();
        let scope = if kind.is_namespaced() { namespace } else { None };

        Ok(self
            .objects
            .read()
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && (scope.is_none() || ns.as_deref() == scope))
            .map(|(_, resource)| resource)
            .filter(|resource| resource.matches_selector(&selector))
            .cloned()
            .collect())
    }

    async fn patch(&self, resource: &Resource) -> Result<Resource> {
        let kind = resource.kind();
        let namespace = resource.namespace();
        self.record(Operation::Patch, kind, namespace, Some(resource.name()))?;

        let key = object_key(kind, namespace, resource.name());
        let current = self
            .objects
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::ResourceNotFound {
                kind: kind.to_string(),
                name: resource.name().to_string(),
            })?;

        let mut updated = encode(&current)?;
        overlay(&mut updated, &encode(resource)?);
        let patched = decode(kind, updated)?;

        self.objects.write().insert(key, patched.clone());
        Ok(patched)
    }

    async fn delete(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> Result<()> {
        self.record(Operation::Delete, kind, namespace, Some(name))?;

        let key = object_key(kind, namespace, name);
        let mut objects = self.objects.write();
        let removed = objects.remove(&key).ok_or_else(|| Error::ResourceNotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        })?;

        match removed {
            Resource::Namespace(_) => {
                objects.retain(|(_, ns, _), _| ns.as_deref() != Some(name));
            }
            Resource::Deployment(deploy) => {
                let selector = deploy
                    .spec
                    .and_then(|s| s.selector.match_labels)
                    .unwrap_or_default();
                if !selector.is_empty() {
                    objects.retain(|(k, ns, _), r| {
                        !(*k == ResourceKind::Pod
                            && ns.as_deref() == namespace
                            && r.matches_selector(&selector))
                    });
                }
            }
            _ => {}
        }
        debug!("memory: deleted {} {}", kind, name);

        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
