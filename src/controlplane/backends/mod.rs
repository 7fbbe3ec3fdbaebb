//! Resource Backend Adapters
//!
//! Provides implementations of the resource backend port:
//! - Cluster: a live cluster reached through kube-rs
//! - Memory: an in-process cluster used by tests and dry runs

pub mod cluster;
pub mod memory;

pub use cluster::*;
pub use memory::*;

use crate::domain::ports::{Resource, ResourceBackendRef, ResourceKind};
use crate::error::{Error, Result};
use serde_json::Value;
use std::sync::Arc;

/// Factory for creating resource backend adapters
pub struct BackendFactory;

impl BackendFactory {
    /// Create a backend adapter by name
    pub async fn create(name: &str, config: BackendConfig) -> Result<ResourceBackendRef> {
        match name.to_lowercase().as_str() {
            "kube" | "openshift" | "cluster" => {
                Ok(Arc::new(KubeBackend::connect(config.kube).await?))
            }
            "memory" | "dry-run" => Ok(Arc::new(InMemoryBackend::new())),
            _ => Err(Error::Configuration(format!("Unknown backend: {}", name))),
        }
    }
}

/// Combined backend configuration
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    pub kube: KubeBackendConfig,
}

// =============================================================================
// JSON Codec
// =============================================================================

/// Serialize a typed descriptor into its API object body
pub fn encode(resource: &Resource) -> Result<Value> {
    let value = match resource {
        Resource::Namespace(r) => serde_json::to_value(r)?,
        Resource::ServiceAccount(r) => serde_json::to_value(r)?,
        Resource::RoleBinding(r) => serde_json::to_value(r)?,
        Resource::PersistentVolumeClaim(r) => serde_json::to_value(r)?,
        Resource::ConfigMap(r) => serde_json::to_value(r)?,
        Resource::Secret(r) => serde_json::to_value(r)?,
        Resource::Deployment(r) => serde_json::to_value(r)?,
        Resource::Service(r) => serde_json::to_value(r)?,
        Resource::Route(r) => serde_json::to_value(r)?,
        Resource::Pod(r) => serde_json::to_value(r)?,
        Resource::StorageClass(r) => serde_json::to_value(r)?,
    };
    Ok(value)
}

/// Deserialize an API object body of the given kind
pub fn decode(kind: ResourceKind, value: Value) -> Result<Resource> {
    let resource = match kind {
        ResourceKind::Namespace => Resource::Namespace(serde_json::from_value(value)?),
        ResourceKind::ServiceAccount => Resource::ServiceAccount(serde_json::from_value(value)?),
        ResourceKind::RoleBinding => Resource::RoleBinding(serde_json::from_value(value)?),
        ResourceKind::PersistentVolumeClaim => {
            Resource::PersistentVolumeClaim(serde_json::from_value(value)?)
        }
        ResourceKind::ConfigMap => Resource::ConfigMap(serde_json::from_value(value)?),
        ResourceKind::Secret => Resource::Secret(serde_json::from_value(value)?),
        ResourceKind::Deployment => Resource::Deployment(serde_json::from_value(value)?),
        ResourceKind::Service => Resource::Service(serde_json::from_value(value)?),
        ResourceKind::Route => Resource::Route(serde_json::from_value(value)?),
        ResourceKind::Pod => Resource::Pod(serde_json::from_value(value)?),
        ResourceKind::StorageClass => Resource::StorageClass(serde_json::from_value(value)?),
    };
    Ok(resource)
}

/// Apply a JSON merge patch (RFC 7386) to `target`
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Apply a patch body the way the backends update objects
///
/// Metadata is merge-patched so labels and annotations accumulate. Every other
/// top-level field present in `body` replaces the current one as a whole, so a
/// ConfigMap's `data` ends up with exactly the keys of the body.
pub fn overlay(target: &mut Value, body: &Value) {
    match (target, body) {
        (Value::Object(target), Value::Object(body)) => {
            for (key, value) in body {
                if key == "metadata" {
                    merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
                } else {
                    target.insert(key.clone(), value.clone());
                }
            }
        }
        (target, body) => *target = body.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;

    #[test]
    fn test_merge_patch_semantics() {
        let mut target = json!({
            "metadata": {"name": "cfg", "labels": {"app": "ocpappsim"}},
            "data": {"action": "create", "stale": "x"}
        });
        merge_patch(
            &mut target,
            &json!({"data": {"action": "stop", "stale": null}, "metadata": {"labels": {"owner": "bob"}}}),
        );

        assert_eq!(target["data"], json!({"action": "stop"}));
        assert_eq!(target["metadata"]["labels"]["app"], "ocpappsim");
        assert_eq!(target["metadata"]["labels"]["owner"], "bob");
    }

    #[test]
    fn test_overlay_replaces_content_and_merges_metadata() {
        let mut target = json!({
            "metadata": {"name": "cfg", "resourceVersion": "7", "labels": {"app": "ocpappsim"}},
            "data": {"action": "create", "stale": "x"},
            "binaryData": {"blob": "AA=="}
        });
        overlay(
            &mut target,
            &json!({
                "metadata": {"name": "cfg", "labels": {"owner": "bob"}},
                "data": {"action": "stop"}
            }),
        );

        assert_eq!(target["data"], json!({"action": "stop"}));
        assert_eq!(target["binaryData"]["blob"], "AA==");
        assert_eq!(target["metadata"]["resourceVersion"], "7");
        assert_eq!(target["metadata"]["labels"]["app"], "ocpappsim");
        assert_eq!(target["metadata"]["labels"]["owner"], "bob");
    }

    #[test]
    fn test_codec_keeps_type_meta() {
        let cm = Resource::ConfigMap(ConfigMap {
            metadata: ObjectMeta {
                name: Some("ocpappsim-cfg".into()),
                namespace: Some("sim-a".into()),
                ..Default::default()
            },
            ..Default::default()
        });

        let value = encode(&cm).unwrap();
        assert_eq!(value["kind"], "ConfigMap");
        assert_eq!(value["apiVersion"], "v1");

        let decoded = decode(ResourceKind::ConfigMap, value).unwrap();
        assert_eq!(decoded, cm);
    }

    #[tokio::test]
    async fn test_factory_rejects_unknown_backend() {
        let result = BackendFactory::create("etcd", BackendConfig::default()).await;
        assert!(matches!(result, Err(Error::Configuration(_))));

        let memory = BackendFactory::create("memory", BackendConfig::default())
            .await
            .unwrap();
        assert_eq!(memory.backend_name(), "memory");
    }
}
