//! Typed manifests for every object of a simulator topology
//!
//! Objects are built from k8s-openapi types and only turned into JSON by the
//! backend adapter.

use crate::controlplane::naming::ResourceNames;
use crate::controlplane::orchestrator::OrchestratorConfig;
use crate::crd::{Route, RoutePort, RouteSpec, RouteTargetReference};
use crate::domain::settings::{Settings, SimulatorAction};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, LocalObjectReference, Namespace,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource,
    PodSpec, PodTemplateSpec, Secret, Service, ServiceAccount, ServicePort, ServiceSpec, Volume,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

/// ConfigMap key holding the simulator action
pub const ACTION_KEY: &str = "action";

/// ConfigMap key holding the simulator properties file
pub const PROPERTIES_KEY: &str = "settings.properties";

const DOCKER_CONFIG_KEY: &str = ".dockerconfigjson";
const DOCKER_CONFIG_TYPE: &str = "kubernetes.io/dockerconfigjson";
const DATA_VOLUME: &str = "pvol";
const CONFIG_VOLUME: &str = "config-volume";

/// Builds the objects of one application topology
pub struct ManifestBuilder<'a> {
    config: &'a OrchestratorConfig,
    names: &'a ResourceNames,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(config: &'a OrchestratorConfig, names: &'a ResourceNames) -> Self {
        Self { config, names }
    }

    fn labels(&self, extra: &[(&str, &str)]) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), self.names.app().to_string());
        for (k, v) in extra {
            labels.insert(k.to_string(), v.to_string());
        }
        labels
    }

    fn meta(&self, name: impl Into<String>, namespace: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            namespace: Some(namespace.to_string()),
            labels: Some(self.labels(&[])),
            ..Default::default()
        }
    }

    /// Namespace carrying the membership and ownership labels
    pub fn namespace(&self, settings: &Settings) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(settings.namespace.clone()),
                labels: Some(self.labels(&[
                    ("name", settings.namespace.as_str()),
                    ("owner", settings.user_name.as_str()),
                ])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn service_account(&self, namespace: &str) -> ServiceAccount {
        ServiceAccount {
            metadata: self.meta(self.names.service_account(), namespace),
            ..Default::default()
        }
    }

    /// Grants the service account the elevated security context constraint
    pub fn role_binding(&self, namespace: &str) -> RoleBinding {
        RoleBinding {
            metadata: self.meta(self.names.role_binding(), namespace),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: self.config.scc_cluster_role.clone(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: self.names.service_account(),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            }]),
        }
    }

    pub fn pvc(&self, name: impl Into<String>, settings: &Settings) -> PersistentVolumeClaim {
        let mut requests = BTreeMap::new();
        requests.insert("storage".to_string(), Quantity(settings.pvc_size.clone()));

        PersistentVolumeClaim {
            metadata: self.meta(name, &settings.namespace),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec![settings.access_mode.as_str().to_string()]),
                volume_mode: Some("Filesystem".to_string()),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(requests),
                    limits: None,
                }),
                storage_class_name: Some(settings.storage_class.clone()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Simulator configuration; the data is always written as a whole
    pub fn config_map(&self, settings: &Settings, action: SimulatorAction) -> ConfigMap {
        let mut data = BTreeMap::new();
        data.insert(ACTION_KEY.to_string(), action.as_str().to_string());
        data.insert(PROPERTIES_KEY.to_string(), self.properties(settings));

        ConfigMap {
            metadata: self.meta(self.names.config_map(), &settings.namespace),
            data: Some(data),
            ..Default::default()
        }
    }

    fn properties(&self, settings: &Settings) -> String {
        let mut lines = vec![
            format!("APPSIM_FS_USED_MAX={}", settings.fs_used),
            format!("APPSIM_PATH={}", self.config.data_mount_path),
        ];
        lines.extend(
            settings
                .tuning
                .properties()
                .into_iter()
                .map(|(key, value)| format!("{}={}", key, value)),
        );
        lines.join("\n")
    }

    /// Registry pull credential
    pub fn pull_secret(&self, namespace: &str) -> Secret {
        let mut data = BTreeMap::new();
        data.insert(
            DOCKER_CONFIG_KEY.to_string(),
            ByteString(self.config.pull_secret_config.as_bytes().to_vec()),
        );

        Secret {
            metadata: self.meta(self.names.pull_secret(), namespace),
            type_: Some(DOCKER_CONFIG_TYPE.to_string()),
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn deployment(&self, unit: u32, settings: &Settings) -> Deployment {
        let name = self.names.deployment(unit);
        let mut selector = BTreeMap::new();
        selector.insert("app".to_string(), name.clone());

        let container = Container {
            name: self.config.container_name.clone(),
            image: Some(settings.container_image.clone()),
            ports: Some(vec![ContainerPort {
                container_port: self.config.container_port,
                ..Default::default()
            }]),
            volume_mounts: Some(vec![
                VolumeMount {
                    mount_path: self.config.data_mount_path.clone(),
                    name: DATA_VOLUME.to_string(),
                    ..Default::default()
                },
                VolumeMount {
                    mount_path: self.config.config_mount_path.clone(),
                    name: CONFIG_VOLUME.to_string(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };

        let volumes = vec![
            Volume {
                name: DATA_VOLUME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: self.names.pvc_for(unit, settings.pvc_shared),
                    read_only: Some(false),
                }),
                ..Default::default()
            },
            Volume {
                name: CONFIG_VOLUME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: Some(self.names.config_map()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ];

        Deployment {
            metadata: self.meta(name, &settings.namespace),
            spec: Some(DeploymentSpec {
                replicas: Some(settings.replicas as i32),
                selector: LabelSelector {
                    match_labels: Some(selector.clone()),
                    match_expressions: None,
                },
                strategy: Some(DeploymentStrategy::default()),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(selector),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        service_account_name: Some(self.names.service_account()),
                        image_pull_secrets: Some(vec![LocalObjectReference {
                            name: Some(self.names.pull_secret().to_string()),
                        }]),
                        containers: vec![container],
                        volumes: Some(volumes),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Service selecting exactly the pods of the unit's deployment
    pub fn service(&self, unit: u32, namespace: &str) -> Service {
        let mut selector = BTreeMap::new();
        selector.insert("app".to_string(), self.names.deployment(unit));

        Service {
            metadata: self.meta(self.names.service(unit), namespace),
            spec: Some(ServiceSpec {
                selector: Some(selector),
                ports: Some(vec![ServicePort {
                    protocol: Some("TCP".to_string()),
                    port: self.config.container_port,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Route targeting exactly the unit's service
    pub fn route(&self, unit: u32, namespace: &str) -> Route {
        let mut route = Route::new(
            &self.names.route(unit),
            RouteSpec {
                host: None,
                to: RouteTargetReference {
                    kind: "Service".to_string(),
                    name: self.names.service(unit),
                    weight: Some(100),
                },
                port: Some(RoutePort {
                    target_port: self.config.container_port,
                }),
            },
        );
        route.metadata.namespace = Some(namespace.to_string());
        route.metadata.labels = Some(self.labels(&[]));
        route
    }
}
