//! Cluster Backend Adapter
//!
//! Talks to the OpenShift API server through kube-rs. Typed descriptors are
//! serialized here and sent as dynamic objects, so one code path serves every
//! kind the orchestrator uses.

use super::{decode, encode, overlay};
use crate::crd::Route;
use crate::domain::ports::{Operation, Resource, ResourceBackend, ResourceKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, TypeMeta};
use kube::{Client, Config};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings for one cluster session
#[derive(Clone, Default)]
pub struct KubeBackendConfig {
    /// API server URL; the ambient kubeconfig is used when unset
    pub endpoint: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Bearer token, preferred over user and password
    pub token: Option<String>,
    /// Skip TLS verification of the API server certificate
    pub accept_invalid_certs: bool,
}

impl std::fmt::Debug for KubeBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeBackendConfig")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

impl KubeBackendConfig {
    /// Bearer token for the session, logging in with user and password when
    /// no token is configured
    pub async fn bearer_token(&self, endpoint: &str) -> Result<String> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => {
                request_token(endpoint, user, password, self.accept_invalid_certs).await
            }
            _ => Err(Error::Configuration(
                "A token or a user and password are required to log in to the cluster".into(),
            )),
        }
    }

    /// Kubeconfig for an explicit endpoint authenticated with a bearer token
    pub fn kubeconfig(&self, endpoint: &str, token: &str) -> Result<Kubeconfig> {
        let kubeconfig = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Config",
            "current-context": "ocpappsim",
            "clusters": [{
                "name": "ocpappsim",
                "cluster": {
                    "server": endpoint,
                    "insecure-skip-tls-verify": self.accept_invalid_certs,
                }
            }],
            "users": [{ "name": "ocpappsim", "user": { "token": token } }],
            "contexts": [{
                "name": "ocpappsim",
                "context": { "cluster": "ocpappsim", "user": "ocpappsim" }
            }],
        }))?;
        Ok(kubeconfig)
    }
}

// =============================================================================
// OAuth Login
// =============================================================================

/// OAuth client that answers with a Basic auth challenge instead of a login page
const CHALLENGING_CLIENT: &str = "openshift-challenging-client";

#[derive(Debug, Deserialize)]
struct OAuthMetadata {
    authorization_endpoint: String,
}

/// Exchange user credentials for an access token at the cluster's OAuth server
///
/// The API server rejects Basic auth, so the implicit grant of the challenging
/// client is used: the token comes back in the fragment of the redirect.
pub async fn request_token(
    endpoint: &str,
    user: &str,
    password: &str,
    accept_invalid_certs: bool,
) -> Result<String> {
    let http = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()?;

    let discovery = format!(
        "{}/.well-known/oauth-authorization-server",
        endpoint.trim_end_matches('/')
    );
    debug!("GET {}", discovery);
    let metadata: OAuthMetadata = http
        .get(&discovery)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    debug!("Requesting token for {} from {}", user, metadata.authorization_endpoint);
    let response = http
        .get(&metadata.authorization_endpoint)
        .query(&[("response_type", "token"), ("client_id", CHALLENGING_CLIENT)])
        .basic_auth(user, Some(password))
        .header("X-CSRF-Token", "1")
        .send()
        .await?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Configuration(format!(
            "Login to the cluster failed for user {}",
            user
        )));
    }

    let token = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|location| location.to_str().ok())
        .and_then(token_from_redirect);
    token.ok_or_else(|| Error::BackendOperationFailed {
        backend: "kube".to_string(),
        operation: "login".to_string(),
        reason: format!("no access token in OAuth response ({})", response.status()),
    })
}

/// `access_token` parameter of a redirect URL fragment
fn token_from_redirect(location: &str) -> Option<String> {
    let url = reqwest::Url::parse(location).ok()?;
    url.fragment()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("access_token="))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Kube Backend
// =============================================================================

/// Resource backend bound to one authenticated cluster session
#[derive(Clone)]
pub struct KubeBackend {
    client: Client,
}

impl KubeBackend {
    /// Open a session; established once and never refreshed
    pub async fn connect(config: KubeBackendConfig) -> Result<Self> {
        let kube_config = match config.endpoint.as_deref() {
            Some(endpoint) => {
                let token = config.bearer_token(endpoint).await?;
                let kubeconfig = config.kubeconfig(endpoint, &token)?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
            }
            None => Config::infer()
                .await
                .map_err(|e| Error::Configuration(format!("No cluster configuration: {}", e)))?,
        };
        info!("Connecting to cluster at {}", kube_config.cluster_url);

        Ok(Self {
            client: Client::try_from(kube_config)?,
        })
    }

    fn api(&self, kind: ResourceKind, namespace: Option<&str>) -> (Api<DynamicObject>, ApiResource) {
        let ar = api_resource(kind);
        let api = match namespace {
            Some(ns) if kind.is_namespaced() => {
                Api::namespaced_with(self.client.clone(), ns, &ar)
            }
            _ => Api::all_with(self.client.clone(), &ar),
        };
        (api, ar)
    }
}

/// API group, version and plural of each kind
pub fn api_resource(kind: ResourceKind) -> ApiResource {
    match kind {
        ResourceKind::Namespace => ApiResource::erase::<Namespace>(&()),
        ResourceKind::ServiceAccount => ApiResource::erase::<ServiceAccount>(&()),
        ResourceKind::RoleBinding => ApiResource::erase::<RoleBinding>(&()),
        ResourceKind::PersistentVolumeClaim => ApiResource::erase::<PersistentVolumeClaim>(&()),
        ResourceKind::ConfigMap => ApiResource::erase::<ConfigMap>(&()),
        ResourceKind::Secret => ApiResource::erase::<Secret>(&()),
        ResourceKind::Deployment => ApiResource::erase::<Deployment>(&()),
        ResourceKind::Service => ApiResource::erase::<Service>(&()),
        ResourceKind::Route => ApiResource::erase::<Route>(&()),
        ResourceKind::Pod => ApiResource::erase::<Pod>(&()),
        ResourceKind::StorageClass => ApiResource::erase::<StorageClass>(&()),
    }
}

/// Map API status codes onto the crate's resource errors
fn map_api_error(err: kube::Error, kind: ResourceKind, name: &str) -> Error {
    match &err {
        kube::Error::Api(resp) if resp.code == 409 => Error::ResourceExists {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(resp) if resp.code == 404 => Error::ResourceNotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        _ => Error::Kube(err),
    }
}

fn to_dynamic(resource: &Resource) -> Result<DynamicObject> {
    Ok(serde_json::from_value(encode(resource)?)?)
}

/// List items come back without type meta; restore it before decoding
fn from_dynamic(kind: ResourceKind, ar: &ApiResource, mut obj: DynamicObject) -> Result<Resource> {
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        });
    }
    decode(kind, serde_json::to_value(obj)?)
}

#[async_trait]
impl ResourceBackend for KubeBackend {
    async fn create(&self, resource: &Resource) -> Result<Resource> {
        let kind = resource.kind();
        let (api, ar) = self.api(kind, resource.namespace());
        debug!("POST {} {}", kind, resource.name());

        let created = api
            .create(&PostParams::default(), &to_dynamic(resource)?)
            .await
            .map_err(|e| map_api_error(e, kind, resource.name()))?;
        from_dynamic(kind, &ar, created)
    }

    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<Resource>> {
        let (api, ar) = self.api(kind, namespace);
        debug!("GET {} {}", kind, name);

        match api
            .get_opt(name)
            .await
            .map_err(|e| map_api_error(e, kind, name))?
        {
            Some(obj) => Ok(Some(from_dynamic(kind, &ar, obj)?)),
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Resource>> {
        let (api, ar) = self.api(kind, namespace);
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        debug!("LIST {} selector={:?}", kind, label_selector);

        let list = api
            .list(&params)
            .await
            .map_err(|e| map_api_error(e, kind, "*"))?;
        list.items
            .into_iter()
            .map(|obj| from_dynamic(kind, &ar, obj))
            .collect()
    }

    async fn patch(&self, resource: &Resource) -> Result<Resource> {
        let kind = resource.kind();
        let name = resource.name();
        let (api, ar) = self.api(kind, resource.namespace());
        debug!("UPDATE {} {}", kind, name);

        // read-modify-replace; the fetched resourceVersion guards the write
        let current = api.get(name).await.map_err(|e| map_api_error(e, kind, name))?;
        let mut body = serde_json::to_value(current)?;
        overlay(&mut body, &encode(resource)?);

        let replaced = api
            .replace(name, &PostParams::default(), &serde_json::from_value(body)?)
            .await
            .map_err(|e| match e {
                kube::Error::Api(resp) if resp.code == 409 => Error::BackendOperationFailed {
                    backend: self.backend_name().to_string(),
                    operation: Operation::Patch.to_string(),
                    reason: format!("{} {} was modified concurrently", kind, name),
                },
                e => map_api_error(e, kind, name),
            })?;
        from_dynamic(kind, &ar, replaced)
    }

    async fn delete(&self, kind: ResourceKind, namespace: Option<&str>, name: &str) -> Result<()> {
        let (api, _) = self.api(kind, namespace);
        debug!("DELETE {} {}", kind, name);

        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| map_api_error(e, kind, name))?;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "kube"
    }
}
