//! OpenShift Route
//!
//! `route.openshift.io/v1` is not part of k8s-openapi, so the subset of the
//! Route schema the simulator needs is declared here as a kube resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Route
// =============================================================================

/// Exposes a Service under a host name on the cluster ingress
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    plural = "routes",
    namespaced,
    status = "RouteStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name": "Host", "type": "string", "jsonPath": ".spec.host"}"#,
    printcolumn = r#"{"name": "Service", "type": "string", "jsonPath": ".spec.to.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Host name; assigned by the router when left empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Backend the route sends traffic to
    pub to: RouteTargetReference,

    /// Port on the target Service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,
}

/// Target of a route
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteTargetReference {
    /// Target kind, always `Service` here
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    pub target_port: i32,
}

/// Status reported by the router
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    #[serde(default)]
    pub ingress: Vec<RouteIngress>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_name: Option<String>,
}

impl Route {
    /// Host the route is reachable under, preferring the spec over admitted ingress
    pub fn host(&self) -> Option<&str> {
        self.spec.host.as_deref().filter(|h| !h.is_empty()).or_else(|| {
            self.status
                .as_ref()
                .and_then(|s| s.ingress.iter().find_map(|i| i.host.as_deref()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_route_api_identity() {
        assert_eq!(Route::group(&()), "route.openshift.io");
        assert_eq!(Route::version(&()), "v1");
        assert_eq!(Route::kind(&()), "Route");
        assert_eq!(Route::plural(&()), "routes");
    }

    #[test]
    fn test_route_serialization() {
        let route = Route::new(
            "ocpappsim0-route",
            RouteSpec {
                host: None,
                to: RouteTargetReference {
                    kind: "Service".into(),
                    name: "ocpappsim0-svc".into(),
                    weight: Some(100),
                },
                port: Some(RoutePort { target_port: 80 }),
            },
        );

        let json = serde_json::to_value(&route).unwrap();
        assert_eq!(json["apiVersion"], "route.openshift.io/v1");
        assert_eq!(json["spec"]["to"]["name"], "ocpappsim0-svc");
        assert_eq!(json["spec"]["port"]["targetPort"], 80);
        assert!(json["spec"].get("host").is_none());
    }

    #[test]
    fn test_host_falls_back_to_ingress() {
        let mut route = Route::new("r", RouteSpec::default());
        assert_eq!(route.host(), None);

        route.status = Some(RouteStatus {
            ingress: vec![RouteIngress {
                host: Some("r-sim-a.apps.example.com".into()),
                router_name: Some("default".into()),
            }],
        });
        assert_eq!(route.host(), Some("r-sim-a.apps.example.com"));

        route.spec.host = Some("custom.example.com".into());
        assert_eq!(route.host(), Some("custom.example.com"));
    }
}
