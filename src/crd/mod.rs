//! Custom resource types that k8s-openapi does not provide
//!
//! - Route: OpenShift ingress route for one simulator unit

pub mod route;

pub use route::*;
