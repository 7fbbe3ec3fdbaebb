//! Error types for OcpAppSim
//!
//! Provides structured error types for settings validation, namespace
//! ownership, backend calls and topology inspection.

use thiserror::Error;

/// Unified error type for the orchestration engine
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid settings: {0}")]
    Validation(String),

    #[error("Mandatory setting(s) missing: {}", .0.join(", "))]
    MissingSettings(Vec<String>),

    // =========================================================================
    // Authorization Errors
    // =========================================================================
    #[error("The namespace {namespace} does not exist or it is not a valid ocpappsim namespace")]
    NotManagedNamespace { namespace: String },

    #[error("The namespace {namespace} is owned by another user ({owner}); use --force to override")]
    OwnershipDenied { namespace: String, owner: String },

    // =========================================================================
    // Kubernetes / Backend Errors
    // =========================================================================
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    #[error("Backend operation failed: {backend} - {operation}: {reason}")]
    BackendOperationFailed {
        backend: String,
        operation: String,
        reason: String,
    },

    #[error("{step} failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Topology Errors
    // =========================================================================
    #[error("Storage class {name} was not found on the cluster")]
    StorageClassNotFound { name: String, available: Vec<String> },

    #[error("Inconsistent topology: {pods} pod(s) cannot be split into deployments of {replicas} replica(s)")]
    InconsistentTopology { pods: usize, replicas: u32 },

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Non-fatal diagnostics collected while a workflow runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The requested settings ask for a change the cluster cannot apply in place
    UnsupportedChange {
        setting: ChangedSetting,
        current: String,
        requested: String,
    },
    /// Some deletions failed during removal
    ManualCleanup { failures: usize },
}

/// PVC properties that cannot be changed on an existing deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangedSetting {
    StorageClass,
    Capacity,
}

impl std::fmt::Display for ChangedSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangedSetting::StorageClass => write!(f, "storage class"),
            ChangedSetting::Capacity => write!(f, "capacity"),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnsupportedChange {
                setting,
                current,
                requested,
            } => write!(
                f,
                "Unsupported operation: cannot change {} of existing PVC from {} to {}",
                setting, current, requested
            ),
            Warning::ManualCleanup { failures } => write!(
                f,
                "{} resource group(s) could not be removed properly and might require some manual clean-up",
                failures
            ),
        }
    }
}

impl Error {
    /// Wrap a backend failure with the step that triggered it
    pub fn step(step: impl Into<String>, source: Error) -> Self {
        Error::StepFailed {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_)
            | Error::MissingSettings(_)
            | Error::StorageClassNotFound { .. }
            | Error::Configuration(_)
            | Error::YamlParse(_) => 2,

            Error::NotManagedNamespace { .. } | Error::OwnershipDenied { .. } => 3,

            Error::Kube(_)
            | Error::Kubeconfig(_)
            | Error::ResourceNotFound { .. }
            | Error::ResourceExists { .. }
            | Error::BackendOperationFailed { .. }
            | Error::StepFailed { .. }
            | Error::InconsistentTopology { .. }
            | Error::Http(_) => 4,

            _ => 1,
        }
    }

    /// Check if this error was raised before anything touched the cluster
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::MissingSettings(_)
                | Error::NotManagedNamespace { .. }
                | Error::OwnershipDenied { .. }
        )
    }

    /// Check if this error is transient, i.e. re-running the workflow may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(resp)) => resp.code >= 500 || resp.code == 429,
            Error::Kube(_) | Error::Http(_) | Error::BackendOperationFailed { .. } => true,
            Error::StepFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for the orchestration engine
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let err = Error::Validation("bad pod_count".into());
        assert_eq!(err.exit_code(), 2);

        let err = Error::OwnershipDenied {
            namespace: "sim-a".into(),
            owner: "alice".into(),
        };
        assert_eq!(err.exit_code(), 3);

        let err = Error::step(
            "create ConfigMap ocpappsim-cfg",
            Error::ResourceExists {
                kind: "ConfigMap".into(),
                name: "ocpappsim-cfg".into(),
            },
        );
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_step_failure_message() {
        let err = Error::step(
            "delete Secret regcred",
            Error::ResourceNotFound {
                kind: "Secret".into(),
                name: "regcred".into(),
            },
        );
        assert_eq!(
            err.to_string(),
            "delete Secret regcred failed: Resource not found: Secret/regcred"
        );
    }

    #[test]
    fn test_transient_classification() {
        let transient = Error::step(
            "create Route ocpappsim0-route",
            Error::BackendOperationFailed {
                backend: "memory".into(),
                operation: "create".into(),
                reason: "connection reset".into(),
            },
        );
        assert!(transient.is_transient());
        assert!(!transient.is_rejection());

        let rejected = Error::MissingSettings(vec!["pvc_size".into()]);
        assert!(!rejected.is_transient());
        assert!(rejected.is_rejection());
    }

    #[test]
    fn test_warning_display() {
        let warning = Warning::UnsupportedChange {
            setting: ChangedSetting::StorageClass,
            current: "gold".into(),
            requested: "silver".into(),
        };
        assert_eq!(
            warning.to_string(),
            "Unsupported operation: cannot change storage class of existing PVC from gold to silver"
        );
    }
}
