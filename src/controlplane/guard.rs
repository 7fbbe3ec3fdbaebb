//! Ownership Guard
//!
//! A namespace belongs to the simulator when it carries the membership label
//! and a `name` label equal to its own name. The `owner` label names the user
//! allowed to mutate it.

use crate::domain::ports::{Resource, ResourceBackend, ResourceKind};
use crate::domain::settings::validate_namespace;
use crate::error::{Error, Result};
use tracing::debug;

/// Owner reported for managed namespaces without an owner label
pub const UNKNOWN_OWNER: &str = "unknown";

/// Label keys forming the namespace ownership record
pub const APP_LABEL: &str = "app";
pub const NAME_LABEL: &str = "name";
pub const OWNER_LABEL: &str = "owner";

/// A recognized, managed namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedNamespace {
    pub name: String,
    pub owner: String,
}

/// Decides whether a namespace is managed and who may change it
#[derive(Debug, Clone)]
pub struct OwnershipGuard {
    app: String,
}

impl OwnershipGuard {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into() }
    }

    /// Recognize a namespace record as managed
    ///
    /// `record` is the namespace object as read from the cluster, `None` when
    /// it does not exist.
    pub fn recognize(
        &self,
        namespace: &str,
        record: Option<&Resource>,
    ) -> Result<ManagedNamespace> {
        let not_managed = || Error::NotManagedNamespace {
            namespace: namespace.to_string(),
        };
        let record = record.ok_or_else(not_managed)?;

        if record.label(APP_LABEL) != Some(self.app.as_str())
            || record.label(NAME_LABEL) != Some(namespace)
        {
            return Err(not_managed());
        }

        Ok(ManagedNamespace {
            name: namespace.to_string(),
            owner: record
                .label(OWNER_LABEL)
                .unwrap_or(UNKNOWN_OWNER)
                .to_string(),
        })
    }

    /// Check that `user` may mutate the namespace
    pub fn authorize(
        &self,
        namespace: &str,
        record: Option<&Resource>,
        user: &str,
        force: bool,
    ) -> Result<ManagedNamespace> {
        let managed = self.recognize(namespace, record)?;
        if force || managed.owner == user {
            Ok(managed)
        } else {
            Err(Error::OwnershipDenied {
                namespace: managed.name,
                owner: managed.owner,
            })
        }
    }

    /// Read the namespace through the backend and authorize `user` on it
    ///
    /// Malformed names are rejected before the backend is called.
    pub async fn check(
        &self,
        backend: &dyn ResourceBackend,
        namespace: &str,
        user: &str,
        force: bool,
    ) -> Result<ManagedNamespace> {
        validate_namespace(namespace)?;
        let record = backend.get(ResourceKind::Namespace, None, namespace).await?;
        let managed = self.authorize(namespace, record.as_ref(), user, force)?;
        debug!(
            "Namespace {} owned by {} authorized for {} (force={})",
            managed.name, managed.owner, user, force
        );
        Ok(managed)
    }
}
