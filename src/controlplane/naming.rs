//! Deterministic resource names
//!
//! Every name is derived from the application name and, for per-unit
//! objects, the unit index.

/// Name generator for one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    app: String,
    pull_secret: String,
}

impl ResourceNames {
    pub fn new(app: impl Into<String>, pull_secret: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            pull_secret: pull_secret.into(),
        }
    }

    /// Application name used for the membership label
    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn deployment(&self, unit: u32) -> String {
        format!("{}-{}", self.app, unit)
    }

    pub fn service(&self, unit: u32) -> String {
        format!("{}{}-svc", self.app, unit)
    }

    pub fn route(&self, unit: u32) -> String {
        format!("{}{}-route", self.app, unit)
    }

    /// Dedicated PVC of a unit
    pub fn unit_pvc(&self, unit: u32) -> String {
        format!("{}-pvc-{}", self.app, unit)
    }

    /// The one PVC all units mount in shared mode
    pub fn shared_pvc(&self) -> String {
        format!("{}-pvc", self.app)
    }

    /// PVC mounted by a unit
    pub fn pvc_for(&self, unit: u32, shared: bool) -> String {
        if shared {
            self.shared_pvc()
        } else {
            self.unit_pvc(unit)
        }
    }

    pub fn config_map(&self) -> String {
        format!("{}-cfg", self.app)
    }

    pub fn service_account(&self) -> String {
        format!("{}-sa", self.app)
    }

    pub fn role_binding(&self) -> String {
        format!("{}:scc:anyuid", self.app)
    }

    pub fn pull_secret(&self) -> &str {
        &self.pull_secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_names() {
        let names = ResourceNames::new("ocpappsim", "regcred");
        assert_eq!(names.deployment(3), "ocpappsim-3");
        assert_eq!(names.service(3), "ocpappsim3-svc");
        assert_eq!(names.route(3), "ocpappsim3-route");
        assert_eq!(names.unit_pvc(3), "ocpappsim-pvc-3");
        assert_eq!(names.pvc_for(3, true), "ocpappsim-pvc");
        assert_eq!(names.pvc_for(3, false), "ocpappsim-pvc-3");
    }

    #[test]
    fn test_shared_names() {
        let names = ResourceNames::new("ocpappsim", "regcred");
        assert_eq!(names.config_map(), "ocpappsim-cfg");
        assert_eq!(names.service_account(), "ocpappsim-sa");
        assert_eq!(names.role_binding(), "ocpappsim:scc:anyuid");
        assert_eq!(names.pull_secret(), "regcred");
    }
}
