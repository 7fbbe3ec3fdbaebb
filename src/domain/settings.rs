//! Workload simulation settings
//!
//! Settings are read from a YAML file into [`RawSettings`], merged with the
//! caller's session context and validated into [`Settings`]. Validation never
//! touches the cluster.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;
use std::sync::OnceLock;

/// Highest number of deployment units a simulation may have
pub const MAX_POD_COUNT: u32 = 99;

/// Sentinel that leaves a tuning parameter out of the generated configuration
pub const DEFAULT_SENTINEL: &str = "default";

// =============================================================================
// Enumerations
// =============================================================================

/// PVC access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadWriteMany,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::ReadWriteOnce => "ReadWriteOnce",
            AccessMode::ReadWriteMany => "ReadWriteMany",
        }
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AccessMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ReadWriteOnce" => Ok(AccessMode::ReadWriteOnce),
            "ReadWriteMany" => Ok(AccessMode::ReadWriteMany),
            other => Err(Error::Validation(format!(
                "Access mode {} is not either ReadWriteOnce or ReadWriteMany",
                other
            ))),
        }
    }
}

/// Action the simulator inside the pods should perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulatorAction {
    Create,
    Stop,
    Verify,
}

impl SimulatorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulatorAction::Create => "create",
            SimulatorAction::Stop => "stop",
            SimulatorAction::Verify => "verify",
        }
    }
}

impl std::fmt::Display for SimulatorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SimulatorAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(SimulatorAction::Create),
            "stop" => Ok(SimulatorAction::Stop),
            "verify" => Ok(SimulatorAction::Verify),
            other => Err(Error::Validation(format!(
                "Invalid action {}. Valid values are 'create', 'stop', and 'verify'",
                other
            ))),
        }
    }
}

/// A tuning parameter that is either set or left to the simulator default
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Tunable {
    #[default]
    Default,
    Value(String),
}

impl Tunable {
    fn from_value(value: Option<&Value>) -> Result<Self> {
        match value {
            None | Some(Value::Null) => Ok(Tunable::Default),
            Some(v) => {
                let text = scalar_to_string(v)?;
                if text == DEFAULT_SENTINEL {
                    Ok(Tunable::Default)
                } else {
                    Ok(Tunable::Value(text))
                }
            }
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Tunable::Default => None,
            Tunable::Value(v) => Some(v),
        }
    }
}

/// Optional simulator tuning parameters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimulatorTuning {
    pub init_fill: Tunable,
    pub hourly_new: Tunable,
    pub hourly_mod: Tunable,
    pub hourly_del: Tunable,
    pub size_min: Tunable,
    pub size_max: Tunable,
    pub random: Tunable,
}

impl SimulatorTuning {
    /// Properties that are set, as `(KEY, value)` in a fixed order
    pub fn properties(&self) -> Vec<(&'static str, &str)> {
        [
            ("APPSIM_INIT_FILL", &self.init_fill),
            ("APPSIM_HOURLY_NEW", &self.hourly_new),
            ("APPSIM_HOURLY_MOD", &self.hourly_mod),
            ("APPSIM_HOURLY_DEL", &self.hourly_del),
            ("APPSIM_SIZE_MIN", &self.size_min),
            ("APPSIM_SIZE_MAX", &self.size_max),
            ("APPSIM_RANDOM", &self.random),
        ]
        .into_iter()
        .filter_map(|(key, tunable)| tunable.value().map(|v| (key, v)))
        .collect()
    }
}

// =============================================================================
// Raw Settings (file shape)
// =============================================================================

/// Settings as written in the YAML settings file
///
/// Numeric fields are kept as raw YAML values so that malformed input is
/// reported by validation instead of by the parser.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSettings {
    #[serde(default, alias = "name_space")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
    #[serde(default)]
    pub access_mode: Option<String>,
    #[serde(default)]
    pub pvc_size: Option<Value>,
    #[serde(default)]
    pub pod_count: Option<Value>,
    #[serde(default)]
    pub pvc_shared: Option<bool>,
    #[serde(default)]
    pub replicas: Option<Value>,
    #[serde(default)]
    pub container_image: Option<String>,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub fs_used: Option<Value>,
    #[serde(default)]
    pub init_fill: Option<Value>,
    #[serde(default)]
    pub hourly_new: Option<Value>,
    #[serde(default)]
    pub hourly_mod: Option<Value>,
    #[serde(default)]
    pub hourly_del: Option<Value>,
    #[serde(default)]
    pub size_min: Option<Value>,
    #[serde(default)]
    pub size_max: Option<Value>,
    #[serde(default)]
    pub random: Option<Value>,
}

impl RawSettings {
    /// Read a settings file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Configuration(format!(
                "the settings file {} could not be read: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse settings from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Values supplied by the invocation rather than the settings file
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Namespace given on the command line; the settings file takes precedence
    pub namespace: Option<String>,
    /// Identity recorded as namespace owner
    pub user_name: String,
    /// Image used when the settings file does not name one
    pub default_container_image: String,
    /// Simulator action, modify only
    pub action: Option<String>,
    /// Bypass the ownership check
    pub force: bool,
}

// =============================================================================
// Validated Settings
// =============================================================================

/// Validated settings for one orchestration run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub namespace: String,
    pub user_name: String,
    pub storage_class: String,
    pub access_mode: AccessMode,
    pub pvc_size: String,
    pub pod_count: u32,
    pub pvc_shared: bool,
    pub replicas: u32,
    pub container_image: String,
    pub app_name: String,
    pub fs_used: String,
    pub tuning: SimulatorTuning,
    pub action: Option<SimulatorAction>,
    pub force: bool,
}

impl Settings {
    /// Merge file settings with the session context and validate the result
    pub fn from_raw(raw: RawSettings, ctx: SessionContext) -> Result<Self> {
        let missing: Vec<String> = [
            ("storage_class", raw.storage_class.is_none()),
            ("access_mode", raw.access_mode.is_none()),
            ("pvc_size", raw.pvc_size.is_none()),
            ("pod_count", raw.pod_count.is_none()),
            ("app_name", raw.app_name.is_none()),
            ("fs_used", raw.fs_used.is_none()),
        ]
        .into_iter()
        .filter(|(_, absent)| *absent)
        .map(|(key, _)| key.to_string())
        .collect();
        if !missing.is_empty() {
            return Err(Error::MissingSettings(missing));
        }

        let namespace = raw.namespace.or(ctx.namespace).ok_or_else(|| {
            Error::MissingSettings(vec!["namespace".to_string()])
        })?;

        let pvc_shared = raw.pvc_shared.unwrap_or(true);
        let replicas = match raw.replicas.as_ref() {
            None => {
                if pvc_shared {
                    2
                } else {
                    1
                }
            }
            Some(v) => parse_replicas(v)?,
        };

        let settings = Settings {
            namespace,
            user_name: ctx.user_name,
            storage_class: raw.storage_class.unwrap_or_default(),
            access_mode: raw.access_mode.unwrap_or_default().parse()?,
            pvc_size: raw.pvc_size.as_ref().map(scalar_to_string).transpose()?.unwrap_or_default(),
            pod_count: raw.pod_count.as_ref().map(parse_pod_count).transpose()?.unwrap_or_default(),
            pvc_shared,
            replicas,
            container_image: raw
                .container_image
                .unwrap_or(ctx.default_container_image),
            app_name: raw.app_name.unwrap_or_default(),
            fs_used: raw.fs_used.as_ref().map(scalar_to_string).transpose()?.unwrap_or_default(),
            tuning: SimulatorTuning {
                init_fill: Tunable::from_value(raw.init_fill.as_ref())?,
                hourly_new: Tunable::from_value(raw.hourly_new.as_ref())?,
                hourly_mod: Tunable::from_value(raw.hourly_mod.as_ref())?,
                hourly_del: Tunable::from_value(raw.hourly_del.as_ref())?,
                size_min: Tunable::from_value(raw.size_min.as_ref())?,
                size_max: Tunable::from_value(raw.size_max.as_ref())?,
                random: Tunable::from_value(raw.random.as_ref())?,
            },
            action: ctx.action.as_deref().map(str::parse).transpose()?,
            force: ctx.force,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Check the cross-field rules that must hold before any cluster call
    pub fn validate(&self) -> Result<()> {
        if self.replicas != 1 && self.replicas != 2 {
            return Err(Error::Validation(format!(
                "Replicas {} is not either 1 or 2",
                self.replicas
            )));
        }
        if self.replicas > 1 && !self.pvc_shared {
            return Err(Error::Validation(
                "More than one replica is not allowed unless sharing a single PVC".into(),
            ));
        }
        for (key, value) in [
            ("storage_class", &self.storage_class),
            ("pvc_size", &self.pvc_size),
            ("app_name", &self.app_name),
            ("fs_used", &self.fs_used),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("{} must not be empty", key)));
            }
        }
        validate_namespace(&self.namespace)?;
        if self.pod_count == 0 || self.pod_count > MAX_POD_COUNT {
            return Err(Error::Validation(format!(
                "Invalid value found for parameter pod_count ({}); expected 1..={}",
                self.pod_count, MAX_POD_COUNT
            )));
        }
        if self.access_mode == AccessMode::ReadWriteOnce && self.pod_count > 1 && self.pvc_shared
        {
            return Err(Error::Validation(
                "More than one pod is not allowed with access mode ReadWriteOnce and a shared PVC"
                    .into(),
            ));
        }
        Ok(())
    }

    /// Action to write into the simulator configuration
    pub fn action_or_create(&self) -> SimulatorAction {
        self.action.unwrap_or(SimulatorAction::Create)
    }
}

// =============================================================================
// Field Parsers
// =============================================================================

fn namespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9\-.]{0,251}[a-z0-9]$").expect("namespace pattern is valid")
    })
}

/// Check a namespace name against the cluster naming rules
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace_pattern().is_match(namespace) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "Invalid value found for parameter namespace: {}",
            namespace
        )))
    }
}

/// Parse `pod_count`: one or two digits, 1..=99
pub fn parse_pod_count(value: &Value) -> Result<u32> {
    let invalid = || {
        Error::Validation(format!(
            "Invalid value found for parameter pod_count ({}); expected numeric, max 2 digits",
            scalar_to_string(value).unwrap_or_else(|_| "?".into())
        ))
    };
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(invalid()),
    };
    if text.is_empty() || text.len() > 2 || !text.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let count: u32 = text.parse().map_err(|_| invalid())?;
    if count == 0 {
        return Err(invalid());
    }
    Ok(count)
}

fn parse_replicas(value: &Value) -> Result<u32> {
    let replicas = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    match replicas {
        Some(r @ (1 | 2)) => Ok(r as u32),
        _ => Err(Error::Validation(format!(
            "Replicas {} is not either 1 or 2",
            scalar_to_string(value).unwrap_or_else(|_| "?".into())
        ))),
    }
}

fn scalar_to_string(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::Validation(format!(
            "expected a scalar value, found {}",
            serde_yaml::to_string(other).unwrap_or_default().trim()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    const SAMPLE: &str = r#"
storage_class: ocs-storagecluster-cephfs
access_mode: ReadWriteMany
pvc_size: 10Gi
pod_count: 2
app_name: appsim
fs_used: 80
init_fill: 40
hourly_new: default
random: "yes"
"#;

    fn ctx() -> SessionContext {
        SessionContext {
            namespace: Some("sim-a".into()),
            user_name: "alice".into(),
            default_container_image: "quay.io/appsim/ocpappsim:latest".into(),
            action: None,
            force: false,
        }
    }

    fn sample_settings() -> Settings {
        Settings::from_raw(RawSettings::from_yaml(SAMPLE).unwrap(), ctx()).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let settings = sample_settings();
        assert_eq!(settings.namespace, "sim-a");
        assert_eq!(settings.user_name, "alice");
        assert!(settings.pvc_shared);
        assert_eq!(settings.replicas, 2);
        assert_eq!(settings.container_image, "quay.io/appsim/ocpappsim:latest");
        assert_eq!(settings.fs_used, "80");
        assert_eq!(settings.pod_count, 2);
    }

    #[test]
    fn test_file_namespace_takes_precedence() {
        let yaml = format!("name_space: from-file\n{}", SAMPLE);
        let settings = Settings::from_raw(RawSettings::from_yaml(&yaml).unwrap(), ctx()).unwrap();
        assert_eq!(settings.namespace, "from-file");
    }

    #[test]
    fn test_unshared_defaults_to_single_replica() {
        let yaml = format!("pvc_shared: false\n{}", SAMPLE);
        let settings = Settings::from_raw(RawSettings::from_yaml(&yaml).unwrap(), ctx()).unwrap();
        assert_eq!(settings.replicas, 1);
    }

    #[test]
    fn test_missing_settings_reported_together() {
        let raw = RawSettings::from_yaml("storage_class: gold\npod_count: 1\n").unwrap();
        let err = Settings::from_raw(raw, ctx()).unwrap_err();
        assert_matches!(err, Error::MissingSettings(keys) => {
            assert_eq!(keys, vec!["access_mode", "pvc_size", "app_name", "fs_used"]);
        });
    }

    #[test]
    fn test_pod_count_bounds() {
        for rejected in [
            Value::from(0),
            Value::from(100),
            Value::from("abc"),
            Value::from(-1),
            Value::from(-12),
            Value::from(""),
        ] {
            assert!(parse_pod_count(&rejected).is_err(), "{:?} accepted", rejected);
        }
        assert_eq!(parse_pod_count(&Value::from(1)).unwrap(), 1);
        assert_eq!(parse_pod_count(&Value::from(99)).unwrap(), 99);
        assert_eq!(parse_pod_count(&Value::from("42")).unwrap(), 42);

        let mut settings = sample_settings();
        settings.pod_count = 100;
        assert_matches!(settings.validate(), Err(Error::Validation(_)));
        settings.pod_count = 0;
        assert_matches!(settings.validate(), Err(Error::Validation(_)));
    }

    #[test]
    fn test_read_write_once_with_shared_pvc() {
        let mut settings = sample_settings();
        settings.access_mode = AccessMode::ReadWriteOnce;
        settings.pvc_shared = true;
        settings.pod_count = 3;
        assert_matches!(settings.validate(), Err(Error::Validation(_)));

        settings.pod_count = 1;
        assert!(settings.validate().is_ok());

        settings.pod_count = 3;
        settings.pvc_shared = false;
        settings.replicas = 1;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_replica_rules() {
        let yaml = format!("replicas: 3\n{}", SAMPLE);
        let err = Settings::from_raw(RawSettings::from_yaml(&yaml).unwrap(), ctx()).unwrap_err();
        assert_matches!(err, Error::Validation(_));

        let yaml = format!("replicas: 2\npvc_shared: false\n{}", SAMPLE);
        let err = Settings::from_raw(RawSettings::from_yaml(&yaml).unwrap(), ctx()).unwrap_err();
        assert_matches!(err, Error::Validation(msg) => assert!(msg.contains("sharing")));
    }

    #[test]
    fn test_namespace_pattern() {
        assert!(validate_namespace("sim-a").is_ok());
        assert!(validate_namespace("a1.b2").is_ok());
        assert!(validate_namespace("a").is_err());
        assert!(validate_namespace("Sim-A").is_err());
        assert!(validate_namespace("-sim").is_err());
        assert!(validate_namespace("sim-").is_err());
        assert!(validate_namespace("sim_a").is_err());
    }

    #[test]
    fn test_action_parsing() {
        let mut context = ctx();
        context.action = Some("verify".into());
        let settings =
            Settings::from_raw(RawSettings::from_yaml(SAMPLE).unwrap(), context.clone()).unwrap();
        assert_eq!(settings.action, Some(SimulatorAction::Verify));

        context.action = Some("start".into());
        let err = Settings::from_raw(RawSettings::from_yaml(SAMPLE).unwrap(), context).unwrap_err();
        assert_matches!(err, Error::Validation(_));
    }

    #[test]
    fn test_tuning_properties_skip_defaults() {
        let settings = sample_settings();
        assert_eq!(
            settings.tuning.properties(),
            vec![("APPSIM_INIT_FILL", "40"), ("APPSIM_RANDOM", "yes")]
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let raw = RawSettings::from_file(file.path()).unwrap();
        assert_eq!(raw.storage_class.as_deref(), Some("ocs-storagecluster-cephfs"));

        let err = RawSettings::from_file("/nonexistent/settings.yaml").unwrap_err();
        assert_matches!(err, Error::Configuration(_));
    }
}
