//! Manager-level configuration (spec §6): which backend is active, the raw config blob handed to
//! its factory, the cache file path, and the `scheduling-class` annotation's name -> tuple table.
//! Follows the same `*Raw` + `Option<T>` + `Default` pattern as `topology_policy::config` and
//! `balloons_policy::config`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use policy_core::config::{parse_config_value, parse_options};
use policy_core::{ConfigError, IoClass, SchedPolicy, SchedulingClass};

const DEFAULT_CACHE_FILE: &str = "resource-policy-cache.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerConfigRaw {
    /// `policy: topology-aware | balloons`, matching the backends' own `BACKEND_NAME` constants.
    pub policy: Option<String>,
    #[serde(rename = "cacheFile")]
    pub cache_file: Option<String>,
    /// The active backend's own configuration, passed through to its `BackendFactory` untouched.
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub control: Option<ControlRaw>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlRaw {
    /// `control.schedulingClasses.<name>`: a `policy_core::config` value string such as
    /// `"fifo[priority=10,ioClass=realtime,ioPriority=4]"`, the same `name[options]` grammar the
    /// teacher uses to parametrize placement algorithms, reused here per
    /// `policy_core::config`'s own doc comment.
    #[serde(rename = "schedulingClasses")]
    pub scheduling_classes: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub backend_name: String,
    pub backend_config: serde_json::Value,
    pub cache_path: PathBuf,
    pub scheduling_classes: BTreeMap<String, SchedulingClass>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            backend_name: topology_policy::BACKEND_NAME.to_string(),
            // An empty object, not `Value::Null`: every backend's `*ConfigRaw` deserializes an
            // absent field as `None` automatically (serde's built-in `Option<T>` handling), but
            // only from a map — `null` itself isn't a valid struct encoding.
            backend_config: serde_json::json!({}),
            cache_path: PathBuf::from(DEFAULT_CACHE_FILE),
            scheduling_classes: BTreeMap::new(),
        }
    }
}

impl ManagerConfig {
    pub fn from_raw(raw: ManagerConfigRaw) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let backend_name = raw.policy.unwrap_or(defaults.backend_name);
        let cache_path = raw.cache_file.map(PathBuf::from).unwrap_or(defaults.cache_path);

        let mut scheduling_classes = BTreeMap::new();
        for (name, spec) in raw.control.and_then(|c| c.scheduling_classes).unwrap_or_default() {
            scheduling_classes.insert(name, parse_scheduling_class(&spec)?);
        }

        // `raw.config` defaults to `Value::Null` when the YAML omits the key entirely; every
        // backend's `*ConfigRaw` needs a map to deserialize against (see `ManagerConfig::default`).
        let backend_config = if raw.config.is_null() { defaults.backend_config } else { raw.config };

        Ok(Self {
            backend_name,
            backend_config,
            cache_path,
            scheduling_classes,
        })
    }
}

/// Parses one `control.schedulingClasses.<name>` value, e.g. `"fifo[priority=10,ioClass=realtime,
/// ioPriority=4]"`, into the `(policy, priority/nice, io_class, io_prio)` tuple the
/// `scheduling-class` annotation names (spec §6's annotation table).
fn parse_scheduling_class(spec: &str) -> Result<SchedulingClass, ConfigError> {
    let (name, options) = parse_config_value(spec);
    let policy = match name.to_ascii_lowercase().as_str() {
        "other" => SchedPolicy::Other,
        "fifo" => SchedPolicy::Fifo,
        "roundrobin" => SchedPolicy::RoundRobin,
        "batch" => SchedPolicy::Batch,
        "idle" => SchedPolicy::Idle,
        other => return Err(ConfigError::Invalid(format!("unrecognized scheduling policy '{other}'"))),
    };
    let options = options.map(|o| parse_options(&o)).unwrap_or_default();
    let priority = match options.get("priority") {
        Some(v) => v.parse::<i32>().map_err(|_| ConfigError::Invalid(format!("invalid priority '{v}'")))?,
        None => 0,
    };
    let io_class = match options.get("ioClass").map(String::as_str) {
        Some("none") | None => IoClass::None,
        Some("realtime") => IoClass::RealTime,
        Some("besteffort") => IoClass::BestEffort,
        Some("idle") => IoClass::Idle,
        Some(other) => return Err(ConfigError::Invalid(format!("unrecognized ioClass '{other}'"))),
    };
    let io_priority = match options.get("ioPriority") {
        Some(v) => v.parse::<i32>().map_err(|_| ConfigError::Invalid(format!("invalid ioPriority '{v}'")))?,
        None => 0,
    };

    Ok(SchedulingClass {
        policy,
        priority,
        io_class,
        io_priority,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pick_topology_aware_backend() {
        let config = ManagerConfig::from_raw(ManagerConfigRaw::default()).unwrap();
        assert_eq!(config.backend_name, "topology-aware");
        assert!(config.scheduling_classes.is_empty());
    }

    #[test]
    fn scheduling_class_options_parse() {
        let class = parse_scheduling_class("fifo[priority=10,ioClass=realtime,ioPriority=4]").unwrap();
        assert_eq!(class.policy, SchedPolicy::Fifo);
        assert_eq!(class.priority, 10);
        assert_eq!(class.io_class, IoClass::RealTime);
        assert_eq!(class.io_priority, 4);
    }

    #[test]
    fn unknown_policy_name_rejected() {
        assert!(parse_scheduling_class("quantum").is_err());
    }
}
