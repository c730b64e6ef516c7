//! Typed annotation families (spec §6), replacing ad hoc string inspection scattered through the
//! allocator with a single parse site and a single per-container "unknown annotation" warning,
//! per Design Notes item "dynamic annotation parsing".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use topology::{CpuPriority, MemoryTypeMask};

use crate::config::{parse_config_value, parse_options};

/// Where an annotation was attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Pod,
    Container,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnlimitedBurstableScope {
    Numa,
    Die,
    Socket,
    System,
}

impl Default for UnlimitedBurstableScope {
    fn default() -> Self {
        UnlimitedBurstableScope::Socket
    }
}

/// A single recognized annotation value, already parsed out of its textual key/value form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Annotation {
    PreferReservedCpus(bool),
    PreferCpuPriority(CpuPriority),
    PreferSharedCpus(bool),
    /// Names a `control.cpu.classes.<name>`-configured scheduling class.
    SchedulingClass(String),
    UnlimitedBurstable(UnlimitedBurstableScope),
    CpuPreserve,
    MemoryPreserve,
    MemoryType(MemoryTypeMask),
    /// Names a configured balloon type.
    BalloonType(String),
    MemoryPolicy { mode: String, nodes: String, flags: String },
    /// CDI device injection is translated out-of-core; only recorded here.
    Cdi(String),
    /// sgx_epc `misc.max` byte limit is applied out-of-core; only recorded here.
    EpcLimit(u64),
    /// Names a topology zone (e.g. `numa-0-0-1`, matching the zone names `published_zones`
    /// exports) the scorer should weight toward or away from (spec §4.3 step 3d).
    TopologyHint { zone: String, weight: i64 },
    /// A pod-affinity record (spec §4.3 step 3d): weight toward pools already holding a container
    /// from a pod carrying the given label.
    PodAffinity { label_key: String, label_value: String, weight: i64 },
    /// A pod-anti-affinity record: weight away from pools already holding a container from a pod
    /// carrying the given label.
    PodAntiAffinity { label_key: String, label_value: String, weight: i64 },
}

pub const KEY_PREFER_RESERVED_CPUS: &str = "prefer-reserved-cpus";
pub const KEY_PREFER_CPU_PRIORITY: &str = "prefer-cpu-priority";
pub const KEY_PREFER_SHARED_CPUS: &str = "prefer-shared-cpus";
pub const KEY_SCHEDULING_CLASS: &str = "scheduling-class";
pub const KEY_UNLIMITED_BURSTABLE: &str = "unlimited-burstable";
pub const KEY_CPU_PRESERVE: &str = "cpu.preserve";
pub const KEY_MEMORY_PRESERVE: &str = "memory.preserve";
pub const KEY_MEMORY_TYPE: &str = "memory-type";
pub const KEY_BALLOON_TYPE: &str = "balloon.balloons.resource-policy.nri.io";
pub const KEY_MEMORY_POLICY_CLASS: &str = "class.memory-policy.nri.io";
pub const KEY_MEMORY_POLICY_POLICY: &str = "policy.memory-policy.nri.io";
pub const KEY_CDI: &str = "cdi.nri.io";
pub const KEY_EPC_LIMIT: &str = "epc-limit.nri.io";
pub const KEY_TOPOLOGY_HINT: &str = "topology-hint.nri.io";
pub const KEY_POD_AFFINITY: &str = "pod-affinity.nri.io";
pub const KEY_POD_ANTI_AFFINITY: &str = "pod-anti-affinity.nri.io";

/// Default `+`/`-` weight for a hint/affinity record that doesn't override it with
/// `[weight=N]`, chosen well below [`crate::config`]'s colocation bonus magnitude so an explicit
/// colocation match still dominates a same-strength hint.
pub const DEFAULT_HINT_WEIGHT: i64 = 1_000;

/// Parses one raw `(key, value)` annotation pair. Returns `Ok(None)` for a key this family
/// doesn't recognize at all (so the caller can record it as unknown rather than an error) and
/// `Err` when the key is recognized but the value doesn't parse.
pub fn parse_annotation(key: &str, value: &str) -> Result<Option<Annotation>, String> {
    let annotation = match key {
        KEY_PREFER_RESERVED_CPUS => Annotation::PreferReservedCpus(parse_bool(value)?),
        KEY_PREFER_CPU_PRIORITY => Annotation::PreferCpuPriority(match value {
            "high" => CpuPriority::Performance,
            "low" => CpuPriority::Efficient,
            "normal" => CpuPriority::Normal,
            other => return Err(format!("unrecognized cpu priority '{other}'")),
        }),
        KEY_PREFER_SHARED_CPUS => Annotation::PreferSharedCpus(parse_bool(value)?),
        KEY_SCHEDULING_CLASS => Annotation::SchedulingClass(value.to_string()),
        KEY_UNLIMITED_BURSTABLE => Annotation::UnlimitedBurstable(match value {
            "numa" => UnlimitedBurstableScope::Numa,
            "die" => UnlimitedBurstableScope::Die,
            "socket" => UnlimitedBurstableScope::Socket,
            "system" => UnlimitedBurstableScope::System,
            other => return Err(format!("unrecognized unlimited-burstable scope '{other}'")),
        }),
        KEY_CPU_PRESERVE => Annotation::CpuPreserve,
        KEY_MEMORY_PRESERVE => Annotation::MemoryPreserve,
        KEY_MEMORY_TYPE => Annotation::MemoryType(MemoryTypeMask::parse(value)),
        KEY_BALLOON_TYPE => Annotation::BalloonType(value.to_string()),
        KEY_CDI => Annotation::Cdi(value.to_string()),
        KEY_EPC_LIMIT => Annotation::EpcLimit(
            value
                .parse::<u64>()
                .map_err(|_| format!("invalid epc-limit byte count '{value}'"))?,
        ),
        KEY_TOPOLOGY_HINT => {
            let (zone, weight) = parse_weighted_value(value)?;
            Annotation::TopologyHint { zone, weight }
        }
        KEY_POD_AFFINITY => {
            let (label_key, label_value, weight) = parse_label_affinity_value(value)?;
            Annotation::PodAffinity { label_key, label_value, weight }
        }
        KEY_POD_ANTI_AFFINITY => {
            let (label_key, label_value, weight) = parse_label_affinity_value(value)?;
            Annotation::PodAntiAffinity { label_key, label_value, weight }
        }
        _ => return Ok(None),
    };
    Ok(Some(annotation))
}

/// Parses `"<name>[weight=N]"`, defaulting to [`DEFAULT_HINT_WEIGHT`] when `weight` is omitted.
fn parse_weighted_value(value: &str) -> Result<(String, i64), String> {
    let (name, options) = parse_config_value(value);
    let weight = match options.map(|o| parse_options(&o)).and_then(|o| o.get("weight").cloned()) {
        Some(w) => w.parse::<i64>().map_err(|_| format!("invalid weight '{w}'"))?,
        None => DEFAULT_HINT_WEIGHT,
    };
    Ok((name, weight))
}

/// Parses `"<label-key>=<label-value>[weight=N]"` for the pod-(anti-)affinity annotations.
fn parse_label_affinity_value(value: &str) -> Result<(String, String, i64), String> {
    let (pair, weight) = parse_weighted_value(value)?;
    let (key, val) = pair
        .split_once('=')
        .ok_or_else(|| format!("expected '<label-key>=<label-value>', got '{pair}'"))?;
    Ok((key.to_string(), val.to_string(), weight))
}

/// The parsed annotation set for one pod/container pair, container-scoped values winning over
/// pod-scoped ones. Unknown keys are recorded, never dropped silently, so the resource manager can
/// emit the single per-container warning the Design Notes call for.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    pod: BTreeMap<String, Annotation>,
    container: BTreeMap<String, Annotation>,
    unknown: Vec<String>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and inserts one raw key/value annotation. `class.memory-policy.nri.io` and
    /// `policy.memory-policy.nri.io` are paired into a single `MemoryPolicy` value; callers should
    /// insert both before calling [`Annotations::get`] for that family.
    pub fn insert(&mut self, scope: Scope, key: &str, value: &str) {
        if key == KEY_MEMORY_POLICY_CLASS || key == KEY_MEMORY_POLICY_POLICY {
            self.insert_memory_policy(scope, key, value);
            return;
        }
        match parse_annotation(key, value) {
            Ok(Some(annotation)) => {
                let map = match scope {
                    Scope::Pod => &mut self.pod,
                    Scope::Container => &mut self.container,
                };
                map.insert(key.to_string(), annotation);
            }
            Ok(None) => self.unknown.push(key.to_string()),
            Err(reason) => self.unknown.push(format!("{key}: {reason}")),
        }
    }

    /// `class.*` names a configured memory-policy class (carrying nodes+flags); `policy.*`
    /// overrides just the mode. Both are folded into one `MemoryPolicy` value keyed under the
    /// `class` annotation key so [`Annotations::get`] only needs one lookup.
    fn insert_memory_policy(&mut self, scope: Scope, key: &str, value: &str) {
        let map = match scope {
            Scope::Pod => &mut self.pod,
            Scope::Container => &mut self.container,
        };
        let mut current = match map.get(KEY_MEMORY_POLICY_CLASS) {
            Some(Annotation::MemoryPolicy { mode, nodes, flags }) => (mode.clone(), nodes.clone(), flags.clone()),
            _ => (String::new(), String::new(), String::new()),
        };
        if key == KEY_MEMORY_POLICY_CLASS {
            current.1 = value.to_string();
        } else {
            current.0 = value.to_string();
        }
        let (mode, nodes, flags) = current;
        map.insert(
            KEY_MEMORY_POLICY_CLASS.to_string(),
            Annotation::MemoryPolicy { mode, nodes, flags },
        );
    }

    /// Returns the effective value for `key`: container-scoped wins over pod-scoped.
    pub fn get(&self, key: &str) -> Option<&Annotation> {
        self.container.get(key).or_else(|| self.pod.get(key))
    }

    pub fn unknown(&self) -> &[String] {
        &self.unknown
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("expected 'true' or 'false', got '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_scope_overrides_pod_scope() {
        let mut annotations = Annotations::new();
        annotations.insert(Scope::Pod, KEY_PREFER_RESERVED_CPUS, "true");
        annotations.insert(Scope::Container, KEY_PREFER_RESERVED_CPUS, "false");
        assert_eq!(
            annotations.get(KEY_PREFER_RESERVED_CPUS),
            Some(&Annotation::PreferReservedCpus(false))
        );
    }

    #[test]
    fn unknown_keys_are_recorded_not_dropped() {
        let mut annotations = Annotations::new();
        annotations.insert(Scope::Pod, "some.other.annotation/v1", "x");
        assert_eq!(annotations.unknown(), &["some.other.annotation/v1".to_string()]);
    }

    #[test]
    fn topology_hint_parses_zone_and_default_weight() {
        let mut annotations = Annotations::new();
        annotations.insert(Scope::Container, KEY_TOPOLOGY_HINT, "numa-0-0-1");
        assert_eq!(
            annotations.get(KEY_TOPOLOGY_HINT),
            Some(&Annotation::TopologyHint { zone: "numa-0-0-1".to_string(), weight: DEFAULT_HINT_WEIGHT })
        );
    }

    #[test]
    fn topology_hint_parses_explicit_weight() {
        let mut annotations = Annotations::new();
        annotations.insert(Scope::Container, KEY_TOPOLOGY_HINT, "numa-0-0-1[weight=-50]");
        assert_eq!(
            annotations.get(KEY_TOPOLOGY_HINT),
            Some(&Annotation::TopologyHint { zone: "numa-0-0-1".to_string(), weight: -50 })
        );
    }

    #[test]
    fn pod_anti_affinity_parses_label_pair() {
        let mut annotations = Annotations::new();
        annotations.insert(Scope::Pod, KEY_POD_ANTI_AFFINITY, "tier=batch[weight=250]");
        assert_eq!(
            annotations.get(KEY_POD_ANTI_AFFINITY),
            Some(&Annotation::PodAntiAffinity {
                label_key: "tier".to_string(),
                label_value: "batch".to_string(),
                weight: 250,
            })
        );
    }

    #[test]
    fn memory_type_mask_parses_union() {
        let mut annotations = Annotations::new();
        annotations.insert(Scope::Container, KEY_MEMORY_TYPE, "hbm,dram,pmem");
        match annotations.get(KEY_MEMORY_TYPE) {
            Some(Annotation::MemoryType(mask)) => {
                assert!(mask.dram && mask.hbm && mask.pmem);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
