//! Balloons backend configuration (spec §6), following the same `*Raw` + `Option<T>` + `Default`
//! pattern as `topology-policy::config` (itself grounded on the teacher's
//! `dslab-iaas/src/core/config/sim_config.rs`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use policy_core::ConfigError;
use topology::MemoryTypeMask;

use crate::types::{
    AllocatorPriority, BalloonType, CpuClass, LoadClass, MatchExpression, MatchOperator, TopologyBalancing,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalloonsConfigRaw {
    #[serde(rename = "pinCPU")]
    pub pin_cpu: Option<bool>,
    #[serde(rename = "pinMemory")]
    pub pin_memory: Option<bool>,
    #[serde(rename = "idleCPUClass")]
    pub idle_cpu_class: Option<String>,
    #[serde(rename = "allocatorTopologyBalancing")]
    pub allocator_topology_balancing: Option<String>,
    #[serde(rename = "balloonTypes")]
    pub balloon_types: Option<Vec<BalloonTypeRaw>>,
    #[serde(default)]
    pub control: Option<ControlRaw>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlRaw {
    pub cpu: Option<CpuControlRaw>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuControlRaw {
    pub classes: Option<BTreeMap<String, CpuClassControlRaw>>,
}

/// `control.cpu.classes.<name>`: min/max frequency and EPP hints applied out-of-core by the
/// runtime adjustment's `linux.resources.unified` entries; recorded here only so configuration
/// round-trips and can be surfaced through introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuClassControlRaw {
    #[serde(rename = "minFreq")]
    pub min_freq: Option<u32>,
    #[serde(rename = "maxFreq")]
    pub max_freq: Option<u32>,
    #[serde(rename = "energyPerformancePreference")]
    pub energy_performance_preference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchExpressionRaw {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalloonTypeRaw {
    pub name: String,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(rename = "matchExpressions", default)]
    pub match_expressions: Vec<MatchExpressionRaw>,
    #[serde(rename = "minCPUs")]
    pub min_cpus: Option<u32>,
    #[serde(rename = "maxCPUs")]
    pub max_cpus: Option<u32>,
    #[serde(rename = "minBalloons")]
    pub min_balloons: Option<u32>,
    #[serde(rename = "maxBalloons")]
    pub max_balloons: Option<u32>,
    #[serde(rename = "allocatorPriority")]
    pub allocator_priority: Option<String>,
    #[serde(rename = "cpuClass")]
    pub cpu_class: Option<String>,
    #[serde(rename = "memoryTypes", default)]
    pub memory_types: Vec<String>,
    #[serde(rename = "preferNewBalloons")]
    pub prefer_new_balloons: Option<bool>,
    #[serde(rename = "preferSpreadingPods")]
    pub prefer_spreading_pods: Option<bool>,
    #[serde(rename = "preferSpreadingNamespaces")]
    pub prefer_spreading_namespaces: Option<bool>,
    #[serde(rename = "groupBy")]
    pub group_by: Option<String>,
    #[serde(default)]
    pub loads: Vec<String>,
    #[serde(rename = "pinCPU")]
    pub pin_cpu: Option<bool>,
    #[serde(rename = "pinMemory")]
    pub pin_memory: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct BalloonsConfig {
    pub pin_cpu: bool,
    pub pin_memory: bool,
    pub idle_cpu_class: CpuClass,
    pub allocator_topology_balancing: TopologyBalancing,
    pub balloon_types: Vec<BalloonType>,
    pub cpu_classes: BTreeMap<String, CpuClassControlRaw>,
}

impl Default for BalloonsConfig {
    fn default() -> Self {
        Self {
            pin_cpu: true,
            pin_memory: true,
            idle_cpu_class: CpuClass::Balanced,
            allocator_topology_balancing: TopologyBalancing::Packed,
            balloon_types: Vec::new(),
            cpu_classes: BTreeMap::new(),
        }
    }
}

impl BalloonsConfig {
    pub fn from_raw(raw: BalloonsConfigRaw) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut balloon_types = Vec::new();
        for t in raw.balloon_types.unwrap_or_default() {
            balloon_types.push(parse_balloon_type(t)?);
        }
        let cpu_classes = raw
            .control
            .and_then(|c| c.cpu)
            .and_then(|c| c.classes)
            .unwrap_or_default();

        Ok(Self {
            pin_cpu: raw.pin_cpu.unwrap_or(defaults.pin_cpu),
            pin_memory: raw.pin_memory.unwrap_or(defaults.pin_memory),
            idle_cpu_class: match raw.idle_cpu_class.as_deref() {
                Some(s) => parse_cpu_class(s)?,
                None => defaults.idle_cpu_class,
            },
            allocator_topology_balancing: match raw.allocator_topology_balancing.as_deref() {
                Some("spread") => TopologyBalancing::Spread,
                Some("packed") | None => defaults.allocator_topology_balancing,
                Some(other) => return Err(ConfigError::Invalid(format!("unrecognized allocatorTopologyBalancing '{other}'"))),
            },
            balloon_types,
            cpu_classes,
        })
    }
}

fn parse_balloon_type(raw: BalloonTypeRaw) -> Result<BalloonType, ConfigError> {
    let min_cpus = raw.min_cpus.unwrap_or(0);
    let max_cpus = raw.max_cpus.unwrap_or(u32::MAX);
    if min_cpus > max_cpus {
        return Err(ConfigError::BalloonCpuRange {
            name: raw.name.clone(),
            min_cpus,
            max_cpus,
        });
    }
    let min_balloons = raw.min_balloons.unwrap_or(0);
    let max_balloons = raw.max_balloons.unwrap_or(u32::MAX);
    if min_balloons > max_balloons {
        return Err(ConfigError::BalloonCountRange {
            name: raw.name.clone(),
            min_balloons,
            max_balloons,
        });
    }

    let mut match_expressions = Vec::with_capacity(raw.match_expressions.len());
    for expr in raw.match_expressions {
        let operator = match expr.operator.as_str() {
            "In" => MatchOperator::In,
            "NotIn" => MatchOperator::NotIn,
            "Exists" => MatchOperator::Exists,
            "DoesNotExist" => MatchOperator::DoesNotExist,
            other => return Err(ConfigError::Invalid(format!("unrecognized matchExpressions operator '{other}'"))),
        };
        match_expressions.push(MatchExpression {
            key: expr.key,
            operator,
            values: expr.values,
        });
    }

    let mut memory_types = MemoryTypeMask::default();
    for kind in &raw.memory_types {
        memory_types = union_memory_type(memory_types, kind)?;
    }

    let mut loads = Vec::with_capacity(raw.loads.len());
    for l in &raw.loads {
        loads.push(match l.as_str() {
            "avx" => LoadClass::Avx,
            "membw" => LoadClass::MemBw,
            "l2" => LoadClass::L2,
            other => return Err(ConfigError::Invalid(format!("unrecognized load class '{other}'"))),
        });
    }

    Ok(BalloonType {
        name: raw.name,
        namespaces: raw.namespaces,
        match_expressions,
        min_cpus,
        max_cpus,
        min_balloons,
        max_balloons,
        allocator_priority: match raw.allocator_priority.as_deref() {
            Some("high") => AllocatorPriority::High,
            Some("normal") | None => AllocatorPriority::Normal,
            Some("low") => AllocatorPriority::Low,
            Some("none") => AllocatorPriority::None,
            Some(other) => return Err(ConfigError::Invalid(format!("unrecognized allocatorPriority '{other}'"))),
        },
        cpu_class: match raw.cpu_class.as_deref() {
            Some(s) => parse_cpu_class(s)?,
            None => CpuClass::Balanced,
        },
        memory_types,
        prefer_new_balloons: raw.prefer_new_balloons.unwrap_or(false),
        prefer_spreading_pods: raw.prefer_spreading_pods.unwrap_or(false),
        prefer_spreading_namespaces: raw.prefer_spreading_namespaces.unwrap_or(false),
        group_by: raw.group_by,
        loads,
        pin_cpu: raw.pin_cpu.unwrap_or(true),
        pin_memory: raw.pin_memory.unwrap_or(true),
    })
}

fn parse_cpu_class(s: &str) -> Result<CpuClass, ConfigError> {
    match s {
        "performance" => Ok(CpuClass::Performance),
        "efficient" => Ok(CpuClass::Efficient),
        "normal" => Ok(CpuClass::Normal),
        "balanced" => Ok(CpuClass::Balanced),
        other => Err(ConfigError::Invalid(format!("unrecognized cpu class '{other}'"))),
    }
}

fn union_memory_type(mut mask: MemoryTypeMask, kind: &str) -> Result<MemoryTypeMask, ConfigError> {
    match kind.to_ascii_lowercase().as_str() {
        "dram" => mask.dram = true,
        "hbm" => mask.hbm = true,
        "pmem" => mask.pmem = true,
        other => return Err(ConfigError::Invalid(format!("unrecognized memory type '{other}'"))),
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_used_when_raw_fields_absent() {
        let config = BalloonsConfig::from_raw(BalloonsConfigRaw::default()).unwrap();
        assert!(config.pin_cpu);
        assert!(config.balloon_types.is_empty());
    }

    #[test]
    fn rejects_min_balloons_over_max() {
        let raw = BalloonTypeRaw {
            name: "bad".into(),
            namespaces: vec![],
            match_expressions: vec![],
            min_cpus: None,
            max_cpus: None,
            min_balloons: Some(3),
            max_balloons: Some(1),
            allocator_priority: None,
            cpu_class: None,
            memory_types: vec![],
            prefer_new_balloons: None,
            prefer_spreading_pods: None,
            prefer_spreading_namespaces: None,
            group_by: None,
            loads: vec![],
            pin_cpu: None,
            pin_memory: None,
        };
        let err = parse_balloon_type(raw).unwrap_err();
        assert!(matches!(err, ConfigError::BalloonCountRange { .. }));
    }
}
