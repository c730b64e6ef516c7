//! Topology-aware backend configuration (spec §6), following the teacher's `SimulationConfig`
//! pattern of a `*Raw` struct with `Option<T>` fields defaulted against a `Default` instance
//! rather than panicking on a missing key (`dslab-iaas/src/core/config/sim_config.rs`).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use policy_core::config::parse_cpuset;
use policy_core::ConfigError;
use topology::CpuId;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyAwareConfigRaw {
    #[serde(rename = "reservedResources")]
    pub reserved_resources: Option<ReservedResourcesRaw>,
    #[serde(rename = "availableResources")]
    pub available_resources: Option<AvailableResourcesRaw>,
    #[serde(rename = "pinCPU")]
    pub pin_cpu: Option<bool>,
    #[serde(rename = "pinMemory")]
    pub pin_memory: Option<bool>,
    #[serde(rename = "preferIsolatedCPUs")]
    pub prefer_isolated_cpus: Option<bool>,
    #[serde(rename = "preferSharedCPUs")]
    pub prefer_shared_cpus: Option<bool>,
    #[serde(rename = "colocatePods")]
    pub colocate_pods: Option<bool>,
    #[serde(rename = "colocateNamespaces")]
    pub colocate_namespaces: Option<bool>,
    #[serde(rename = "reservedPoolNamespaces")]
    pub reserved_pool_namespaces: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservedResourcesRaw {
    pub cpu: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableResourcesRaw {
    pub cpu: String,
}

/// Resolved configuration, every option defaulted.
#[derive(Debug, Clone)]
pub struct TopologyAwareConfig {
    pub reserved_cpus: BTreeSet<CpuId>,
    pub available_cpus: Option<BTreeSet<CpuId>>,
    pub pin_cpu: bool,
    pub pin_memory: bool,
    pub prefer_isolated_cpus: bool,
    pub prefer_shared_cpus: bool,
    pub colocate_pods: bool,
    pub colocate_namespaces: bool,
    pub reserved_pool_namespaces: Vec<String>,
}

impl Default for TopologyAwareConfig {
    fn default() -> Self {
        Self {
            reserved_cpus: BTreeSet::new(),
            available_cpus: None,
            pin_cpu: true,
            pin_memory: true,
            prefer_isolated_cpus: true,
            prefer_shared_cpus: false,
            colocate_pods: true,
            colocate_namespaces: false,
            reserved_pool_namespaces: vec!["kube-system".to_string()],
        }
    }
}

impl TopologyAwareConfig {
    pub fn from_raw(raw: TopologyAwareConfigRaw) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let reserved_cpus = match raw.reserved_resources {
            Some(r) => parse_cpuset(&r.cpu)?,
            None => defaults.reserved_cpus,
        };
        let available_cpus = match raw.available_resources {
            Some(r) => Some(parse_cpuset(&r.cpu)?),
            None => defaults.available_cpus,
        };
        Ok(Self {
            reserved_cpus,
            available_cpus,
            pin_cpu: raw.pin_cpu.unwrap_or(defaults.pin_cpu),
            pin_memory: raw.pin_memory.unwrap_or(defaults.pin_memory),
            prefer_isolated_cpus: raw.prefer_isolated_cpus.unwrap_or(defaults.prefer_isolated_cpus),
            prefer_shared_cpus: raw.prefer_shared_cpus.unwrap_or(defaults.prefer_shared_cpus),
            colocate_pods: raw.colocate_pods.unwrap_or(defaults.colocate_pods),
            colocate_namespaces: raw.colocate_namespaces.unwrap_or(defaults.colocate_namespaces),
            reserved_pool_namespaces: raw
                .reserved_pool_namespaces
                .unwrap_or(defaults.reserved_pool_namespaces),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_used_when_raw_fields_absent() {
        let config = TopologyAwareConfig::from_raw(TopologyAwareConfigRaw::default()).unwrap();
        assert!(config.pin_cpu);
        assert!(config.reserved_cpus.is_empty());
    }

    #[test]
    fn reserved_resources_parsed_from_cpuset() {
        let raw = TopologyAwareConfigRaw {
            reserved_resources: Some(ReservedResourcesRaw { cpu: "0-1".into() }),
            ..Default::default()
        };
        let config = TopologyAwareConfig::from_raw(raw).unwrap();
        assert_eq!(config.reserved_cpus.len(), 2);
    }
}
