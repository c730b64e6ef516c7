//! The immutable `Topology` descriptor and its derived helpers.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::cpu::{Cpu, CpuId};
use crate::error::TopologyError;
use crate::memory::{MemNodeId, MemoryNode};

/// Immutable snapshot of the host's hardware topology.
///
/// Produced by a [`crate::provider::TopologyProvider`] and shared read-only (copy-on-write: a
/// topology change produces a brand new `Topology` rather than mutating this one in place).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    cpus: BTreeMap<CpuId, Cpu>,
    memory_nodes: BTreeMap<MemNodeId, MemoryNode>,
}

impl Topology {
    /// Builds and validates a topology from its constituent CPUs and memory nodes.
    pub fn build(cpus: Vec<Cpu>, memory_nodes: Vec<MemoryNode>) -> Result<Self, TopologyError> {
        if cpus.is_empty() {
            return Err(TopologyError::Empty);
        }
        for node in &memory_nodes {
            if node.capacity_bytes == 0 {
                return Err(TopologyError::EmptyMemoryNode(node.id.0));
            }
        }

        let mut core_owner: BTreeMap<u32, (u32, u32)> = BTreeMap::new();
        for cpu in &cpus {
            match core_owner.get(&cpu.core_id) {
                Some((package, die)) if *package != cpu.package || *die != cpu.die => {
                    return Err(TopologyError::InconsistentCore {
                        cpu: cpu.id,
                        core: cpu.core_id,
                    });
                }
                _ => {
                    core_owner.insert(cpu.core_id, (cpu.package, cpu.die));
                }
            }
        }

        let cpus = cpus.into_iter().map(|c| (c.id, c)).collect();
        let memory_nodes = memory_nodes.into_iter().map(|n| (n.id, n)).collect();
        Ok(Self { cpus, memory_nodes })
    }

    pub fn cpus(&self) -> impl Iterator<Item = &Cpu> {
        self.cpus.values()
    }

    pub fn cpu(&self, id: CpuId) -> Option<&Cpu> {
        self.cpus.get(&id)
    }

    pub fn cpu_ids(&self) -> BTreeSet<CpuId> {
        self.cpus.keys().copied().collect()
    }

    pub fn memory_nodes(&self) -> impl Iterator<Item = &MemoryNode> {
        self.memory_nodes.values()
    }

    pub fn memory_node(&self, id: MemNodeId) -> Option<&MemoryNode> {
        self.memory_nodes.get(&id)
    }

    pub fn memory_node_ids(&self) -> BTreeSet<MemNodeId> {
        self.memory_nodes.keys().copied().collect()
    }

    pub fn packages(&self) -> BTreeSet<u32> {
        self.cpus.values().map(|c| c.package).collect()
    }

    pub fn dies_in_package(&self, package: u32) -> BTreeSet<u32> {
        self.cpus
            .values()
            .filter(|c| c.package == package)
            .map(|c| c.die)
            .collect()
    }

    pub fn numa_nodes_in_die(&self, package: u32, die: u32) -> BTreeSet<u32> {
        self.cpus
            .values()
            .filter(|c| c.package == package && c.die == die)
            .map(|c| c.numa_node)
            .collect()
    }

    pub fn cores_in_numa(&self, numa_node: u32) -> BTreeSet<u32> {
        self.cpus
            .values()
            .filter(|c| c.numa_node == numa_node)
            .map(|c| c.core_id)
            .collect()
    }

    pub fn cpus_in_core(&self, core_id: u32) -> BTreeSet<CpuId> {
        self.cpus
            .values()
            .filter(|c| c.core_id == core_id)
            .map(|c| c.id)
            .collect()
    }

    pub fn cpus_in_numa(&self, numa_node: u32) -> BTreeSet<CpuId> {
        self.cpus
            .values()
            .filter(|c| c.numa_node == numa_node)
            .map(|c| c.id)
            .collect()
    }

    pub fn cpus_in_die(&self, package: u32, die: u32) -> BTreeSet<CpuId> {
        self.cpus
            .values()
            .filter(|c| c.package == package && c.die == die)
            .map(|c| c.id)
            .collect()
    }

    pub fn cpus_in_package(&self, package: u32) -> BTreeSet<CpuId> {
        self.cpus
            .values()
            .filter(|c| c.package == package)
            .map(|c| c.id)
            .collect()
    }

    /// Returns the memory nodes co-located (NUMA-closest) with the given CPU, nearest first.
    pub fn closest_mems(&self, cpu: CpuId) -> Vec<MemNodeId> {
        let Some(cpu) = self.cpu(cpu) else {
            return Vec::new();
        };
        let local = MemNodeId(cpu.numa_node);
        self.sorted_mems_by_distance(local)
    }

    /// Returns every memory node ordered by distance from `from`, nearest first, ties broken by id.
    pub fn sorted_mems_by_distance(&self, from: MemNodeId) -> Vec<MemNodeId> {
        let mut nodes: Vec<(u32, MemNodeId)> = self
            .memory_nodes
            .values()
            .map(|n| {
                let distance = self
                    .memory_nodes
                    .get(&from)
                    .map(|f| f.distance_to(n.id))
                    .unwrap_or(crate::memory::FALLBACK_REMOTE_DISTANCE);
                (distance, n.id)
            })
            .collect();
        nodes.sort();
        nodes.into_iter().map(|(_, id)| id).collect()
    }

    /// Returns the CPUs whose local NUMA node is `mem`.
    pub fn closest_cpus(&self, mem: MemNodeId) -> BTreeSet<CpuId> {
        self.cpus_in_numa(mem.0)
    }

    /// CPUs that are members of the given core other than `cpu` itself (SMT siblings).
    pub fn smt_siblings(&self, cpu: CpuId) -> BTreeSet<CpuId> {
        match self.cpu(cpu) {
            Some(c) => self
                .cpus_in_core(c.core_id)
                .into_iter()
                .filter(|&id| id != cpu)
                .collect(),
            None => BTreeSet::new(),
        }
    }

    /// Diff against a previous topology snapshot, for hot-plug handling (spec §4.1).
    pub fn diff(&self, previous: &Topology) -> TopologyDiff {
        let current: BTreeSet<CpuId> = self.cpu_ids();
        let prior: BTreeSet<CpuId> = previous.cpu_ids();
        TopologyDiff {
            added: current.difference(&prior).copied().collect(),
            removed: prior.difference(&current).copied().collect(),
        }
    }
}

/// The set of CPUs that appeared or vanished between two topology snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyDiff {
    pub added: BTreeSet<CpuId>,
    pub removed: BTreeSet<CpuId>,
}

impl TopologyDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
