//! Hardware discovery providers.
//!
//! Discovery is abstracted behind a trait so tests (and the scenarios in spec §8) can inject a
//! synthetic topology instead of reading sysfs. The production provider lives outside this core
//! crate (it belongs to the out-of-core host-integration layer); what's in scope here is the
//! contract and a builder good enough to construct any topology the tests need.

use crate::cpu::{Cpu, CpuPriority};
use crate::error::TopologyError;
use crate::memory::{MemNodeId, MemoryKind, MemoryNode, FALLBACK_LOCAL_DISTANCE, FALLBACK_REMOTE_DISTANCE};
use crate::topology::Topology;

/// Something that can produce a [`Topology`] snapshot on demand.
pub trait TopologyProvider {
    fn discover(&self) -> Result<Topology, TopologyError>;
}

/// Builds a uniform topology of `packages` x `dies_per_package` x `numa_per_die` NUMA nodes, each
/// with `cores_per_numa` cores of `threads_per_core` SMT siblings, and one DRAM memory node per
/// NUMA node of `mem_per_node_bytes`.
///
/// Distances default to the spec's fallback of 10 (local) / 20 (remote) unless overridden with
/// [`SyntheticTopologyBuilder::with_distance`].
#[derive(Debug, Clone)]
pub struct SyntheticTopologyBuilder {
    packages: u32,
    dies_per_package: u32,
    numa_per_die: u32,
    cores_per_numa: u32,
    threads_per_core: u32,
    mem_per_node_bytes: u64,
    mem_kind: MemoryKind,
    overrides: Vec<(MemNodeId, MemNodeId, u32)>,
}

impl SyntheticTopologyBuilder {
    pub fn new() -> Self {
        Self {
            packages: 1,
            dies_per_package: 1,
            numa_per_die: 1,
            cores_per_numa: 1,
            threads_per_core: 1,
            mem_per_node_bytes: 1 << 30,
            mem_kind: MemoryKind::Dram,
            overrides: Vec::new(),
        }
    }

    pub fn packages(mut self, n: u32) -> Self {
        self.packages = n;
        self
    }

    pub fn dies_per_package(mut self, n: u32) -> Self {
        self.dies_per_package = n;
        self
    }

    pub fn numa_per_die(mut self, n: u32) -> Self {
        self.numa_per_die = n;
        self
    }

    pub fn cores_per_numa(mut self, n: u32) -> Self {
        self.cores_per_numa = n;
        self
    }

    pub fn threads_per_core(mut self, n: u32) -> Self {
        self.threads_per_core = n;
        self
    }

    pub fn memory_per_node(mut self, bytes: u64) -> Self {
        self.mem_per_node_bytes = bytes;
        self
    }

    pub fn memory_kind(mut self, kind: MemoryKind) -> Self {
        self.mem_kind = kind;
        self
    }

    pub fn with_distance(mut self, a: u32, b: u32, distance: u32) -> Self {
        self.overrides.push((MemNodeId(a), MemNodeId(b), distance));
        self
    }

    pub fn build(self) -> Result<Topology, TopologyError> {
        let mut cpus = Vec::new();
        let mut mem_nodes = Vec::new();
        let mut cpu_id = 0u32;
        let mut core_id = 0u32;
        let mut numa_id = 0u32;

        for package in 0..self.packages {
            for die in 0..self.dies_per_package {
                for _ in 0..self.numa_per_die {
                    mem_nodes.push(MemoryNode::new(numa_id, self.mem_kind, self.mem_per_node_bytes));
                    for _ in 0..self.cores_per_numa {
                        for _ in 0..self.threads_per_core {
                            cpus.push(Cpu::new(cpu_id, core_id, numa_id, die, package).with_priority(CpuPriority::Normal));
                            cpu_id += 1;
                        }
                        core_id += 1;
                    }
                    numa_id += 1;
                }
            }
        }

        for node in mem_nodes.iter_mut() {
            for other in 0..numa_id {
                let other_id = MemNodeId(other);
                let distance = if other_id == node.id { FALLBACK_LOCAL_DISTANCE } else { FALLBACK_REMOTE_DISTANCE };
                node.distances.insert(other_id, distance);
            }
        }
        for (a, b, distance) in self.overrides {
            if let Some(node) = mem_nodes.iter_mut().find(|n| n.id == a) {
                node.distances.insert(b, distance);
            }
            if let Some(node) = mem_nodes.iter_mut().find(|n| n.id == b) {
                node.distances.insert(a, distance);
            }
        }

        Topology::build(cpus, mem_nodes)
    }
}

impl Default for SyntheticTopologyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`TopologyProvider`] that always returns a pre-built topology, for tests.
pub struct FixedTopologyProvider(pub Topology);

impl TopologyProvider for FixedTopologyProvider {
    fn discover(&self) -> Result<Topology, TopologyError> {
        Ok(self.0.clone())
    }
}
