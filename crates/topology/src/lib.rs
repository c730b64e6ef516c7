//! Hardware topology discovery and the immutable [`Topology`] descriptor.
//!
//! This crate covers component 1 of the resource policy engine: it enumerates CPUs, their SMT
//! siblings, cores, NUMA nodes, dies, packages, memory capacities and kinds, and inter-node
//! distances, and exposes the derived `closest_cpus`/`closest_mems` helpers that both policy
//! backends build mems selection on top of.

pub mod cpu;
pub mod error;
pub mod memory;
pub mod provider;
pub mod topology;

pub use cpu::{Cpu, CpuId, CpuPriority};
pub use error::TopologyError;
pub use memory::{MemNodeId, MemoryKind, MemoryNode, MemoryTypeMask, FALLBACK_LOCAL_DISTANCE, FALLBACK_REMOTE_DISTANCE};
pub use provider::{FixedTopologyProvider, SyntheticTopologyBuilder, TopologyProvider};
pub use topology::{Topology, TopologyDiff};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_numa_sixteen_cpu_topology() {
        let topo = SyntheticTopologyBuilder::new()
            .packages(1)
            .dies_per_package(1)
            .numa_per_die(4)
            .cores_per_numa(4)
            .threads_per_core(1)
            .build()
            .unwrap();
        assert_eq!(topo.cpus().count(), 16);
        assert_eq!(topo.memory_nodes().count(), 4);
        assert_eq!(topo.cpus_in_numa(1).len(), 4);
    }

    #[test]
    fn smt_siblings_share_core_id() {
        let topo = SyntheticTopologyBuilder::new()
            .cores_per_numa(2)
            .threads_per_core(2)
            .build()
            .unwrap();
        let cpu0 = CpuId(0);
        let siblings = topo.smt_siblings(cpu0);
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings.iter().next().unwrap(), &CpuId(1));
    }

    #[test]
    fn closest_mems_is_local_first() {
        let topo = SyntheticTopologyBuilder::new().numa_per_die(2).cores_per_numa(2).build().unwrap();
        let cpu_on_node1 = topo.cpus_in_numa(1).iter().next().copied().unwrap();
        let closest = topo.closest_mems(cpu_on_node1);
        assert_eq!(closest[0], MemNodeId(1));
    }

    #[test]
    fn inconsistent_core_assignment_rejected() {
        let a = Cpu::new(0, 0, 0, 0, 0);
        let mut b = Cpu::new(1, 0, 0, 0, 0);
        b.package = 1; // same core_id, different package: invalid
        let err = Topology::build(vec![a, b], vec![MemoryNode::new(0, MemoryKind::Dram, 1024)]);
        assert!(err.is_err());
    }

    #[test]
    fn topology_diff_detects_hotplug() {
        let before = SyntheticTopologyBuilder::new().cores_per_numa(2).build().unwrap();
        let mut cpus: Vec<Cpu> = before.cpus().cloned().collect();
        cpus.push(Cpu::new(99, 99, 0, 0, 0));
        let after = Topology::build(cpus, before.memory_nodes().cloned().collect()).unwrap();
        let diff = after.diff(&before);
        assert_eq!(diff.added, [CpuId(99)].into_iter().collect());
        assert!(diff.removed.is_empty());
    }
}
