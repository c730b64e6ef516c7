//! The idle-CPU picker: selects CPUs out of whatever isn't yet owned by any balloon, in
//! allocator-priority order mapped onto a topology-aware pick (spec §4.4 "Startup": "performance-
//! class CPUs first when `cpu_class` requests them; otherwise balanced or packed per
//! `allocator_topology_balancing`").

use std::collections::BTreeSet;

use topology::{CpuId, CpuPriority, Topology};

use crate::types::{CpuClass, TopologyBalancing};

/// Ranks idle CPUs for a given `cpu_class`/`balancing` preference, most-preferred first.
/// `count` CPUs are then drawn off the front by the caller (inflate) or released off the back
/// (deflate, via [`pick_for_deflate`]).
pub fn rank_idle_cpus(topology: &Topology, idle: &BTreeSet<CpuId>, class: CpuClass, balancing: TopologyBalancing) -> Vec<CpuId> {
    let mut ranked: Vec<CpuId> = idle.iter().copied().collect();
    ranked.sort_by_key(|id| {
        let cpu = topology.cpu(*id);
        let class_rank = match (class, cpu.map(|c| c.priority_class)) {
            (CpuClass::Performance, Some(CpuPriority::Performance)) => 0,
            (CpuClass::Efficient, Some(CpuPriority::Efficient)) => 0,
            (CpuClass::Normal, Some(CpuPriority::Normal)) => 0,
            (CpuClass::Balanced, _) => 0,
            _ => 1,
        };
        // Packed: prefer CPUs on a NUMA node/core already partially used by this type, approximated
        // here by sorting on (numa, core, id) so consecutive picks land on the same node/core first.
        // Spread would sort by the same key in the opposite direction; we keep the tuple identical
        // and flip the ordering below through `packed`.
        let numa = cpu.map(|c| c.numa_node).unwrap_or(u32::MAX);
        let core = cpu.map(|c| c.core_id).unwrap_or(u32::MAX);
        match balancing {
            TopologyBalancing::Packed => (class_rank, numa, core, id.0),
            TopologyBalancing::Spread => (class_rank, u32::MAX - numa, u32::MAX - core, id.0),
        }
    });
    ranked
}

/// Picks the least-preferred `count` CPUs currently in `held` to release on deflate (spec §4.4
/// "Resize": "Deflate releases the least-preferred CPUs (by reverse-pick)").
pub fn pick_for_deflate(topology: &Topology, held: &BTreeSet<CpuId>, class: CpuClass, balancing: TopologyBalancing, count: usize) -> BTreeSet<CpuId> {
    let mut ranked = rank_idle_cpus(topology, held, class, balancing);
    ranked.reverse();
    ranked.into_iter().take(count).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology::SyntheticTopologyBuilder;

    #[test]
    fn performance_class_ranks_matching_cpus_first() {
        let topo = SyntheticTopologyBuilder::new().cores_per_numa(2).build().unwrap();
        let mut cpus = topo.cpus().cloned().collect::<Vec<_>>();
        cpus[0].priority_class = CpuPriority::Performance;
        let topo = Topology::build(cpus, topo.memory_nodes().cloned().collect()).unwrap();
        let idle: BTreeSet<CpuId> = topo.cpu_ids();
        let ranked = rank_idle_cpus(&topo, &idle, CpuClass::Performance, TopologyBalancing::Packed);
        assert_eq!(ranked[0], CpuId(0));
    }
}
