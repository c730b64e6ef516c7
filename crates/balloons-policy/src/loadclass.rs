//! Load-class anti-affinity (spec §4.4 "Virtual devices"): two balloons whose type declares the
//! same load class (`avx`, `membw`, `l2`) must not both have containers running on the same NUMA
//! node, since that's the granularity at which the hardware resource they stress (L2 capacity,
//! memory bandwidth, AVX execution units) is shared. Modeled as an edge set keyed by
//! `(LoadClass, numa_node)`, occupied while at least one balloon with that load class on that node
//! holds a container; freeing a container's last use of a node releases the edge.

use std::collections::BTreeSet;

use topology::{CpuId, Topology};

use crate::types::LoadClass;

#[derive(Debug, Clone, Default)]
pub struct LoadClassTracker {
    /// `(load class, numa node)` -> balloon ids currently occupying that edge.
    occupied: std::collections::BTreeMap<(LoadClass, u32), BTreeSet<u64>>,
}

impl LoadClassTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn numa_nodes_of(topology: &Topology, cpus: &BTreeSet<CpuId>) -> BTreeSet<u32> {
        cpus.iter().filter_map(|c| topology.cpu(*c)).map(|c| c.numa_node).collect()
    }

    /// Whether `balloon_id` can acquire `loads` on `cpus` without conflicting with a different
    /// balloon already occupying the same `(load, numa node)` edge.
    pub fn can_acquire(&self, topology: &Topology, balloon_id: u64, loads: &[LoadClass], cpus: &BTreeSet<CpuId>) -> bool {
        let nodes = Self::numa_nodes_of(topology, cpus);
        for load in loads {
            for node in &nodes {
                if let Some(holders) = self.occupied.get(&(*load, *node)) {
                    if holders.iter().any(|id| *id != balloon_id) {
                        return false;
                    }
                }
            }
        }
        true
    }

    pub fn acquire(&mut self, topology: &Topology, balloon_id: u64, loads: &[LoadClass], cpus: &BTreeSet<CpuId>) {
        let nodes = Self::numa_nodes_of(topology, cpus);
        for load in loads {
            for node in &nodes {
                self.occupied.entry((*load, *node)).or_default().insert(balloon_id);
            }
        }
    }

    pub fn release(&mut self, balloon_id: u64) {
        for holders in self.occupied.values_mut() {
            holders.remove(&balloon_id);
        }
        self.occupied.retain(|_, holders| !holders.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topology::SyntheticTopologyBuilder;

    #[test]
    fn second_l2_balloon_on_same_numa_conflicts() {
        let topo = SyntheticTopologyBuilder::new().numa_per_die(1).cores_per_numa(2).build().unwrap();
        let cpus: BTreeSet<CpuId> = topo.cpus_in_numa(0);
        let mut tracker = LoadClassTracker::new();
        assert!(tracker.can_acquire(&topo, 1, &[LoadClass::L2], &cpus));
        tracker.acquire(&topo, 1, &[LoadClass::L2], &cpus);
        assert!(!tracker.can_acquire(&topo, 2, &[LoadClass::L2], &cpus));
        tracker.release(1);
        assert!(tracker.can_acquire(&topo, 2, &[LoadClass::L2], &cpus));
    }
}
