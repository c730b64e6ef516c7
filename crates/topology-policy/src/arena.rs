//! Builds and owns the pool tree: `Root -> Package(i) -> Die(i,j) -> Numa(i,j,k) -> Core(i,j,k,l)`
//! (spec §4.3 "Build"). Arena-indexed per Design Notes: no parent/child `Rc`/`Weak` cycles, just
//! `Vec<Pool>` plus integer `PoolId` links, making the whole tree trivially cloneable for
//! Rebalance's "reprocess from scratch" pass.

use std::collections::{BTreeMap, BTreeSet};

use policy_core::ContainerId;
use topology::{CpuId, Topology};

use crate::pool::{Pool, PoolId, Scope};

#[derive(Debug, Clone)]
pub struct PoolArena {
    pools: Vec<Pool>,
    root: PoolId,
    /// Global exclusive-CPU ownership: a CPU exclusively held anywhere in the tree must be
    /// excluded from every ancestor pool's shared view, not just the pool it was carved from.
    exclusive_owners: BTreeMap<CpuId, ContainerId>,
}

impl PoolArena {
    /// Builds the tree from `topology`, restricted to `available_cpus` if given (spec §6
    /// `availableResources.cpu`). `reserved_cpus` is subtracted from every pool's shared view and
    /// also recorded at the root (spec §4.3: "a configured reserved cpuset ... gathered in the
    /// Root's `reserved_cpus`").
    pub fn build(topology: &Topology, available_cpus: Option<&BTreeSet<CpuId>>, reserved_cpus: &BTreeSet<CpuId>) -> Self {
        let mut pools = Vec::new();
        let root_id = PoolId(0);
        pools.push(Pool::new(root_id, Scope::Root, None, 0, 0, 0, 0));

        for package in topology.packages() {
            let package_id = PoolId(pools.len());
            pools.push(Pool::new(package_id, Scope::Package, Some(root_id), package, 0, 0, 0));
            pools[root_id.0].children.push(package_id);

            for die in topology.dies_in_package(package) {
                let die_id = PoolId(pools.len());
                pools.push(Pool::new(die_id, Scope::Die, Some(package_id), package, die, 0, 0));
                pools[package_id.0].children.push(die_id);

                for numa in topology.numa_nodes_in_die(package, die) {
                    let numa_id = PoolId(pools.len());
                    pools.push(Pool::new(numa_id, Scope::Numa, Some(die_id), package, die, numa, 0));
                    pools[die_id.0].children.push(numa_id);

                    for core in topology.cores_in_numa(numa) {
                        let core_pool_id = PoolId(pools.len());
                        let mut core_pool = Pool::new(core_pool_id, Scope::Core, Some(numa_id), package, die, numa, core);
                        core_pool.cpus_total = topology.cpus_in_core(core);
                        pools.push(core_pool);
                        pools[numa_id.0].children.push(core_pool_id);
                    }
                }
            }
        }

        let mut arena = Self {
            pools,
            root: root_id,
            exclusive_owners: BTreeMap::new(),
        };
        if let Some(available) = available_cpus {
            arena.restrict_to_available(available);
        }
        arena.propagate_cpus_upward();
        arena.apply_reserved(reserved_cpus);
        arena
    }

    fn restrict_to_available(&mut self, available: &BTreeSet<CpuId>) {
        for pool in &mut self.pools {
            if pool.scope == Scope::Core {
                pool.cpus_total = pool.cpus_total.intersection(available).copied().collect();
            }
        }
    }

    /// Every non-leaf pool's `cpus_total` is the union of its children's (computed bottom-up
    /// since core pools are built leaf-first above).
    fn propagate_cpus_upward(&mut self) {
        for scope in [Scope::Numa, Scope::Die, Scope::Package, Scope::Root] {
            let ids: Vec<PoolId> = self.pools.iter().filter(|p| p.scope == scope).map(|p| p.id).collect();
            for id in ids {
                let union: BTreeSet<CpuId> = self.pools[id.0]
                    .children
                    .iter()
                    .flat_map(|c| self.pools[c.0].cpus_total.iter().copied())
                    .collect();
                self.pools[id.0].cpus_total = union;
            }
        }
    }

    fn apply_reserved(&mut self, reserved_cpus: &BTreeSet<CpuId>) {
        for pool in &mut self.pools {
            let intersection: BTreeSet<CpuId> = pool.cpus_total.intersection(reserved_cpus).copied().collect();
            pool.reserved_cpus = intersection;
        }
    }

    pub fn root(&self) -> PoolId {
        self.root
    }

    pub fn pool(&self, id: PoolId) -> &Pool {
        &self.pools[id.0]
    }

    pub fn pool_mut(&mut self, id: PoolId) -> &mut Pool {
        &mut self.pools[id.0]
    }

    pub fn all(&self) -> impl Iterator<Item = &Pool> {
        self.pools.iter()
    }

    pub fn of_scope(&self, scope: Scope) -> impl Iterator<Item = &Pool> {
        self.pools.iter().filter(move |p| p.scope == scope)
    }

    /// CPUs in `pool` available for shared (milli-CPU) accounting: total minus reserved minus
    /// whatever is exclusively held anywhere in the tree.
    pub fn cpus_shared(&self, pool: PoolId) -> BTreeSet<CpuId> {
        let pool = &self.pools[pool.0];
        pool.cpus_total
            .iter()
            .filter(|c| !pool.reserved_cpus.contains(c) && !self.exclusive_owners.contains_key(c))
            .copied()
            .collect()
    }

    pub fn free_shared_millis(&self, pool: PoolId) -> i64 {
        let demand = self.pools[pool.0].cpu_demand_millis() as i64;
        self.cpus_shared(pool).len() as i64 * 1000 - demand
    }

    /// Headroom left in `pool`'s reserved cpuset, in milli-CPUs. The reserved set is accounted
    /// separately from the shared pool: a container pinned to it adds to the same pool's
    /// `shares` map (there is only ever a reserved cpuset at the root), but the capacity ceiling
    /// is `|reserved_cpus| * 1000`, not `|cpus_shared| * 1000`.
    pub fn free_reserved_millis(&self, pool: PoolId) -> i64 {
        let pool = &self.pools[pool.0];
        pool.reserved_cpus.len() as i64 * 1000 - pool.cpu_demand_millis() as i64
    }

    /// Commits `cpus` as exclusively held by `container`, globally.
    pub fn commit_exclusive(&mut self, cpus: &BTreeSet<CpuId>, container: ContainerId) {
        for cpu in cpus {
            self.exclusive_owners.insert(*cpu, container.clone());
        }
    }

    /// Releases exclusive ownership of `cpus`, globally.
    pub fn release_exclusive(&mut self, cpus: &BTreeSet<CpuId>) {
        for cpu in cpus {
            self.exclusive_owners.remove(cpu);
        }
    }

    pub fn exclusive_owner(&self, cpu: CpuId) -> Option<&ContainerId> {
        self.exclusive_owners.get(&cpu)
    }

    /// Every CPU exclusively held anywhere in the tree, for topology-change reconciliation.
    pub fn all_exclusive_cpus(&self) -> BTreeSet<CpuId> {
        self.exclusive_owners.keys().copied().collect()
    }

    /// Ancestor chain from `id` up to and including the root.
    pub fn ancestors(&self, id: PoolId) -> Vec<PoolId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.pools[current.0].parent {
            chain.push(parent);
            current = parent;
        }
        chain
    }
}
