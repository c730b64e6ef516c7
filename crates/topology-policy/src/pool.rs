//! The pool tree node type, arena-indexed rather than parent/child-pointer-linked (Design Notes
//! item "cycle-prone pool tree"): pools live in [`crate::arena::PoolArena`]'s `Vec`; parent/child
//! links are plain [`PoolId`] indices. Grounded on `dslab-iaas`'s `resource_pool::HostInfo` (a
//! plain data struct holding totals/available/overcommit plus a `BTreeMap` of allocations)
//! generalized from a flat host to a tree node with an exclusive/shared split.
//!
//! Exclusive CPU ownership is tracked once, globally, on [`crate::arena::PoolArena`] rather than
//! per pool: a CPU exclusively held by a container anywhere in the subtree must be excluded from
//! every ancestor's shared view too, which a per-pool map can't express without manual
//! propagation. `Pool` itself only knows its own `cpus_total` and `reserved_cpus`.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use policy_core::ContainerId;
use topology::CpuId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(pub usize);

/// Topology scope a pool is tagged with (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Root,
    Package,
    Die,
    Numa,
    Core,
}

/// One node of the pool tree: the CPUs it owns, the subset reserved for the reserved namespace
/// set, and the milli-CPU shares outstanding against whatever of `cpus_total` isn't reserved or
/// exclusively held elsewhere in the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub scope: Scope,
    pub parent: Option<PoolId>,
    pub children: Vec<PoolId>,
    /// Topology coordinates this pool represents, for pretty names and candidate-scope checks.
    pub package: u32,
    pub die: u32,
    pub numa_node: u32,
    pub core_id: u32,

    pub cpus_total: BTreeSet<CpuId>,
    pub reserved_cpus: BTreeSet<CpuId>,
    /// Outstanding milli-CPU shares against the shared view, per container.
    pub shares: BTreeMap<ContainerId, u32>,
}

impl Pool {
    pub fn new(id: PoolId, scope: Scope, parent: Option<PoolId>, package: u32, die: u32, numa_node: u32, core_id: u32) -> Self {
        Self {
            id,
            scope,
            parent,
            children: Vec::new(),
            package,
            die,
            numa_node,
            core_id,
            cpus_total: BTreeSet::new(),
            reserved_cpus: BTreeSet::new(),
            shares: BTreeMap::new(),
        }
    }

    pub fn cpu_demand_millis(&self) -> u32 {
        self.shares.values().sum()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Canonical zone name for this pool, the same naming scheme `published_zones` exports and
    /// the `topology-hint.nri.io` annotation's value is matched against.
    pub fn zone_name(&self) -> String {
        match self.scope {
            Scope::Root => "root".to_string(),
            Scope::Package => format!("package-{}", self.package),
            Scope::Die => format!("die-{}-{}", self.package, self.die),
            Scope::Numa => format!("numa-{}-{}-{}", self.package, self.die, self.numa_node),
            Scope::Core => format!("core-{}-{}-{}-{}", self.package, self.die, self.numa_node, self.core_id),
        }
    }
}
