//! Balloon and balloon-type data model (spec §3 "Balloon").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use policy_core::ContainerId;
use topology::{CpuId, MemoryTypeMask};

/// Priority order the idle-CPU picker draws from (spec §4.4 "Startup": "high -> normal -> low ->
/// none").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AllocatorPriority {
    High,
    Normal,
    Low,
    None,
}

impl Default for AllocatorPriority {
    fn default() -> Self {
        AllocatorPriority::Normal
    }
}

/// A balloon type's preferred CPU priority class (spec §3 `cpu_class`); distinct from
/// [`topology::CpuPriority`] because a balloon can also ask for "balanced" mixed-class CPUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuClass {
    Performance,
    Efficient,
    Normal,
    Balanced,
}

impl Default for CpuClass {
    fn default() -> Self {
        CpuClass::Balanced
    }
}

/// How the idle-CPU picker spatially prefers CPUs within a class: packed onto as few
/// cores/NUMA-nodes as possible, or spread across them (spec §6 `allocatorTopologyBalancing`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopologyBalancing {
    Packed,
    Spread,
}

impl Default for TopologyBalancing {
    fn default() -> Self {
        TopologyBalancing::Packed
    }
}

/// A hardware resource a workload stresses, used as an anti-affinity edge between balloons that
/// share a NUMA node or core group (spec §4.4 "Virtual devices").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LoadClass {
    Avx,
    MemBw,
    L2,
}

/// `matchExpressions` operator (spec §4.4 "Matching" step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchExpression {
    pub key: String,
    pub operator: MatchOperator,
    pub values: Vec<String>,
}

impl MatchExpression {
    /// Evaluates against a label set (pod or container labels, already merged by the caller).
    pub fn matches(&self, labels: &[(String, String)]) -> bool {
        let found = labels.iter().find(|(k, _)| k == &self.key);
        match self.operator {
            MatchOperator::Exists => found.is_some(),
            MatchOperator::DoesNotExist => found.is_none(),
            MatchOperator::In => found.map(|(_, v)| self.values.contains(v)).unwrap_or(false),
            MatchOperator::NotIn => found.map(|(_, v)| !self.values.contains(v)).unwrap_or(true),
        }
    }
}

/// A configured balloon type: the rule set new [`Balloon`] instances are stamped out of (spec §3,
/// §6 `balloonTypes[]`).
#[derive(Debug, Clone)]
pub struct BalloonType {
    pub name: String,
    pub namespaces: Vec<String>,
    pub match_expressions: Vec<MatchExpression>,
    pub min_cpus: u32,
    pub max_cpus: u32,
    pub min_balloons: u32,
    pub max_balloons: u32,
    pub allocator_priority: AllocatorPriority,
    pub cpu_class: CpuClass,
    pub memory_types: MemoryTypeMask,
    pub prefer_new_balloons: bool,
    pub prefer_spreading_pods: bool,
    pub prefer_spreading_namespaces: bool,
    pub group_by: Option<String>,
    pub loads: Vec<LoadClass>,
    pub pin_cpu: bool,
    pub pin_memory: bool,
}

/// Lifecycle a balloon instance moves through (spec §4.4 "State machine per balloon").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalloonState {
    New,
    Populated,
    Inflating,
    Deflating,
    Empty,
    Destroyed,
}

/// One named, dynamically sized CPU set and the containers sharing it (spec §3 "Balloon").
#[derive(Debug, Clone)]
pub struct Balloon {
    pub id: u64,
    pub type_name: String,
    pub cpuset: std::collections::BTreeSet<CpuId>,
    /// Outstanding milli-CPU shares per container (`cpu_demand_millis = sum of values`).
    pub containers: BTreeMap<ContainerId, u32>,
    /// `groupBy` bin this instance belongs to; `None` when the type has no `groupBy` expression.
    pub group_key: Option<String>,
    pub state: BalloonState,
    /// Whether this instance must never be destroyed even when idle (the reserved/default
    /// balloons, and any instance kept alive by `min_balloons`).
    pub pinned: bool,
}

impl Balloon {
    pub fn new(id: u64, type_name: &str, cpuset: std::collections::BTreeSet<CpuId>, group_key: Option<String>) -> Self {
        Self {
            id,
            type_name: type_name.to_string(),
            cpuset,
            containers: BTreeMap::new(),
            group_key,
            state: BalloonState::New,
            pinned: false,
        }
    }

    pub fn cpu_demand_millis(&self) -> u32 {
        self.containers.values().sum()
    }

    pub fn is_idle(&self) -> bool {
        self.containers.is_empty()
    }

    /// Target size per spec §4.4 "Resize": `clamp(ceil(demand/1000), min_cpus, max_cpus)`.
    pub fn target_cpu_count(&self, min_cpus: u32, max_cpus: u32) -> u32 {
        let demand_cpus = (self.cpu_demand_millis() + 999) / 1000;
        demand_cpus.clamp(min_cpus, max_cpus)
    }
}
