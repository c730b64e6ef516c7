//! CPU-level topology facts.

use serde::{Deserialize, Serialize};

/// Identifies a single logical CPU (hardware thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CpuId(pub u32);

impl std::fmt::Display for CpuId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Priority class of a CPU, as exposed by hybrid (big.LITTLE / P-core-E-core) hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuPriority {
    Performance,
    Efficient,
    Normal,
}

impl Default for CpuPriority {
    fn default() -> Self {
        CpuPriority::Normal
    }
}

/// A single logical CPU and the topology coordinates it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpu {
    pub id: CpuId,
    /// SMT siblings share a `core_id`.
    pub core_id: u32,
    pub numa_node: u32,
    pub die: u32,
    pub package: u32,
    pub priority_class: CpuPriority,
    pub isolated: bool,
}

impl Cpu {
    pub fn new(id: u32, core_id: u32, numa_node: u32, die: u32, package: u32) -> Self {
        Self {
            id: CpuId(id),
            core_id,
            numa_node,
            die,
            package,
            priority_class: CpuPriority::Normal,
            isolated: false,
        }
    }

    pub fn with_priority(mut self, priority: CpuPriority) -> Self {
        self.priority_class = priority;
        self
    }

    pub fn isolated(mut self) -> Self {
        self.isolated = true;
        self
    }
}
