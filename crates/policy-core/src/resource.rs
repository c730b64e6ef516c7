//! Resource request/limit and the resulting allocation record.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use topology::{CpuId, MemNodeId, MemoryTypeMask};

use crate::scheduling::SchedulingClass;

/// A container's resource request, as declared by the workload (0 = unlimited).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cpu_request_millis: u32,
    pub cpu_limit_millis: u32,
    pub memory_request: u64,
    pub memory_limit: u64,
}

impl ResourceRequest {
    /// Whether the CPU request is an integral number of full CPUs (eligible for exclusive
    /// allocation when the container is Guaranteed).
    pub fn is_full_cpu_integral(&self) -> bool {
        self.cpu_request_millis > 0 && self.cpu_request_millis % 1000 == 0
    }

    pub fn full_cpus(&self) -> u32 {
        self.cpu_request_millis / 1000
    }

    pub fn is_unlimited(&self) -> bool {
        self.cpu_limit_millis == 0
    }
}

/// The result of granting a container resources: which CPUs, which are held exclusively, and
/// which memory nodes back its allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub cpus: BTreeSet<CpuId>,
    pub exclusive_cpus: BTreeSet<CpuId>,
    pub mems: BTreeSet<MemNodeId>,
    pub memory_type_mask: MemoryTypeMask,
    pub scheduling_class: Option<SchedulingClass>,
}

impl Allocation {
    pub fn is_empty(&self) -> bool {
        self.cpus.is_empty() && self.mems.is_empty()
    }
}
