//! Assembles the runtime-facing adjustment from a committed [`Allocation`] (spec §4.5/§6):
//! `linux.resources.cpu.cpus`, `linux.resources.cpu.mems`, a handful of `unified` cgroup v2
//! entries, and `envs[]`. The actual transport that carries this to the runtime is out of core
//! (spec §1); this module only builds the value.

use std::collections::BTreeMap;

use policy_core::annotations::Annotation;
use policy_core::{Allocation, ContainerRequest, Qos, SchedulingClass};
use topology::MemNodeId;

/// One container's resolved runtime adjustment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adjustment {
    /// `linux.resources.cpu.cpus`, absent when `cpu.preserve` is set or the allocation has no
    /// exclusive/shared cpuset of its own (e.g. an unlimited BestEffort container).
    pub cpus: Option<String>,
    /// `linux.resources.cpu.mems`, absent when `memory.preserve` is set.
    pub mems: Option<String>,
    /// `linux.resources.unified[key]=value` entries (spec §4.5: `cpu.weight`, `memory.swap.max`;
    /// `misc.max` for sgx_epc is out of core per spec §1 and never set here).
    pub unified: BTreeMap<String, String>,
    /// Environment variables surfaced to the container, e.g. the resolved scheduling class for an
    /// out-of-core exec wrapper to apply via `sched_setscheduler`.
    pub envs: Vec<(String, String)>,
}

impl Adjustment {
    pub fn is_empty(&self) -> bool {
        self.cpus.is_none() && self.mems.is_none() && self.unified.is_empty() && self.envs.is_empty()
    }
}

fn format_memset(mems: &std::collections::BTreeSet<MemNodeId>) -> String {
    let ids: Vec<u32> = mems.iter().map(|m| m.0).collect();
    let mut parts = Vec::new();
    let mut i = 0;
    while i < ids.len() {
        let start = ids[i];
        let mut end = start;
        while i + 1 < ids.len() && ids[i + 1] == end + 1 {
            end = ids[i + 1];
            i += 1;
        }
        parts.push(if start == end { start.to_string() } else { format!("{start}-{end}") });
        i += 1;
    }
    parts.join(",")
}

/// cgroups v2 `cpu.weight` (1..10000) proportional to milli-CPU shares, clamped the way the
/// kernel's own `cpu.shares`-to-`cpu.weight` conversion does (1 share == 1 weight unit at 1000m).
fn weight_from_millis(millis: u32) -> u64 {
    (millis as u64 / 10).clamp(1, 10_000)
}

/// Resolves the `scheduling-class` annotation, if any, against the manager's configured table.
/// Unknown class names are reported to the caller (recorded as a warning) rather than silently
/// dropped; no scheduling class is applied either way.
pub fn resolve_scheduling_class(
    request: &ContainerRequest,
    scheduling_classes: &BTreeMap<String, SchedulingClass>,
) -> Option<SchedulingClass> {
    match request.annotations.get(policy_core::annotations::KEY_SCHEDULING_CLASS) {
        Some(Annotation::SchedulingClass(name)) => match scheduling_classes.get(name) {
            Some(class) => Some(*class),
            None => {
                log::warn!("container {}: unrecognized scheduling class '{name}'", request.container_id);
                None
            }
        },
        _ => None,
    }
}

/// Builds the adjustment for a freshly committed allocation. `allocation.scheduling_class` is
/// expected to already be resolved (policy backends leave it `None`; [`resolve_scheduling_class`]
/// fills it in at the resource-manager layer, which is the only place that holds the
/// `control.schedulingClasses` table, per the comment in `topology_policy::allocator`).
pub fn build_adjustment(request: &ContainerRequest, allocation: &Allocation) -> Adjustment {
    let mut adjustment = Adjustment::default();

    let preserve_cpu = matches!(request.annotations.get(policy_core::annotations::KEY_CPU_PRESERVE), Some(Annotation::CpuPreserve));
    let preserve_memory = matches!(
        request.annotations.get(policy_core::annotations::KEY_MEMORY_PRESERVE),
        Some(Annotation::MemoryPreserve)
    );

    if !preserve_cpu && !allocation.cpus.is_empty() {
        adjustment.cpus = Some(policy_core::config::format_cpuset(&allocation.cpus));
    }
    if !preserve_memory && !allocation.mems.is_empty() {
        adjustment.mems = Some(format_memset(&allocation.mems));
    }

    if allocation.exclusive_cpus.is_empty() && !allocation.cpus.is_empty() {
        adjustment
            .unified
            .insert("cpu.weight".to_string(), weight_from_millis(request.request.cpu_request_millis).to_string());
    }
    if matches!(request.qos(), Qos::Guaranteed) {
        adjustment.unified.insert("memory.swap.max".to_string(), "0".to_string());
    }

    if let Some(class) = allocation.scheduling_class {
        adjustment.envs.push((
            "RESOURCE_POLICY_SCHEDULING_CLASS".to_string(),
            format!(
                "policy={:?},priority={},ioClass={:?},ioPriority={}",
                class.policy, class.priority, class.io_class, class.io_priority
            ),
        ));
    }

    adjustment
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_core::annotations::Scope;
    use policy_core::{Annotations, ContainerId, PodUid, ResourceRequest};
    use std::collections::BTreeSet;
    use topology::CpuId;

    fn request_with(annotations: Annotations, cpu_millis: u32) -> ContainerRequest {
        ContainerRequest {
            pod_uid: PodUid("pod".into()),
            container_id: ContainerId("c1".into()),
            container_name: "c1".into(),
            namespace: "default".into(),
            pod_labels: vec![],
            request: ResourceRequest {
                cpu_request_millis: cpu_millis,
                cpu_limit_millis: cpu_millis,
                memory_request: 1 << 20,
                memory_limit: 1 << 20,
            },
            annotations,
        }
    }

    #[test]
    fn cpu_preserve_suppresses_cpus_field() {
        let mut annotations = Annotations::new();
        annotations.insert(Scope::Container, policy_core::annotations::KEY_CPU_PRESERVE, "");
        let request = request_with(annotations, 1000);
        let allocation = Allocation {
            cpus: [CpuId(0)].into_iter().collect(),
            exclusive_cpus: [CpuId(0)].into_iter().collect(),
            mems: [MemNodeId(0)].into_iter().collect(),
            memory_type_mask: Default::default(),
            scheduling_class: None,
        };
        let adjustment = build_adjustment(&request, &allocation);
        assert!(adjustment.cpus.is_none());
        assert_eq!(adjustment.mems, Some("0".to_string()));
    }

    #[test]
    fn shared_allocation_gets_cpu_weight() {
        let request = request_with(Annotations::new(), 500);
        let allocation = Allocation {
            cpus: [CpuId(0), CpuId(1)].into_iter().collect(),
            exclusive_cpus: BTreeSet::new(),
            mems: [MemNodeId(0)].into_iter().collect(),
            memory_type_mask: Default::default(),
            scheduling_class: None,
        };
        let adjustment = build_adjustment(&request, &allocation);
        assert_eq!(adjustment.unified.get("cpu.weight"), Some(&"50".to_string()));
    }

    #[test]
    fn guaranteed_container_disables_swap() {
        let request = request_with(Annotations::new(), 1000);
        let allocation = Allocation {
            cpus: [CpuId(0)].into_iter().collect(),
            exclusive_cpus: [CpuId(0)].into_iter().collect(),
            mems: [MemNodeId(0)].into_iter().collect(),
            memory_type_mask: Default::default(),
            scheduling_class: None,
        };
        let adjustment = build_adjustment(&request, &allocation);
        assert_eq!(adjustment.unified.get("memory.swap.max"), Some(&"0".to_string()));
    }

    #[test]
    fn unknown_scheduling_class_resolves_to_none() {
        let mut annotations = Annotations::new();
        annotations.insert(Scope::Container, policy_core::annotations::KEY_SCHEDULING_CLASS, "batch-low");
        let request = request_with(annotations, 1000);
        let classes = BTreeMap::new();
        assert!(resolve_scheduling_class(&request, &classes).is_none());
    }
}
