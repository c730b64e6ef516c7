//! The pool-tree allocator: drives the `Allocator` contract (spec §4.3) over a [`PoolArena`],
//! grounded on `dslab-iaas`'s `scheduler.rs` "pick the best host, commit, track per-VM placement"
//! loop, generalized to a tree of pools instead of a flat host list and to milli-CPU shares
//! alongside whole-CPU exclusivity.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use policy_core::annotations::{Annotation, Scope as AnnotationScope};
use policy_core::{
    Allocation, AllocationError, Allocator, ContainerId, ContainerRequest, PodUid, Qos,
};
use topology::{MemNodeId, Topology};

use crate::arena::PoolArena;
use crate::config::TopologyAwareConfig;
use crate::pool::{PoolId, Scope};
use crate::scoring::{self, CandidateScore};

/// Where a container's CPUs came from, kept per container so `release`/`update`/`rebalance` can
/// reverse or redo the commit without re-deriving it from the `Allocation` alone (e.g. which pool
/// owns the milli-CPU shares is not recoverable from a cpuset once it has been unioned with
/// ancestor pools' shares).
#[derive(Debug, Clone)]
struct Placement {
    pod_uid: PodUid,
    namespace: String,
    request: ContainerRequest,
    pool: PoolId,
    exclusive: bool,
    allocation: Allocation,
}

/// Implements the pool-tree policy's [`Allocator`] contract.
pub struct PoolTreeAllocator {
    topology: Topology,
    arena: PoolArena,
    config: TopologyAwareConfig,
    /// Insertion order is the commit order, preserved for `rebalance`'s stable pod-uid replay
    /// (spec §4.3 "iterate all containers in stable pod-uid order").
    placements: IndexMap<ContainerId, Placement>,
}

impl PoolTreeAllocator {
    pub fn new(topology: Topology, config: TopologyAwareConfig) -> Self {
        let arena = PoolArena::build(&topology, config.available_cpus.as_ref(), &config.reserved_cpus);
        Self {
            topology,
            arena,
            config,
            placements: IndexMap::new(),
        }
    }

    fn wants_reserved(&self, request: &ContainerRequest) -> bool {
        match request.annotations.get(policy_core::annotations::KEY_PREFER_RESERVED_CPUS) {
            Some(Annotation::PreferReservedCpus(false)) => false,
            Some(Annotation::PreferReservedCpus(true)) => true,
            _ => self.config.reserved_pool_namespaces.iter().any(|ns| ns == &request.namespace),
        }
    }

    fn has_annotation(request: &ContainerRequest, key: &str, want: impl Fn(&Annotation) -> bool) -> bool {
        request.annotations.get(key).map(want).unwrap_or(false)
    }

    fn same_pod_pools(&self, pod_uid: &PodUid) -> BTreeSet<PoolId> {
        self.placements.values().filter(|p| &p.pod_uid == pod_uid).map(|p| p.pool).collect()
    }

    fn same_namespace_pools(&self, namespace: &str) -> BTreeSet<PoolId> {
        self.placements.values().filter(|p| p.namespace == namespace).map(|p| p.pool).collect()
    }

    /// Pools currently holding a container from a pod carrying `label_key=label_value`, for the
    /// `pod-affinity`/`pod-anti-affinity` annotations (spec §4.3 step 3d). Scoring has no
    /// placement history of its own, so this is resolved here and passed in.
    fn label_affinity_pools(&self, label_key: &str, label_value: &str) -> BTreeSet<PoolId> {
        self.placements
            .values()
            .filter(|p| p.request.pod_labels.iter().any(|(k, v)| k == label_key && v == label_value))
            .map(|p| p.pool)
            .collect()
    }

    /// Places a request against the reserved cpuset tracked at the root pool, capped by arrival
    /// order: once the reserved set is full, later requests are rejected rather than overflowing
    /// into the shared tree (Open Question decision, see DESIGN.md).
    fn allocate_reserved(&mut self, request: &ContainerRequest) -> Result<Allocation, AllocationError> {
        let root = self.arena.root();
        let reserved = self.arena.pool(root).reserved_cpus.clone();
        if reserved.is_empty() {
            return Err(AllocationError::ReservedCpusetOversubscribed);
        }
        let millis = request.request.cpu_request_millis;
        if millis == 0 {
            return Ok(Allocation {
                cpus: reserved.clone(),
                exclusive_cpus: BTreeSet::new(),
                mems: self.select_mems(request, &reserved),
                memory_type_mask: memory_type_mask(request),
                scheduling_class: None,
            });
        }
        if self.arena.free_reserved_millis(root) < millis as i64 {
            return Err(AllocationError::ReservedCpusetOversubscribed);
        }
        self.arena.pool_mut(root).shares.insert(request.container_id.clone(), millis);
        let mems = self.select_mems(request, &reserved);
        Ok(Allocation {
            cpus: reserved.clone(),
            exclusive_cpus: BTreeSet::new(),
            mems,
            memory_type_mask: memory_type_mask(request),
            scheduling_class: None,
        })
    }

    fn select_mems(&self, request: &ContainerRequest, cpus: &BTreeSet<topology::CpuId>) -> BTreeSet<MemNodeId> {
        if !self.config.pin_memory || cpus.is_empty() {
            return BTreeSet::new();
        }
        let mask = memory_type_mask(request);
        let mut candidates: Vec<MemNodeId> = Vec::new();
        for cpu in cpus {
            for mem in self.topology.closest_mems(*cpu) {
                if !candidates.contains(&mem) {
                    candidates.push(mem);
                }
            }
        }
        let mut picked = BTreeSet::new();
        let mut capacity = 0u64;
        for mem in candidates {
            let Some(node) = self.topology.memory_node(mem) else { continue };
            if !mask.matches(node.kind) {
                continue;
            }
            picked.insert(mem);
            capacity += node.capacity_bytes;
            if capacity >= request.request.memory_request {
                break;
            }
        }
        picked
    }

    fn place(&mut self, request: &ContainerRequest) -> Result<(PoolId, Allocation), AllocationError> {
        if Self::has_annotation(request, policy_core::annotations::KEY_CPU_PRESERVE, |_| true)
            || request.qos() == Qos::BestEffort
            || !self.config.pin_cpu
        {
            // CpuPreserve and BestEffort both skip pinning entirely: kubelet/NRI conventions leave
            // BestEffort containers unpinned, and cpu.preserve asks us to leave an existing cpuset
            // (handled by `update`) untouched rather than recompute one.
            return Ok((self.arena.root(), Allocation::default()));
        }
        if self.wants_reserved(request) {
            return self.allocate_reserved(request).map(|a| (self.arena.root(), a));
        }

        let preferred = scoring::preferred_scope(&self.arena, &self.topology, request);
        let exclusive = scoring::wants_exclusive_cpus(request, self.config.prefer_shared_cpus);
        let candidates = scoring::candidates(&self.arena, preferred, request, self.config.prefer_shared_cpus);
        if candidates.is_empty() {
            return Err(AllocationError::NoSuitablePool(request.container_id.clone()));
        }

        let same_pod = self.same_pod_pools(&request.pod_uid);
        let same_ns = self.same_namespace_pools(&request.namespace);
        let affinity_pools = match request.annotations.get(policy_core::annotations::KEY_POD_AFFINITY) {
            Some(Annotation::PodAffinity { label_key, label_value, .. }) => Some(self.label_affinity_pools(label_key, label_value)),
            _ => None,
        };
        let anti_affinity_pools = match request.annotations.get(policy_core::annotations::KEY_POD_ANTI_AFFINITY) {
            Some(Annotation::PodAntiAffinity { label_key, label_value, .. }) => Some(self.label_affinity_pools(label_key, label_value)),
            _ => None,
        };
        let affinity = scoring::AffinityHints {
            affinity_pools: affinity_pools.as_ref(),
            anti_affinity_pools: anti_affinity_pools.as_ref(),
        };
        let mut best: Option<(PoolId, CandidateScore)> = None;
        for pool in &candidates {
            let score = scoring::score_candidate(
                &self.arena,
                pool,
                &self.topology,
                request,
                self.config.colocate_pods,
                self.config.colocate_namespaces,
                self.config.prefer_isolated_cpus,
                self.config.prefer_shared_cpus,
                &same_pod,
                &same_ns,
                affinity,
            );
            if best.as_ref().map(|(_, b)| score > *b).unwrap_or(true) {
                best = Some((pool.id, score));
            }
        }
        let (pool_id, _) = best.expect("candidates is non-empty");

        let millis = request.request.cpu_request_millis.max(if request.request.cpu_request_millis == 0 { 1000 } else { 0 });
        let cpus;
        let exclusive_cpus;
        if exclusive {
            let count = request.request.full_cpus() as usize;
            exclusive_cpus = scoring::pick_exclusive_cpus(&self.arena, pool_id, &self.topology, count);
            if exclusive_cpus.len() < count {
                return Err(AllocationError::NoSuitablePool(request.container_id.clone()));
            }
            self.arena.commit_exclusive(&exclusive_cpus, request.container_id.clone());
            cpus = exclusive_cpus.clone();
        } else {
            exclusive_cpus = BTreeSet::new();
            self.arena.pool_mut(pool_id).shares.insert(request.container_id.clone(), millis);
            cpus = self.arena.cpus_shared(pool_id);
        }

        let mems = self.select_mems(request, &cpus);
        Ok((
            pool_id,
            Allocation {
                cpus,
                exclusive_cpus,
                mems,
                memory_type_mask: memory_type_mask(request),
                scheduling_class: scheduling_class(request),
            },
        ))
    }

    fn unplace(&mut self, container_id: &ContainerId, placement: &Placement) {
        if placement.exclusive {
            self.arena.release_exclusive(&placement.allocation.exclusive_cpus);
        } else {
            self.arena.pool_mut(placement.pool).shares.remove(container_id);
        }
    }
}

fn memory_type_mask(request: &ContainerRequest) -> topology::MemoryTypeMask {
    match request.annotations.get(policy_core::annotations::KEY_MEMORY_TYPE) {
        Some(Annotation::MemoryType(mask)) => *mask,
        _ => topology::MemoryTypeMask::all(),
    }
}

fn scheduling_class(request: &ContainerRequest) -> Option<policy_core::SchedulingClass> {
    match request.annotations.get(policy_core::annotations::KEY_SCHEDULING_CLASS) {
        Some(Annotation::SchedulingClass(_name)) => None, // resolved against config by resource-manager
        _ => None,
    }
}

impl Allocator for PoolTreeAllocator {
    fn allocate(&mut self, request: &ContainerRequest) -> Result<Allocation, AllocationError> {
        let (pool, allocation) = self.place(request)?;
        self.placements.insert(
            request.container_id.clone(),
            Placement {
                pod_uid: request.pod_uid.clone(),
                namespace: request.namespace.clone(),
                request: request.clone(),
                pool,
                exclusive: !allocation.exclusive_cpus.is_empty(),
                allocation: allocation.clone(),
            },
        );
        Ok(allocation)
    }

    fn update(&mut self, container_id: &ContainerId, request: &ContainerRequest) -> Result<Allocation, AllocationError> {
        if let Some(existing) = self.placements.get(container_id).cloned() {
            self.unplace(container_id, &existing);
        }
        match self.place(request) {
            Ok((pool, allocation)) => {
                self.placements.insert(
                    container_id.clone(),
                    Placement {
                        pod_uid: request.pod_uid.clone(),
                        namespace: request.namespace.clone(),
                        request: request.clone(),
                        pool,
                        exclusive: !allocation.exclusive_cpus.is_empty(),
                        allocation: allocation.clone(),
                    },
                );
                Ok(allocation)
            }
            Err(err) => {
                // Best-effort restore of the previous placement so a rejected update doesn't leave
                // the container silently unpinned.
                if let Some(existing) = self.placements.get(container_id).cloned() {
                    let _ = self.place(&existing.request);
                }
                Err(err)
            }
        }
    }

    fn release(&mut self, container_id: &ContainerId) -> Result<(), AllocationError> {
        if let Some(placement) = self.placements.shift_remove(container_id) {
            self.unplace(container_id, &placement);
        }
        Ok(())
    }

    fn rebalance(&mut self) -> Result<Vec<(ContainerId, Allocation)>, AllocationError> {
        let mut order: Vec<(ContainerId, ContainerRequest)> = self
            .placements
            .iter()
            .map(|(id, p)| (id.clone(), p.request.clone()))
            .collect();
        order.sort_by(|a, b| a.1.pod_uid.0.cmp(&b.1.pod_uid.0).then(a.0 .0.cmp(&b.0 .0)));

        for (id, _) in &order {
            if let Some(placement) = self.placements.shift_remove(id) {
                self.unplace(id, &placement);
            }
        }

        let mut changes = Vec::new();
        for (id, request) in order {
            let (pool, allocation) = self.place(&request)?;
            changes.push((id.clone(), allocation.clone()));
            self.placements.insert(
                id,
                Placement {
                    pod_uid: request.pod_uid.clone(),
                    namespace: request.namespace.clone(),
                    request,
                    pool,
                    exclusive: !allocation.exclusive_cpus.is_empty(),
                    allocation,
                },
            );
        }
        Ok(changes)
    }

    fn topology_changed(&mut self, topology: &Topology) {
        self.topology = topology.clone();
        self.arena = PoolArena::build(&self.topology, self.config.available_cpus.as_ref(), &self.config.reserved_cpus);
        for (id, placement) in self.placements.iter() {
            if placement.exclusive {
                self.arena.commit_exclusive(&placement.allocation.exclusive_cpus, id.clone());
            } else {
                self.arena.pool_mut(placement.pool).shares.insert(id.clone(), placement.request.request.cpu_request_millis);
            }
        }
    }
}

impl PoolTreeAllocator {
    pub fn describe(&self) -> Vec<String> {
        self.arena
            .all()
            .filter(|p| matches!(p.scope, Scope::Package | Scope::Die | Scope::Numa))
            .map(|p| {
                format!(
                    "{:?}(pkg={},die={},numa={}) total={} shared={} reserved={} demand_millis={}",
                    p.scope,
                    p.package,
                    p.die,
                    p.numa_node,
                    p.cpus_total.len(),
                    self.arena.cpus_shared(p.id).len(),
                    p.reserved_cpus.len(),
                    p.cpu_demand_millis(),
                )
            })
            .collect()
    }

    pub fn published_zones(&self) -> Vec<String> {
        self.arena.of_scope(Scope::Numa).map(|p| p.zone_name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_core::{Annotations, ResourceRequest};
    use topology::SyntheticTopologyBuilder;

    fn topo() -> Topology {
        SyntheticTopologyBuilder::new().numa_per_die(2).cores_per_numa(4).build().unwrap()
    }

    fn request(pod: &str, container: &str, namespace: &str, millis: u32) -> ContainerRequest {
        ContainerRequest {
            pod_uid: PodUid(pod.into()),
            container_id: ContainerId(container.into()),
            container_name: container.into(),
            namespace: namespace.into(),
            pod_labels: vec![],
            request: ResourceRequest {
                cpu_request_millis: millis,
                cpu_limit_millis: millis,
                memory_request: 1 << 20,
                memory_limit: 1 << 20,
            },
            annotations: Annotations::new(),
        }
    }

    #[test]
    fn guaranteed_integral_request_gets_exclusive_cpus() {
        let mut allocator = PoolTreeAllocator::new(topo(), TopologyAwareConfig::default());
        let allocation = allocator.allocate(&request("pod-a", "c1", "default", 2000)).unwrap();
        assert_eq!(allocation.exclusive_cpus.len(), 2);
        assert_eq!(allocation.cpus, allocation.exclusive_cpus);
    }

    #[test]
    fn best_effort_gets_no_pinning() {
        let mut allocator = PoolTreeAllocator::new(topo(), TopologyAwareConfig::default());
        let req = request("pod-b", "c1", "default", 0);
        let allocation = allocator.allocate(&req).unwrap();
        assert!(allocation.cpus.is_empty());
    }

    #[test]
    fn release_frees_exclusive_cpus_for_reuse() {
        let mut allocator = PoolTreeAllocator::new(topo(), TopologyAwareConfig::default());
        let id = ContainerId("c1".into());
        allocator.allocate(&request("pod-a", "c1", "default", 4000)).unwrap();
        allocator.release(&id).unwrap();
        let second = allocator.allocate(&request("pod-c", "c2", "default", 4000)).unwrap();
        assert_eq!(second.exclusive_cpus.len(), 4);
    }

    #[test]
    fn topology_hint_steers_shared_placement_to_named_zone() {
        let mut allocator = PoolTreeAllocator::new(topo(), TopologyAwareConfig::default());
        let target_zone = allocator.arena.of_scope(Scope::Numa).nth(1).unwrap().zone_name();

        let mut req = request("pod-a", "c1", "default", 500);
        req.annotations.insert(
            policy_core::annotations::Scope::Container,
            policy_core::annotations::KEY_TOPOLOGY_HINT,
            &target_zone,
        );
        let allocation = allocator.allocate(&req).unwrap();
        let placed_pool = allocator.placements.get(&ContainerId("c1".into())).unwrap().pool;
        assert_eq!(allocator.arena.pool(placed_pool).zone_name(), target_zone);
        assert!(!allocation.cpus.is_empty());
    }

    #[test]
    fn rebalance_on_balanced_state_is_a_noop() {
        let mut allocator = PoolTreeAllocator::new(topo(), TopologyAwareConfig::default());
        allocator.allocate(&request("pod-a", "c1", "default", 1000)).unwrap();
        allocator.allocate(&request("pod-b", "c2", "default", 1000)).unwrap();
        let before: Vec<_> = allocator.placements.values().map(|p| p.allocation.clone()).collect();
        allocator.rebalance().unwrap();
        let after: Vec<_> = allocator.placements.values().map(|p| p.allocation.clone()).collect();
        assert_eq!(before, after);
    }
}
