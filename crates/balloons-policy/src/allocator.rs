//! The balloon-set allocator: drives the `Allocator` contract (spec §4.4) over a flat collection
//! of [`Balloon`] instances, grounded on `dslab-iaas`'s `scheduler.rs` (hold a configured
//! placement strategy, iterate candidates, commit the best one) generalized from "pick one host"
//! to "pick one balloon type, then one instance of it".

use std::collections::BTreeSet;

use indexmap::IndexMap;

use policy_core::annotations::Annotation;
use policy_core::{Allocation, AllocationError, Allocator, ContainerId, ContainerRequest, PodUid};
use topology::{CpuId, MemNodeId, Topology};

use crate::config::BalloonsConfig;
use crate::idle::{pick_for_deflate, rank_idle_cpus};
use crate::loadclass::LoadClassTracker;
use crate::matcher::{self, DEFAULT_BALLOON_TYPE, RESERVED_BALLOON_TYPE};
use crate::types::{Balloon, BalloonState, BalloonType, CpuClass};

#[derive(Debug, Clone)]
struct Placement {
    balloon_id: u64,
    request: ContainerRequest,
}

/// Component 4: the balloon set. Holds every configured [`BalloonType`] (plus the synthesized
/// implicit `default`/`reserved` types, spec §3), the live [`Balloon`] instances, and the
/// load-class anti-affinity tracker shared across all of them.
pub struct BalloonSetAllocator {
    topology: Topology,
    config: BalloonsConfig,
    types: Vec<BalloonType>,
    balloons: IndexMap<u64, Balloon>,
    next_id: u64,
    placements: IndexMap<ContainerId, Placement>,
    load_tracker: LoadClassTracker,
}

impl BalloonSetAllocator {
    pub fn new(topology: Topology, config: BalloonsConfig) -> Self {
        let mut types = config.balloon_types.clone();
        ensure_implicit_types(&mut types, &topology);

        let mut allocator = Self {
            topology,
            config,
            types,
            balloons: IndexMap::new(),
            next_id: 0,
            placements: IndexMap::new(),
            load_tracker: LoadClassTracker::new(),
        };
        allocator.startup_preallocate();
        allocator
    }

    /// Spec §4.4 "Startup": pre-create `min_balloons` instances of `min_cpus` size for every
    /// configured type, drawn from the idle pool in allocator-priority order.
    fn startup_preallocate(&mut self) {
        let types: Vec<BalloonType> = self.types.clone();
        for t in &types {
            for _ in 0..t.min_balloons {
                let cpus = self.draw_idle_cpus(t, t.min_cpus as usize);
                let id = self.fresh_id();
                let mut balloon = Balloon::new(id, &t.name, cpus, None);
                balloon.pinned = true;
                balloon.state = BalloonState::Empty;
                self.balloons.insert(id, balloon);
            }
        }
    }

    fn fresh_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn idle_cpus(&self) -> BTreeSet<CpuId> {
        let owned: BTreeSet<CpuId> = self.balloons.values().flat_map(|b| b.cpuset.iter().copied()).collect();
        self.topology.cpu_ids().difference(&owned).copied().collect()
    }

    fn draw_idle_cpus(&self, t: &BalloonType, count: usize) -> BTreeSet<CpuId> {
        let idle = self.idle_cpus();
        let ranked = rank_idle_cpus(&self.topology, &idle, t.cpu_class, self.config.allocator_topology_balancing);
        ranked.into_iter().take(count).collect()
    }

    fn find_type<'a>(&'a self, name: &str) -> Option<&'a BalloonType> {
        self.types.iter().find(|t| t.name == name)
    }

    fn instances_of<'a>(&'a self, type_name: &str, group_key: Option<&str>) -> Vec<&'a Balloon> {
        self.balloons
            .values()
            .filter(|b| b.type_name == type_name && b.state != BalloonState::Destroyed)
            .filter(|b| b.group_key.as_deref() == group_key)
            .collect()
    }

    fn group_key(t: &BalloonType, request: &ContainerRequest) -> Option<String> {
        let key = t.group_by.as_ref()?;
        request.pod_labels.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    /// Spec §4.4 "Balloon instance selection": create a new instance when preferred/forced and
    /// room allows, else the smallest-fitting existing instance, tie-broken by pod spreading.
    fn select_instance(&mut self, t: &BalloonType, group_key: Option<String>, request: &ContainerRequest) -> Result<u64, String> {
        let existing_ids: Vec<u64> = self.instances_of(&t.name, group_key.as_deref()).iter().map(|b| b.id).collect();
        let millis = request.request.cpu_request_millis.max(1);

        let want_new = (t.prefer_new_balloons || existing_ids.is_empty()) && (existing_ids.len() as u32) < t.max_balloons;
        if want_new {
            let cpus = self.draw_idle_cpus(t, t.min_cpus as usize);
            if cpus.len() as u32 >= t.min_cpus {
                let id = self.fresh_id();
                let balloon = Balloon::new(id, &t.name, cpus, group_key);
                self.balloons.insert(id, balloon);
                return Ok(id);
            }
        }

        let mut best: Option<(u64, u32, usize)> = None; // (id, resulting demand, same-pod containers)
        for id in existing_ids {
            let balloon = &self.balloons[&id];
            let resulting = balloon.cpu_demand_millis() + millis;
            if resulting > t.max_cpus.saturating_mul(1000) {
                continue;
            }
            let same_pod = if t.prefer_spreading_pods {
                balloon
                    .containers
                    .keys()
                    .filter(|cid| self.placements.get(cid).map(|p| p.request.pod_uid == request.pod_uid).unwrap_or(false))
                    .count()
            } else {
                0
            };
            let better = match &best {
                None => true,
                Some((_, best_demand, best_same_pod)) => (resulting, same_pod) < (*best_demand, *best_same_pod),
            };
            if better {
                best = Some((id, resulting, same_pod));
            }
        }
        best.map(|(id, _, _)| id)
            .ok_or_else(|| format!("balloon type '{}' has no instance with room for {millis}m", t.name))
    }

    /// Resizes `balloon_id` to its target size after a membership change (spec §4.4 "Resize").
    /// Returns an error string (load-class conflict or insufficient idle CPUs) instead of
    /// committing a partial resize.
    fn resize(&mut self, balloon_id: u64, t: &BalloonType) -> Result<(), String> {
        let target = {
            let balloon = &self.balloons[&balloon_id];
            balloon.target_cpu_count(t.min_cpus, t.max_cpus) as usize
        };
        let current = self.balloons[&balloon_id].cpuset.len();

        let final_cpuset = if target > current {
            let need = target - current;
            let idle = self.idle_cpus();
            let ranked = rank_idle_cpus(&self.topology, &idle, t.cpu_class, self.config.allocator_topology_balancing);
            if ranked.len() < need {
                return Err(format!("balloon type '{}' has no idle CPUs left to inflate", t.name));
            }
            let grant: BTreeSet<CpuId> = ranked.into_iter().take(need).collect();
            let mut candidate = self.balloons[&balloon_id].cpuset.clone();
            candidate.extend(grant.iter().copied());
            if !self.load_tracker.can_acquire(&self.topology, balloon_id, &t.loads, &candidate) {
                return Err(format!("balloon type '{}' conflicts with a load-class anti-affinity edge", t.name));
            }
            self.balloons.get_mut(&balloon_id).unwrap().cpuset = candidate.clone();
            self.balloons.get_mut(&balloon_id).unwrap().state = BalloonState::Inflating;
            candidate
        } else if target < current {
            let need = current - target;
            let held = self.balloons[&balloon_id].cpuset.clone();
            let release = pick_for_deflate(&self.topology, &held, t.cpu_class, self.config.allocator_topology_balancing, need);
            let balloon = self.balloons.get_mut(&balloon_id).unwrap();
            for cpu in &release {
                balloon.cpuset.remove(cpu);
            }
            balloon.state = BalloonState::Deflating;
            balloon.cpuset.clone()
        } else {
            self.balloons[&balloon_id].cpuset.clone()
        };

        // Registers (or re-registers) this balloon's load-class occupancy against its final
        // cpuset unconditionally, not just on inflate — a balloon whose `min_cpus == max_cpus`
        // never takes the inflate/deflate branch on its first assignment, and would otherwise
        // never show up to `LoadClassTracker::can_acquire` for a conflicting balloon placed later.
        self.load_tracker.acquire(&self.topology, balloon_id, &t.loads, &final_cpuset);

        let balloon = self.balloons.get_mut(&balloon_id).unwrap();
        balloon.state = if balloon.containers.is_empty() { BalloonState::Empty } else { BalloonState::Populated };
        Ok(())
    }

    fn select_mems(&self, t: &BalloonType, cpus: &BTreeSet<CpuId>, memory_request: u64) -> BTreeSet<MemNodeId> {
        if !t.pin_memory || cpus.is_empty() {
            return BTreeSet::new();
        }
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
            if !t.memory_types.matches(node.kind) {
                continue;
            }
            picked.insert(mem);
            capacity += node.capacity_bytes;
            if capacity >= memory_request {
                break;
            }
        }
        picked
    }

    fn wants_reserved(request: &ContainerRequest) -> Option<bool> {
        match request.annotations.get(policy_core::annotations::KEY_PREFER_RESERVED_CPUS) {
            Some(Annotation::PreferReservedCpus(v)) => Some(*v),
            _ => None,
        }
    }

    fn place(&mut self, request: &ContainerRequest) -> Result<(u64, Allocation), AllocationError> {
        let type_name = if Self::wants_reserved(request) == Some(true) {
            RESERVED_BALLOON_TYPE.to_string()
        } else {
            matcher::match_type(&self.types, request)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| matcher::implicit_balloon_name().to_string())
        };
        let t = self
            .find_type(&type_name)
            .cloned()
            .ok_or_else(|| AllocationError::NoSuitableBalloon(request.container_id.clone(), format!("unknown balloon type '{type_name}'")))?;

        let group_key = Self::group_key(&t, request);
        let balloon_id = self
            .select_instance(&t, group_key.clone(), request)
            .map_err(|reason| AllocationError::NoSuitableBalloon(request.container_id.clone(), reason))?;

        let millis = request.request.cpu_request_millis.max(1);
        self.balloons.get_mut(&balloon_id).unwrap().containers.insert(request.container_id.clone(), millis);

        if let Err(reason) = self.resize(balloon_id, &t) {
            // Roll back the membership change so a failed resize never leaves a dangling share.
            self.balloons.get_mut(&balloon_id).unwrap().containers.remove(&request.container_id);
            return Err(AllocationError::NoSuitableBalloon(request.container_id.clone(), reason));
        }

        let cpus = self.balloons[&balloon_id].cpuset.clone();
        let mems = self.select_mems(&t, &cpus, request.request.memory_request);
        Ok((
            balloon_id,
            Allocation {
                cpus,
                exclusive_cpus: BTreeSet::new(),
                mems,
                memory_type_mask: t.memory_types,
                scheduling_class: None,
            },
        ))
    }

    fn unplace(&mut self, container_id: &ContainerId, placement: &Placement) {
        let Some(balloon) = self.balloons.get_mut(&placement.balloon_id) else { return };
        balloon.containers.remove(container_id);
        let type_name = balloon.type_name.clone();
        if let Some(t) = self.find_type(&type_name).cloned() {
            let _ = self.resize(placement.balloon_id, &t);
        }
        let balloon = &self.balloons[&placement.balloon_id];
        if balloon.is_idle() {
            self.load_tracker.release(placement.balloon_id);
            if !balloon.pinned {
                self.balloons.get_mut(&placement.balloon_id).unwrap().state = BalloonState::Destroyed;
            }
        }
    }

    pub fn describe(&self) -> Vec<String> {
        self.balloons
            .values()
            .filter(|b| b.state != BalloonState::Destroyed)
            .map(|b| {
                format!(
                    "balloon#{} type={} cpus={} demand_millis={} containers={} state={:?}",
                    b.id,
                    b.type_name,
                    b.cpuset.len(),
                    b.cpu_demand_millis(),
                    b.containers.len(),
                    b.state
                )
            })
            .collect()
    }

    pub fn published_zones(&self) -> Vec<String> {
        self.balloons
            .values()
            .filter(|b| b.state != BalloonState::Destroyed)
            .map(|b| format!("balloon-{}-{}", b.type_name, b.id))
            .collect()
    }
}

/// Synthesizes the always-present `default` and `reserved` balloon types when configuration
/// doesn't define them explicitly (spec §3 "Reserved balloon and default balloon are implicit,
/// always-present balloons"). `default` matches every namespace as the last-resort fallback;
/// `reserved` is never matched by the normal matcher precedence, only selected directly for
/// `prefer-reserved-cpus: true` containers (see DESIGN.md Open Question decision).
fn ensure_implicit_types(types: &mut Vec<BalloonType>, topology: &Topology) {
    let total_cpus = topology.cpus().count() as u32;
    if !types.iter().any(|t| t.name == DEFAULT_BALLOON_TYPE) {
        types.push(BalloonType {
            name: DEFAULT_BALLOON_TYPE.to_string(),
            namespaces: vec!["*".to_string()],
            match_expressions: vec![],
            min_cpus: 0,
            max_cpus: total_cpus,
            min_balloons: 1,
            max_balloons: 1,
            allocator_priority: crate::types::AllocatorPriority::Normal,
            cpu_class: CpuClass::Balanced,
            memory_types: topology::MemoryTypeMask::all(),
            prefer_new_balloons: false,
            prefer_spreading_pods: false,
            prefer_spreading_namespaces: false,
            group_by: None,
            loads: vec![],
            pin_cpu: true,
            pin_memory: true,
        });
    }
    if !types.iter().any(|t| t.name == RESERVED_BALLOON_TYPE) {
        types.push(BalloonType {
            name: RESERVED_BALLOON_TYPE.to_string(),
            namespaces: vec![],
            match_expressions: vec![],
            min_cpus: 0,
            max_cpus: total_cpus,
            min_balloons: 1,
            max_balloons: 1,
            allocator_priority: crate::types::AllocatorPriority::Normal,
            cpu_class: CpuClass::Normal,
            memory_types: topology::MemoryTypeMask::all(),
            prefer_new_balloons: false,
            prefer_spreading_pods: false,
            prefer_spreading_namespaces: false,
            group_by: None,
            loads: vec![],
            pin_cpu: true,
            pin_memory: true,
        });
    }
}

impl Allocator for BalloonSetAllocator {
    fn allocate(&mut self, request: &ContainerRequest) -> Result<Allocation, AllocationError> {
        let (balloon_id, allocation) = self.place(request)?;
        self.placements.insert(
            request.container_id.clone(),
            Placement {
                balloon_id,
                request: request.clone(),
            },
        );
        Ok(allocation)
    }

    fn update(&mut self, container_id: &ContainerId, request: &ContainerRequest) -> Result<Allocation, AllocationError> {
        if let Some(existing) = self.placements.get(container_id).cloned() {
            self.unplace(container_id, &existing);
        }
        match self.place(request) {
            Ok((balloon_id, allocation)) => {
                self.placements.insert(
                    container_id.clone(),
                    Placement {
                        balloon_id,
                        request: request.clone(),
                    },
                );
                Ok(allocation)
            }
            Err(err) => {
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
        order.sort_by(|a, b| pod_sort_key(&a.1.pod_uid).cmp(&pod_sort_key(&b.1.pod_uid)).then(a.0 .0.cmp(&b.0 .0)));

        for (id, _) in &order {
            if let Some(placement) = self.placements.shift_remove(id) {
                self.unplace(id, &placement);
            }
        }

        let mut changes = Vec::new();
        for (id, request) in order {
            let (balloon_id, allocation) = self.place(&request)?;
            changes.push((id.clone(), allocation.clone()));
            self.placements.insert(id, Placement { balloon_id, request });
        }
        Ok(changes)
    }

    fn topology_changed(&mut self, topology: &Topology) {
        self.topology = topology.clone();
        let vanished: Vec<CpuId> = self
            .balloons
            .values()
            .flat_map(|b| b.cpuset.iter().copied())
            .filter(|c| topology.cpu(*c).is_none())
            .collect();
        for balloon in self.balloons.values_mut() {
            for cpu in &vanished {
                balloon.cpuset.remove(cpu);
            }
        }
    }
}

fn pod_sort_key(pod_uid: &PodUid) -> &str {
    &pod_uid.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_core::{Annotations, ResourceRequest};
    use topology::SyntheticTopologyBuilder;

    fn topo() -> Topology {
        SyntheticTopologyBuilder::new().numa_per_die(2).cores_per_numa(4).build().unwrap()
    }

    fn req(pod: &str, container: &str, millis: u32) -> ContainerRequest {
        ContainerRequest {
            pod_uid: PodUid(pod.into()),
            container_id: ContainerId(container.into()),
            container_name: container.into(),
            namespace: "default".into(),
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

    fn singleton_type() -> BalloonType {
        BalloonType {
            name: "singleton".into(),
            namespaces: vec!["*".into()],
            match_expressions: vec![],
            min_cpus: 2,
            max_cpus: 2,
            min_balloons: 0,
            max_balloons: 1,
            allocator_priority: crate::types::AllocatorPriority::Normal,
            cpu_class: CpuClass::Balanced,
            memory_types: topology::MemoryTypeMask::all(),
            prefer_new_balloons: false,
            prefer_spreading_pods: false,
            prefer_spreading_namespaces: false,
            group_by: None,
            loads: vec![],
            pin_cpu: true,
            pin_memory: true,
        }
    }

    /// BAL-1: balloon type `singleton` (minCPUs=maxCPUs=2, maxBalloons=1). 1500m succeeds,
    /// +500m succeeds (same balloon), +100m fails with `NoSuitableBalloon`.
    #[test]
    fn bal1_singleton_balloon_fills_then_rejects() {
        let config = BalloonsConfig {
            balloon_types: vec![singleton_type()],
            ..Default::default()
        };
        let mut allocator = BalloonSetAllocator::new(topo(), config);
        allocator.allocate(&req("pod-1", "c1", 1500)).unwrap();
        allocator.allocate(&req("pod-2", "c2", 500)).unwrap();
        let err = allocator.allocate(&req("pod-3", "c3", 100)).unwrap_err();
        assert!(matches!(err, AllocationError::NoSuitableBalloon(_, _)));
    }

    fn dynamictwo_type() -> BalloonType {
        BalloonType {
            name: "dynamictwo".into(),
            namespaces: vec!["*".into()],
            match_expressions: vec![],
            min_cpus: 1,
            max_cpus: 1,
            min_balloons: 0,
            max_balloons: 2,
            allocator_priority: crate::types::AllocatorPriority::Normal,
            cpu_class: CpuClass::Balanced,
            memory_types: topology::MemoryTypeMask::all(),
            prefer_new_balloons: true,
            prefer_spreading_pods: false,
            prefer_spreading_namespaces: false,
            group_by: None,
            loads: vec![],
            pin_cpu: true,
            pin_memory: true,
        }
    }

    /// BAL-2: type `dynamictwo` (maxBalloons=2, minCPUs=maxCPUs=1, preferNewBalloons=true).
    /// 800m/600m/300m in sequence: 1st and 2nd each create a new balloon, 3rd lands in the 2nd
    /// balloon (demand 900m <= 1000m).
    #[test]
    fn bal2_prefer_new_balloons_then_packs_into_existing() {
        let config = BalloonsConfig {
            balloon_types: vec![dynamictwo_type()],
            ..Default::default()
        };
        let mut allocator = BalloonSetAllocator::new(topo(), config);
        let a = allocator.allocate(&req("pod-1", "c1", 800)).unwrap();
        let b = allocator.allocate(&req("pod-2", "c2", 600)).unwrap();
        assert!(a.cpus.is_disjoint(&b.cpus));
        let c = allocator.allocate(&req("pod-3", "c3", 300)).unwrap();
        assert_eq!(c.cpus, b.cpus);
    }

    /// BAL-3: type `mem-types` restricted to HBM+PMEM. A container requesting
    /// `memory-type=hbm,dram,pmem` gets mems = the intersection of its package's nodes with
    /// HBM∪PMEM (the type's own restriction always wins over a wider container request).
    #[test]
    fn bal3_memory_type_restriction_intersects_with_type() {
        let mut topo = SyntheticTopologyBuilder::new().numa_per_die(3).cores_per_numa(2).build().unwrap();
        let mut cpus: Vec<topology::Cpu> = topo.cpus().cloned().collect();
        let mut mems: Vec<topology::MemoryNode> = topo.memory_nodes().cloned().collect();
        mems[0].kind = topology::MemoryKind::Hbm;
        mems[1].kind = topology::MemoryKind::Dram;
        mems[2].kind = topology::MemoryKind::Pmem;
        topo = Topology::build(std::mem::take(&mut cpus), mems).unwrap();

        let mem_type = BalloonType {
            name: "mem-types".into(),
            namespaces: vec!["*".into()],
            match_expressions: vec![],
            min_cpus: 2,
            max_cpus: 6,
            min_balloons: 0,
            max_balloons: 1,
            allocator_priority: crate::types::AllocatorPriority::Normal,
            cpu_class: CpuClass::Balanced,
            memory_types: topology::MemoryTypeMask { dram: false, hbm: true, pmem: true },
            prefer_new_balloons: false,
            prefer_spreading_pods: false,
            prefer_spreading_namespaces: false,
            group_by: None,
            loads: vec![],
            pin_cpu: true,
            pin_memory: true,
        };
        let config = BalloonsConfig {
            balloon_types: vec![mem_type],
            ..Default::default()
        };
        let mut allocator = BalloonSetAllocator::new(topo, config);
        let mut request = req("pod-1", "c1", 2000);
        // Larger than a single node's capacity, so selection must span two nodes; if the type's
        // memory-type restriction were ignored, the closest (by id) node 1 (DRAM) would be picked.
        request.request.memory_request = (1u64 << 30) + 1;
        request
            .annotations
            .insert(policy_core::annotations::Scope::Container, policy_core::annotations::KEY_MEMORY_TYPE, "hbm,dram,pmem");
        let allocation = allocator.allocate(&request).unwrap();
        assert!(!allocation.mems.is_empty());
        assert!(allocation.mems.iter().all(|m| m.0 == 0 || m.0 == 2));
        assert!(!allocation.mems.contains(&topology::MemNodeId(1)));
    }

    fn fixed_size_l2_type(name: &str) -> BalloonType {
        BalloonType {
            name: name.into(),
            namespaces: vec!["*".into()],
            match_expressions: vec![],
            min_cpus: 2,
            max_cpus: 2,
            min_balloons: 0,
            max_balloons: 2,
            allocator_priority: crate::types::AllocatorPriority::Normal,
            cpu_class: CpuClass::Balanced,
            memory_types: topology::MemoryTypeMask::all(),
            prefer_new_balloons: true,
            prefer_spreading_pods: false,
            prefer_spreading_namespaces: false,
            group_by: None,
            loads: vec![crate::types::LoadClass::L2],
            pin_cpu: true,
            pin_memory: true,
        }
    }

    /// A balloon whose `min_cpus == max_cpus` never takes the inflate/deflate branch in
    /// `resize()` on first assignment (target == current already), so its load-class occupancy
    /// must still be registered — otherwise a second L2 balloon on the same NUMA node would never
    /// see a conflict, silently defeating the anti-affinity invariant (spec §4.4).
    #[test]
    fn fixed_size_balloon_registers_load_class_without_inflate() {
        // A single 4-CPU NUMA node: two 2-CPU balloons both land on node 0, so any failure to
        // register the first balloon's load-class occupancy is directly observable.
        let single_node_topo = SyntheticTopologyBuilder::new().numa_per_die(1).cores_per_numa(4).build().unwrap();
        let config = BalloonsConfig {
            balloon_types: vec![fixed_size_l2_type("l2-pinned")],
            ..Default::default()
        };
        let mut allocator = BalloonSetAllocator::new(single_node_topo, config);
        let first = allocator.allocate(&req("pod-1", "c1", 1000)).unwrap();
        let second = allocator.allocate(&req("pod-2", "c2", 1000)).unwrap();
        assert!(first.cpus.is_disjoint(&second.cpus));

        assert!(!allocator.load_tracker.can_acquire(
            &allocator.topology,
            999,
            &[crate::types::LoadClass::L2],
            &second.cpus
        ));
    }

    #[test]
    fn release_frees_cpus_for_reuse() {
        let config = BalloonsConfig {
            balloon_types: vec![dynamictwo_type()],
            ..Default::default()
        };
        let mut allocator = BalloonSetAllocator::new(topo(), config);
        let id = ContainerId("c1".into());
        let first = allocator.allocate(&req("pod-1", "c1", 800)).unwrap();
        allocator.release(&id).unwrap();
        let second = allocator.allocate(&req("pod-2", "c2", 800)).unwrap();
        assert_eq!(first.cpus, second.cpus);
    }
}
