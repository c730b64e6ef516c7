//! Candidate scope/pool selection and the scoring tuple from spec §4.3 step 1-3, grounded on
//! `dslab-iaas`'s `vm_placement_algorithms/*.rs` shape (scan every candidate host, compute one
//! comparable score per candidate, keep the best) generalized from "select one host" to "select
//! one pool and the exclusive CPUs within it".

use std::cmp::Ordering;
use std::collections::BTreeSet;

use policy_core::annotations::{Annotation, KEY_POD_AFFINITY, KEY_POD_ANTI_AFFINITY, KEY_TOPOLOGY_HINT};
use policy_core::ContainerRequest;
use topology::{CpuId, Topology};

use crate::arena::PoolArena;
use crate::pool::{Pool, PoolId, Scope};

/// How finely a request should be placed, before the candidate list is narrowed by capacity.
fn scope_rank(scope: Scope) -> u8 {
    match scope {
        Scope::Root => 0,
        Scope::Package => 1,
        Scope::Die => 2,
        Scope::Numa => 3,
        Scope::Core => 4,
    }
}

/// Spec §4.3 step 1: derive the preferred scope from the CPU request size.
pub fn preferred_scope(arena: &PoolArena, topology: &Topology, request: &ContainerRequest) -> Scope {
    let millis = request.request.cpu_request_millis;
    if millis == 0 {
        return unlimited_scope(request);
    }
    if millis <= 1000 {
        return if request.request.is_full_cpu_integral() {
            Scope::Core
        } else {
            Scope::Numa
        };
    }
    let cpus_needed = (millis as f64 / 1000.0).ceil() as usize;
    if topology.memory_nodes().any(|n| topology.closest_cpus(n.id).len() >= cpus_needed) {
        return Scope::Numa;
    }
    for die_pool in arena.of_scope(Scope::Die) {
        if die_pool.cpus_total.len() >= cpus_needed {
            return Scope::Die;
        }
    }
    for package_pool in arena.of_scope(Scope::Package) {
        if package_pool.cpus_total.len() >= cpus_needed {
            return Scope::Package;
        }
    }
    Scope::Root
}

/// The default scope for unlimited Burstable containers (spec §4.3 step 4), overridable per
/// container via the `unlimited-burstable` annotation.
fn unlimited_scope(request: &ContainerRequest) -> Scope {
    use policy_core::annotations::UnlimitedBurstableScope as U;
    match request.annotations.get(policy_core::annotations::KEY_UNLIMITED_BURSTABLE) {
        Some(Annotation::UnlimitedBurstable(U::Numa)) => Scope::Numa,
        Some(Annotation::UnlimitedBurstable(U::Die)) => Scope::Die,
        Some(Annotation::UnlimitedBurstable(U::System)) => Scope::Root,
        _ => Scope::Package, // "socket" default
    }
}

/// Whether this request should carve out whole exclusive CPUs rather than milli-CPU shares.
/// `prefer_shared_cpus_default` is the policy-wide `preferSharedCPUs` config option (spec §6); it
/// only applies when the container carries no `prefer-shared-cpus` annotation of its own, the same
/// annotation-overrides-config precedence `PoolTreeAllocator::wants_reserved` applies to
/// `prefer-reserved-cpus`/`reservedPoolNamespaces`.
pub fn wants_exclusive_cpus(request: &ContainerRequest, prefer_shared_cpus_default: bool) -> bool {
    match request.annotations.get(policy_core::annotations::KEY_PREFER_SHARED_CPUS) {
        Some(Annotation::PreferSharedCpus(prefer_shared)) => {
            if *prefer_shared {
                return false;
            }
        }
        _ => {
            if prefer_shared_cpus_default {
                return false;
            }
        }
    }
    request.qos() == policy_core::Qos::Guaranteed && request.request.is_full_cpu_integral()
}

/// Spec §4.3 step 2: every pool at or below `preferred` whose free capacity satisfies `request`.
///
/// Exclusive (integral-CPU) requests bin-pack: candidates include `preferred` and every finer
/// descendant scope, since a smaller subtree that still holds enough whole CPUs is a tighter fit.
/// Shared (milli-CPU) requests instead get pinned to whatever granularity `preferred_scope` chose
/// — handing a fractional request down to a single core would defeat the point of sharing across
/// a NUMA node's worth of CPUs — escalating to the next coarser scope only if nothing at
/// `preferred` has room.
pub fn candidates<'a>(
    arena: &'a PoolArena,
    preferred: Scope,
    request: &ContainerRequest,
    prefer_shared_cpus_default: bool,
) -> Vec<&'a Pool> {
    let cpus_needed = cpus_needed_millis(request);
    if wants_exclusive_cpus(request, prefer_shared_cpus_default) {
        let rank = scope_rank(preferred);
        arena
            .all()
            .filter(|p| scope_rank(p.scope) >= rank)
            .filter(|p| pool_has_headroom(arena, p, cpus_needed, request, prefer_shared_cpus_default))
            .collect()
    } else {
        let mut rank = scope_rank(preferred);
        loop {
            let at_rank: Vec<&Pool> = arena
                .all()
                .filter(|p| scope_rank(p.scope) == rank)
                .filter(|p| pool_has_headroom(arena, p, cpus_needed, request, prefer_shared_cpus_default))
                .collect();
            if !at_rank.is_empty() || rank == 0 {
                return at_rank;
            }
            rank -= 1;
        }
    }
}

fn cpus_needed_millis(request: &ContainerRequest) -> u32 {
    let millis = request.request.cpu_request_millis;
    if millis == 0 {
        1000 // unlimited burstable still needs at least one shared CPU's worth of headroom
    } else {
        millis
    }
}

fn pool_has_headroom(
    arena: &PoolArena,
    pool: &Pool,
    cpus_needed_millis: u32,
    request: &ContainerRequest,
    prefer_shared_cpus_default: bool,
) -> bool {
    if wants_exclusive_cpus(request, prefer_shared_cpus_default) {
        let full_cpus = request.request.full_cpus() as usize;
        arena.cpus_shared(pool.id).len() >= full_cpus
    } else {
        arena.free_shared_millis(pool.id) >= cpus_needed_millis as i64
    }
}

/// The scoring tuple from spec §4.3 step 3, higher is better. `spread` (more free headroom wins)
/// sits between (d) hint and (e) the pool-id tie-break: it isn't named as its own letter in the
/// spec, but a topology-aware policy that always broke remaining ties by pool id alone would pack
/// every first-come container onto the lowest-numbered pool instead of spreading load, which
/// contradicts the "smallest pool that fits" framing in §2. `colocate_pods`/`colocate_namespaces`
/// outweigh it deliberately, so an explicit request to colocate beats the default spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateScore {
    pub isolation: i64,
    pub colocation: i64,
    pub priority_fit: i64,
    pub hint: i64,
    pub spread: i64,
    /// Negated pool id: lower pool id sorts as a *higher* score (tie-break, step 3e).
    tie_break: i64,
}

impl PartialOrd for CandidateScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CandidateScore {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.isolation, self.colocation, self.priority_fit, self.hint, self.spread, self.tie_break).cmp(&(
            other.isolation,
            other.colocation,
            other.priority_fit,
            other.hint,
            other.spread,
            other.tie_break,
        ))
    }
}

pub const COLOCATION_BONUS: i64 = 100_000;

/// The pod-affinity/anti-affinity half of the hint score (spec §4.3 step 3d): pools already
/// holding a container from a pod the request's `pod-affinity`/`pod-anti-affinity` annotation
/// names, resolved by the caller against its own placement history (scoring has no placement
/// state of its own).
#[derive(Debug, Clone, Copy, Default)]
pub struct AffinityHints<'a> {
    pub affinity_pools: Option<&'a BTreeSet<PoolId>>,
    pub anti_affinity_pools: Option<&'a BTreeSet<PoolId>>,
}

/// Scores one candidate pool against a request. `same_pod_pools`/`same_namespace_pools` are the
/// pools any already-placed container from the same pod/namespace currently occupies.
#[allow(clippy::too_many_arguments)]
pub fn score_candidate(
    arena: &PoolArena,
    pool: &Pool,
    topology: &Topology,
    request: &ContainerRequest,
    colocate_pods: bool,
    colocate_namespaces: bool,
    prefer_isolated_cpus: bool,
    prefer_shared_cpus_default: bool,
    same_pod_pools: &BTreeSet<PoolId>,
    same_namespace_pools: &BTreeSet<PoolId>,
    affinity: AffinityHints,
) -> CandidateScore {
    let isolation = if prefer_isolated_cpus {
        isolation_score(arena, pool, topology, request, prefer_shared_cpus_default)
    } else {
        0
    };
    let mut colocation = 0;
    if colocate_pods && same_pod_pools.contains(&pool.id) {
        colocation += COLOCATION_BONUS;
    }
    if colocate_namespaces && same_namespace_pools.contains(&pool.id) {
        colocation += COLOCATION_BONUS / 2;
    }
    let priority_fit = priority_class_fit(arena, pool, topology, request);
    let hint = hint_score(pool, request, affinity);
    CandidateScore {
        isolation,
        colocation,
        priority_fit,
        hint,
        spread: arena.free_shared_millis(pool.id),
        tie_break: -(pool.id.0 as i64),
    }
}

/// (d) hint score: a `topology-hint.nri.io` annotation naming this pool's zone adds/subtracts its
/// weight; a `pod-affinity`/`pod-anti-affinity` record does the same for pools already holding a
/// matching pod's container.
fn hint_score(pool: &Pool, request: &ContainerRequest, affinity: AffinityHints) -> i64 {
    let mut score = 0;
    if let Some(Annotation::TopologyHint { zone, weight }) = request.annotations.get(KEY_TOPOLOGY_HINT) {
        if *zone == pool.zone_name() {
            score += weight;
        }
    }
    if let Some(Annotation::PodAffinity { weight, .. }) = request.annotations.get(KEY_POD_AFFINITY) {
        if affinity.affinity_pools.map(|pools| pools.contains(&pool.id)).unwrap_or(false) {
            score += weight;
        }
    }
    if let Some(Annotation::PodAntiAffinity { weight, .. }) = request.annotations.get(KEY_POD_ANTI_AFFINITY) {
        if affinity.anti_affinity_pools.map(|pools| pools.contains(&pool.id)).unwrap_or(false) {
            score -= weight;
        }
    }
    score
}

/// (a) isolation score: how many isolated or whole-core-free CPUs this pool's shared set offers,
/// only meaningful when the request wants exclusive full CPUs.
fn isolation_score(arena: &PoolArena, pool: &Pool, topology: &Topology, request: &ContainerRequest, prefer_shared_cpus_default: bool) -> i64 {
    if !wants_exclusive_cpus(request, prefer_shared_cpus_default) {
        return 0;
    }
    let shared = arena.cpus_shared(pool.id);
    let isolated = shared.iter().filter(|c| topology.cpu(**c).map(|cpu| cpu.isolated).unwrap_or(false)).count();
    let whole_core_free = shared
        .iter()
        .filter(|c| topology.smt_siblings(**c).iter().all(|s| shared.contains(s)))
        .count();
    (isolated * 2 + whole_core_free) as i64
}

/// (c) priority-class fit: bias toward pools whose free CPUs match the `prefer-cpu-priority`
/// annotation; the reserved pool always selects Normal regardless (spec §4.3 step 3c, enforced by
/// the caller never calling into scoring for the reserved cpuset in the first place).
fn priority_class_fit(arena: &PoolArena, pool: &Pool, topology: &Topology, request: &ContainerRequest) -> i64 {
    let wanted = match request.annotations.get(policy_core::annotations::KEY_PREFER_CPU_PRIORITY) {
        Some(Annotation::PreferCpuPriority(p)) => *p,
        _ => return 0,
    };
    let shared = arena.cpus_shared(pool.id);
    if shared.is_empty() {
        return 0;
    }
    let matching = shared
        .iter()
        .filter(|c| topology.cpu(**c).map(|cpu| cpu.priority_class == wanted).unwrap_or(false))
        .count();
    matching as i64
}

/// Picks `count` exclusive CPUs out of `pool`'s shared set, preferring isolated CPUs and whole
/// idle cores first (spec §4.3 step 3a applied to the actual pick, not just pool scoring).
pub fn pick_exclusive_cpus(arena: &PoolArena, pool_id: PoolId, topology: &Topology, count: usize) -> BTreeSet<CpuId> {
    let shared = arena.cpus_shared(pool_id);
    let mut ranked: Vec<CpuId> = shared.iter().copied().collect();
    ranked.sort_by_key(|c| {
        let cpu = topology.cpu(*c);
        let not_isolated = cpu.map(|c| !c.isolated).unwrap_or(true);
        let sibling_in_use = !topology.smt_siblings(*c).iter().all(|s| shared.contains(s));
        let core_id = cpu.map(|c| c.core_id).unwrap_or(u32::MAX);
        (not_isolated, sibling_in_use, core_id, c.0)
    });
    ranked.into_iter().take(count).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_core::{Annotations, PodUid};
    use topology::SyntheticTopologyBuilder;

    fn req(millis: u32) -> ContainerRequest {
        ContainerRequest {
            pod_uid: PodUid("p".into()),
            container_id: policy_core::ContainerId("c".into()),
            container_name: "c".into(),
            namespace: "default".into(),
            pod_labels: vec![],
            request: policy_core::ResourceRequest {
                cpu_request_millis: millis,
                cpu_limit_millis: millis,
                memory_request: 1,
                memory_limit: 1,
            },
            annotations: Annotations::new(),
        }
    }

    #[test]
    fn small_integral_request_prefers_core_scope() {
        let topo = SyntheticTopologyBuilder::new().numa_per_die(2).cores_per_numa(2).build().unwrap();
        let arena = PoolArena::build(&topo, None, &Default::default());
        assert_eq!(preferred_scope(&arena, &topo, &req(1000)), Scope::Core);
    }

    #[test]
    fn fractional_request_prefers_numa_scope() {
        let topo = SyntheticTopologyBuilder::new().numa_per_die(2).cores_per_numa(2).build().unwrap();
        let arena = PoolArena::build(&topo, None, &Default::default());
        assert_eq!(preferred_scope(&arena, &topo, &req(500)), Scope::Numa);
    }

    #[test]
    fn isolation_score_zero_for_shared_requests() {
        let topo = SyntheticTopologyBuilder::new().build().unwrap();
        let arena = PoolArena::build(&topo, None, &Default::default());
        let core_pool = arena.of_scope(Scope::Core).next().unwrap();
        assert_eq!(isolation_score(&arena, core_pool, &topo, &req(500), false), 0);
    }

    #[test]
    fn shared_candidates_stay_at_preferred_scope() {
        let topo = SyntheticTopologyBuilder::new().numa_per_die(4).cores_per_numa(4).build().unwrap();
        let arena = PoolArena::build(&topo, None, &Default::default());
        let found = candidates(&arena, Scope::Numa, &req(500), false);
        assert!(found.iter().all(|p| p.scope == Scope::Numa));
    }

    #[test]
    fn prefer_shared_cpus_default_overridden_by_annotation() {
        let mut annotated = req(1000);
        annotated.annotations.insert(policy_core::annotations::Scope::Container, policy_core::annotations::KEY_PREFER_SHARED_CPUS, "false");
        assert!(!wants_exclusive_cpus(&req(1000), true));
        assert!(wants_exclusive_cpus(&annotated, true));
    }

    #[test]
    fn topology_hint_rewards_matching_zone() {
        let topo = SyntheticTopologyBuilder::new().numa_per_die(2).cores_per_numa(2).build().unwrap();
        let arena = PoolArena::build(&topo, None, &Default::default());
        let numa_pool = arena.of_scope(Scope::Numa).next().unwrap();
        let other_pool = arena.of_scope(Scope::Numa).nth(1).unwrap();

        let mut request = req(500);
        request.annotations.insert(policy_core::annotations::Scope::Container, KEY_TOPOLOGY_HINT, &numa_pool.zone_name());

        let affinity = AffinityHints::default();
        let matching = hint_score(numa_pool, &request, affinity);
        let non_matching = hint_score(other_pool, &request, affinity);
        assert_eq!(matching, policy_core::annotations::DEFAULT_HINT_WEIGHT);
        assert_eq!(non_matching, 0);
    }

    #[test]
    fn pod_anti_affinity_penalizes_occupied_pool() {
        let topo = SyntheticTopologyBuilder::new().build().unwrap();
        let arena = PoolArena::build(&topo, None, &Default::default());
        let pool = arena.of_scope(Scope::Numa).next().unwrap();

        let mut request = req(500);
        request.annotations.insert(
            policy_core::annotations::Scope::Pod,
            KEY_POD_ANTI_AFFINITY,
            "tier=batch[weight=250]",
        );
        let occupied: BTreeSet<PoolId> = [pool.id].into_iter().collect();
        let affinity = AffinityHints { affinity_pools: None, anti_affinity_pools: Some(&occupied) };
        assert_eq!(hint_score(pool, &request, affinity), -250);
    }
}
