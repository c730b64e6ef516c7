//! Balloon-type matching (spec §4.4 "Matching"): iterate configured types in declared order,
//! select the first whose matcher accepts the container, evaluated through the precedence the
//! spec lists: explicit annotation, then `matchExpressions`, then `namespaces`, then (for the
//! implicit default/reserved balloons only) a QoS fallback.

use policy_core::annotations::Annotation;
use policy_core::ContainerRequest;

use crate::types::BalloonType;

pub const DEFAULT_BALLOON_TYPE: &str = "default";
pub const RESERVED_BALLOON_TYPE: &str = "reserved";

/// Labels available for `matchExpressions` to evaluate against. Pod-scoped only: `ContainerRequest`
/// carries `pod_labels` but no container-level labels field, so this cannot yet apply the
/// container-scoped-wins-over-pod-scoped precedence spec §4.4 step 2 describes for label matching
/// (the same precedence `policy_core::Annotations` applies to annotations). Revisit once
/// container-level labels are threaded through the runtime adapter.
fn merged_labels(request: &ContainerRequest) -> Vec<(String, String)> {
    request.pod_labels.clone()
}

/// Picks the balloon type a new container should be matched into, per spec §4.4 step 1-3. Falls
/// back to `None` when nothing (including an explicit annotation naming an unconfigured type)
/// matches, letting the caller apply the QoS fallback to the implicit balloons.
pub fn match_type<'a>(types: &'a [BalloonType], request: &ContainerRequest) -> Option<&'a BalloonType> {
    if let Some(Annotation::BalloonType(name)) = request.annotations.get(policy_core::annotations::KEY_BALLOON_TYPE) {
        return types.iter().find(|t| &t.name == name);
    }

    let labels = merged_labels(request);
    for t in types {
        if !t.match_expressions.is_empty() && t.match_expressions.iter().all(|e| e.matches(&labels)) {
            return Some(t);
        }
    }

    // Namespace match: an exact match on any type beats every `*` wildcard match, regardless of
    // declaration order (spec §4.4 step 3 "exact or `*` wildcard with precedence given to exact
    // matches").
    let mut wildcard: Option<&BalloonType> = None;
    for t in types {
        if t.namespaces.iter().any(|ns| ns == &request.namespace) {
            return Some(t);
        }
        if wildcard.is_none() && t.namespaces.iter().any(|ns| ns == "*") {
            wildcard = Some(t);
        }
    }
    wildcard
}

/// QoS fallback used only when nothing configured matched: Guaranteed and Burstable containers
/// land in the default balloon, BestEffort in the reserved... no, spec says "QoS fallback for the
/// implicit reserved/default balloons" without prescribing which QoS maps to which; following the
/// topology-aware backend's own convention (reserved is for system/annotated workloads, default is
/// everything else), QoS alone never selects reserved — only the `prefer-reserved-cpus` annotation
/// and configured reserved namespaces do, handled by the caller before this fallback runs.
pub fn implicit_balloon_name() -> &'static str {
    DEFAULT_BALLOON_TYPE
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_core::{Annotations, ContainerId, PodUid, ResourceRequest};

    fn req(namespace: &str) -> ContainerRequest {
        ContainerRequest {
            pod_uid: PodUid("p".into()),
            container_id: ContainerId("c".into()),
            container_name: "c".into(),
            namespace: namespace.into(),
            pod_labels: vec![],
            request: ResourceRequest::default(),
            annotations: Annotations::new(),
        }
    }

    fn type_with_namespaces(name: &str, namespaces: &[&str]) -> BalloonType {
        BalloonType {
            name: name.into(),
            namespaces: namespaces.iter().map(|s| s.to_string()).collect(),
            match_expressions: vec![],
            min_cpus: 0,
            max_cpus: u32::MAX,
            min_balloons: 0,
            max_balloons: u32::MAX,
            allocator_priority: crate::types::AllocatorPriority::Normal,
            cpu_class: crate::types::CpuClass::Balanced,
            memory_types: topology::MemoryTypeMask::default(),
            prefer_new_balloons: false,
            prefer_spreading_pods: false,
            prefer_spreading_namespaces: false,
            group_by: None,
            loads: vec![],
            pin_cpu: true,
            pin_memory: true,
        }
    }

    #[test]
    fn exact_namespace_beats_wildcard() {
        let types = vec![type_with_namespaces("catchall", &["*"]), type_with_namespaces("specific", &["prod"])];
        let matched = match_type(&types, &req("prod")).unwrap();
        assert_eq!(matched.name, "specific");
    }

    #[test]
    fn explicit_annotation_wins_over_namespace() {
        let types = vec![type_with_namespaces("byns", &["prod"])];
        let mut request = req("prod");
        request.annotations.insert(
            policy_core::annotations::Scope::Container,
            policy_core::annotations::KEY_BALLOON_TYPE,
            "byns",
        );
        let matched = match_type(&types, &request).unwrap();
        assert_eq!(matched.name, "byns");
    }
}
