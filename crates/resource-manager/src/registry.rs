//! The explicit `{name -> factory}` table (spec §4.7 / Design Notes "plugin registration via
//! import-for-side-effects"), populated once at process init instead of each backend crate
//! registering itself as a side effect of being linked in.

use policy_core::BackendRegistry;

/// Registers both shipped backends under their spec-mandated configuration names
/// (`topology-aware`, `balloons`). Callers that only need one backend linked in may build a
/// `BackendRegistry` by hand instead; this is the convenience path `ResourceManager::new` uses
/// when not given one explicitly.
pub fn default_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(topology_policy::BACKEND_NAME, topology_policy::TopologyAwareBackend::factory());
    registry.register(balloons_policy::BACKEND_NAME, balloons_policy::BalloonsBackend::factory());
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_backends_registered() {
        let registry = default_registry();
        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["balloons", "topology-aware"]);
    }
}
