//! The contract a pool-tree or balloon-set policy implements, and the registry the resource
//! manager uses to pick between them (spec §3, Design Notes item "explicit backend registry"
//! replacing import-for-side-effects plugin registration).

use std::collections::HashMap;
use std::sync::Arc;

use topology::Topology;

use crate::container::ContainerRequest;
use crate::error::{AllocationError, ConfigError};
use crate::identity::ContainerId;
use crate::resource::Allocation;
use crate::services::Services;

/// The core placement contract: given a request and the containers already running, produce or
/// revoke an allocation.
pub trait Allocator {
    fn allocate(&mut self, request: &ContainerRequest) -> Result<Allocation, AllocationError>;

    fn update(&mut self, container_id: &ContainerId, request: &ContainerRequest) -> Result<Allocation, AllocationError>;

    fn release(&mut self, container_id: &ContainerId) -> Result<(), AllocationError>;

    /// Re-derives every allocation from current policy state without changing membership
    /// semantics; a pass with nothing to improve is a no-op (spec invariant 5).
    fn rebalance(&mut self) -> Result<Vec<(ContainerId, Allocation)>, AllocationError>;

    fn topology_changed(&mut self, topology: &Topology);
}

/// What a backend exposes for operational visibility. Optional in the sense that a minimal
/// backend can return empty collections; `resource-manager` still calls through this trait so the
/// NRI adapter has one place to ask "what does this backend see".
pub trait Introspection {
    /// One human-readable line per top-level scope (pool or balloon), for a status dump.
    fn describe(&self) -> Vec<String>;
}

/// Publishes the zones/pools a backend actually uses back out, for external tooling that wants to
/// mirror the allocator's view of the topology without re-deriving it.
pub trait TopologyPublisher {
    fn published_zones(&self) -> Vec<String>;
}

/// A complete, pluggable policy backend: `Allocator` is mandatory, the other two are implemented
/// on every backend here because both ship introspection and zone publication, but are kept as
/// separate traits so a future caller can depend on just one.
pub trait PolicyBackend: Allocator + Introspection + TopologyPublisher + Send {
    fn name(&self) -> &'static str;
}

/// Constructs a backend from its YAML config and current topology. Implemented once per backend
/// crate and registered under the backend's name.
pub type BackendFactory = Arc<dyn Fn(&Topology, serde_json::Value, Services) -> Result<Box<dyn PolicyBackend>, ConfigError> + Send + Sync>;

/// `{name -> factory}` table the resource manager consults when the runtime config names an
/// active backend. Registration is explicit (`register`), done once at startup by whichever
/// binary links the backend crates in, instead of each backend crate registering itself as a side
/// effect of being linked.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, factory: BackendFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn build(
        &self,
        name: &str,
        topology: &Topology,
        config: serde_json::Value,
        services: Services,
    ) -> Result<Box<dyn PolicyBackend>, ConfigError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownBackend(name.to_string()))?;
        factory(topology, config, services)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
