//! Balloons policy backend: component 4 (spec §4.4). A flat collection of named, dynamically
//! sized CPU sets ("balloons"), each stamped out of a configured [`crate::types::BalloonType`],
//! grown and shrunk as containers join and leave instead of walking a fixed hardware tree.

pub mod allocator;
pub mod config;
pub mod idle;
pub mod loadclass;
pub mod matcher;
pub mod types;

use std::sync::Arc;

use policy_core::{
    Allocation, AllocationError, Allocator, BackendFactory, ConfigError, ContainerId,
    ContainerRequest, Introspection, PolicyBackend, Services, TopologyPublisher,
};
use topology::Topology;

pub use allocator::BalloonSetAllocator;
pub use config::{BalloonsConfig, BalloonsConfigRaw};
pub use types::{Balloon, BalloonState, BalloonType};

/// Registered backend name, matching the spec's `policy: balloons` configuration value.
pub const BACKEND_NAME: &str = "balloons";

/// Adapts [`BalloonSetAllocator`] to the [`PolicyBackend`] union trait the resource manager
/// drives, mirroring `topology-policy`'s `TopologyAwareBackend` wrapper.
pub struct BalloonsBackend {
    allocator: BalloonSetAllocator,
}

impl BalloonsBackend {
    pub fn new(topology: Topology, config: BalloonsConfig) -> Self {
        Self {
            allocator: BalloonSetAllocator::new(topology, config),
        }
    }

    /// Builds a backend from its raw JSON configuration and the current topology; the shape
    /// [`BackendFactory`] expects, registered under [`BACKEND_NAME`].
    pub fn factory() -> BackendFactory {
        Arc::new(|topology: &Topology, config: serde_json::Value, _services: Services| {
            let raw: BalloonsConfigRaw = serde_json::from_value(config).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            let config = BalloonsConfig::from_raw(raw)?;
            Ok(Box::new(Self::new(topology.clone(), config)) as Box<dyn PolicyBackend>)
        })
    }
}

impl Allocator for BalloonsBackend {
    fn allocate(&mut self, request: &ContainerRequest) -> Result<Allocation, AllocationError> {
        self.allocator.allocate(request)
    }

    fn update(&mut self, container_id: &ContainerId, request: &ContainerRequest) -> Result<Allocation, AllocationError> {
        self.allocator.update(container_id, request)
    }

    fn release(&mut self, container_id: &ContainerId) -> Result<(), AllocationError> {
        self.allocator.release(container_id)
    }

    fn rebalance(&mut self) -> Result<Vec<(ContainerId, Allocation)>, AllocationError> {
        self.allocator.rebalance()
    }

    fn topology_changed(&mut self, topology: &Topology) {
        self.allocator.topology_changed(topology)
    }
}

impl Introspection for BalloonsBackend {
    fn describe(&self) -> Vec<String> {
        self.allocator.describe()
    }
}

impl TopologyPublisher for BalloonsBackend {
    fn published_zones(&self) -> Vec<String> {
        self.allocator.published_zones()
    }
}

impl PolicyBackend for BalloonsBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }
}
