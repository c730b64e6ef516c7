//! The orchestrator's public error surface (spec §7): wraps every crate-boundary error the
//! manager can hit while draining the command queue.

use thiserror::Error;

use cache::CacheError;
use policy_core::{AllocationError, ConfigError, ContainerId};
use topology::TopologyError;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("container {0} is not known to the cache")]
    UnknownContainer(ContainerId),
}
