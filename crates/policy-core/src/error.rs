//! Error kinds surfaced by the allocator (spec §7).

use thiserror::Error;

use crate::identity::ContainerId;

/// Feasibility verdict for a candidate pool/balloon, cheap to compute before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationVerdict {
    Success,
    NotEnoughCpu,
    NotEnoughMemory,
    PriorityClassMismatch,
    LoadClassConflict,
    TargetNotFound,
}

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("no pool in the topology tree could satisfy the request for container {0}")]
    NoSuitablePool(ContainerId),

    #[error("no balloon could satisfy the request for container {0}: {1}")]
    NoSuitableBalloon(ContainerId, String),

    #[error("container {0} references CPUs no longer present in the current topology")]
    TopologyMismatch(ContainerId),

    #[error("the runtime rejected the proposed adjustment for container {0}: {1}")]
    AdjustmentRejected(ContainerId, String),

    #[error("reserved cpuset is smaller than the combined request of its pinned containers")]
    ReservedCpusetOversubscribed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Invalid(String),

    #[error("balloon type '{name}' has minBalloons ({min_balloons}) > maxBalloons ({max_balloons})")]
    BalloonCountRange {
        name: String,
        min_balloons: u32,
        max_balloons: u32,
    },

    #[error("balloon type '{name}' has minCPUs ({min_cpus}) > maxCPUs ({max_cpus})")]
    BalloonCpuRange { name: String, min_cpus: u32, max_cpus: u32 },

    #[error("invalid cpuset specification '{0}'")]
    InvalidCpuset(String),

    #[error("unknown policy backend '{0}'")]
    UnknownBackend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
