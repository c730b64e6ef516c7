//! Errors raised while discovering or validating hardware topology.

use thiserror::Error;

use crate::CpuId;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("provider failed to enumerate CPUs: {0}")]
    DiscoveryFailed(String),

    #[error("cpu {cpu:?} disagrees with its core {core}'s package/die assignment")]
    InconsistentCore { cpu: CpuId, core: u32 },

    #[error("topology has no CPUs")]
    Empty,

    #[error("memory node {0} has zero capacity")]
    EmptyMemoryNode(u32),
}
