//! The single serialized command stream the resource manager drains (spec §5), replacing the
//! teacher's discrete-event `cast!`/`EventHandler::on` dispatch: a real daemon driven by NRI
//! hook calls and periodic rebalance ticks has no simulated clock to advance, just one queue of
//! requests arriving from whichever NRI event triggered them.

use crate::container::ContainerRequest;
use crate::error::AllocationError;
use crate::identity::ContainerId;
use crate::resource::Allocation;

#[derive(Debug, Clone)]
pub enum Command {
    Allocate(ContainerRequest),
    Update(ContainerRequest),
    Release(ContainerId),
    /// NRI `Synchronize`: containers the runtime already has running (`add`) alongside ones that
    /// disappeared while the plugin was disconnected (`del`). Deletions apply before additions,
    /// per spec §5.
    Sync {
        add: Vec<ContainerRequest>,
        del: Vec<ContainerId>,
    },
    /// Periodic or triggered rebalance pass, in `(pod_creation_timestamp, pod_uid,
    /// container_index)` order.
    Rebalance,
    ConfigUpdate,
    TopologyChanged,
}

/// What a command produces once applied, handed back to the NRI adapter to turn into a runtime
/// adjustment or propagated as an error to the caller.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Allocated {
        container_id: ContainerId,
        allocation: Allocation,
    },
    Released {
        container_id: ContainerId,
    },
    Synced {
        allocated: Vec<(ContainerId, Allocation)>,
        removed: Vec<ContainerId>,
    },
    Rebalanced {
        moved: Vec<(ContainerId, Allocation)>,
    },
    Acknowledged,
}

pub type CommandResult = Result<CommandOutcome, AllocationError>;

/// Associates a command with the channel its caller is waiting on, since the manager's command
/// loop (`resource-manager`) is the sole place that owns `PolicyBackend` mutably.
pub struct Envelope {
    pub command: Command,
    pub reply: std::sync::mpsc::Sender<CommandResult>,
}

impl Envelope {
    pub fn new(command: Command, reply: std::sync::mpsc::Sender<CommandResult>) -> Self {
        Self { command, reply }
    }
}
