//! The view of a container a [`crate::backend::Allocator`] receives: everything the request and
//! the pod's metadata carry that the allocator is allowed to look at.

use crate::annotations::Annotations;
use crate::identity::{ContainerId, PodUid};
use crate::qos::Qos;
use crate::resource::{Allocation, ResourceRequest};

#[derive(Debug, Clone)]
pub struct ContainerRequest {
    pub pod_uid: PodUid,
    pub container_id: ContainerId,
    pub container_name: String,
    pub namespace: String,
    pub pod_labels: Vec<(String, String)>,
    pub request: ResourceRequest,
    pub annotations: Annotations,
}

impl ContainerRequest {
    pub fn qos(&self) -> Qos {
        Qos::derive(&self.request)
    }
}

/// A container already known to the manager, carrying its current grant alongside the request
/// that produced it. Distinct from [`ContainerRequest`] because `Update`/`Release`/`Rebalance`
/// need the existing allocation; `Allocate` doesn't have one yet.
#[derive(Debug, Clone)]
pub struct ContainerState {
    pub request: ContainerRequest,
    pub allocation: Allocation,
}
