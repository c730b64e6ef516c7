//! The persisted view of one pod/container, grounded on `dslab-iaas`'s `vm_api::VmAPI` registry
//! shape (a plain record behind a `HashMap`, status tracked alongside it) generalized to the
//! lifecycle spec §3 requires.

use serde::{Deserialize, Serialize};

use policy_core::{Allocation, ContainerId, ContainerRequest, PodUid, Qos, ResourceRequest};

/// Lifecycle states a container moves through; only `Running` holds a reservation (spec §3). The
/// runtime interface (spec §6) only raises `CreateContainer`/`UpdateContainer`/`StopContainer`,
/// with no intermediate "allocated but not yet started" or "stopping" event to observe, so a
/// record moves directly from `Pending` to `Running` and is deleted from the cache on stop rather
/// than passing through a held `Released` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Pending,
    Running,
    Released,
}

impl Lifecycle {
    pub fn holds_reservation(&self) -> bool {
        matches!(self, Lifecycle::Running)
    }
}

/// Everything the cache remembers about one container across a process restart: identity, QoS,
/// the resource request that produced its allocation, annotations (re-parsed on load since
/// `Annotations` itself isn't serialized, see [`ContainerRecord::to_request`]), and the
/// last-known allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub pod_uid: PodUid,
    pub container_id: ContainerId,
    pub container_name: String,
    pub namespace: String,
    pub pod_labels: Vec<(String, String)>,
    /// Raw `(scope, key, value)` annotation triples, re-parsed through
    /// `policy_core::annotations::Annotations` on load rather than serializing the parsed form,
    /// so a cache written by an older annotation parser still loads under a newer one.
    pub raw_annotations: Vec<(policy_core::annotations::Scope, String, String)>,
    pub request: ResourceRequest,
    pub lifecycle: Lifecycle,
    pub allocation: Option<Allocation>,
    /// Pod creation order, used by Rebalance's total ordering (spec §5).
    pub pod_creation_timestamp: u64,
    pub container_index: u32,
    /// Set when a topology-change signal (spec §4.1) removed a CPU this container's allocation
    /// referenced; cleared once Rebalance re-derives a fresh allocation for it.
    #[serde(default)]
    pub needs_reallocation: bool,
}

impl ContainerRecord {
    pub fn qos(&self) -> Qos {
        Qos::derive(&self.request)
    }

    /// Reconstructs the [`ContainerRequest`] view an allocator consumes, re-parsing annotations.
    pub fn to_request(&self) -> ContainerRequest {
        let mut annotations = policy_core::Annotations::new();
        for (scope, key, value) in &self.raw_annotations {
            annotations.insert(*scope, key, value);
        }
        ContainerRequest {
            pod_uid: self.pod_uid.clone(),
            container_id: self.container_id.clone(),
            container_name: self.container_name.clone(),
            namespace: self.namespace.clone(),
            pod_labels: self.pod_labels.clone(),
            request: self.request,
            annotations,
        }
    }

    /// Builds a fresh record from an incoming request. `raw_annotations` is the (scope, key,
    /// value) triples the runtime adapter parsed `request.annotations` out of; the caller passes
    /// them through separately because `Annotations` keeps only the parsed form.
    pub fn from_request(
        request: &ContainerRequest,
        raw_annotations: Vec<(policy_core::annotations::Scope, String, String)>,
        pod_creation_timestamp: u64,
        container_index: u32,
    ) -> Self {
        Self {
            pod_uid: request.pod_uid.clone(),
            container_id: request.container_id.clone(),
            container_name: request.container_name.clone(),
            namespace: request.namespace.clone(),
            pod_labels: request.pod_labels.clone(),
            raw_annotations,
            request: request.request,
            lifecycle: Lifecycle::Pending,
            allocation: None,
            pod_creation_timestamp,
            container_index,
            needs_reallocation: false,
        }
    }
}
