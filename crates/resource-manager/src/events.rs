//! Inputs to the resource manager's lifecycle methods: everything a `CreateContainer`/`Synchronize`
//! NRI event carries that the cache needs to durably remember, beyond what
//! [`policy_core::ContainerRequest`] itself models (spec §4.2/§4.5).
//!
//! The NRI transport that decodes these off the wire is out of core (spec §1); this is the
//! boundary it would call into.

use policy_core::annotations::Scope;
use policy_core::{ContainerId, ContainerRequest, PodUid, ResourceRequest};

/// One container as reported by `CreateContainer` or as one entry of `Synchronize`'s `add` list.
#[derive(Debug, Clone)]
pub struct CreateContainerInput {
    pub pod_uid: PodUid,
    pub container_id: ContainerId,
    pub container_name: String,
    pub namespace: String,
    pub pod_labels: Vec<(String, String)>,
    /// Raw `(scope, key, value)` annotation triples; parsed into [`policy_core::Annotations`]
    /// here and re-parsed from the cache on every restart (see `cache::ContainerRecord`).
    pub raw_annotations: Vec<(Scope, String, String)>,
    pub request: ResourceRequest,
    /// Pod creation time, milliseconds since epoch; anchors Rebalance's required total order
    /// (spec §5) together with `pod_uid` and `container_index`.
    pub pod_creation_timestamp: u64,
    pub container_index: u32,
}

impl CreateContainerInput {
    pub(crate) fn to_container_request(&self) -> ContainerRequest {
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
}

/// What `Synchronize(add, del)` produced: every surviving container's fresh adjustment, plus
/// which `del` entries were actually known (the rest were already gone, a no-op per spec §7).
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    pub allocated: Vec<(ContainerId, crate::adjustment::Adjustment)>,
    pub removed: Vec<ContainerId>,
}
