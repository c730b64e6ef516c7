//! Component 7: the resource manager (spec §4.5). Translates runtime lifecycle events into
//! policy-backend calls, assembles the resulting runtime adjustment, persists the cache, and
//! publishes metrics/topology zones. Owns the single [`policy_core::PolicyBackend`] and drives
//! every allocate/release/update/sync/rebalance through it, serialized (spec §5: "the allocator
//! never observes a partial commit") because `&mut self` only one caller can hold at a time.

pub mod adjustment;
pub mod config;
pub mod error;
pub mod events;
pub mod registry;

use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use cache::{ContainerCache, ContainerRecord, Lifecycle};
use policy_core::{
    AllocationError, BackendRegistry, Command, CommandOutcome, CommandResult, ContainerId,
    ContainerRequest, Envelope, Introspection, PolicyBackend, ResourceRequest, Services,
    TopologyPublisher,
};
use topology::{Topology, TopologyProvider};

pub use adjustment::Adjustment;
pub use config::{ManagerConfig, ManagerConfigRaw};
pub use error::ManagerError;
pub use events::{CreateContainerInput, SyncOutcome};
pub use registry::default_registry;

/// The orchestrator described in spec §4.5/§2. Every public method here is one NRI lifecycle
/// event (or the periodic Rebalance/TopologyChanged/ConfigUpdate signals); none of them may be
/// called concurrently against the same instance (spec §5's single-threaded cooperative model),
/// which is enforced simply by requiring `&mut self`.
pub struct ResourceManager {
    backend: Box<dyn PolicyBackend>,
    backend_registry: BackendRegistry,
    backend_name: String,
    backend_config: serde_json::Value,
    topology: Topology,
    topology_provider: Arc<dyn TopologyProvider + Send + Sync>,
    cache: ContainerCache,
    cache_path: PathBuf,
    config_path: Option<PathBuf>,
    services: Services,
    scheduling_classes: std::collections::BTreeMap<String, policy_core::SchedulingClass>,
}

impl ResourceManager {
    /// Builds a manager against an explicit [`BackendRegistry`], the initial discovered
    /// [`Topology`], and the provider it re-consults on a `TopologyChanged` signal. Loads the
    /// cache from `config.cache_path` (spec §4.2: a missing file is a fresh empty cache, a
    /// symlinked one is fatal).
    pub fn new(
        config: ManagerConfig,
        topology: Topology,
        topology_provider: Arc<dyn TopologyProvider + Send + Sync>,
        services: Services,
        registry: BackendRegistry,
    ) -> Result<Self, ManagerError> {
        let backend = registry.build(&config.backend_name, &topology, config.backend_config.clone(), services.clone())?;
        let cache = ContainerCache::load(&config.cache_path)?;
        Ok(Self {
            backend,
            backend_registry: registry,
            backend_name: config.backend_name,
            backend_config: config.backend_config,
            topology,
            topology_provider,
            cache,
            cache_path: config.cache_path,
            config_path: None,
            services,
            scheduling_classes: config.scheduling_classes,
        })
    }

    /// Convenience over [`Self::new`] that registers both shipped backends.
    pub fn with_default_backends(
        config: ManagerConfig,
        topology: Topology,
        topology_provider: Arc<dyn TopologyProvider + Send + Sync>,
        services: Services,
    ) -> Result<Self, ManagerError> {
        Self::new(config, topology, topology_provider, services, default_registry())
    }

    /// Points the manager at a config file to re-read on a `ConfigUpdate` signal driven through
    /// [`Self::apply`]; without one, that signal is a logged no-op.
    pub fn watch_config_file(&mut self, path: PathBuf) {
        self.config_path = Some(path);
    }

    pub fn cache(&self) -> &ContainerCache {
        &self.cache
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    fn save_cache(&self) -> Result<(), ManagerError> {
        self.cache.save(&self.cache_path).map_err(Into::into)
    }

    /// Publishes topology-zone and per-container metrics after every mutating call (spec §4.5:
    /// "publishes topology zones ... and per-container metrics"). Zone detail itself (pool/balloon
    /// cpusets) is available to callers via [`Self::published_zones`]/[`Self::describe`]; what
    /// goes through [`policy_core::Services::metrics`] is the handful of gauges a metrics backend
    /// would actually want to scrape.
    fn publish_gauges(&self) {
        self.services.metrics.set_gauge("containers_total", self.cache.len() as i64);
        self.services
            .metrics
            .set_gauge("published_zones_total", self.backend.published_zones().len() as i64);

        let mut guaranteed = 0i64;
        let mut burstable = 0i64;
        let mut best_effort = 0i64;
        for record in self.cache.list() {
            match record.qos() {
                policy_core::Qos::Guaranteed => guaranteed += 1,
                policy_core::Qos::Burstable => burstable += 1,
                policy_core::Qos::BestEffort => best_effort += 1,
            }
        }
        self.services.metrics.set_gauge("containers_guaranteed_total", guaranteed);
        self.services.metrics.set_gauge("containers_burstable_total", burstable);
        self.services.metrics.set_gauge("containers_besteffort_total", best_effort);
    }

    /// The cache's current view of a container's grant, for the command-queue path where a
    /// caller only gets back a [`policy_core::Allocation`], not the runtime [`Adjustment`].
    fn allocation_of(&self, container_id: &ContainerId) -> policy_core::Allocation {
        self.cache
            .get(container_id)
            .and_then(|record| record.allocation.clone())
            .unwrap_or_default()
    }

    // ---- CreateContainer / UpdateContainer / StopContainer (spec §4.5, §6) ----

    /// `CreateContainer -> AllocateResources`: on success the container is recorded as `Running`
    /// (the scoped runtime interface has no separate "container started" event) and the cache is
    /// saved before returning; on failure nothing is mutated and no allocation is held (spec §7:
    /// "the container is not placed into any pool/balloon").
    pub fn create_container(&mut self, input: CreateContainerInput) -> Result<Adjustment, ManagerError> {
        let (_, adjustment) = self.commit_allocation(input)?;
        self.save_cache()?;
        self.publish_gauges();
        Ok(adjustment)
    }

    fn commit_allocation(&mut self, input: CreateContainerInput) -> Result<(ContainerId, Adjustment), ManagerError> {
        let request = input.to_container_request();
        let mut allocation = match self.backend.allocate(&request) {
            Ok(allocation) => allocation,
            Err(err) => {
                self.services.metrics.incr_counter("allocation_errors_total", 1);
                return Err(err.into());
            }
        };
        allocation.scheduling_class = adjustment::resolve_scheduling_class(&request, &self.scheduling_classes);

        let mut record = ContainerRecord::from_request(
            &request,
            input.raw_annotations,
            input.pod_creation_timestamp,
            input.container_index,
        );
        record.lifecycle = Lifecycle::Running;
        record.allocation = Some(allocation.clone());
        let container_id = record.container_id.clone();
        self.cache.insert(record);
        self.services.metrics.incr_counter("allocations_total", 1);

        let adjustment = adjustment::build_adjustment(&request, &allocation);
        Ok((container_id, adjustment))
    }

    /// `UpdateContainer -> UpdateResources`: re-runs the allocation algorithm against the new
    /// request (spec §4.5: "deltas only; same algorithm as Allocate against the new request").
    pub fn update_container(&mut self, container_id: &ContainerId, new_request: ResourceRequest) -> Result<Adjustment, ManagerError> {
        let record = self
            .cache
            .get(container_id)
            .ok_or_else(|| ManagerError::UnknownContainer(container_id.clone()))?;
        let mut request: ContainerRequest = record.to_request();
        request.request = new_request;

        let mut allocation = self.backend.update(container_id, &request)?;
        allocation.scheduling_class = adjustment::resolve_scheduling_class(&request, &self.scheduling_classes);

        self.cache.update(container_id, |r| {
            r.request = new_request;
            r.allocation = Some(allocation.clone());
        });
        self.save_cache()?;
        self.services.metrics.incr_counter("updates_total", 1);
        self.publish_gauges();
        Ok(adjustment::build_adjustment(&request, &allocation))
    }

    /// `StopContainer -> ReleaseResources`. Best-effort idempotent: releasing a container the
    /// backend or cache no longer know about is a no-op, never an error (spec §7).
    pub fn stop_container(&mut self, container_id: &ContainerId) -> Result<(), ManagerError> {
        let _ = self.backend.release(container_id);
        self.cache.delete(container_id);
        self.save_cache()?;
        self.services.metrics.incr_counter("releases_total", 1);
        self.publish_gauges();
        Ok(())
    }

    /// `Synchronize(add, del)`: `del` is applied before `add` (spec §5), so CPUs a disappeared
    /// container held are visible to the reallocations that follow in the same call. A container
    /// in `add` that fails to allocate is dropped with a logged warning rather than aborting the
    /// whole batch — the runtime already told us about every other survivor in this same call.
    pub fn synchronize(&mut self, add: Vec<CreateContainerInput>, del: Vec<ContainerId>) -> Result<SyncOutcome, ManagerError> {
        let mut removed = Vec::new();
        for id in del {
            let _ = self.backend.release(&id);
            if self.cache.get(&id).is_some() {
                removed.push(id.clone());
            }
            self.cache.delete(&id);
        }

        let mut allocated = Vec::new();
        for input in add {
            let container_id = input.container_id.clone();
            match self.commit_allocation(input) {
                Ok((id, adjustment)) => allocated.push((id, adjustment)),
                Err(err) => log::warn!("synchronize: container {container_id} failed to allocate: {err}"),
            }
        }

        self.save_cache()?;
        self.publish_gauges();
        Ok(SyncOutcome { allocated, removed })
    }

    /// Rebalance: replays every cached container in `(pod_creation_timestamp, pod_uid,
    /// container_index)` order (spec §5) — release then reallocate, one container at a time, so
    /// later containers in the order see the CPUs earlier ones just gave back. Idempotent by
    /// construction: an already-balanced cache releases and reclaims the same CPUs in the same
    /// order (spec invariant 5).
    pub fn rebalance(&mut self) -> Result<Vec<(ContainerId, Adjustment)>, ManagerError> {
        let order: Vec<ContainerId> = self
            .cache
            .list_rebalance_order()
            .into_iter()
            .filter(|r| r.lifecycle.holds_reservation())
            .map(|r| r.container_id.clone())
            .collect();

        for id in &order {
            let _ = self.backend.release(id);
        }

        let mut changes = Vec::new();
        for id in &order {
            let record = self
                .cache
                .get(id)
                .expect("rebalance order was just derived from the cache's own contents")
                .clone();
            let request = record.to_request();
            let mut allocation = match self.backend.allocate(&request) {
                Ok(allocation) => allocation,
                Err(err) => {
                    log::warn!("rebalance: container {id} could not be reallocated: {err}");
                    continue;
                }
            };
            allocation.scheduling_class = adjustment::resolve_scheduling_class(&request, &self.scheduling_classes);

            let adjustment = adjustment::build_adjustment(&request, &allocation);
            self.cache.update(id, |r| {
                r.allocation = Some(allocation.clone());
                r.needs_reallocation = false;
            });
            changes.push((id.clone(), adjustment));
        }

        self.save_cache()?;
        self.services.metrics.incr_counter("rebalance_total", 1);
        self.publish_gauges();
        Ok(changes)
    }

    /// A hot-plug / topology-change signal (spec §4.1): swaps in `new_topology`, tells the
    /// backend, and flags every cached container whose last-known allocation referenced a CPU
    /// that vanished. Flagged containers are not reallocated here — the caller (or
    /// [`Self::reload_topology`], for the `TopologyChanged` command) is expected to follow up with
    /// [`Self::rebalance`], matching spec §4.1's "retriggers Sync on the policy backend".
    pub fn topology_changed(&mut self, new_topology: Topology) -> Result<Vec<ContainerId>, ManagerError> {
        let diff = new_topology.diff(&self.topology);
        self.topology = new_topology;
        self.backend.topology_changed(&self.topology);

        let mut flagged = Vec::new();
        if !diff.removed.is_empty() {
            let stale_ids: Vec<ContainerId> = self
                .cache
                .list()
                .filter(|record| {
                    record
                        .allocation
                        .as_ref()
                        .map(|a| a.cpus.iter().any(|cpu| diff.removed.contains(cpu)))
                        .unwrap_or(false)
                })
                .map(|record| record.container_id.clone())
                .collect();
            for id in stale_ids {
                self.cache.update(&id, |r| r.needs_reallocation = true);
                flagged.push(id);
            }
            self.save_cache()?;
        }
        Ok(flagged)
    }

    /// Re-discovers the topology through the configured provider and applies
    /// [`Self::topology_changed`]; if anything got flagged, immediately follows up with
    /// [`Self::rebalance`] so the signal is fully handled in one call, the way a real hot-plug
    /// handler would.
    pub fn reload_topology(&mut self) -> Result<Vec<(ContainerId, Adjustment)>, ManagerError> {
        let discovered = self.topology_provider.discover()?;
        let flagged = self.topology_changed(discovered)?;
        if flagged.is_empty() {
            return Ok(Vec::new());
        }
        self.rebalance()
    }

    /// Re-reads the config file set by [`Self::watch_config_file`] and applies it. A static
    /// validation failure leaves the previous configuration (and backend) live and is reported
    /// back as an error (spec §7 "Configuration error"); the happy path rebuilds the backend
    /// against the *current* topology and cache, which is why a backend switch loses any
    /// in-flight exclusive placements the old backend held (there's no cross-backend migration).
    pub fn reload_config_from_disk(&mut self) -> Result<(), ManagerError> {
        let Some(path) = self.config_path.clone() else {
            log::warn!("ConfigUpdate received but no config file is being watched");
            return Ok(());
        };
        let bytes = std::fs::read(&path).map_err(policy_core::ConfigError::Io)?;
        let raw: ManagerConfigRaw = serde_yaml::from_slice(&bytes).map_err(|e| policy_core::ConfigError::Invalid(e.to_string()))?;
        let config = ManagerConfig::from_raw(raw)?;
        self.reload_config(config)
    }

    pub fn reload_config(&mut self, config: ManagerConfig) -> Result<(), ManagerError> {
        let backend = self
            .backend_registry
            .build(&config.backend_name, &self.topology, config.backend_config.clone(), self.services.clone())?;
        self.backend = backend;
        self.backend_name = config.backend_name;
        self.backend_config = config.backend_config;
        self.cache_path = config.cache_path;
        self.scheduling_classes = config.scheduling_classes;
        Ok(())
    }

    pub fn describe(&self) -> Vec<String> {
        self.backend.describe()
    }

    pub fn published_zones(&self) -> Vec<String> {
        self.backend.published_zones()
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    // ---- Command queue (spec §5.1) ----

    /// Drains a single [`Command`], the shape the out-of-core NRI transport would carry over an
    /// `mpsc` channel (spec Design Notes "goroutine + channel event loop"). `Command::Allocate`/
    /// `Update`/`Sync` only carry a [`ContainerRequest`], which has no raw annotation triples or
    /// pod-creation timestamp to persist — this path stamps the current wall-clock time and
    /// `container_index = 0`, which is fine for queue-driven smoke tests but loses Rebalance
    /// ordering fidelity; callers that care about exact ordering should call
    /// [`Self::create_container`]/[`Self::synchronize`] directly with a [`CreateContainerInput`].
    pub fn apply(&mut self, command: Command) -> CommandResult {
        let (result, fallback_id) = self.apply_raw(command);
        to_command_result(result, fallback_id.as_ref())
    }

    /// Same dispatch as [`Self::apply`], but keeps the [`ManagerError`] uncollapsed so [`Self::run`]
    /// can tell a cache-save failure (spec §4.5: "fatal; process exits") apart from an ordinary
    /// rejected adjustment before the error is narrowed down to [`AllocationError`] for the reply.
    fn apply_raw(&mut self, command: Command) -> (Result<CommandOutcome, ManagerError>, Option<ContainerId>) {
        match command {
            Command::Allocate(request) => {
                let container_id = request.container_id.clone();
                let input = self.request_to_input(request);
                let result = self.create_container(input).map(|_| CommandOutcome::Allocated {
                    container_id: container_id.clone(),
                    allocation: self.allocation_of(&container_id),
                });
                (result, Some(container_id))
            }
            Command::Update(request) => {
                let container_id = request.container_id.clone();
                let result = self.update_container(&container_id, request.request).map(|_| CommandOutcome::Allocated {
                    container_id: container_id.clone(),
                    allocation: self.allocation_of(&container_id),
                });
                (result, Some(container_id))
            }
            Command::Release(container_id) => {
                let result = self.stop_container(&container_id).map(|()| CommandOutcome::Released {
                    container_id: container_id.clone(),
                });
                (result, Some(container_id))
            }
            Command::Sync { add, del } => {
                let inputs = add.into_iter().map(|r| self.request_to_input(r)).collect();
                let result = self.synchronize(inputs, del).map(|outcome| CommandOutcome::Synced {
                    allocated: outcome
                        .allocated
                        .iter()
                        .map(|(id, _)| (id.clone(), self.allocation_of(id)))
                        .collect(),
                    removed: outcome.removed,
                });
                (result, None)
            }
            Command::Rebalance => {
                let result = self.rebalance().map(|changes| CommandOutcome::Rebalanced {
                    moved: changes.iter().map(|(id, _)| (id.clone(), self.allocation_of(id))).collect(),
                });
                (result, None)
            }
            Command::TopologyChanged => (self.reload_topology().map(|_| CommandOutcome::Acknowledged), None),
            Command::ConfigUpdate => (self.reload_config_from_disk().map(|()| CommandOutcome::Acknowledged), None),
        }
    }

    fn request_to_input(&self, request: ContainerRequest) -> CreateContainerInput {
        CreateContainerInput {
            pod_uid: request.pod_uid,
            container_id: request.container_id,
            container_name: request.container_name,
            namespace: request.namespace,
            pod_labels: request.pod_labels,
            raw_annotations: Vec::new(),
            request: request.request,
            pod_creation_timestamp: self.services.clock.now_unix_millis(),
            container_index: 0,
        }
    }

    /// Drains `rx` until the sender is dropped, replying to each [`Envelope`] on its own channel.
    /// The single-consumer loop spec §5 requires; the out-of-core transport owns the `Sender`
    /// half and one reply channel per call.
    ///
    /// A cache-save failure is fatal (spec §4.5: "process exits; restart replays from runtime
    /// state"). This library has no process to exit, so it replies to the failed call and then
    /// stops draining `rx` instead; the binary embedding it is expected to treat `run` returning
    /// with commands still queued as the signal to exit and let the restarted process rebuild its
    /// cache from the runtime's own state.
    pub fn run(mut self, rx: Receiver<Envelope>) {
        for envelope in rx {
            let (result, fallback_id) = self.apply_raw(envelope.command);
            let fatal = matches!(result, Err(ManagerError::Cache(_)));
            let _ = envelope.reply.send(to_command_result(result, fallback_id.as_ref()));
            if fatal {
                log::error!("cache save failed; stopping the command loop, restart will replay from runtime state");
                break;
            }
        }
    }
}

fn to_command_result(result: Result<CommandOutcome, ManagerError>, fallback_id: Option<&ContainerId>) -> CommandResult {
    result.map_err(|err| match err {
        ManagerError::Allocation(inner) => inner,
        other => {
            let id = fallback_id.cloned().unwrap_or_else(|| ContainerId("unknown".to_string()));
            AllocationError::AdjustmentRejected(id, other.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_core::annotations::Scope;
    use policy_core::{PodUid, ResourceRequest};
    use topology::{FixedTopologyProvider, SyntheticTopologyBuilder};

    fn topo() -> Topology {
        SyntheticTopologyBuilder::new().numa_per_die(2).cores_per_numa(4).build().unwrap()
    }

    fn manager_with_cache_dir(dir: &std::path::Path) -> ResourceManager {
        let topology = topo();
        let provider: Arc<dyn TopologyProvider + Send + Sync> = Arc::new(FixedTopologyProvider(topology.clone()));
        let mut config = ManagerConfig::default();
        config.cache_path = dir.join("cache.json");
        ResourceManager::with_default_backends(config, topology, provider, Services::default()).unwrap()
    }

    fn input(pod: &str, container: &str, millis: u32, timestamp: u64) -> CreateContainerInput {
        CreateContainerInput {
            pod_uid: PodUid(pod.into()),
            container_id: ContainerId(container.into()),
            container_name: container.into(),
            namespace: "default".into(),
            pod_labels: vec![],
            raw_annotations: Vec::new(),
            request: ResourceRequest {
                cpu_request_millis: millis,
                cpu_limit_millis: millis,
                memory_request: 1 << 20,
                memory_limit: 1 << 20,
            },
            pod_creation_timestamp: timestamp,
            container_index: 0,
        }
    }

    #[test]
    fn create_container_persists_to_cache_and_returns_adjustment() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_with_cache_dir(dir.path());
        let adjustment = manager.create_container(input("pod-1", "c1", 1000, 0)).unwrap();
        assert!(adjustment.cpus.is_some());
        assert_eq!(manager.cache().len(), 1);

        let reloaded = ContainerCache::load(&manager.cache_path).unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn stop_container_is_idempotent_for_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_with_cache_dir(dir.path());
        manager.stop_container(&ContainerId("nope".into())).unwrap();
    }

    #[test]
    fn update_unknown_container_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_with_cache_dir(dir.path());
        let err = manager.update_container(&ContainerId("nope".into()), ResourceRequest::default());
        assert!(matches!(err, Err(ManagerError::UnknownContainer(_))));
    }

    #[test]
    fn synchronize_processes_del_before_add() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_with_cache_dir(dir.path());
        manager.create_container(input("pod-1", "c1", 4000, 0)).unwrap();

        // The replacement pod needs every CPU the first one held; del must free them before add
        // is attempted in the same call.
        let outcome = manager
            .synchronize(vec![input("pod-2", "c2", 4000, 1)], vec![ContainerId("c1".into())])
            .unwrap();
        assert_eq!(outcome.removed, vec![ContainerId("c1".into())]);
        assert_eq!(outcome.allocated.len(), 1);
        assert!(manager.cache().get(&ContainerId("c1".into())).is_none());
    }

    #[test]
    fn rebalance_on_balanced_cache_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_with_cache_dir(dir.path());
        manager.create_container(input("pod-1", "c1", 2000, 5)).unwrap();
        manager.create_container(input("pod-2", "c2", 1000, 1)).unwrap();

        let first = manager.rebalance().unwrap();
        let second = manager.rebalance().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rebalance_orders_by_pod_creation_timestamp_then_pod_uid() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_with_cache_dir(dir.path());
        // Insert out of timestamp order; rebalance must still replay earliest-created first.
        manager.create_container(input("pod-late", "c-late", 1000, 100)).unwrap();
        manager.create_container(input("pod-early", "c-early", 1000, 1)).unwrap();

        let changes = manager.rebalance().unwrap();
        let ids: Vec<&ContainerId> = changes.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![&ContainerId("c-early".into()), &ContainerId("c-late".into())]);
    }

    #[test]
    fn topology_change_flags_containers_referencing_vanished_cpus() {
        use std::collections::BTreeSet;
        use topology::CpuId;

        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_with_cache_dir(dir.path());
        manager.create_container(input("pod-1", "c1", 1000, 0)).unwrap();
        // Pin the recorded allocation to a CPU id guaranteed not to exist in the shrunk topology
        // below, independent of which CPU the backend actually picked.
        manager.cache.update(&ContainerId("c1".into()), |r| {
            let allocation = r.allocation.get_or_insert_with(Default::default);
            allocation.cpus = BTreeSet::from([CpuId(7)]);
        });

        let shrunk = SyntheticTopologyBuilder::new().numa_per_die(1).cores_per_numa(1).build().unwrap();
        let flagged = manager.topology_changed(shrunk).unwrap();
        assert!(!flagged.is_empty());
        let record = manager.cache().get(&ContainerId("c1".into())).unwrap();
        assert!(record.needs_reallocation);
    }

    #[test]
    fn apply_command_allocate_round_trips_through_queue_shape() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_with_cache_dir(dir.path());
        let request = ContainerRequest {
            pod_uid: PodUid("pod-1".into()),
            container_id: ContainerId("c1".into()),
            container_name: "c1".into(),
            namespace: "default".into(),
            pod_labels: vec![],
            request: ResourceRequest {
                cpu_request_millis: 1000,
                cpu_limit_millis: 1000,
                memory_request: 1 << 20,
                memory_limit: 1 << 20,
            },
            annotations: policy_core::Annotations::new(),
        };
        let outcome = manager.apply(Command::Allocate(request)).unwrap();
        assert!(matches!(outcome, CommandOutcome::Allocated { .. }));
    }

    #[test]
    fn scheduling_class_annotation_resolves_against_configured_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager_with_cache_dir(dir.path());
        manager.scheduling_classes.insert(
            "batch-low".to_string(),
            policy_core::SchedulingClass {
                policy: policy_core::SchedPolicy::Batch,
                priority: 0,
                io_class: policy_core::IoClass::Idle,
                io_priority: 7,
            },
        );
        let mut create = input("pod-1", "c1", 1000, 0);
        create.raw_annotations = vec![(Scope::Container, policy_core::annotations::KEY_SCHEDULING_CLASS.to_string(), "batch-low".to_string())];
        manager.create_container(create).unwrap();
        let record = manager.cache().get(&ContainerId("c1".into())).unwrap();
        let class = record.allocation.as_ref().unwrap().scheduling_class.unwrap();
        assert_eq!(class.policy, policy_core::SchedPolicy::Batch);
    }
}
