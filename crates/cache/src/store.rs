//! `ContainerCache`: `Insert`/`Update`/`Get`/`Delete`/`List`/`Save`/`Load` against a single
//! versioned JSON file, grounded on `dslab-iaas`'s `vm_api::VmAPI` (a `HashMap`-backed registry
//! with a `get`/`register_new_vm`/status-update surface) for the in-memory shape; the
//! persistence-with-symlink-rejection requirement has no teacher equivalent and follows spec
//! §4.2/§8 SYM-1 directly.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use policy_core::ContainerId;

use crate::error::CacheError;
use crate::record::ContainerRecord;

/// Bumped whenever the on-disk schema changes incompatibly; [`ContainerCache::load`] refuses to
/// read a file stamped with a different version rather than guess at a migration.
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    containers: BTreeMap<ContainerId, ContainerRecord>,
}

/// In-memory container registry, durable across restarts via a single serialized file.
#[derive(Debug, Clone, Default)]
pub struct ContainerCache {
    containers: BTreeMap<ContainerId, ContainerRecord>,
}

impl ContainerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ContainerRecord) {
        self.containers.insert(record.container_id.clone(), record);
    }

    /// Applies `patch` to the record named `id`, if present. Returns whether a record was found.
    pub fn update(&mut self, id: &ContainerId, patch: impl FnOnce(&mut ContainerRecord)) -> bool {
        match self.containers.get_mut(id) {
            Some(record) => {
                patch(record);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &ContainerId) -> Option<&ContainerRecord> {
        self.containers.get(id)
    }

    /// Removing an unknown container is a no-op (spec §7: release is best-effort idempotent).
    pub fn delete(&mut self, id: &ContainerId) {
        self.containers.remove(id);
    }

    pub fn list(&self) -> impl Iterator<Item = &ContainerRecord> {
        self.containers.values()
    }

    /// Containers in Rebalance's required total order: `(pod_creation_timestamp, pod_uid,
    /// container_index)` (spec §5).
    pub fn list_rebalance_order(&self) -> Vec<&ContainerRecord> {
        let mut records: Vec<&ContainerRecord> = self.containers.values().collect();
        records.sort_by_key(|r| (r.pod_creation_timestamp, r.pod_uid.clone(), r.container_index));
        records
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Persists the cache to `path` as a single file, fsync'd before returning (spec §5: "the
    /// cache file (single writer, fsync on every save)"). Writes to a sibling temp file and
    /// renames over the target so a crash mid-write never leaves a truncated cache.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let file = CacheFile {
            version: CACHE_FORMAT_VERSION,
            containers: self.containers.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&file).map_err(|source| CacheError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp_path = tmp_path_for(path);
        let tmp = fs::File::create(&tmp_path).map_err(|source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        use std::io::Write;
        {
            let mut tmp = tmp;
            tmp.write_all(&bytes).map_err(|source| CacheError::Write {
                path: path.to_path_buf(),
                source,
            })?;
            tmp.sync_all().map_err(|source| CacheError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::rename(&tmp_path, path).map_err(|source| CacheError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Loads the cache from `path`. A missing file yields a fresh empty cache (first boot); a
    /// symlinked file is refused outright (spec §8 SYM-1); a version mismatch is refused rather
    /// than silently reinterpreted.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(CacheError::SymlinkRejected(path.to_path_buf()));
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => {
                return Err(CacheError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }

        let bytes = fs::read(path).map_err(|source| CacheError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: CacheFile = serde_json::from_slice(&bytes).map_err(|source| CacheError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        if file.version != CACHE_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                found: file.version,
                expected: CACHE_FORMAT_VERSION,
            });
        }
        Ok(Self {
            containers: file.containers,
        })
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "cache".into());
    name.push(".tmp");
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy_core::{Annotations, ContainerRequest, PodUid, ResourceRequest};

    fn sample_record(id: &str) -> ContainerRecord {
        let request = ContainerRequest {
            pod_uid: PodUid("pod-1".into()),
            container_id: ContainerId(id.into()),
            container_name: "main".into(),
            namespace: "default".into(),
            pod_labels: vec![],
            request: ResourceRequest {
                cpu_request_millis: 1000,
                cpu_limit_millis: 1000,
                memory_request: 1 << 20,
                memory_limit: 1 << 20,
            },
            annotations: Annotations::new(),
        };
        ContainerRecord::from_request(&request, Vec::new(), 0, 0)
    }

    #[test]
    fn insert_get_delete_roundtrip() {
        let mut cache = ContainerCache::new();
        cache.insert(sample_record("c1"));
        assert!(cache.get(&ContainerId("c1".into())).is_some());
        cache.delete(&ContainerId("c1".into()));
        assert!(cache.get(&ContainerId("c1".into())).is_none());
    }

    #[test]
    fn delete_unknown_is_noop() {
        let mut cache = ContainerCache::new();
        cache.delete(&ContainerId("missing".into()));
        assert!(cache.is_empty());
    }

    #[test]
    fn save_then_load_roundtrips_allocations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let mut cache = ContainerCache::new();
        cache.insert(sample_record("c1"));
        cache.update(&ContainerId("c1".into()), |r| {
            r.lifecycle = crate::record::Lifecycle::Running;
            r.allocation = Some(policy_core::Allocation::default());
        });
        cache.save(&path).unwrap();

        let loaded = ContainerCache::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        let record = loaded.get(&ContainerId("c1".into())).unwrap();
        assert_eq!(record.lifecycle, crate::record::Lifecycle::Running);
    }

    #[test]
    fn load_missing_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let cache = ContainerCache::load(&path).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn load_refuses_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.json");
        fs::write(&target, b"{}").unwrap();
        let link = dir.path().join("cache.json");
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, &link).unwrap();
        #[cfg(unix)]
        {
            let err = ContainerCache::load(&link).unwrap_err();
            assert!(matches!(err, CacheError::SymlinkRejected(_)));
        }
    }

    #[test]
    fn load_rejects_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, br#"{"version":999,"containers":{}}"#).unwrap();
        let err = ContainerCache::load(&path).unwrap_err();
        assert!(matches!(err, CacheError::VersionMismatch { .. }));
    }

    #[test]
    fn rebalance_order_is_stable_total_order() {
        let mut cache = ContainerCache::new();
        let mut r1 = sample_record("c1");
        r1.pod_creation_timestamp = 5;
        let mut r2 = sample_record("c2");
        r2.pod_creation_timestamp = 1;
        cache.insert(r1);
        cache.insert(r2);
        let ordered = cache.list_rebalance_order();
        assert_eq!(ordered[0].container_id, ContainerId("c2".into()));
        assert_eq!(ordered[1].container_id, ContainerId("c1".into()));
    }
}
