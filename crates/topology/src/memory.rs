//! Memory-node topology facts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifies a NUMA memory node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemNodeId(pub u32);

impl std::fmt::Display for MemNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of memory backing a NUMA node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryKind {
    Dram,
    Hbm,
    Pmem,
}

/// Fallback distance values used when the discovery provider cannot read a distance table.
pub const FALLBACK_LOCAL_DISTANCE: u32 = 10;
pub const FALLBACK_REMOTE_DISTANCE: u32 = 20;

/// A single NUMA memory node, its capacity and its distance to every other node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: MemNodeId,
    pub kind: MemoryKind,
    pub capacity_bytes: u64,
    /// Distance to every node in the topology (including itself, distance 0 or the local fallback).
    pub distances: BTreeMap<MemNodeId, u32>,
}

impl MemoryNode {
    pub fn new(id: u32, kind: MemoryKind, capacity_bytes: u64) -> Self {
        Self {
            id: MemNodeId(id),
            kind,
            capacity_bytes,
            distances: BTreeMap::new(),
        }
    }

    pub fn distance_to(&self, other: MemNodeId) -> u32 {
        if other == self.id {
            return FALLBACK_LOCAL_DISTANCE;
        }
        self.distances
            .get(&other)
            .copied()
            .unwrap_or(FALLBACK_REMOTE_DISTANCE)
    }
}

/// Bitset over the three recognized memory kinds, backing the `memory-type` annotation
/// and a balloon type's `memory_types` restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryTypeMask {
    pub dram: bool,
    pub hbm: bool,
    pub pmem: bool,
}

impl MemoryTypeMask {
    pub fn all() -> Self {
        Self {
            dram: true,
            hbm: true,
            pmem: true,
        }
    }

    pub fn matches(&self, kind: MemoryKind) -> bool {
        if !(self.dram || self.hbm || self.pmem) {
            return true;
        }
        match kind {
            MemoryKind::Dram => self.dram,
            MemoryKind::Hbm => self.hbm,
            MemoryKind::Pmem => self.pmem,
        }
    }

    /// Parses a comma-separated list such as `"hbm,dram,pmem"`.
    pub fn parse(spec: &str) -> Self {
        let mut mask = Self::default();
        for part in spec.split(',') {
            match part.trim().to_ascii_lowercase().as_str() {
                "dram" => mask.dram = true,
                "hbm" => mask.hbm = true,
                "pmem" => mask.pmem = true,
                _ => {}
            }
        }
        mask
    }
}
