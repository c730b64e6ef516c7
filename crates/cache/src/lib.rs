//! Component 2: the in-memory, persistable registry of known pods/containers (spec §4.2).
//!
//! The cache is the single owner of container records; pool/balloon membership elsewhere is a
//! non-owning reference by [`policy_core::ContainerId`].

pub mod error;
pub mod record;
pub mod store;

pub use error::CacheError;
pub use record::{ContainerRecord, Lifecycle};
pub use store::ContainerCache;
