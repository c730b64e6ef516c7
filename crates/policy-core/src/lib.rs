//! Shared contract between the resource manager and whichever policy backend is active: the
//! container/resource/annotation vocabulary, the `Allocator`/`PolicyBackend` traits, the command
//! queue shape, and the services bundle. Neither `topology-policy` nor `balloons-policy` depends
//! on the other; both depend only on this crate and `topology`.

pub mod annotations;
pub mod backend;
pub mod command;
pub mod config;
pub mod container;
pub mod error;
pub mod identity;
pub mod qos;
pub mod resource;
pub mod scheduling;
pub mod services;

pub use annotations::{Annotation, Annotations, Scope};
pub use backend::{Allocator, BackendFactory, BackendRegistry, Introspection, PolicyBackend, TopologyPublisher};
pub use command::{Command, CommandOutcome, CommandResult, Envelope};
pub use container::{ContainerRequest, ContainerState};
pub use error::{AllocationError, AllocationVerdict, ConfigError};
pub use identity::{ContainerId, PodUid};
pub use qos::Qos;
pub use resource::{Allocation, ResourceRequest};
pub use scheduling::{IoClass, SchedPolicy, SchedulingClass};
pub use services::{Clock, MetricsSink, NullMetricsSink, Services, SystemClock};
