//! The `Services` bundle: dependencies constructors take explicitly instead of reaching for
//! globals or ambient state, per Design Notes item "explicit services bundle".

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Abstracts wall-clock time so allocation/rebalance logic can be driven by fixed timestamps in
/// tests instead of `SystemTime::now()`.
pub trait Clock: Send + Sync {
    fn now_unix_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Counters and gauges the allocator publishes (spec §4.6: pool/balloon occupancy, rebalance
/// counts, allocation failures). Kept minimal; a real deployment wires this to its own metrics
/// stack, which is why it's a trait rather than a concrete recorder.
pub trait MetricsSink: Send + Sync {
    fn incr_counter(&self, name: &str, value: u64);
    fn set_gauge(&self, name: &str, value: i64);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricsSink;

impl MetricsSink for NullMetricsSink {
    fn incr_counter(&self, _name: &str, _value: u64) {}
    fn set_gauge(&self, _name: &str, _value: i64) {}
}

/// Dependencies threaded into every backend and the resource manager. Logging goes through the
/// `log` facade directly (as the teacher does) rather than through this bundle; `Services` covers
/// only what genuinely varies between a production run and a test.
#[derive(Clone)]
pub struct Services {
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl Services {
    pub fn new(clock: Arc<dyn Clock>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { clock, metrics }
    }
}

impl Default for Services {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NullMetricsSink),
        }
    }
}
