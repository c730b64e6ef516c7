//! Quality-of-service classification.

use serde::{Deserialize, Serialize};

use crate::resource::ResourceRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Qos {
    Guaranteed,
    Burstable,
    BestEffort,
}

impl Qos {
    /// Derives the QoS class from requests/limits the same way the kubelet does: Guaranteed
    /// requires every resource's request to equal its limit (and both to be set); BestEffort is
    /// the absence of any request or limit; everything else is Burstable.
    pub fn derive(request: &ResourceRequest) -> Self {
        let no_cpu = request.cpu_request_millis == 0 && request.cpu_limit_millis == 0;
        let no_mem = request.memory_request == 0 && request.memory_limit == 0;
        if no_cpu && no_mem {
            return Qos::BestEffort;
        }
        let cpu_guaranteed = request.cpu_limit_millis != 0 && request.cpu_request_millis == request.cpu_limit_millis;
        let mem_guaranteed = request.memory_limit != 0 && request.memory_request == request.memory_limit;
        if cpu_guaranteed && mem_guaranteed {
            Qos::Guaranteed
        } else {
            Qos::Burstable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guaranteed_requires_request_equals_limit() {
        let req = ResourceRequest {
            cpu_request_millis: 1000,
            cpu_limit_millis: 1000,
            memory_request: 1 << 20,
            memory_limit: 1 << 20,
        };
        assert_eq!(Qos::derive(&req), Qos::Guaranteed);
    }

    #[test]
    fn best_effort_has_no_requests() {
        let req = ResourceRequest::default();
        assert_eq!(Qos::derive(&req), Qos::BestEffort);
    }

    #[test]
    fn mismatched_limit_is_burstable() {
        let req = ResourceRequest {
            cpu_request_millis: 500,
            cpu_limit_millis: 1000,
            memory_request: 1 << 20,
            memory_limit: 1 << 20,
        };
        assert_eq!(Qos::derive(&req), Qos::Burstable);
    }
}
