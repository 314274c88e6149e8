//! TimeoutCertificate gossip message.

use canopy_types::{NetworkMessage, TimeoutCertificate};
use serde::{Deserialize, Serialize};

/// Certificate proving a supermajority timed out a view.
///
/// Broadcast by the replica that assembled it so lagging replicas can skip
/// the view without collecting timeouts themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutCertificateGossip {
    /// The certificate being gossiped.
    pub certificate: TimeoutCertificate,
}

impl TimeoutCertificateGossip {
    /// Create a new timeout certificate gossip message.
    pub fn new(certificate: TimeoutCertificate) -> Self {
        Self { certificate }
    }
}

impl NetworkMessage for TimeoutCertificateGossip {
    fn message_type_id() -> &'static str {
        "consensus.timeout_certificate"
    }
}
