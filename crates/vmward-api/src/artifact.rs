//! Provisioning result descriptor

use serde::{Deserialize, Serialize};

/// Result of a successful provisioning action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Public IP address of the instance
    pub ip_address: String,
    /// Backend instance identifier
    pub instance_id: String,
    /// Primary domain name bound to the machine
    pub domain_name: String,
    /// Instance type the instance is actually running with
    pub instance_type: String,
}
