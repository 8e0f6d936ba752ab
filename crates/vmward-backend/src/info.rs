//! Instance description types

use serde::{Deserialize, Serialize};
use vmward_api::MachineState;

/// Backend view of a single instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Instance identifier
    pub instance_id: String,
    /// Current state as reported by the backend
    pub state: MachineState,
    /// Instance type (size)
    pub instance_type: String,
    /// Public IP address, if one is assigned
    pub ip_address: Option<String>,
}

impl InstanceInfo {
    /// Create a new instance description without an address
    pub fn new(
        instance_id: impl Into<String>,
        state: MachineState,
        instance_type: impl Into<String>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            state,
            instance_type: instance_type.into(),
            ip_address: None,
        }
    }

    /// Set the public IP address
    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }
}
